//! Result processors: typed adapters from [`RawResult`] to caller-visible
//! values (spec §4.C).
//!
//! A processor is modeled as a function over a small enum rather than an
//! open trait hierarchy — conditions, processors, and result sinks are a
//! closed set (spec §9 "Polymorphism"), so a plain `fn` pointer plus a
//! handful of provided adapters covers every shape the spec names.

use crate::message::{FailureDetail, FailureKind, ProcessOutcome, RedirectTarget};
use crate::raw::RawResult;

/// Recognize a `-MOVED`/`-ASK` error reply and turn it into a redirect
/// target, or classify any other `-ERR`-shaped reply as a server failure.
fn classify_error(msg: &[u8]) -> ProcessOutcome<std::convert::Infallible> {
    let text = String::from_utf8_lossy(msg);
    let mut parts = text.split_whitespace();
    match parts.next() {
        Some("MOVED") => {
            if let (Some(slot), Some(addr)) = (parts.next(), parts.next()) {
                if let (Ok(slot), Some((host, port))) = (slot.parse(), addr.rsplit_once(':')) {
                    if let Ok(port) = port.parse() {
                        return ProcessOutcome::NeedRedirect(RedirectTarget::Moved {
                            slot,
                            host: host.to_owned(),
                            port,
                        });
                    }
                }
            }
            ProcessOutcome::Failed(FailureDetail {
                kind: FailureKind::ServerError,
                server_message: Some(text.into_owned()),
            })
        }
        Some("ASK") => {
            if let (Some(slot), Some(addr)) = (parts.next(), parts.next()) {
                if let (Ok(slot), Some((host, port))) = (slot.parse(), addr.rsplit_once(':')) {
                    if let Ok(port) = port.parse() {
                        return ProcessOutcome::NeedRedirect(RedirectTarget::Ask {
                            slot,
                            host: host.to_owned(),
                            port,
                        });
                    }
                }
            }
            ProcessOutcome::Failed(FailureDetail {
                kind: FailureKind::ServerError,
                server_message: Some(text.into_owned()),
            })
        }
        Some("LOADING") | Some("TRYAGAIN") | Some("CLUSTERDOWN") => ProcessOutcome::NeedRetry,
        _ => ProcessOutcome::Failed(FailureDetail {
            kind: FailureKind::ServerError,
            server_message: Some(text.into_owned()),
        }),
    }
}

/// Shared dispatch used by every processor below: error replies are always
/// handled the same way (redirect / retry / fail), so only the success-case
/// mapping differs per processor.
fn dispatch<T>(raw: &RawResult, on_success: impl FnOnce(&RawResult) -> Option<T>) -> ProcessOutcome<T> {
    if let RawResult::Error(msg) = raw {
        return match classify_error(msg) {
            ProcessOutcome::NeedRedirect(r) => ProcessOutcome::NeedRedirect(r),
            ProcessOutcome::NeedRetry => ProcessOutcome::NeedRetry,
            ProcessOutcome::Failed(f) => ProcessOutcome::Failed(f),
            ProcessOutcome::Completed(never) => match never {},
        };
    }
    match on_success(raw) {
        Some(v) => ProcessOutcome::Completed(v),
        None => ProcessOutcome::Failed(FailureDetail {
            kind: FailureKind::UnexpectedType,
            server_message: None,
        }),
    }
}

/// Discards the reply entirely; used for fire-and-forget messages once the
/// write has already completed the caller's future.
pub fn void(raw: &RawResult) -> ProcessOutcome<()> {
    dispatch(raw, |_| Some(()))
}

/// `+OK` (or RESP3 `#t`) maps to `true`; anything else that isn't an error
/// maps to `false` rather than failing, matching common client behavior for
/// commands like `SETNX`.
pub fn bool_from_ok(raw: &RawResult) -> ProcessOutcome<bool> {
    dispatch(raw, |r| match r {
        RawResult::SimpleString(s) => Some(s.as_slice() == b"OK"),
        RawResult::Boolean(b) => Some(*b),
        RawResult::Integer(i) => Some(*i != 0),
        RawResult::Null => Some(false),
        _ => None,
    })
}

/// `:0`/`:1` replies (e.g. `EXISTS`, `SETNX`) as a boolean.
pub fn zero_or_one(raw: &RawResult) -> ProcessOutcome<bool> {
    dispatch(raw, |r| match r {
        RawResult::Integer(0) => Some(false),
        RawResult::Integer(1) => Some(true),
        _ => None,
    })
}

/// Plain signed 64-bit integer reply.
pub fn integer(raw: &RawResult) -> ProcessOutcome<i64> {
    dispatch(raw, |r| match r {
        RawResult::Integer(i) => Some(*i),
        _ => None,
    })
}

/// Double reply, accepting both RESP3 `,` frames and RESP2 bulk-string
/// encodings of the same value (servers downgrade `,` to `$` for RESP2
/// clients).
pub fn double(raw: &RawResult) -> ProcessOutcome<f64> {
    dispatch(raw, |r| match r {
        RawResult::Double(d) => Some(*d),
        RawResult::BulkString(Some(b)) => crate::buffer::parse_f64(b),
        _ => None,
    })
}

/// Nullable byte-sequence reply (`GET`, `HGET`, …).
pub fn nullable_bytes(raw: &RawResult) -> ProcessOutcome<Option<Vec<u8>>> {
    dispatch(raw, |r| match r {
        RawResult::BulkString(b) => Some(b.clone()),
        RawResult::Null => Some(None),
        _ => None,
    })
}

/// Array of (possibly-null) bulk strings, e.g. `MGET`.
pub fn array_of_bulk_strings(raw: &RawResult) -> ProcessOutcome<Vec<Option<Vec<u8>>>> {
    dispatch(raw, |r| match r {
        RawResult::Array(Some(items)) => items
            .iter()
            .map(|i| match i {
                RawResult::BulkString(b) => Some(b.clone()),
                RawResult::Null => Some(None),
                _ => None,
            })
            .collect(),
        _ => None,
    })
}

/// Field/value pairs from either a flat RESP2 array (`HGETALL`) or a native
/// RESP3 map reply.
pub fn multi_map(raw: &RawResult) -> ProcessOutcome<Vec<(Vec<u8>, Vec<u8>)>> {
    dispatch(raw, |r| match r {
        RawResult::Map(pairs) => pairs
            .iter()
            .map(|(k, v)| Some((as_bytes(k)?, as_bytes(v)?)))
            .collect(),
        RawResult::Array(Some(items)) => {
            if items.len() % 2 != 0 {
                return None;
            }
            let mut out = Vec::with_capacity(items.len() / 2);
            let mut it = items.iter();
            while let (Some(k), Some(v)) = (it.next(), it.next()) {
                out.push((as_bytes(k)?, as_bytes(v)?));
            }
            Some(out)
        }
        _ => None,
    })
}

/// Member/score pairs (`ZRANGE ... WITHSCORES` and similar) from a flat
/// RESP2 array or a RESP3 map.
pub fn sorted_set_with_scores(raw: &RawResult) -> ProcessOutcome<Vec<(Vec<u8>, f64)>> {
    dispatch(raw, |r| match r {
        RawResult::Map(pairs) => pairs
            .iter()
            .map(|(k, v)| Some((as_bytes(k)?, as_f64(v)?)))
            .collect(),
        RawResult::Array(Some(items)) => {
            if items.len() % 2 != 0 {
                return None;
            }
            let mut out = Vec::with_capacity(items.len() / 2);
            let mut it = items.iter();
            while let (Some(m), Some(s)) = (it.next(), it.next()) {
                out.push((as_bytes(m)?, as_f64(s)?));
            }
            Some(out)
        }
        _ => None,
    })
}

/// `GEOPOS`-shaped reply: an array of nullable (longitude, latitude) pairs.
pub fn geo_positions(raw: &RawResult) -> ProcessOutcome<Vec<Option<(f64, f64)>>> {
    dispatch(raw, |r| match r {
        RawResult::Array(Some(items)) => items
            .iter()
            .map(|i| match i {
                RawResult::Null => Some(None),
                RawResult::Array(Some(pair)) if pair.len() == 2 => {
                    Some(Some((as_f64(&pair[0])?, as_f64(&pair[1])?)))
                }
                _ => None,
            })
            .collect(),
        _ => None,
    })
}

/// A single `XRANGE`/`XREAD` stream entry: an id plus its field/value pairs.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamEntry {
    pub id: Vec<u8>,
    pub fields: Vec<(Vec<u8>, Vec<u8>)>,
}

/// Array of stream entries, each `[id, [field, value, ...]]`.
pub fn stream_entries(raw: &RawResult) -> ProcessOutcome<Vec<StreamEntry>> {
    dispatch(raw, |r| match r {
        RawResult::Array(Some(items)) => items.iter().map(parse_stream_entry).collect(),
        _ => None,
    })
}

fn parse_stream_entry(item: &RawResult) -> Option<StreamEntry> {
    let RawResult::Array(Some(pair)) = item else {
        return None;
    };
    if pair.len() != 2 {
        return None;
    }
    let id = as_bytes(&pair[0])?;
    let RawResult::Array(Some(flat)) = &pair[1] else {
        return None;
    };
    if flat.len() % 2 != 0 {
        return None;
    }
    let mut fields = Vec::with_capacity(flat.len() / 2);
    let mut it = flat.iter();
    while let (Some(k), Some(v)) = (it.next(), it.next()) {
        fields.push((as_bytes(k)?, as_bytes(v)?));
    }
    Some(StreamEntry { id, fields })
}

/// Parsed line from `CLUSTER NODES` bulk-string output.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterNode {
    pub id: String,
    pub host: String,
    pub port: u16,
    pub flags: Vec<String>,
    pub slots: Vec<(u16, u16)>,
}

/// `CLUSTER NODES` reply: a single bulk string of newline-separated records.
pub fn cluster_nodes(raw: &RawResult) -> ProcessOutcome<Vec<ClusterNode>> {
    dispatch(raw, |r| match r {
        RawResult::BulkString(Some(b)) => {
            let text = std::str::from_utf8(b).ok()?;
            text.lines().filter(|l| !l.is_empty()).map(parse_cluster_node_line).collect()
        }
        _ => None,
    })
}

fn parse_cluster_node_line(line: &str) -> Option<ClusterNode> {
    let mut fields = line.split(' ');
    let id = fields.next()?.to_owned();
    let addr = fields.next()?;
    let hostport = addr.split('@').next()?;
    let (host, port) = hostport.rsplit_once(':')?;
    let port = port.parse().ok()?;
    let flags: Vec<String> = fields.next()?.split(',').map(str::to_owned).collect();
    let _master_id = fields.next();
    let _ping_sent = fields.next();
    let _pong_recv = fields.next();
    let _config_epoch = fields.next();
    let _link_state = fields.next();
    let slots = fields
        .filter(|tok| tok.as_bytes().first().is_some_and(u8::is_ascii_digit))
        .filter_map(|tok| {
            let mut parts = tok.splitn(2, '-');
            let lo: u16 = parts.next()?.parse().ok()?;
            let hi: u16 = match parts.next() {
                Some(hi) => hi.parse().ok()?,
                None => lo,
            };
            Some((lo, hi))
        })
        .collect();
    Some(ClusterNode {
        id,
        host: host.to_owned(),
        port,
        flags,
        slots,
    })
}

/// `CLIENT INFO` reply: a single bulk string of space-separated `k=v` pairs.
pub fn client_info(raw: &RawResult) -> ProcessOutcome<Vec<(String, String)>> {
    dispatch(raw, |r| match r {
        RawResult::BulkString(Some(b)) => {
            let text = std::str::from_utf8(b).ok()?;
            text.split_whitespace()
                .map(|tok| tok.split_once('=').map(|(k, v)| (k.to_owned(), v.to_owned())))
                .collect()
        }
        _ => None,
    })
}

fn as_bytes(r: &RawResult) -> Option<Vec<u8>> {
    match r {
        RawResult::BulkString(Some(b)) => Some(b.clone()),
        RawResult::SimpleString(b) => Some(b.clone()),
        _ => None,
    }
}

fn as_f64(r: &RawResult) -> Option<f64> {
    match r {
        RawResult::Double(d) => Some(*d),
        RawResult::BulkString(Some(b)) => crate::buffer::parse_f64(b),
        RawResult::SimpleString(b) => crate::buffer::parse_f64(b),
        _ => None,
    }
}
