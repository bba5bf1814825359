//! RESP2/RESP3 encode/decode (spec §4.B).
//!
//! Encoding always emits the multi-bulk command form (`*N\r\n$L\r\n...`);
//! inline encoding is never produced by this client.
//!
//! Decoding dispatches on the first byte of each line and recurses for
//! nested aggregates. Attribute frames (`|`) are stripped out at whatever
//! nesting level they appear and handed to an optional handler; they never
//! count toward their parent's declared length.

use crate::buffer::{parse_f64, parse_i64, ConsumeOutcome, ReadBuffer};
use crate::error::{DecodeError, ExpectedToken};
use crate::raw::{AttributeHandler, Attributes, RawResult};
use crate::value::RedisValue;

/// Which protocol version frames are being decoded under. RESP3-only frame
/// markers are a hard error while negotiating RESP2; RESP2 frames remain a
/// valid subset once RESP3 is negotiated (spec §4.B "Downgrade").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Resp2,
    Resp3,
}

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

/// Encode a command name plus positional arguments as a RESP multi-bulk
/// frame: `*N\r\n$len\r\nbytes\r\n...`.
pub fn encode_command(command: &str, args: &[RedisValue], out: &mut Vec<u8>) {
    let total = 1 + args.len();
    out.extend_from_slice(format!("*{total}\r\n").as_bytes());
    write_bulk(command.as_bytes(), out);
    for arg in args {
        write_bulk(&arg.to_wire_bytes(), out);
    }
}

fn write_bulk(bytes: &[u8], out: &mut Vec<u8>) {
    out.extend_from_slice(format!("${}\r\n", bytes.len()).as_bytes());
    out.extend_from_slice(bytes);
    out.extend_from_slice(b"\r\n");
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

/// Decode the next complete frame from `buf`, forwarding any attribute
/// frames encountered (at this level or nested) to `attr_handler`.
///
/// Returns `Ok(None)` if the buffer doesn't yet hold a complete frame — the
/// buffer's read position is left exactly where it was. Returns `Err` for a
/// malformed frame (fatal to the bridge per spec §4.D).
pub fn decode_frame(
    buf: &mut ReadBuffer,
    protocol: Protocol,
    attr_handler: Option<&AttributeHandler>,
) -> Result<Option<RawResult>, DecodeError> {
    decode_one(buf, protocol, attr_handler)
}

fn decode_one(
    buf: &mut ReadBuffer,
    protocol: Protocol,
    attr_handler: Option<&AttributeHandler>,
) -> Result<Option<RawResult>, DecodeError> {
    let start = buf.position();
    let Some(line) = buf.consume_line() else {
        return Ok(None);
    };
    if line.is_empty() {
        buf.restore(start);
        return Err(DecodeError::new(start, ExpectedToken::TypePrefix));
    }
    let prefix = line[0];
    let rest = &line[1..];

    require_resp3(protocol, prefix, start)?;

    match prefix {
        b'+' => Ok(Some(RawResult::SimpleString(rest.to_vec()))),
        b'-' => Ok(Some(RawResult::Error(rest.to_vec()))),
        b':' => parse_i64(rest)
            .map(RawResult::Integer)
            .map(Some)
            .ok_or_else(|| DecodeError::new(start, ExpectedToken::Length)),
        b'_' => Ok(Some(RawResult::Null)),
        b',' => parse_f64(rest)
            .map(RawResult::Double)
            .map(Some)
            .ok_or_else(|| DecodeError::new(start, ExpectedToken::Length)),
        b'#' => match rest {
            b"t" => Ok(Some(RawResult::Boolean(true))),
            b"f" => Ok(Some(RawResult::Boolean(false))),
            _ => Err(DecodeError::new(start, ExpectedToken::Length)),
        },
        b'(' => Ok(Some(RawResult::BigNumber(rest.to_vec()))),
        b'$' => decode_bulk_string(buf, rest, start),
        b'=' => decode_verbatim_string(buf, rest, start),
        b'*' => decode_aggregate(buf, protocol, rest, start, attr_handler, AggregateKind::Array),
        b'~' => decode_aggregate(buf, protocol, rest, start, attr_handler, AggregateKind::Set),
        b'>' => decode_aggregate(buf, protocol, rest, start, attr_handler, AggregateKind::Push),
        b'%' => decode_map(buf, protocol, rest, start, attr_handler),
        b'|' => decode_attribute_then_value(buf, protocol, rest, start, attr_handler),
        _ => {
            buf.restore(start);
            Err(DecodeError::new(start, ExpectedToken::TypePrefix))
        }
    }
}

fn require_resp3(protocol: Protocol, prefix: u8, offset: usize) -> Result<(), DecodeError> {
    let is_resp3_only = matches!(prefix, b'%' | b'~' | b'>' | b',' | b'#' | b'(' | b'=' | b'_' | b'|');
    if protocol == Protocol::Resp2 && is_resp3_only {
        return Err(DecodeError::new(offset, ExpectedToken::TypePrefix));
    }
    Ok(())
}

fn decode_bulk_string(
    buf: &mut ReadBuffer,
    len_field: &[u8],
    start: usize,
) -> Result<Option<RawResult>, DecodeError> {
    let len = parse_i64(len_field).ok_or_else(|| DecodeError::new(start, ExpectedToken::Length))?;
    if len < 0 {
        return Ok(Some(RawResult::BulkString(None)));
    }
    match buf.consume_exact(len as usize) {
        ConsumeOutcome::Pending => {
            buf.restore(start);
            Ok(None)
        }
        ConsumeOutcome::Malformed => Err(DecodeError::new(start, ExpectedToken::Crlf)),
        ConsumeOutcome::Ready(bytes) => Ok(Some(RawResult::BulkString(Some(bytes.to_vec())))),
    }
}

fn decode_verbatim_string(
    buf: &mut ReadBuffer,
    len_field: &[u8],
    start: usize,
) -> Result<Option<RawResult>, DecodeError> {
    let len = parse_i64(len_field).ok_or_else(|| DecodeError::new(start, ExpectedToken::Length))?;
    if len < 4 {
        return Err(DecodeError::new(start, ExpectedToken::BulkPayload));
    }
    match buf.consume_exact(len as usize) {
        ConsumeOutcome::Pending => {
            buf.restore(start);
            Ok(None)
        }
        ConsumeOutcome::Malformed => Err(DecodeError::new(start, ExpectedToken::Crlf)),
        ConsumeOutcome::Ready(bytes) => {
            if bytes.get(3) != Some(&b':') {
                return Err(DecodeError::new(start, ExpectedToken::BulkPayload));
            }
            let mut format = [0u8; 3];
            format.copy_from_slice(&bytes[..3]);
            Ok(Some(RawResult::VerbatimString {
                format,
                bytes: bytes[4..].to_vec(),
            }))
        }
    }
}

enum AggregateKind {
    Array,
    Set,
    Push,
}

fn decode_aggregate(
    buf: &mut ReadBuffer,
    protocol: Protocol,
    len_field: &[u8],
    start: usize,
    attr_handler: Option<&AttributeHandler>,
    kind: AggregateKind,
) -> Result<Option<RawResult>, DecodeError> {
    let len = parse_i64(len_field).ok_or_else(|| DecodeError::new(start, ExpectedToken::Length))?;
    if len < 0 {
        return match kind {
            AggregateKind::Array => Ok(Some(RawResult::Array(None))),
            // RESP3 only emits -1 length for arrays; sets/pushes never do,
            // but treat defensively as an empty aggregate rather than panic.
            AggregateKind::Set => Ok(Some(RawResult::Set(Vec::new()))),
            AggregateKind::Push => Ok(Some(RawResult::Push(Vec::new()))),
        };
    }
    match decode_n_children(buf, protocol, len as usize, start, attr_handler)? {
        None => Ok(None),
        Some(children) => Ok(Some(match kind {
            AggregateKind::Array => RawResult::Array(Some(children)),
            AggregateKind::Set => RawResult::Set(children),
            AggregateKind::Push => RawResult::Push(children),
        })),
    }
}

fn decode_map(
    buf: &mut ReadBuffer,
    protocol: Protocol,
    len_field: &[u8],
    start: usize,
    attr_handler: Option<&AttributeHandler>,
) -> Result<Option<RawResult>, DecodeError> {
    let pairs = parse_i64(len_field).ok_or_else(|| DecodeError::new(start, ExpectedToken::Length))?;
    if pairs < 0 {
        return Err(DecodeError::new(start, ExpectedToken::Length));
    }
    match decode_n_children(buf, protocol, pairs as usize * 2, start, attr_handler)? {
        None => Ok(None),
        Some(flat) => {
            let mut out = Vec::with_capacity(flat.len() / 2);
            let mut it = flat.into_iter();
            while let (Some(k), Some(v)) = (it.next(), it.next()) {
                out.push((k, v));
            }
            Ok(Some(RawResult::Map(out)))
        }
    }
}

fn decode_n_children(
    buf: &mut ReadBuffer,
    protocol: Protocol,
    n: usize,
    rollback_to: usize,
    attr_handler: Option<&AttributeHandler>,
) -> Result<Option<Vec<RawResult>>, DecodeError> {
    let mut out = Vec::with_capacity(n);
    for _ in 0..n {
        match decode_one(buf, protocol, attr_handler)? {
            Some(v) => out.push(v),
            None => {
                buf.restore(rollback_to);
                return Ok(None);
            }
        }
    }
    Ok(Some(out))
}

fn decode_attribute_then_value(
    buf: &mut ReadBuffer,
    protocol: Protocol,
    len_field: &[u8],
    start: usize,
    attr_handler: Option<&AttributeHandler>,
) -> Result<Option<RawResult>, DecodeError> {
    let pairs = parse_i64(len_field).ok_or_else(|| DecodeError::new(start, ExpectedToken::Length))?;
    if pairs < 0 {
        return Err(DecodeError::new(start, ExpectedToken::Length));
    }
    let flat = match decode_n_children(buf, protocol, pairs as usize * 2, start, attr_handler)? {
        None => return Ok(None),
        Some(f) => f,
    };
    let mut kv = Vec::with_capacity(flat.len() / 2);
    let mut it = flat.into_iter();
    while let (Some(k), Some(v)) = (it.next(), it.next()) {
        kv.push((k, v));
    }
    let attrs = Attributes(kv);
    match attr_handler {
        Some(h) => h(&attrs),
        None => tracing::debug!(?attrs, "discarding RESP3 attribute frame (no handler installed)"),
    }
    // The attribute precedes the actual value; decode it now. If that value
    // is incomplete, roll back the *entire* combined frame.
    match decode_one(buf, protocol, attr_handler)? {
        Some(v) => Ok(Some(v)),
        None => {
            buf.restore(start);
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(bytes: &[u8], protocol: Protocol) -> Result<Option<RawResult>, DecodeError> {
        let mut buf = ReadBuffer::new();
        buf.extend(bytes);
        decode_frame(&mut buf, protocol, None)
    }

    #[test]
    fn round_trips_simple_string() {
        assert_eq!(
            decode(b"+OK\r\n", Protocol::Resp2).unwrap(),
            Some(RawResult::SimpleString(b"OK".to_vec()))
        );
    }

    #[test]
    fn round_trips_error() {
        assert_eq!(
            decode(b"-ERR oops\r\n", Protocol::Resp2).unwrap(),
            Some(RawResult::Error(b"ERR oops".to_vec()))
        );
    }

    #[test]
    fn round_trips_integer() {
        assert_eq!(
            decode(b":1000\r\n", Protocol::Resp2).unwrap(),
            Some(RawResult::Integer(1000))
        );
        assert_eq!(
            decode(b":-5\r\n", Protocol::Resp2).unwrap(),
            Some(RawResult::Integer(-5))
        );
    }

    #[test]
    fn null_bulk_string_is_distinct_from_empty() {
        assert_eq!(
            decode(b"$-1\r\n", Protocol::Resp2).unwrap(),
            Some(RawResult::BulkString(None))
        );
        assert_eq!(
            decode(b"$0\r\n\r\n", Protocol::Resp2).unwrap(),
            Some(RawResult::BulkString(Some(Vec::new())))
        );
    }

    #[test]
    fn bulk_string_is_eight_bit_clean() {
        let raw = [0u8, 1, 255, b'\r', b'\n'];
        let mut frame = b"$5\r\n".to_vec();
        frame.extend_from_slice(&raw);
        frame.extend_from_slice(b"\r\n");
        assert_eq!(
            decode(&frame, Protocol::Resp2).unwrap(),
            Some(RawResult::BulkString(Some(raw.to_vec())))
        );
    }

    #[test]
    fn null_array_is_distinct_from_empty_array() {
        assert_eq!(
            decode(b"*-1\r\n", Protocol::Resp2).unwrap(),
            Some(RawResult::Array(None))
        );
        assert_eq!(
            decode(b"*0\r\n", Protocol::Resp2).unwrap(),
            Some(RawResult::Array(Some(Vec::new())))
        );
    }

    #[test]
    fn decodes_nested_array() {
        let frame = b"*2\r\n$3\r\nfoo\r\n:42\r\n";
        assert_eq!(
            decode(frame, Protocol::Resp2).unwrap(),
            Some(RawResult::Array(Some(vec![
                RawResult::BulkString(Some(b"foo".to_vec())),
                RawResult::Integer(42),
            ])))
        );
    }

    #[test]
    fn partial_array_returns_none_and_does_not_advance() {
        let mut buf = ReadBuffer::new();
        buf.extend(b"*2\r\n$3\r\nfoo\r\n");
        assert_eq!(decode_frame(&mut buf, Protocol::Resp2, None).unwrap(), None);
        assert_eq!(buf.unconsumed(), b"*2\r\n$3\r\nfoo\r\n");
    }

    #[test]
    fn split_feed_matches_one_shot_decode() {
        let whole: &[u8] = b"*2\r\n$3\r\nfoo\r\n:42\r\n";
        for split in 0..whole.len() {
            let mut buf = ReadBuffer::new();
            buf.extend(&whole[..split]);
            let first = decode_frame(&mut buf, Protocol::Resp2, None).unwrap();
            buf.extend(&whole[split..]);
            let second = match first {
                Some(v) => Some(v),
                None => decode_frame(&mut buf, Protocol::Resp2, None).unwrap(),
            };
            assert_eq!(
                second,
                Some(RawResult::Array(Some(vec![
                    RawResult::BulkString(Some(b"foo".to_vec())),
                    RawResult::Integer(42),
                ])))
            );
        }
    }

    #[test]
    fn resp3_marker_is_hard_error_under_resp2() {
        assert!(decode(b"#t\r\n", Protocol::Resp2).is_err());
        assert!(decode(b"#t\r\n", Protocol::Resp3).unwrap().is_some());
    }

    #[test]
    fn resp3_map_decodes_as_pairs() {
        let frame = b"%2\r\n+a\r\n:1\r\n+b\r\n:2\r\n";
        let expected = RawResult::Map(vec![
            (RawResult::SimpleString(b"a".to_vec()), RawResult::Integer(1)),
            (RawResult::SimpleString(b"b".to_vec()), RawResult::Integer(2)),
        ]);
        assert_eq!(decode(frame, Protocol::Resp3).unwrap(), Some(expected));
    }

    #[test]
    fn resp3_set_decodes() {
        let frame = b"~2\r\n+a\r\n+b\r\n";
        assert_eq!(
            decode(frame, Protocol::Resp3).unwrap(),
            Some(RawResult::Set(vec![
                RawResult::SimpleString(b"a".to_vec()),
                RawResult::SimpleString(b"b".to_vec()),
            ]))
        );
    }

    #[test]
    fn resp3_push_decodes() {
        let frame = b">2\r\n+message\r\n+hi\r\n";
        assert_eq!(
            decode(frame, Protocol::Resp3).unwrap(),
            Some(RawResult::Push(vec![
                RawResult::SimpleString(b"message".to_vec()),
                RawResult::SimpleString(b"hi".to_vec()),
            ]))
        );
    }

    #[test]
    fn resp3_double_and_bignum_and_null() {
        assert_eq!(decode(b",3.14\r\n", Protocol::Resp3).unwrap(), Some(RawResult::Double(3.14)));
        assert_eq!(decode(b",inf\r\n", Protocol::Resp3).unwrap(), Some(RawResult::Double(f64::INFINITY)));
        assert_eq!(
            decode(b"(3492890328409238509324850943850943825024385\r\n", Protocol::Resp3).unwrap(),
            Some(RawResult::BigNumber(b"3492890328409238509324850943850943825024385".to_vec()))
        );
        assert_eq!(decode(b"_\r\n", Protocol::Resp3).unwrap(), Some(RawResult::Null));
    }

    #[test]
    fn resp3_verbatim_string_splits_format_tag() {
        let frame = b"=15\r\ntxt:Some string\r\n";
        assert_eq!(
            decode(frame, Protocol::Resp3).unwrap(),
            Some(RawResult::VerbatimString {
                format: *b"txt",
                bytes: b"Some string".to_vec(),
            })
        );
    }

    #[test]
    fn attribute_frame_does_not_occupy_parent_slot() {
        // A 2-element array where the second element is preceded by an attribute.
        let frame = b"*2\r\n+a\r\n|1\r\n+key\r\n+val\r\n+b\r\n";
        let seen = std::cell::RefCell::new(Vec::new());
        let handler = |a: &Attributes| seen.borrow_mut().push(a.clone());
        let mut buf = ReadBuffer::new();
        buf.extend(frame);
        let result = decode_frame(&mut buf, Protocol::Resp3, Some(&handler)).unwrap();
        assert_eq!(
            result,
            Some(RawResult::Array(Some(vec![
                RawResult::SimpleString(b"a".to_vec()),
                RawResult::SimpleString(b"b".to_vec()),
            ])))
        );
        assert_eq!(seen.borrow().len(), 1);
    }

    #[test]
    fn top_level_attribute_precedes_value() {
        let frame = b"|1\r\n+key\r\n+val\r\n:7\r\n";
        assert_eq!(decode(frame, Protocol::Resp3).unwrap(), Some(RawResult::Integer(7)));
    }

    #[test]
    fn encode_command_renders_multibulk() {
        let mut out = Vec::new();
        encode_command("SET", &[RedisValue::from("foo"), RedisValue::from("bar")], &mut out);
        assert_eq!(out, b"*3\r\n$3\r\nSET\r\n$3\r\nfoo\r\n$3\r\nbar\r\n");
    }

    #[test]
    fn encode_command_renders_integer_shortest_decimal() {
        let mut out = Vec::new();
        encode_command("INCRBY", &[RedisValue::from("k"), RedisValue::Integer(-7)], &mut out);
        assert_eq!(out, b"*3\r\n$6\r\nINCRBY\r\n$1\r\nk\r\n$2\r\n-7\r\n");
    }
}
