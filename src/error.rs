//! Top-level error taxonomy (spec §7).
//!
//! Every variant carries a `detail: Option<ErrorDetail>` slot. When
//! `Config::include_detail_in_exceptions` is false, the bridge constructs
//! errors with `detail: None` — omission is enforced structurally at
//! construction time, not stripped afterward (`SPEC_FULL.md` §C.2).

use std::time::Duration;
use thiserror::Error;

use resp_protocol::DecodeError;

/// Endpoint/command/queue context attached to a failure, omitted entirely
/// when detail reporting is disabled (spec §7 "User-visible behavior").
#[derive(Debug, Clone, Default)]
pub struct ErrorDetail {
    pub endpoint: Option<String>,
    pub command: Option<String>,
    pub key: Option<Vec<u8>>,
    pub elapsed: Option<Duration>,
    pub backlog_depth: Option<usize>,
    pub in_flight_depth: Option<usize>,
}

/// Sub-classification of a `ConnectionFailure` (spec §7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionFailureKind {
    UnableToResolve,
    UnableToConnect,
    SocketClosed,
    SocketFailure,
    AuthenticationFailure,
    ProtocolFailure,
}

/// Endpoint role a bridge serves (spec §3 "Server endpoint").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeRole {
    Interactive,
    Subscription,
}

/// Why a transaction was aborted before or during `EXEC` (spec §9 open
/// question: `ASK` mid-transaction is rejected, not retried).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    WatchFailed,
    Redirected,
}

/// The top-level error surfaced to callers (spec §7).
#[derive(Debug, Error)]
pub enum RedisError {
    #[error("configuration error: {message}")]
    ConfigurationError { message: String },

    #[error("no bridge ready and backlog rejected")]
    ConnectionUnavailable { detail: Option<ErrorDetail> },

    #[error("connection failure ({kind:?})")]
    ConnectionFailure {
        kind: ConnectionFailureKind,
        role: BridgeRole,
        detail: Option<ErrorDetail>,
    },

    #[error("timed out before the command reached the socket")]
    TimeoutBeforeWrite { detail: Option<ErrorDetail> },

    #[error("timed out after the command was written, awaiting reply")]
    TimeoutAfterWrite { detail: Option<ErrorDetail> },

    #[error("server error: {prefix}")]
    ServerError {
        prefix: ServerErrorPrefix,
        message: String,
        detail: Option<ErrorDetail>,
    },

    #[error("transaction aborted ({reason:?})")]
    TransactionAborted {
        reason: AbortReason,
        detail: Option<ErrorDetail>,
    },

    #[error("protocol decode error: {0}")]
    ProtocolDecodeError(#[from] DecodeError),

    #[error("multi-key command spans more than one slot")]
    CrossSlot { detail: Option<ErrorDetail> },

    #[error("multi-key command's keys resolve to different servers")]
    MultiKeyOnDifferentServers { detail: Option<ErrorDetail> },

    #[error("multiplexer already closed")]
    ObjectDisposed,
}

/// Server `-ERR`-shaped reply, classified by its leading token
/// (spec §7 "ServerError").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerErrorPrefix {
    Moved,
    Ask,
    CrossSlot,
    Loading,
    Busy,
    NoAuth,
    WrongPass,
    ReadOnly,
    MasterDown,
    NoScript,
    ClusterDown,
    TryAgain,
    Generic,
}

impl ServerErrorPrefix {
    /// Classify a raw `-ERR ...` message by its leading token.
    pub fn classify(message: &str) -> Self {
        match message.split_whitespace().next() {
            Some("MOVED") => ServerErrorPrefix::Moved,
            Some("ASK") => ServerErrorPrefix::Ask,
            Some("CROSSSLOT") => ServerErrorPrefix::CrossSlot,
            Some("LOADING") => ServerErrorPrefix::Loading,
            Some("BUSY") => ServerErrorPrefix::Busy,
            Some("NOAUTH") => ServerErrorPrefix::NoAuth,
            Some("WRONGPASS") => ServerErrorPrefix::WrongPass,
            Some("READONLY") => ServerErrorPrefix::ReadOnly,
            Some("MASTERDOWN") => ServerErrorPrefix::MasterDown,
            Some("NOSCRIPT") => ServerErrorPrefix::NoScript,
            Some("CLUSTERDOWN") => ServerErrorPrefix::ClusterDown,
            Some("TRYAGAIN") => ServerErrorPrefix::TryAgain,
            _ => ServerErrorPrefix::Generic,
        }
    }

    /// Whether this class is recovered locally with bounded retries
    /// (spec §7 "Propagation policy").
    pub fn is_locally_recoverable(self) -> bool {
        matches!(
            self,
            ServerErrorPrefix::Moved
                | ServerErrorPrefix::Ask
                | ServerErrorPrefix::Loading
                | ServerErrorPrefix::TryAgain
                | ServerErrorPrefix::ClusterDown
        )
    }
}

impl RedisError {
    /// Strip endpoint/command/queue-depth detail when
    /// `include_detail_in_exceptions` is false, preserving the error kind.
    pub fn gate_detail(mut self, include: bool) -> Self {
        if include {
            return self;
        }
        match &mut self {
            RedisError::ConnectionUnavailable { detail }
            | RedisError::ConnectionFailure { detail, .. }
            | RedisError::TimeoutBeforeWrite { detail }
            | RedisError::TimeoutAfterWrite { detail }
            | RedisError::ServerError { detail, .. }
            | RedisError::TransactionAborted { detail, .. }
            | RedisError::CrossSlot { detail }
            | RedisError::MultiKeyOnDifferentServers { detail } => *detail = None,
            RedisError::ConfigurationError { .. }
            | RedisError::ProtocolDecodeError(_)
            | RedisError::ObjectDisposed => {}
        }
        self
    }
}
