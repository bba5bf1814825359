//! A high-throughput, multiplexing Redis client.
//!
//! One multiplexer instance fans many concurrent callers' commands over a
//! small number of physical connections per server, tracking topology
//! (standalone, primary/replica, sentinel, cluster) and following
//! `MOVED`/`ASK` redirects transparently. See `Multiplexer` for the entry
//! point.

pub mod bridge;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod hashslot;
pub mod multiplexer;
pub mod stats;
pub mod strategy;

pub use bridge::{Bridge, BridgeState, Connector, PushHandler, QueuedCommand, Socket};
pub use config::{
    load_config_from_path, load_config_from_str, BacklogPolicy, Config, ConfigBuilder, ConfigError,
    ProtocolPreference, ReconnectRetryPolicy,
};
pub use endpoint::{ServerEndpoint, ServerFeatures, ServerRole};
pub use error::{
    AbortReason, BridgeRole, ConnectionFailureKind, ErrorDetail, RedisError, ServerErrorPrefix,
};
pub use hashslot::{crc16, slot_for_key, SLOT_COUNT};
pub use multiplexer::{
    ConditionOutcome, Database, Multiplexer, TransactionCondition, TransactionResult,
};
pub use stats::{BridgeCounters, StatsSnapshot};
pub use strategy::{RedirectBudget, SelectionStrategy, Selection, Topology};

pub use resp_protocol::{
    decode_frame, encode_command, hint_for, processor, AttributeHandler, Attributes, CommandHint,
    CommandId, DecodeError, ExpectedToken, FailureDetail, FailureKind, LifecycleState, Message,
    MessageFlags, Payload, ProcessOutcome, Protocol, RawResult, ReadBuffer, RedirectTarget,
    RedisKey, RedisValue,
};
