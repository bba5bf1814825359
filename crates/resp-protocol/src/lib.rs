//! Wire-level crate: byte buffer/token layer, RESP2/RESP3 codec, the
//! `Message`/`RawResult`/`RedisValue`/`RedisKey` data model, result
//! processors, and the client-side command hints table.
//!
//! This crate has no knowledge of sockets, reconnection, or topology — that
//! lives in the multiplexer crate one level up. It only knows how to turn
//! bytes into typed values and back.

pub mod buffer;
pub mod codec;
pub mod commands;
pub mod error;
pub mod key;
pub mod message;
pub mod processor;
pub mod raw;
pub mod value;

pub use buffer::ReadBuffer;
pub use codec::{decode_frame, encode_command, Protocol};
pub use commands::{hint_for, CommandHint, CommandId};
pub use error::{DecodeError, ExpectedToken};
pub use key::RedisKey;
pub use message::{
    FailureDetail, FailureKind, LifecycleState, Message, MessageFlags, Payload, ProcessOutcome,
    RedirectTarget, Ticks,
};
pub use raw::{AttributeHandler, Attributes, RawResult};
pub use value::RedisValue;
