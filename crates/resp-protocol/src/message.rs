//! `Message`: the in-flight unit threaded through bridge, multiplexer, and
//! caller (spec §3 "Message", §4.C).

use std::time::Instant;

use crate::commands::CommandId;
use crate::error::DecodeError;
use crate::key::RedisKey;
use crate::raw::RawResult;
use crate::value::RedisValue;

/// Per-message behavior flags (spec §3).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MessageFlags {
    pub fire_and_forget: bool,
    pub demand_primary: bool,
    pub demand_replica: bool,
    pub prefer_primary: bool,
    pub prefer_replica: bool,
    pub no_redirect: bool,
    pub high_priority: bool,
}

/// Where a `Message` currently sits in its lifecycle (spec §3).
///
/// Monotonicity invariant: ticks recorded on entry to each state are
/// non-decreasing and each transition is observed at most once — enforced
/// by `Message::advance`, which refuses to move backward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Created,
    Queued,
    Written,
    AwaitingReply,
    Completed,
    Failed,
    Cancelled,
}

impl LifecycleState {
    fn rank(self) -> u8 {
        match self {
            LifecycleState::Created => 0,
            LifecycleState::Queued => 1,
            LifecycleState::Written => 2,
            LifecycleState::AwaitingReply => 3,
            LifecycleState::Completed | LifecycleState::Failed | LifecycleState::Cancelled => 4,
        }
    }

    fn is_terminal(self) -> bool {
        matches!(
            self,
            LifecycleState::Completed | LifecycleState::Failed | LifecycleState::Cancelled
        )
    }
}

/// Monotonic timestamps recorded at each lifecycle transition.
#[derive(Debug, Clone, Copy, Default)]
pub struct Ticks {
    pub creation: Option<Instant>,
    pub enqueue: Option<Instant>,
    pub send: Option<Instant>,
    pub response: Option<Instant>,
    pub complete: Option<Instant>,
}

/// The body of a command submission: key (if any) plus positional args.
#[derive(Debug, Clone)]
pub struct Payload {
    pub key: Option<RedisKey>,
    pub args: Vec<RedisValue>,
}

impl Payload {
    pub fn new(key: Option<RedisKey>, args: Vec<RedisValue>) -> Self {
        Self { key, args }
    }
}

/// Outcome of applying a result processor to a decoded frame (spec §4.C).
#[derive(Debug)]
pub enum ProcessOutcome<T> {
    Completed(T),
    NeedRedirect(RedirectTarget),
    NeedRetry,
    Failed(FailureDetail),
}

/// Redirect target carried by `NeedRedirect` (spec §4.E).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RedirectTarget {
    Moved { slot: u16, host: String, port: u16 },
    Ask { slot: u16, host: String, port: u16 },
}

/// Classification of a processor-level failure, independent of the
/// top-level `RedisError` (which wraps this with connection/endpoint
/// context once it reaches the caller).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureDetail {
    pub kind: FailureKind,
    pub server_message: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    UnexpectedType,
    ServerError,
    Decode,
}

impl From<DecodeError> for FailureDetail {
    fn from(e: DecodeError) -> Self {
        FailureDetail {
            kind: FailureKind::Decode,
            server_message: Some(e.to_string()),
        }
    }
}

/// An in-flight command: the unit the connection bridge queues, writes, and
/// eventually resolves. Carries no result sink type parameter itself —
/// `raw_result` is filled in by the bridge's read loop and handed to
/// whatever processor the caller registered out-of-band (the multiplexer
/// layer owns that pairing, see `crate::processor`).
#[derive(Debug)]
pub struct Message {
    pub command: CommandId,
    /// -1 = unselected, matching spec §3 ("database index (-1 = unselected)").
    pub database: i32,
    pub flags: MessageFlags,
    pub payload: Payload,
    pub attempt: u32,
    pub state: LifecycleState,
    pub ticks: Ticks,
    pub raw_result: Option<RawResult>,
}

impl Message {
    pub fn new(command: CommandId, database: i32, payload: Payload, flags: MessageFlags) -> Self {
        Self {
            command,
            database,
            flags,
            payload,
            attempt: 0,
            state: LifecycleState::Created,
            ticks: Ticks::default(),
            raw_result: None,
        }
    }

    /// Move to `next`, recording `now` in the matching tick field.
    ///
    /// Returns `false` (no-op) if `next` would move the state backward or
    /// re-enter an already-terminal message, preserving the
    /// at-most-once-completion invariant (spec §8).
    pub fn advance(&mut self, next: LifecycleState, now: Instant) -> bool {
        if self.state.is_terminal() || next.rank() < self.state.rank() {
            return false;
        }
        match next {
            LifecycleState::Queued => self.ticks.enqueue = Some(now),
            LifecycleState::Written => self.ticks.send = Some(now),
            LifecycleState::AwaitingReply => self.ticks.response = Some(now),
            LifecycleState::Completed | LifecycleState::Failed | LifecycleState::Cancelled => {
                self.ticks.complete = Some(now);
            }
            LifecycleState::Created => {}
        }
        self.state = next;
        true
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Message {
        Message::new(
            CommandId::Get,
            -1,
            Payload::new(Some(RedisKey::from("foo")), vec![]),
            MessageFlags::default(),
        )
    }

    #[test]
    fn advance_refuses_to_move_backward() {
        let mut m = sample();
        let t0 = Instant::now();
        assert!(m.advance(LifecycleState::Queued, t0));
        assert!(!m.advance(LifecycleState::Created, t0));
        assert_eq!(m.state, LifecycleState::Queued);
    }

    #[test]
    fn terminal_state_is_sticky() {
        let mut m = sample();
        let t0 = Instant::now();
        assert!(m.advance(LifecycleState::Completed, t0));
        assert!(!m.advance(LifecycleState::Failed, t0));
        assert_eq!(m.state, LifecycleState::Completed);
    }

    #[test]
    fn ticks_are_recorded_per_transition() {
        let mut m = sample();
        let t0 = Instant::now();
        m.advance(LifecycleState::Queued, t0);
        m.advance(LifecycleState::Written, t0);
        m.advance(LifecycleState::AwaitingReply, t0);
        m.advance(LifecycleState::Completed, t0);
        assert!(m.ticks.enqueue.is_some());
        assert!(m.ticks.send.is_some());
        assert!(m.ticks.response.is_some());
        assert!(m.ticks.complete.is_some());
    }
}
