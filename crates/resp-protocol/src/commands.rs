//! Client-side command hints table (spec §6).
//!
//! This is a dispatch aid, not a typed command surface — the hundreds of
//! convenience wrappers (`GET`/`HSET`/`ZADD`/…) are explicitly out of scope
//! (spec §1). What's here is just enough metadata for the bridge and
//! server-selection strategy to make routing and transaction-boundary
//! decisions without parsing command names at every call site.

/// A closed set of commands this client has a reason to special-case —
/// either because they gate transactions, drive pub/sub refcounting, or are
/// issued internally during handshake/heartbeat. Everything else is
/// `Other`, which gets the conservative default hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandId {
    Get,
    Set,
    Del,
    Incr,
    Subscribe,
    Unsubscribe,
    Psubscribe,
    Punsubscribe,
    Publish,
    Multi,
    Exec,
    Discard,
    Watch,
    Unwatch,
    Hello,
    Auth,
    Ping,
    Client,
    Cluster,
    Select,
    Script,
    Eval,
    Evalsha,
    Asking,
    Other,
}

/// Dispatch-relevant metadata for a command (spec §6).
#[derive(Debug, Clone, Copy)]
pub struct CommandHint {
    pub min_arity: u8,
    pub max_arity: Option<u8>,
    pub writes: bool,
    pub admin: bool,
    pub replica_ok: bool,
    pub pubsub: bool,
    /// Ends a `MULTI` block when seen inside one (`EXEC`, `DISCARD`).
    pub transaction_terminating: bool,
}

const DEFAULT_HINT: CommandHint = CommandHint {
    min_arity: 0,
    max_arity: None,
    writes: true,
    admin: false,
    replica_ok: false,
    pubsub: false,
    transaction_terminating: false,
};

/// Look up the dispatch hint for a command. Unknown commands (`Other`, or
/// any `CommandId` not listed below) default to "writes, primary-only,
/// non-admin" per spec §6.
pub fn hint_for(id: CommandId) -> CommandHint {
    match id {
        CommandId::Get => CommandHint {
            min_arity: 1,
            max_arity: Some(1),
            writes: false,
            replica_ok: true,
            ..DEFAULT_HINT
        },
        CommandId::Set => CommandHint {
            min_arity: 2,
            max_arity: None,
            writes: true,
            ..DEFAULT_HINT
        },
        CommandId::Del => CommandHint {
            min_arity: 1,
            max_arity: None,
            writes: true,
            ..DEFAULT_HINT
        },
        CommandId::Incr => CommandHint {
            min_arity: 1,
            max_arity: Some(1),
            writes: true,
            ..DEFAULT_HINT
        },
        CommandId::Subscribe | CommandId::Psubscribe => CommandHint {
            min_arity: 1,
            max_arity: None,
            writes: false,
            replica_ok: true,
            pubsub: true,
            ..DEFAULT_HINT
        },
        CommandId::Unsubscribe | CommandId::Punsubscribe => CommandHint {
            min_arity: 0,
            max_arity: None,
            writes: false,
            replica_ok: true,
            pubsub: true,
            ..DEFAULT_HINT
        },
        CommandId::Publish => CommandHint {
            min_arity: 2,
            max_arity: Some(2),
            writes: false,
            replica_ok: true,
            pubsub: true,
            ..DEFAULT_HINT
        },
        CommandId::Multi | CommandId::Watch | CommandId::Unwatch => CommandHint {
            min_arity: 0,
            max_arity: None,
            writes: false,
            ..DEFAULT_HINT
        },
        CommandId::Exec | CommandId::Discard => CommandHint {
            min_arity: 0,
            max_arity: Some(0),
            writes: false,
            transaction_terminating: true,
            ..DEFAULT_HINT
        },
        CommandId::Hello | CommandId::Auth | CommandId::Ping => CommandHint {
            min_arity: 0,
            max_arity: None,
            writes: false,
            replica_ok: true,
            ..DEFAULT_HINT
        },
        CommandId::Client => CommandHint {
            min_arity: 1,
            max_arity: None,
            writes: false,
            admin: true,
            replica_ok: true,
            ..DEFAULT_HINT
        },
        CommandId::Cluster => CommandHint {
            min_arity: 1,
            max_arity: None,
            writes: false,
            admin: true,
            replica_ok: true,
            ..DEFAULT_HINT
        },
        CommandId::Select => CommandHint {
            min_arity: 1,
            max_arity: Some(1),
            writes: false,
            replica_ok: true,
            ..DEFAULT_HINT
        },
        CommandId::Script => CommandHint {
            min_arity: 1,
            max_arity: None,
            writes: false,
            admin: true,
            ..DEFAULT_HINT
        },
        CommandId::Eval | CommandId::Evalsha => CommandHint {
            min_arity: 2,
            max_arity: None,
            writes: true,
            ..DEFAULT_HINT
        },
        CommandId::Asking => CommandHint {
            min_arity: 0,
            max_arity: Some(0),
            writes: false,
            replica_ok: true,
            ..DEFAULT_HINT
        },
        CommandId::Other => DEFAULT_HINT,
    }
}

impl CommandId {
    /// The ASCII name sent on the wire. `Other` commands are named by the
    /// caller directly and never routed through this table.
    pub fn as_str(self) -> &'static str {
        match self {
            CommandId::Get => "GET",
            CommandId::Set => "SET",
            CommandId::Del => "DEL",
            CommandId::Incr => "INCR",
            CommandId::Subscribe => "SUBSCRIBE",
            CommandId::Unsubscribe => "UNSUBSCRIBE",
            CommandId::Psubscribe => "PSUBSCRIBE",
            CommandId::Punsubscribe => "PUNSUBSCRIBE",
            CommandId::Publish => "PUBLISH",
            CommandId::Multi => "MULTI",
            CommandId::Exec => "EXEC",
            CommandId::Discard => "DISCARD",
            CommandId::Watch => "WATCH",
            CommandId::Unwatch => "UNWATCH",
            CommandId::Hello => "HELLO",
            CommandId::Auth => "AUTH",
            CommandId::Ping => "PING",
            CommandId::Client => "CLIENT",
            CommandId::Cluster => "CLUSTER",
            CommandId::Select => "SELECT",
            CommandId::Script => "SCRIPT",
            CommandId::Eval => "EVAL",
            CommandId::Evalsha => "EVALSHA",
            CommandId::Asking => "ASKING",
            CommandId::Other => "",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_command_defaults_to_writes_primary_only() {
        let hint = hint_for(CommandId::Other);
        assert!(hint.writes);
        assert!(!hint.replica_ok);
        assert!(!hint.admin);
    }

    #[test]
    fn get_is_replica_ok_and_non_write() {
        let hint = hint_for(CommandId::Get);
        assert!(!hint.writes);
        assert!(hint.replica_ok);
    }

    #[test]
    fn exec_and_discard_terminate_transactions() {
        assert!(hint_for(CommandId::Exec).transaction_terminating);
        assert!(hint_for(CommandId::Discard).transaction_terminating);
        assert!(!hint_for(CommandId::Multi).transaction_terminating);
    }

    #[test]
    fn pubsub_commands_are_flagged() {
        assert!(hint_for(CommandId::Subscribe).pubsub);
        assert!(hint_for(CommandId::Publish).pubsub);
        assert!(!hint_for(CommandId::Get).pubsub);
    }
}
