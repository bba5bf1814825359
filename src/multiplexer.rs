//! The multiplexer: the library's public entry point (spec §4.F).
//!
//! Owns configuration, the endpoint table (via [`SelectionStrategy`]), the
//! subscription table, and coordinates reconfiguration. All public
//! operations funnel through `execute`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{oneshot, Mutex};
use tracing::{debug, info, warn};

use resp_protocol::{
    processor, CommandId, FailureDetail, MessageFlags, Payload, ProcessOutcome, RawResult, RedirectTarget, RedisKey,
    RedisValue,
};

use crate::bridge::{Connector, PushHandler, QueuedCommand};
use crate::config::Config;
use crate::endpoint::ServerEndpoint;
use crate::error::{AbortReason, RedisError, ServerErrorPrefix};
use crate::strategy::{RedirectBudget, SelectionStrategy, Topology};

/// A subscribed channel/pattern's handler list plus its reference count
/// (spec §4.F "Pub/sub").
struct Subscription {
    refcount: u32,
    handlers: Vec<Arc<dyn Fn(Vec<u8>) + Send + Sync>>,
}

/// The shared pub/sub routing table: channel/pattern key -> subscription.
#[derive(Default)]
struct SubscriptionTable {
    channels: HashMap<Vec<u8>, Subscription>,
    patterns: HashMap<Vec<u8>, Subscription>,
}

/// The library's single entry point. Exclusively owns the endpoint table,
/// selection strategy, and subscription table (spec §3 "Multiplexer").
pub struct Multiplexer {
    config: Config,
    strategy: SelectionStrategy,
    subscriptions: Mutex<SubscriptionTable>,
    connector_for: Arc<dyn Fn(String, u16) -> Connector + Send + Sync>,
    reconfiguring: AtomicBool,
    closed: AtomicBool,
    client_id: u64,
}

static NEXT_CLIENT_ID: AtomicU64 = AtomicU64::new(1);

impl Multiplexer {
    /// Connect using `connector_for` to build a dialer for each
    /// (host, port) pair discovered in configuration or via topology probes.
    /// Kept generic over the dialer so tests can substitute an in-memory
    /// duplex instead of real TCP (spec §4.F "Connect").
    pub async fn connect(
        config: Config,
        topology: Topology,
        connector_for: Arc<dyn Fn(String, u16) -> Connector + Send + Sync>,
    ) -> Result<Arc<Self>, RedisError> {
        if config.endpoints.is_empty() {
            return Err(RedisError::ConfigurationError {
                message: "at least one endpoint is required".to_owned(),
            });
        }
        let strategy = SelectionStrategy::new(topology, config.connect_retry);
        let mux = Arc::new(Self {
            client_id: NEXT_CLIENT_ID.fetch_add(1, Ordering::Relaxed),
            config,
            strategy,
            subscriptions: Mutex::new(SubscriptionTable::default()),
            connector_for,
            reconfiguring: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        });
        mux.configure().await?;
        Ok(mux)
    }

    /// (Re)build the endpoint table from `config.endpoints`, spawning a
    /// bridge pair per address and kicking off its connection loop
    /// (spec §4.F "Reconfiguration").
    pub async fn configure(self: &Arc<Self>) -> Result<(), RedisError> {
        if self
            .reconfiguring
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("reconfiguration already running, coalescing");
            return Ok(());
        }
        let result = self.configure_inner().await;
        self.reconfiguring.store(false, Ordering::Release);
        result
    }

    async fn configure_inner(self: &Arc<Self>) -> Result<(), RedisError> {
        let mut endpoints = Vec::with_capacity(self.config.endpoints.len());
        for (host, port) in &self.config.endpoints {
            let push_handler = self.push_handler();
            let endpoint = ServerEndpoint::new(host.clone(), *port, &self.config, Some(push_handler));
            let connector = (self.connector_for)(host.clone(), *port);
            tokio::spawn(endpoint.interactive.clone().run(
                connector.clone(),
                self.config.reconnect_retry_policy,
                self.config.heartbeat_interval,
            ));
            tokio::spawn(endpoint.subscription.clone().run(
                connector,
                self.config.reconnect_retry_policy,
                self.config.heartbeat_interval,
            ));
            endpoints.push(endpoint);
        }
        if endpoints.len() == 1 {
            endpoints[0].set_role(crate::endpoint::ServerRole::Primary);
        }
        self.strategy.publish_endpoints(endpoints);
        info!(count = self.config.endpoints.len(), "multiplexer configured");
        Ok(())
    }

    /// Build the callback handed to each endpoint's bridges for frames that
    /// arrive unsolicited: RESP3 `>` push frames, and every frame on a
    /// subscription-role bridge (spec §4.F "Pub/sub"). Routes `message`
    /// and `pmessage` payloads to registered handlers; anything else
    /// (subscribe/unsubscribe acks) is just noise to this path.
    fn push_handler(self: &Arc<Self>) -> PushHandler {
        let mux = self.clone();
        Arc::new(move |items: Vec<RawResult>| {
            let mux = mux.clone();
            tokio::spawn(async move { mux.route_push(items).await });
        })
    }

    async fn route_push(&self, items: Vec<RawResult>) {
        let Some(kind) = items.first().and_then(as_bulk_bytes) else {
            return;
        };
        match kind.as_slice() {
            b"message" => {
                if let (Some(channel), Some(payload)) =
                    (items.get(1).and_then(as_bulk_bytes), items.get(2).and_then(as_bulk_bytes))
                {
                    self.dispatch_message(&channel, payload).await;
                }
            }
            b"pmessage" => {
                if let (Some(pattern), Some(payload)) =
                    (items.get(1).and_then(as_bulk_bytes), items.get(3).and_then(as_bulk_bytes))
                {
                    self.dispatch_pmessage(&pattern, payload).await;
                }
            }
            b"subscribe" | b"psubscribe" | b"unsubscribe" | b"punsubscribe" => {
                // Acks for our own (un)subscribe calls; the refcounted
                // subscription table is already updated synchronously by
                // the caller, so there's nothing further to do here.
            }
            _ => debug!("push frame received with no matching pub/sub shape"),
        }
    }

    /// A lightweight view bound to `index`; every operation on it funnels
    /// through `execute` (spec §4.F).
    pub fn database(self: &Arc<Self>, index: i32) -> Database {
        Database { mux: self.clone(), index }
    }

    /// Execute a single command, honoring flags and resolving
    /// `MOVED`/`ASK` redirects locally up to `connect_retry` hops
    /// (spec §4.E "Redirects").
    pub async fn execute<T>(
        self: &Arc<Self>,
        command: CommandId,
        key: Option<RedisKey>,
        args: Vec<RedisValue>,
        database: i32,
        flags: MessageFlags,
        processor_fn: fn(&RawResult) -> ProcessOutcome<T>,
    ) -> Result<T, RedisError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(RedisError::ObjectDisposed);
        }
        if let Some(k) = &key {
            self.strategy.check_cross_slot(std::slice::from_ref(k))?;
        }

        let mut budget = RedirectBudget::new(self.strategy.connect_retry_limit());
        let mut asking = false;
        // `None` means "re-select via the normal strategy"; `Some` pins the
        // next attempt to a specific endpoint, used to route an `ASK` retry
        // to the redirect target instead of whatever `select` would pick
        // (which is still the old slot owner — the slot table isn't updated
        // by `ASK`, only by `MOVED`).
        let mut ask_target: Option<Arc<ServerEndpoint>> = None;
        loop {
            let endpoint = match ask_target.take() {
                Some(ep) => ep,
                None => self.strategy.select(key.as_ref(), flags)?.endpoint,
            };
            if asking {
                self.send_asking(&endpoint).await?;
            }
            let raw = self.send_raw(&endpoint, command, &args, key.clone(), database, flags).await?;
            match processor_fn(&raw) {
                ProcessOutcome::Completed(v) => return Ok(v),
                ProcessOutcome::NeedRetry => {
                    if !budget.take() {
                        return Err(RedisError::ServerError {
                            prefix: ServerErrorPrefix::TryAgain,
                            message: "retry budget exhausted".to_owned(),
                            detail: None,
                        });
                    }
                    asking = false;
                    continue;
                }
                ProcessOutcome::NeedRedirect(RedirectTarget::Moved { slot, host, port }) => {
                    if !budget.take() {
                        return Err(RedisError::ServerError {
                            prefix: ServerErrorPrefix::Moved,
                            message: format!("MOVED {slot} {host}:{port}"),
                            detail: None,
                        });
                    }
                    self.strategy.apply_moved(slot, format!("{host}:{port}"));
                    asking = false;
                    continue;
                }
                ProcessOutcome::NeedRedirect(RedirectTarget::Ask { slot: _, host, port }) => {
                    if flags.no_redirect {
                        return Err(RedisError::TransactionAborted {
                            reason: AbortReason::Redirected,
                            detail: None,
                        });
                    }
                    if !budget.take() {
                        return Err(RedisError::ServerError {
                            prefix: ServerErrorPrefix::Ask,
                            message: "ASK retry budget exhausted".to_owned(),
                            detail: None,
                        });
                    }
                    ask_target = Some(self.resolve_endpoint(&host, port).await);
                    asking = true;
                    continue;
                }
                ProcessOutcome::Failed(FailureDetail { server_message, .. }) => {
                    return Err(RedisError::ServerError {
                        prefix: ServerErrorPrefix::Generic,
                        message: server_message.unwrap_or_default(),
                        detail: None,
                    });
                }
            }
        }
    }

    /// Resolve an `ASK`/`MOVED` redirect's `host:port` to an endpoint,
    /// spawning a bridge pair for it if the client has never talked to it
    /// before (spec §4.E "On `-ASK`"). Mirrors `configure_inner`'s
    /// bridge-spawning for each statically configured endpoint.
    async fn resolve_endpoint(self: &Arc<Self>, host: &str, port: u16) -> Arc<ServerEndpoint> {
        let address = format!("{host}:{port}");
        let mux = self.clone();
        self.strategy.resolve_or_insert(&address, move || {
            let push_handler = mux.push_handler();
            let endpoint = ServerEndpoint::new(host, port, &mux.config, Some(push_handler));
            let connector = (mux.connector_for)(host.to_owned(), port);
            tokio::spawn(endpoint.interactive.clone().run(
                connector.clone(),
                mux.config.reconnect_retry_policy,
                mux.config.heartbeat_interval,
            ));
            tokio::spawn(endpoint.subscription.clone().run(
                connector,
                mux.config.reconnect_retry_policy,
                mux.config.heartbeat_interval,
            ));
            endpoint
        })
    }

    async fn send_asking(&self, endpoint: &Arc<ServerEndpoint>) -> Result<(), RedisError> {
        let (tx, rx) = oneshot::channel();
        let cmd = QueuedCommand::new(
            CommandId::Asking,
            &[],
            Payload::new(None, vec![]),
            MessageFlags { high_priority: true, ..Default::default() },
            -1,
            Some(tx),
        );
        endpoint.interactive.submit(cmd).await?;
        rx.await.map_err(|_| RedisError::ConnectionUnavailable { detail: None })??;
        Ok(())
    }

    async fn send_raw(
        &self,
        endpoint: &Arc<ServerEndpoint>,
        command: CommandId,
        args: &[RedisValue],
        key: Option<RedisKey>,
        database: i32,
        mut flags: MessageFlags,
    ) -> Result<RawResult, RedisError> {
        let bridge = if uses_subscription_bridge(command) {
            // The subscription bridge's read loop treats every frame as an
            // unsolicited push (spec §4.D: "dispatches to pub/sub ... for
            // subscription bridge"), so nothing arriving on it is ever
            // paired with an in-flight entry. These commands complete at
            // write-time; their actual (P)(UN)SUBSCRIBE acks are observed
            // via the push handler, not this reply.
            flags.fire_and_forget = true;
            &endpoint.subscription
        } else {
            &endpoint.interactive
        };
        let (tx, rx) = oneshot::channel();
        let cmd = QueuedCommand::new(command, args, Payload::new(key, args.to_vec()), flags, database, Some(tx));
        bridge.submit(cmd).await?;
        rx.await.map_err(|_| RedisError::ConnectionUnavailable { detail: None })?
    }

    /// Execute a sequence of body commands as a `MULTI`/`EXEC` block guarded
    /// by optimistic-lock conditions (spec §4.F "Transactions").
    ///
    /// Every command in the block is pinned to one endpoint selected up
    /// front — `MULTI`/`EXEC` are connection-scoped on the server, so unlike
    /// a plain `execute` call this never re-selects or follows a redirect
    /// mid-block. A `MOVED`/`ASK` reply here aborts the transaction instead
    /// (`SPEC_FULL.md` §D: "`ASK` mid-transaction is rejected, not
    /// retried").
    pub async fn execute_transaction(
        &self,
        watch_keys: Vec<RedisKey>,
        conditions: Vec<TransactionCondition>,
        body: Vec<(CommandId, Option<RedisKey>, Vec<RedisValue>)>,
        database: i32,
    ) -> Result<TransactionResult, RedisError> {
        self.strategy.check_cross_slot(&watch_keys)?;
        let all_keys: Vec<RedisKey> = watch_keys
            .iter()
            .cloned()
            .chain(body.iter().filter_map(|(_, k, _)| k.clone()))
            .collect();
        self.strategy.check_cross_slot(&all_keys)?;

        let selection = self.strategy.select(watch_keys.first().or_else(|| all_keys.first()), MessageFlags::default())?;
        let endpoint = &selection.endpoint;

        for key in &watch_keys {
            let raw = self
                .send_raw(
                    endpoint,
                    CommandId::Watch,
                    &[RedisValue::Bytes(key.as_bytes().to_vec())],
                    Some(key.clone()),
                    database,
                    MessageFlags::default(),
                )
                .await?;
            reject_redirect(&raw)?;
        }

        let mut condition_results = Vec::with_capacity(conditions.len());
        let mut all_satisfied = true;
        for cond in &conditions {
            let raw = self
                .send_raw(endpoint, cond.command, &cond.args, cond.key.clone(), database, MessageFlags::default())
                .await?;
            reject_redirect(&raw)?;
            let satisfied = (cond.predicate)(&raw);
            condition_results.push(ConditionOutcome { satisfied });
            if !satisfied {
                all_satisfied = false;
            }
        }

        if !all_satisfied {
            self.send_raw(endpoint, CommandId::Unwatch, &[], None, database, MessageFlags::default()).await?;
            return Ok(TransactionResult {
                executed: false,
                conditions: condition_results,
                body_results: Vec::new(),
            });
        }

        let multi_reply = self.send_raw(endpoint, CommandId::Multi, &[], None, database, MessageFlags::default()).await?;
        reject_redirect(&multi_reply)?;
        for (cmd, key, args) in &body {
            let raw = self.send_raw(endpoint, *cmd, args, key.clone(), database, MessageFlags::default()).await?;
            reject_redirect(&raw)?;
        }
        let exec_reply = self.send_raw(endpoint, CommandId::Exec, &[], None, database, MessageFlags::default()).await?;
        reject_redirect(&exec_reply)?;

        match exec_reply {
            RawResult::Array(None) => Ok(TransactionResult {
                executed: false,
                conditions: condition_results,
                body_results: Vec::new(),
            }),
            RawResult::Array(Some(items)) => Ok(TransactionResult {
                executed: true,
                conditions: condition_results,
                body_results: items,
            }),
            RawResult::Error(msg) => Err(RedisError::ServerError {
                prefix: ServerErrorPrefix::classify(&String::from_utf8_lossy(&msg)),
                message: String::from_utf8_lossy(&msg).into_owned(),
                detail: None,
            }),
            other => Err(RedisError::ServerError {
                prefix: ServerErrorPrefix::Generic,
                message: format!("unexpected EXEC reply shape: {other:?}"),
                detail: None,
            }),
        }
    }

    /// Subscribe a handler to `channel`, issuing the wire `SUBSCRIBE` only
    /// on the first subscriber (spec §4.F "Pub/sub").
    pub async fn subscribe(
        &self,
        channel: Vec<u8>,
        handler: Arc<dyn Fn(Vec<u8>) + Send + Sync>,
    ) -> Result<(), RedisError> {
        let mut table = self.subscriptions.lock().await;
        match table.channels.get_mut(&channel) {
            Some(sub) => {
                sub.refcount += 1;
                sub.handlers.push(handler);
            }
            None => {
                table.channels.insert(
                    channel.clone(),
                    Subscription { refcount: 1, handlers: vec![handler] },
                );
                drop(table);
                let selection = self.strategy.select(None, MessageFlags::default())?;
                self.send_raw(
                    &selection.endpoint,
                    CommandId::Subscribe,
                    &[RedisValue::Bytes(channel)],
                    None,
                    -1,
                    MessageFlags { high_priority: true, ..Default::default() },
                )
                .await?;
            }
        }
        Ok(())
    }

    /// Subscribe a handler to `pattern`, issuing `PSUBSCRIBE` only on the
    /// first subscriber for that pattern.
    pub async fn psubscribe(
        &self,
        pattern: Vec<u8>,
        handler: Arc<dyn Fn(Vec<u8>) + Send + Sync>,
    ) -> Result<(), RedisError> {
        let mut table = self.subscriptions.lock().await;
        match table.patterns.get_mut(&pattern) {
            Some(sub) => {
                sub.refcount += 1;
                sub.handlers.push(handler);
            }
            None => {
                table.patterns.insert(
                    pattern.clone(),
                    Subscription { refcount: 1, handlers: vec![handler] },
                );
                drop(table);
                let selection = self.strategy.select(None, MessageFlags::default())?;
                self.send_raw(
                    &selection.endpoint,
                    CommandId::Psubscribe,
                    &[RedisValue::Bytes(pattern)],
                    None,
                    -1,
                    MessageFlags { high_priority: true, ..Default::default() },
                )
                .await?;
            }
        }
        Ok(())
    }

    /// Drop one subscriber from `pattern`; issues `PUNSUBSCRIBE` only when
    /// the last subscriber leaves.
    pub async fn punsubscribe(&self, pattern: &[u8]) -> Result<(), RedisError> {
        let should_send = {
            let mut table = self.subscriptions.lock().await;
            match table.patterns.get_mut(pattern) {
                Some(sub) if sub.refcount > 1 => {
                    sub.refcount -= 1;
                    false
                }
                Some(_) => {
                    table.patterns.remove(pattern);
                    true
                }
                None => false,
            }
        };
        if should_send {
            let selection = self.strategy.select(None, MessageFlags::default())?;
            self.send_raw(
                &selection.endpoint,
                CommandId::Punsubscribe,
                &[RedisValue::Bytes(pattern.to_vec())],
                None,
                -1,
                MessageFlags { high_priority: true, ..Default::default() },
            )
            .await?;
        }
        Ok(())
    }

    /// Drop one subscriber from `channel`; issues `UNSUBSCRIBE` only when
    /// the last subscriber leaves.
    pub async fn unsubscribe(&self, channel: &[u8]) -> Result<(), RedisError> {
        let should_send_unsubscribe = {
            let mut table = self.subscriptions.lock().await;
            match table.channels.get_mut(channel) {
                Some(sub) if sub.refcount > 1 => {
                    sub.refcount -= 1;
                    false
                }
                Some(_) => {
                    table.channels.remove(channel);
                    true
                }
                None => false,
            }
        };
        if should_send_unsubscribe {
            let selection = self.strategy.select(None, MessageFlags::default())?;
            self.send_raw(
                &selection.endpoint,
                CommandId::Unsubscribe,
                &[RedisValue::Bytes(channel.to_vec())],
                None,
                -1,
                MessageFlags { high_priority: true, ..Default::default() },
            )
            .await?;
        }
        Ok(())
    }

    /// Publish `payload` to `channel`, returning the number of subscribers
    /// it was delivered to. Unlike `SUBSCRIBE`/`UNSUBSCRIBE`, `PUBLISH`
    /// carries a real reply and isn't routed over the subscription bridge
    /// (spec §4.F "Pub/sub").
    pub async fn publish(self: &Arc<Self>, channel: Vec<u8>, payload: Vec<u8>) -> Result<i64, RedisError> {
        self.execute(
            CommandId::Publish,
            None,
            vec![RedisValue::Bytes(channel), RedisValue::Bytes(payload)],
            -1,
            MessageFlags::default(),
            processor::integer,
        )
        .await
    }

    /// Fan out a received channel message to every registered handler, in
    /// subscription order (spec §4.F "Pub/sub").
    pub async fn dispatch_message(&self, channel: &[u8], payload: Vec<u8>) {
        let handlers = {
            let table = self.subscriptions.lock().await;
            table.channels.get(channel).map(|s| s.handlers.clone())
        };
        if let Some(handlers) = handlers {
            for handler in handlers {
                let payload = payload.clone();
                tokio::spawn(async move { handler(payload) });
            }
        } else {
            warn!("pub/sub message for channel with no registered handlers");
        }
    }

    /// Fan out a received pattern message (`pmessage`) to every handler
    /// registered for the matching pattern.
    pub async fn dispatch_pmessage(&self, pattern: &[u8], payload: Vec<u8>) {
        let handlers = {
            let table = self.subscriptions.lock().await;
            table.patterns.get(pattern).map(|s| s.handlers.clone())
        };
        if let Some(handlers) = handlers {
            for handler in handlers {
                let payload = payload.clone();
                tokio::spawn(async move { handler(payload) });
            }
        } else {
            warn!("pattern message for pattern with no registered handlers");
        }
    }

    /// Best-effort tiebreaker write-back against the primary during
    /// reconfiguration (`SPEC_FULL.md` §D — documented, never enforced
    /// against externally-set values).
    pub async fn write_tiebreaker(&self) {
        let Some(endpoint) = self.strategy.endpoints_snapshot().into_iter().find(|e| e.role() == crate::endpoint::ServerRole::Primary) else {
            return;
        };
        let key = self.config.tiebreaker.clone();
        let value = self.client_id.to_string();
        let result = self
            .send_raw(
                &endpoint,
                CommandId::Set,
                &[RedisValue::from(key.as_str()), RedisValue::from(value)],
                Some(RedisKey::from(key.as_str())),
                -1,
                MessageFlags::default(),
            )
            .await;
        if let Err(e) = result {
            debug!(error = %e, "tiebreaker write-back failed (best-effort, not enforced)");
        }
    }

    /// Close the multiplexer. Pending bridge work is failed with
    /// `ObjectDisposed` unless `allow_pending` lets it drain first
    /// (spec §5 "Resource release").
    pub async fn close(&self, allow_pending: bool) {
        self.closed.store(true, Ordering::Release);
        for endpoint in self.strategy.endpoints_snapshot() {
            endpoint.interactive.close(allow_pending).await;
            endpoint.subscription.close(allow_pending).await;
        }
    }
}

/// Extract the payload of a bulk/simple string reply, used to read the
/// `message`/`pmessage` kind tag and channel/pattern/payload fields out of a
/// push frame's items.
fn as_bulk_bytes(raw: &RawResult) -> Option<Vec<u8>> {
    match raw {
        RawResult::BulkString(Some(b)) | RawResult::SimpleString(b) => Some(b.clone()),
        _ => None,
    }
}

/// Commands that put a connection into (or out of) subscriber mode and so
/// must travel over the endpoint's dedicated subscription bridge rather than
/// its interactive one (spec §4.F "Pub/sub"). `PUBLISH` is deliberately
/// excluded: it has a real integer reply and doesn't need a subscriber
/// connection, so it is routed like any other request/response command.
fn uses_subscription_bridge(command: CommandId) -> bool {
    matches!(
        command,
        CommandId::Subscribe | CommandId::Psubscribe | CommandId::Unsubscribe | CommandId::Punsubscribe
    )
}

/// Abort a transaction immediately on any `-MOVED`/`-ASK` reply seen
/// mid-block, instead of following the redirect like a standalone `execute`
/// would (`SPEC_FULL.md` §D decision: redirects are never safe to retry
/// once `WATCH`/`MULTI` state already lives on a specific connection).
fn reject_redirect(raw: &RawResult) -> Result<(), RedisError> {
    let RawResult::Error(msg) = raw else { return Ok(()) };
    let text = String::from_utf8_lossy(msg);
    let prefix = ServerErrorPrefix::classify(&text);
    if matches!(prefix, ServerErrorPrefix::Moved | ServerErrorPrefix::Ask) {
        return Err(RedisError::TransactionAborted { reason: AbortReason::Redirected, detail: None });
    }
    Ok(())
}

/// A read-check paired with an expected-result predicate, evaluated before
/// a transaction's body is queued (spec §4.F "Conditions").
pub struct TransactionCondition {
    pub command: CommandId,
    pub key: Option<RedisKey>,
    pub args: Vec<RedisValue>,
    pub predicate: fn(&RawResult) -> bool,
}

pub struct ConditionOutcome {
    pub satisfied: bool,
}

/// Outcome of `execute_transaction` (spec §4.F step 3/4).
pub struct TransactionResult {
    pub executed: bool,
    pub conditions: Vec<ConditionOutcome>,
    pub body_results: Vec<RawResult>,
}

/// A lightweight view bound to a database index; every operation funnels
/// through [`Multiplexer::execute`] (spec §4.F "GetDatabase").
pub struct Database {
    mux: Arc<Multiplexer>,
    index: i32,
}

impl Database {
    pub async fn get(&self, key: impl Into<RedisKey>) -> Result<Option<Vec<u8>>, RedisError> {
        let key = key.into();
        self.mux
            .execute(
                CommandId::Get,
                Some(key.clone()),
                vec![RedisValue::Bytes(key.as_bytes().to_vec())],
                self.index,
                MessageFlags::default(),
                processor::nullable_bytes,
            )
            .await
    }

    pub async fn set(&self, key: impl Into<RedisKey>, value: impl Into<RedisValue>) -> Result<bool, RedisError> {
        let key = key.into();
        self.mux
            .execute(
                CommandId::Set,
                Some(key.clone()),
                vec![RedisValue::Bytes(key.as_bytes().to_vec()), value.into()],
                self.index,
                MessageFlags::default(),
                processor::bool_from_ok,
            )
            .await
    }

    pub async fn del(&self, key: impl Into<RedisKey>) -> Result<i64, RedisError> {
        let key = key.into();
        self.mux
            .execute(
                CommandId::Del,
                Some(key.clone()),
                vec![RedisValue::Bytes(key.as_bytes().to_vec())],
                self.index,
                MessageFlags::default(),
                processor::integer,
            )
            .await
    }

    pub async fn incr(&self, key: impl Into<RedisKey>) -> Result<i64, RedisError> {
        let key = key.into();
        self.mux
            .execute(
                CommandId::Incr,
                Some(key.clone()),
                vec![RedisValue::Bytes(key.as_bytes().to_vec())],
                self.index,
                MessageFlags::default(),
                processor::integer,
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redirect_target_variants_are_distinct() {
        let moved = RedirectTarget::Moved { slot: 1, host: "a".into(), port: 1 };
        let ask = RedirectTarget::Ask { slot: 1, host: "a".into(), port: 1 };
        assert_ne!(moved, ask);
    }
}
