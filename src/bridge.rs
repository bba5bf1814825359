//! Connection bridge: owns one physical socket in one role, with the
//! backlog/in-flight/write-ready queues and the write/read loop pair
//! (spec §4.D).

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::{mpsc, oneshot, watch, Mutex};
use tracing::{debug, warn};

use resp_protocol::{
    decode_frame, encode_command, CommandId, Message, MessageFlags, Payload, Protocol, RawResult, ReadBuffer,
    RedisValue,
};

use crate::config::{BacklogPolicy, Config, ProtocolPreference, ReconnectRetryPolicy};
use crate::error::{BridgeRole, ConnectionFailureKind, ErrorDetail, RedisError, ServerErrorPrefix};
use crate::stats::BridgeCounters;

/// Bridge lifecycle (spec §3 "Bridge state").
///
/// Transition invariant (enforced by construction, not by a runtime check):
/// only the read loop moves `ConnectedEstablished -> ConnectedFailing`; only
/// the write loop or the reconnect task moves `Disconnected -> Connecting`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeState {
    Disconnected,
    Connecting,
    Handshaking,
    ConnectedEstablishing,
    ConnectedEstablished,
    ConnectedFailing,
    Disconnecting,
}

/// Any duplex byte stream the bridge can drive — a TCP socket, a TLS
/// stream, or (in tests) an in-memory duplex.
pub trait Socket: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send> Socket for T {}

type BoxSocket = Box<dyn Socket>;
type ConnectFuture = Pin<Box<dyn Future<Output = std::io::Result<BoxSocket>> + Send>>;

/// Dials a fresh socket for one connection attempt. Boxed so the bridge
/// doesn't need to know whether it's plain TCP or a TLS upgrade.
pub type Connector = Arc<dyn Fn() -> ConnectFuture + Send + Sync>;

/// Command queued onto a bridge: the logical `Message` plus the channel its
/// caller is awaiting the result on. `reply_tx` is `None` for
/// fire-and-forget messages, which complete on write success without
/// waiting for a server reply.
pub struct QueuedCommand {
    pub message: Message,
    pub encoded: Vec<u8>,
    pub reply_tx: Option<oneshot::Sender<Result<RawResult, RedisError>>>,
}

impl QueuedCommand {
    pub fn new(
        command: CommandId,
        args: &[RedisValue],
        payload: Payload,
        flags: resp_protocol::MessageFlags,
        database: i32,
        reply_tx: Option<oneshot::Sender<Result<RawResult, RedisError>>>,
    ) -> Self {
        let mut encoded = Vec::new();
        encode_command(command.as_str(), args, &mut encoded);
        Self {
            message: Message::new(command, database, payload, flags),
            encoded,
            reply_tx,
        }
    }
}

/// Reply handler for frames that arrive unsolicited (RESP3 `>` push frames,
/// or every frame on a subscription-role bridge).
pub type PushHandler = Arc<dyn Fn(Vec<RawResult>) + Send + Sync>;

const WRITE_READY_CAPACITY: usize = 4096;
const HIGH_WATERMARK: usize = 2048;

/// One physical link to one server endpoint in one role.
pub struct Bridge {
    role: BridgeRole,
    endpoint: String,
    state_tx: watch::Sender<BridgeState>,
    state_rx: watch::Receiver<BridgeState>,
    write_ready_tx: mpsc::Sender<QueuedCommand>,
    write_ready_rx: Mutex<Option<mpsc::Receiver<QueuedCommand>>>,
    backlog: Mutex<VecDeque<QueuedCommand>>,
    backlog_cap: usize,
    backlog_policy: BacklogPolicy,
    in_flight: Mutex<VecDeque<QueuedCommand>>,
    counters: Arc<BridgeCounters>,
    push_handler: Option<PushHandler>,
    protocol_preference: ProtocolPreference,
    user: Option<String>,
    password: Option<String>,
    client_name: Option<String>,
    default_database: u8,
    sync_timeout: Duration,
    heartbeat_pending: Mutex<Option<Instant>>,
}

impl Bridge {
    pub fn new(role: BridgeRole, endpoint: String, cfg: &Config, push_handler: Option<PushHandler>) -> Arc<Self> {
        let (state_tx, state_rx) = watch::channel(BridgeState::Disconnected);
        let (write_ready_tx, write_ready_rx) = mpsc::channel(WRITE_READY_CAPACITY);
        let backlog_cap = if cfg.backlog_policy == BacklogPolicy::FailFast {
            0
        } else {
            WRITE_READY_CAPACITY
        };
        Arc::new(Self {
            role,
            endpoint,
            state_tx,
            state_rx,
            write_ready_tx,
            write_ready_rx: Mutex::new(Some(write_ready_rx)),
            backlog: Mutex::new(VecDeque::new()),
            backlog_cap,
            backlog_policy: cfg.backlog_policy,
            in_flight: Mutex::new(VecDeque::new()),
            counters: BridgeCounters::new(),
            push_handler,
            protocol_preference: cfg.protocol,
            user: cfg.user.clone(),
            password: cfg.password.clone(),
            client_name: cfg.client_name.clone(),
            default_database: cfg.default_database,
            sync_timeout: cfg.sync_timeout,
            heartbeat_pending: Mutex::new(None),
        })
    }

    pub fn state(&self) -> BridgeState {
        *self.state_rx.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<BridgeState> {
        self.state_rx.clone()
    }

    pub fn counters(&self) -> &Arc<BridgeCounters> {
        &self.counters
    }

    fn detail(&self) -> ErrorDetail {
        let snap = self.counters.snapshot();
        ErrorDetail {
            endpoint: Some(self.endpoint.clone()),
            command: None,
            key: None,
            elapsed: None,
            backlog_depth: Some(snap.backlog_depth.max(0) as usize),
            in_flight_depth: Some(snap.in_flight_depth.max(0) as usize),
        }
    }

    /// Submit a command for dispatch (spec §4.D "Queues" admission policy).
    /// High-priority commands bypass both the write-ready watermark and the
    /// backlog admission check (PING/AUTH/HELLO/CLUSTER NODES/SUBSCRIBE).
    pub async fn submit(&self, cmd: QueuedCommand) -> Result<(), RedisError> {
        let high_priority = cmd.message.flags.high_priority;
        match self.state() {
            BridgeState::ConnectedEstablished if self.write_ready_tx.capacity() > 0 || high_priority => {
                self.counters.in_flight_pushed();
                self.write_ready_tx
                    .send(cmd)
                    .await
                    .map_err(|_| RedisError::ConnectionUnavailable { detail: Some(self.detail()) })
            }
            BridgeState::ConnectedEstablished
            | BridgeState::ConnectedEstablishing
            | BridgeState::Handshaking
            | BridgeState::Connecting
            | BridgeState::Disconnected => {
                if high_priority {
                    self.counters.in_flight_pushed();
                    return self
                        .write_ready_tx
                        .send(cmd)
                        .await
                        .map_err(|_| RedisError::ConnectionUnavailable { detail: Some(self.detail()) });
                }
                self.admit_to_backlog(cmd).await
            }
            BridgeState::ConnectedFailing | BridgeState::Disconnecting => {
                Err(RedisError::ConnectionUnavailable { detail: Some(self.detail()) })
            }
        }
    }

    async fn admit_to_backlog(&self, cmd: QueuedCommand) -> Result<(), RedisError> {
        if self.backlog_policy == BacklogPolicy::FailFast {
            return Err(RedisError::ConnectionUnavailable { detail: Some(self.detail()) });
        }
        let mut backlog = self.backlog.lock().await;
        if backlog.len() >= self.backlog_cap {
            return Err(RedisError::ConnectionUnavailable { detail: Some(self.detail()) });
        }
        backlog.push_back(cmd);
        self.counters.backlog_enqueued();
        Ok(())
    }

    /// Drive connection attempts forever: dial via `connector`, handshake,
    /// run the write/read loop pair until failure, fail all in-flight and
    /// (per policy) backlog messages, back off, and retry.
    pub async fn run(self: Arc<Self>, connector: Connector, retry_policy: ReconnectRetryPolicy, heartbeat_interval: Duration) {
        let mut attempt: u32 = 0;
        loop {
            self.state_tx.send_replace(BridgeState::Connecting);
            let socket = match connector().await {
                Ok(s) => s,
                Err(e) => {
                    warn!(endpoint = %self.endpoint, error = %e, "bridge connect failed");
                    self.fail_everything(ConnectionFailureKind::UnableToConnect).await;
                    attempt += 1;
                    tokio::time::sleep(retry_policy.next_delay(attempt)).await;
                    continue;
                }
            };
            self.state_tx.send_replace(BridgeState::Handshaking);
            let (mut read_half, mut write_half) = tokio::io::split(socket);
            let mut buf = ReadBuffer::new();
            let protocol = match self.perform_handshake(&mut write_half, &mut read_half, &mut buf).await {
                Ok(protocol) => protocol,
                Err(kind) => {
                    warn!(endpoint = %self.endpoint, ?kind, "bridge handshake failed");
                    self.fail_everything(kind).await;
                    if kind == ConnectionFailureKind::AuthenticationFailure {
                        // Terminal: the endpoint stays Disconnected until
                        // configuration changes, per spec — don't reconnect
                        // with credentials that are known to be rejected.
                        self.state_tx.send_replace(BridgeState::Disconnected);
                        return;
                    }
                    self.state_tx.send_replace(BridgeState::Disconnected);
                    attempt += 1;
                    tokio::time::sleep(retry_policy.next_delay(attempt)).await;
                    continue;
                }
            };
            self.state_tx.send_replace(BridgeState::ConnectedEstablishing);
            self.state_tx.send_replace(BridgeState::ConnectedEstablished);
            self.counters.reconnected();
            attempt = 0;

            self.drain_backlog_into_write_ready().await;

            let reason = self.run_session(read_half, write_half, buf, heartbeat_interval, protocol).await;
            self.state_tx.send_replace(BridgeState::ConnectedFailing);
            warn!(endpoint = %self.endpoint, ?reason, "bridge session ended");
            self.fail_everything(reason).await;
            if matches!(self.state(), BridgeState::Disconnecting) {
                return;
            }
            self.state_tx.send_replace(BridgeState::Disconnected);
            attempt += 1;
            tokio::time::sleep(retry_policy.next_delay(attempt)).await;
        }
    }

    /// Negotiate protocol version, authenticate, name the connection, and
    /// select a database on a freshly dialed socket (spec §4.D "Handshake").
    /// Returns the protocol the rest of the session should decode under.
    async fn perform_handshake(
        &self,
        write_half: &mut WriteHalf<BoxSocket>,
        read_half: &mut ReadHalf<BoxSocket>,
        buf: &mut ReadBuffer,
    ) -> Result<Protocol, ConnectionFailureKind> {
        let mut protocol = Protocol::Resp2;

        if !matches!(self.protocol_preference, ProtocolPreference::Resp2) {
            let mut args = vec![RedisValue::from("3")];
            if let (Some(user), Some(password)) = (&self.user, &self.password) {
                args.push(RedisValue::from("AUTH"));
                args.push(RedisValue::from(user.as_str()));
                args.push(RedisValue::from(password.as_str()));
            }
            if let Some(name) = &self.client_name {
                args.push(RedisValue::from("SETNAME"));
                args.push(RedisValue::from(name.as_str()));
            }
            write_frame(write_half, CommandId::Hello, &args).await?;
            match read_one_frame(read_half, buf).await? {
                RawResult::Error(msg) => {
                    let text = String::from_utf8_lossy(&msg).into_owned();
                    if is_unknown_command(&text) {
                        protocol = Protocol::Resp2;
                    } else if is_auth_failure(&text) {
                        return Err(ConnectionFailureKind::AuthenticationFailure);
                    } else {
                        return Err(ConnectionFailureKind::ProtocolFailure);
                    }
                }
                _ => protocol = Protocol::Resp3,
            }
        }

        if protocol == Protocol::Resp2 {
            if let Some(password) = &self.password {
                let mut args = Vec::new();
                if let Some(user) = &self.user {
                    args.push(RedisValue::from(user.as_str()));
                }
                args.push(RedisValue::from(password.as_str()));
                write_frame(write_half, CommandId::Auth, &args).await?;
                if let RawResult::Error(msg) = read_one_frame(read_half, buf).await? {
                    let text = String::from_utf8_lossy(&msg);
                    return Err(if is_auth_failure(&text) {
                        ConnectionFailureKind::AuthenticationFailure
                    } else {
                        ConnectionFailureKind::ProtocolFailure
                    });
                }
            }
            if let Some(name) = &self.client_name {
                write_frame(
                    write_half,
                    CommandId::Client,
                    &[RedisValue::from("SETNAME"), RedisValue::from(name.as_str())],
                )
                .await?;
                read_one_frame(read_half, buf).await?;
            }
        }

        // CLIENT SETINFO is best-effort: older servers reply with an
        // "unknown subcommand" error, which isn't fatal to the handshake.
        write_frame(
            write_half,
            CommandId::Client,
            &[RedisValue::from("SETINFO"), RedisValue::from("lib-name"), RedisValue::from("redis_mux")],
        )
        .await?;
        let _ = read_one_frame(read_half, buf).await;
        write_frame(
            write_half,
            CommandId::Client,
            &[
                RedisValue::from("SETINFO"),
                RedisValue::from("lib-ver"),
                RedisValue::from(env!("CARGO_PKG_VERSION")),
            ],
        )
        .await?;
        let _ = read_one_frame(read_half, buf).await;

        if self.default_database != 0 {
            write_frame(write_half, CommandId::Select, &[RedisValue::from(self.default_database.to_string())]).await?;
            if let RawResult::Error(_) = read_one_frame(read_half, buf).await? {
                return Err(ConnectionFailureKind::ProtocolFailure);
            }
        }

        Ok(protocol)
    }

    async fn drain_backlog_into_write_ready(&self) {
        let mut backlog = self.backlog.lock().await;
        while let Some(cmd) = backlog.pop_front() {
            self.counters.backlog_dequeued();
            if self.write_ready_tx.send(cmd).await.is_err() {
                break;
            }
        }
    }

    /// Run one physical session to completion, returning why it ended.
    /// `read_half`/`write_half`/`buf` are handed over already past the
    /// handshake; `protocol` is whatever it negotiated, and governs how
    /// every frame in this session is decoded.
    async fn run_session(
        &self,
        mut read_half: ReadHalf<BoxSocket>,
        mut write_half: WriteHalf<BoxSocket>,
        mut buf: ReadBuffer,
        heartbeat_interval: Duration,
        protocol: Protocol,
    ) -> ConnectionFailureKind {
        let mut write_ready_rx = match self.write_ready_rx.lock().await.take() {
            Some(rx) => rx,
            None => return ConnectionFailureKind::ProtocolFailure,
        };
        *self.heartbeat_pending.lock().await = None;
        let mut read_chunk = [0u8; 8192];
        let mut heartbeat = tokio::time::interval(heartbeat_interval);
        heartbeat.tick().await;

        let result = loop {
            tokio::select! {
                maybe_cmd = write_ready_rx.recv() => {
                    let Some(cmd) = maybe_cmd else { break ConnectionFailureKind::SocketClosed };
                    if write_half.write_all(&cmd.encoded).await.is_err() {
                        break ConnectionFailureKind::SocketFailure;
                    }
                    if write_half.flush().await.is_err() {
                        break ConnectionFailureKind::SocketFailure;
                    }
                    if cmd.message.flags.fire_and_forget {
                        if let Some(tx) = cmd.reply_tx {
                            let _ = tx.send(Ok(RawResult::Null));
                        }
                        self.counters.in_flight_popped();
                        self.counters.completed();
                    } else {
                        self.in_flight.lock().await.push_back(cmd);
                    }
                }
                n = read_half.read(&mut read_chunk) => {
                    match n {
                        Ok(0) => break ConnectionFailureKind::SocketClosed,
                        Ok(n) => {
                            buf.extend(&read_chunk[..n]);
                            if let Err(reason) = self.drain_frames(&mut buf, protocol).await {
                                break reason;
                            }
                        }
                        Err(_) => break ConnectionFailureKind::SocketFailure,
                    }
                }
                _ = heartbeat.tick() => {
                    let pending = *self.heartbeat_pending.lock().await;
                    match pending {
                        Some(sent_at) if sent_at.elapsed() > self.sync_timeout => {
                            break ConnectionFailureKind::SocketFailure;
                        }
                        Some(_) => {}
                        None => {
                            if self.in_flight.lock().await.is_empty() {
                                let mut encoded = Vec::new();
                                encode_command(CommandId::Ping.as_str(), &[], &mut encoded);
                                if write_half.write_all(&encoded).await.is_err() || write_half.flush().await.is_err() {
                                    break ConnectionFailureKind::SocketFailure;
                                }
                                self.in_flight.lock().await.push_back(QueuedCommand {
                                    message: Message::new(
                                        CommandId::Ping,
                                        -1,
                                        Payload::new(None, vec![]),
                                        MessageFlags { high_priority: true, ..Default::default() },
                                    ),
                                    encoded,
                                    reply_tx: None,
                                });
                                *self.heartbeat_pending.lock().await = Some(Instant::now());
                            }
                        }
                    }
                }
            }
        };
        *self.write_ready_rx.lock().await = Some(write_ready_rx);
        result
    }

    /// Decode every complete frame currently buffered, dispatching pushes
    /// independently of the in-flight FIFO (spec §4.D "read loop").
    async fn drain_frames(&self, buf: &mut ReadBuffer, protocol: Protocol) -> Result<(), ConnectionFailureKind> {
        loop {
            match decode_frame(buf, protocol, None) {
                Ok(None) => return Ok(()),
                Ok(Some(frame)) => {
                    if frame.is_push() || self.role == BridgeRole::Subscription {
                        // RESP3 delivers these as `Push`; RESP2 delivers the
                        // same shape as a plain `Array` (subscribe/unsubscribe
                        // acks and message/pmessage frames alike). Either way
                        // the handler wants the inner items, not the frame.
                        let items = match &frame {
                            RawResult::Push(items) | RawResult::Array(Some(items)) => Some(items.clone()),
                            _ => None,
                        };
                        if let Some(items) = items {
                            if let Some(handler) = &self.push_handler {
                                handler(items);
                            }
                        } else {
                            debug!("frame arrived on subscription path with no array/push shape");
                        }
                        continue;
                    }
                    let mut in_flight = self.in_flight.lock().await;
                    if let Some(cmd) = in_flight.pop_front() {
                        drop(in_flight);
                        self.counters.in_flight_popped();
                        self.counters.completed();
                        if cmd.message.command == CommandId::Ping {
                            *self.heartbeat_pending.lock().await = None;
                        }
                        if let Some(tx) = cmd.reply_tx {
                            let _ = tx.send(Ok(frame));
                        }
                    } else {
                        debug!("frame arrived with no in-flight message to pair it with");
                    }
                }
                Err(_decode_err) => return Err(ConnectionFailureKind::ProtocolFailure),
            }
        }
    }

    async fn fail_everything(&self, reason: ConnectionFailureKind) {
        let mut in_flight = self.in_flight.lock().await;
        while let Some(cmd) = in_flight.pop_front() {
            self.counters.in_flight_popped();
            self.counters.failed();
            if let Some(tx) = cmd.reply_tx {
                let _ = tx.send(Err(RedisError::ConnectionFailure {
                    kind: reason,
                    role: self.role,
                    detail: Some(self.detail()),
                }));
            }
        }
        if self.backlog_policy == BacklogPolicy::FailFast {
            let mut backlog = self.backlog.lock().await;
            while let Some(cmd) = backlog.pop_front() {
                self.counters.backlog_dequeued();
                self.counters.failed();
                if let Some(tx) = cmd.reply_tx {
                    let _ = tx.send(Err(RedisError::ConnectionUnavailable { detail: Some(self.detail()) }));
                }
            }
        }
    }

    /// Begin shutdown: stop admitting new work and, if `allow_pending`,
    /// let the write loop drain before tearing down (spec §5 "Resource
    /// release").
    pub async fn close(&self, allow_pending: bool) {
        self.state_tx.send_replace(BridgeState::Disconnecting);
        if !allow_pending {
            self.fail_everything(ConnectionFailureKind::SocketClosed).await;
        }
    }
}

/// Encode and write one command during the handshake, outside the normal
/// queue machinery (the bridge isn't `ConnectedEstablished` yet).
async fn write_frame<W: AsyncWrite + Unpin>(
    write_half: &mut W,
    command: CommandId,
    args: &[RedisValue],
) -> Result<(), ConnectionFailureKind> {
    let mut encoded = Vec::new();
    encode_command(command.as_str(), args, &mut encoded);
    write_half.write_all(&encoded).await.map_err(|_| ConnectionFailureKind::SocketFailure)?;
    write_half.flush().await.map_err(|_| ConnectionFailureKind::SocketFailure)
}

/// Read exactly one frame during the handshake, blocking on more socket
/// reads as needed. Always decodes as RESP3: every handshake reply shape
/// (simple string, error, bulk string, RESP3 map) uses a prefix byte that's
/// valid under either protocol, so this doesn't presuppose what `HELLO`
/// negotiates.
async fn read_one_frame<R: AsyncRead + Unpin>(
    read_half: &mut R,
    buf: &mut ReadBuffer,
) -> Result<RawResult, ConnectionFailureKind> {
    let mut chunk = [0u8; 8192];
    loop {
        match decode_frame(buf, Protocol::Resp3, None) {
            Ok(Some(frame)) => return Ok(frame),
            Ok(None) => {}
            Err(_) => return Err(ConnectionFailureKind::ProtocolFailure),
        }
        match read_half.read(&mut chunk).await {
            Ok(0) => return Err(ConnectionFailureKind::SocketClosed),
            Ok(n) => buf.extend(&chunk[..n]),
            Err(_) => return Err(ConnectionFailureKind::SocketFailure),
        }
    }
}

fn is_unknown_command(text: &str) -> bool {
    text.contains("unknown command")
}

fn is_auth_failure(text: &str) -> bool {
    matches!(ServerErrorPrefix::classify(text), ServerErrorPrefix::NoAuth | ServerErrorPrefix::WrongPass)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    fn cmd(high_priority: bool, reply: Option<oneshot::Sender<Result<RawResult, RedisError>>>) -> QueuedCommand {
        QueuedCommand::new(
            CommandId::Get,
            &[RedisValue::from("foo")],
            Payload::new(Some("foo".into()), vec![]),
            MessageFlags { high_priority, ..Default::default() },
            -1,
            reply,
        )
    }

    fn test_config() -> Config {
        crate::config::ConfigBuilder::new().endpoint("127.0.0.1", 6379).build().unwrap()
    }

    #[tokio::test]
    async fn backlog_admits_while_disconnected_then_fail_fast_rejects_over_cap() {
        let mut cfg = test_config();
        cfg.backlog_policy = BacklogPolicy::FailFast;
        let bridge = Bridge::new(BridgeRole::Interactive, "127.0.0.1:6379".into(), &cfg, None);
        let result = bridge.submit(cmd(false, None)).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn backlog_and_retry_admits_up_to_cap() {
        let cfg = test_config();
        let bridge = Bridge::new(BridgeRole::Interactive, "127.0.0.1:6379".into(), &cfg, None);
        assert!(bridge.submit(cmd(false, None)).await.is_ok());
        assert_eq!(bridge.counters().snapshot().backlog_depth, 1);
    }

    #[tokio::test]
    async fn basic_set_get_round_trip_over_in_memory_socket() {
        let cfg = test_config();
        let bridge = Bridge::new(BridgeRole::Interactive, "127.0.0.1:6379".into(), &cfg, None);
        let (client_side, server_side) = duplex(4096);

        let server = tokio::spawn(async move {
            let mut server_side = server_side;
            let mut buf = [0u8; 256];
            let n = server_side.read(&mut buf).await.unwrap();
            assert!(std::str::from_utf8(&buf[..n]).unwrap().starts_with("*2\r\n$3\r\nGET"));
            server_side.write_all(b"$3\r\nbar\r\n").await.unwrap();
        });

        let bridge_for_run = bridge.clone();
        let connector: Connector = Arc::new(move || {
            Box::pin(async { Err::<BoxSocket, _>(std::io::Error::other("only one attempt in this test")) })
        });
        // Drive a single session directly rather than through the infinite
        // reconnect loop, since this test only exercises one exchange (and
        // skips the handshake, which has its own coverage elsewhere).
        let (client_read, client_write) = tokio::io::split(Box::new(client_side) as BoxSocket);
        let run_task = tokio::spawn(async move {
            bridge_for_run
                .run_session(client_read, client_write, ReadBuffer::new(), Duration::from_secs(30), Protocol::Resp3)
                .await
        });

        let (tx, rx) = oneshot::channel();
        bridge.write_ready_tx.send(cmd(false, Some(tx))).await.unwrap();
        let reply = rx.await.unwrap().unwrap();
        assert_eq!(reply, RawResult::BulkString(Some(b"bar".to_vec())));

        server.await.unwrap();
        run_task.abort();
        let _ = connector;
    }

    async fn read_server_frame<S: AsyncRead + Unpin>(server_side: &mut S, buf: &mut ReadBuffer, chunk: &mut [u8]) -> RawResult {
        loop {
            if let Ok(Some(frame)) = decode_frame(buf, Protocol::Resp3, None) {
                return frame;
            }
            let n = server_side.read(chunk).await.unwrap();
            buf.extend(&chunk[..n]);
        }
    }

    fn assert_command_name(frame: &RawResult, expected: &str) {
        let RawResult::Array(Some(items)) = frame else { panic!("expected a multi-bulk command frame") };
        let RawResult::BulkString(Some(name)) = &items[0] else { panic!("expected a bulk string command name") };
        assert_eq!(name.to_ascii_uppercase(), expected.as_bytes());
    }

    #[tokio::test]
    async fn handshake_negotiates_resp3_auth_name_and_select_db() {
        let cfg = crate::config::ConfigBuilder::new()
            .endpoint("127.0.0.1", 6379)
            .credentials(Some("user".to_owned()), Some("pw".to_owned()))
            .client_name("testclient")
            .default_database(2)
            .build()
            .unwrap();
        let bridge = Bridge::new(BridgeRole::Interactive, "127.0.0.1:6379".into(), &cfg, None);
        let (client_side, server_side) = duplex(4096);

        let server = tokio::spawn(async move {
            let mut server_side = server_side;
            let mut buf = ReadBuffer::new();
            let mut chunk = [0u8; 4096];

            let frame = read_server_frame(&mut server_side, &mut buf, &mut chunk).await;
            assert_command_name(&frame, "HELLO");
            server_side.write_all(b"%1\r\n$6\r\nserver\r\n$5\r\nmock1\r\n").await.unwrap();

            let frame = read_server_frame(&mut server_side, &mut buf, &mut chunk).await;
            assert_command_name(&frame, "CLIENT");
            server_side.write_all(b"+OK\r\n").await.unwrap();

            let frame = read_server_frame(&mut server_side, &mut buf, &mut chunk).await;
            assert_command_name(&frame, "CLIENT");
            server_side.write_all(b"+OK\r\n").await.unwrap();

            let frame = read_server_frame(&mut server_side, &mut buf, &mut chunk).await;
            assert_command_name(&frame, "SELECT");
            server_side.write_all(b"+OK\r\n").await.unwrap();
        });

        let (mut read_half, mut write_half) = tokio::io::split(Box::new(client_side) as BoxSocket);
        let mut hbuf = ReadBuffer::new();
        let protocol = bridge.perform_handshake(&mut write_half, &mut read_half, &mut hbuf).await.unwrap();
        assert_eq!(protocol, Protocol::Resp3);

        server.await.unwrap();
    }

    #[tokio::test]
    async fn hello_rejected_as_unknown_command_falls_back_to_resp2() {
        let cfg = crate::config::ConfigBuilder::new()
            .endpoint("127.0.0.1", 6379)
            .credentials(None, Some("pw".to_owned()))
            .build()
            .unwrap();
        let bridge = Bridge::new(BridgeRole::Interactive, "127.0.0.1:6379".into(), &cfg, None);
        let (client_side, server_side) = duplex(4096);

        let server = tokio::spawn(async move {
            let mut server_side = server_side;
            let mut buf = ReadBuffer::new();
            let mut chunk = [0u8; 4096];

            let frame = read_server_frame(&mut server_side, &mut buf, &mut chunk).await;
            assert_command_name(&frame, "HELLO");
            server_side.write_all(b"-ERR unknown command 'HELLO'\r\n").await.unwrap();

            let frame = read_server_frame(&mut server_side, &mut buf, &mut chunk).await;
            assert_command_name(&frame, "AUTH");
            server_side.write_all(b"+OK\r\n").await.unwrap();

            let frame = read_server_frame(&mut server_side, &mut buf, &mut chunk).await;
            assert_command_name(&frame, "CLIENT");
            server_side.write_all(b"+OK\r\n").await.unwrap();

            let frame = read_server_frame(&mut server_side, &mut buf, &mut chunk).await;
            assert_command_name(&frame, "CLIENT");
            server_side.write_all(b"+OK\r\n").await.unwrap();
        });

        let (mut read_half, mut write_half) = tokio::io::split(Box::new(client_side) as BoxSocket);
        let mut hbuf = ReadBuffer::new();
        let protocol = bridge.perform_handshake(&mut write_half, &mut read_half, &mut hbuf).await.unwrap();
        assert_eq!(protocol, Protocol::Resp2);

        server.await.unwrap();
    }

    #[tokio::test]
    async fn handshake_classifies_auth_failure_as_terminal() {
        let cfg = crate::config::ConfigBuilder::new()
            .endpoint("127.0.0.1", 6379)
            .credentials(Some("user".to_owned()), Some("wrongpw".to_owned()))
            .build()
            .unwrap();
        let bridge = Bridge::new(BridgeRole::Interactive, "127.0.0.1:6379".into(), &cfg, None);
        let (client_side, server_side) = duplex(4096);

        let server = tokio::spawn(async move {
            let mut server_side = server_side;
            let mut buf = ReadBuffer::new();
            let mut chunk = [0u8; 4096];
            let frame = read_server_frame(&mut server_side, &mut buf, &mut chunk).await;
            assert_command_name(&frame, "HELLO");
            server_side.write_all(b"-WRONGPASS invalid username-password pair\r\n").await.unwrap();
        });

        let (mut read_half, mut write_half) = tokio::io::split(Box::new(client_side) as BoxSocket);
        let mut hbuf = ReadBuffer::new();
        let result = bridge.perform_handshake(&mut write_half, &mut read_half, &mut hbuf).await;
        assert_eq!(result.unwrap_err(), ConnectionFailureKind::AuthenticationFailure);

        server.await.unwrap();
    }

    #[tokio::test]
    async fn heartbeat_issues_a_real_ping_when_idle() {
        let mut cfg = test_config();
        cfg.sync_timeout = Duration::from_millis(500);
        let bridge = Bridge::new(BridgeRole::Interactive, "127.0.0.1:6379".into(), &cfg, None);
        let (client_side, server_side) = duplex(4096);

        let server = tokio::spawn(async move {
            let mut server_side = server_side;
            let mut buf = [0u8; 64];
            let n = server_side.read(&mut buf).await.unwrap();
            assert_eq!(&buf[..n], b"*1\r\n$4\r\nPING\r\n");
            server_side.write_all(b"+PONG\r\n").await.unwrap();
            tokio::time::sleep(Duration::from_millis(100)).await;
        });

        let bridge_for_run = bridge.clone();
        let (client_read, client_write) = tokio::io::split(Box::new(client_side) as BoxSocket);
        let run_task = tokio::spawn(async move {
            bridge_for_run
                .run_session(client_read, client_write, ReadBuffer::new(), Duration::from_millis(10), Protocol::Resp3)
                .await
        });

        server.await.unwrap();
        run_task.abort();
    }
}
