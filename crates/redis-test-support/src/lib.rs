//! A mock RESP server for `redis-mux` integration tests.
//!
//! Binds to a random port, accepts any number of connections, and serves a
//! small in-memory key/value store plus enough of
//! `MULTI`/`WATCH`/`SUBSCRIBE`/`PSUBSCRIBE` to exercise the multiplexer end
//! to end. Tests can additionally script a one-shot `MOVED` reply or force
//! connections closed after N commands to drive the reconnect/backlog paths.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::debug;

use resp_protocol::{decode_frame, Protocol, RawResult, ReadBuffer};

/// One scripted redirect: the next read/write command gets a `-MOVED` (or
/// `-ASK`) reply instead of touching the store.
#[derive(Clone, Copy)]
enum ScriptedRedirect {
    Moved { slot: u16, port: u16 },
    Ask { slot: u16, port: u16 },
}

struct ServerState {
    store: Mutex<HashMap<Vec<u8>, Vec<u8>>>,
    /// Per connection, the keys it watched and their store version at watch
    /// time; `EXEC` aborts if any has since changed.
    watches: Mutex<HashMap<u64, Vec<(Vec<u8>, u64)>>>,
    watch_versions: Mutex<HashMap<Vec<u8>, u64>>,
    subscribers: Mutex<HashMap<Vec<u8>, Vec<mpsc::UnboundedSender<Vec<u8>>>>>,
    pattern_subscribers: Mutex<HashMap<Vec<u8>, Vec<mpsc::UnboundedSender<Vec<u8>>>>>,
    redirect_once: Mutex<Option<ScriptedRedirect>>,
    close_after: Mutex<Option<u32>>,
    next_conn_id: std::sync::atomic::AtomicU64,
}

impl Default for ServerState {
    fn default() -> Self {
        Self {
            store: Mutex::new(HashMap::new()),
            watches: Mutex::new(HashMap::new()),
            watch_versions: Mutex::new(HashMap::new()),
            subscribers: Mutex::new(HashMap::new()),
            pattern_subscribers: Mutex::new(HashMap::new()),
            redirect_once: Mutex::new(None),
            close_after: Mutex::new(None),
            next_conn_id: std::sync::atomic::AtomicU64::new(1),
        }
    }
}

/// A disposable single-node RESP server for one test.
pub struct MockRedisServer {
    addr: SocketAddr,
    state: Arc<ServerState>,
    _task: JoinHandle<()>,
}

impl MockRedisServer {
    /// Bind to `127.0.0.1:0` and start accepting connections in the
    /// background; returns once the listener is bound.
    pub async fn start() -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let state = Arc::new(ServerState::default());
        let accept_state = state.clone();
        let task = tokio::spawn(async move {
            Self::accept_loop(listener, accept_state).await;
        });
        Ok(Self { addr, state, _task: task })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Seed a key directly, bypassing the wire protocol.
    pub async fn seed(&self, key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) {
        self.state.store.lock().await.insert(key.into(), value.into());
    }

    pub async fn get_seeded(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.state.store.lock().await.get(key).cloned()
    }

    /// The next command touching a key gets a `-MOVED slot host:port` reply
    /// instead of being served, to exercise redirect-following.
    pub async fn inject_moved_once(&self, slot: u16, port: u16) {
        *self.state.redirect_once.lock().await = Some(ScriptedRedirect::Moved { slot, port });
    }

    /// The next command touching a key gets a `-ASK slot host:port` reply.
    pub async fn inject_ask_once(&self, slot: u16, port: u16) {
        *self.state.redirect_once.lock().await = Some(ScriptedRedirect::Ask { slot, port });
    }

    /// Close every connection after it has sent `n` commands, to exercise
    /// reconnect and backlog draining.
    pub async fn close_connections_after(&self, n: u32) {
        *self.state.close_after.lock().await = Some(n);
    }

    async fn accept_loop(listener: TcpListener, state: Arc<ServerState>) {
        loop {
            match listener.accept().await {
                Ok((stream, _peer)) => {
                    let conn_id = state.next_conn_id.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                    let conn_state = state.clone();
                    tokio::spawn(async move {
                        if let Err(e) = Self::handle_connection(stream, conn_id, conn_state).await {
                            debug!(error = %e, "mock server connection ended");
                        }
                    });
                }
                Err(_) => break,
            }
        }
    }

    async fn handle_connection(
        mut stream: TcpStream,
        conn_id: u64,
        state: Arc<ServerState>,
    ) -> std::io::Result<()> {
        let (push_tx, mut push_rx) = mpsc::unbounded_channel::<Vec<u8>>();
        let mut buf = ReadBuffer::new();
        let mut chunk = [0u8; 4096];
        let mut commands_seen: u32 = 0;
        let mut in_multi = false;
        let mut queued: Vec<Vec<Vec<u8>>> = Vec::new();

        loop {
            tokio::select! {
                push = push_rx.recv() => {
                    let Some(bytes) = push else { continue };
                    stream.write_all(&bytes).await?;
                }
                n = stream.read(&mut chunk) => {
                    let n = n?;
                    if n == 0 {
                        return Ok(());
                    }
                    buf.extend(&chunk[..n]);
                    loop {
                        match decode_frame(&mut buf, Protocol::Resp2, None) {
                            Ok(None) => break,
                            Ok(Some(frame)) => {
                                let Some(argv) = as_command_argv(&frame) else { continue };
                                commands_seen += 1;
                                let reply = Self::dispatch(&state, conn_id, &argv, &mut in_multi, &mut queued, &push_tx).await;
                                stream.write_all(&reply).await?;
                                let mut close_after = state.close_after.lock().await;
                                if let Some(limit) = *close_after {
                                    if commands_seen >= limit {
                                        // One-shot: only the connection alive when this was
                                        // armed gets cut, so reconnects behave normally.
                                        *close_after = None;
                                        return Ok(());
                                    }
                                }
                            }
                            Err(_) => return Ok(()),
                        }
                    }
                }
            }
        }
    }

    fn dispatch<'a>(
        state: &'a Arc<ServerState>,
        conn_id: u64,
        argv: &'a [Vec<u8>],
        in_multi: &'a mut bool,
        queued: &'a mut Vec<Vec<Vec<u8>>>,
        push_tx: &'a mpsc::UnboundedSender<Vec<u8>>,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Vec<u8>> + Send + 'a>> {
        Box::pin(async move {
        let name = argv[0].to_ascii_uppercase();
        let name = name.as_slice();

        if *in_multi && !matches!(name, b"EXEC" | b"DISCARD") {
            queued.push(argv.to_vec());
            return reply_simple("QUEUED");
        }

        match name {
            b"PING" => reply_simple("PONG"),
            b"HELLO" => reply_hello(),
            b"SELECT" | b"AUTH" | b"CLIENT" => reply_simple("OK"),
            b"GET" => {
                if let Some(redirect) = Self::take_redirect(state).await {
                    return redirect_reply(redirect);
                }
                let key = &argv[1];
                match state.store.lock().await.get(key) {
                    Some(v) => reply_bulk(Some(v)),
                    None => reply_bulk(None),
                }
            }
            b"SET" => {
                if let Some(redirect) = Self::take_redirect(state).await {
                    return redirect_reply(redirect);
                }
                let key = argv[1].clone();
                let value = argv[2].clone();
                state.store.lock().await.insert(key.clone(), value);
                *state.watch_versions.lock().await.entry(key).or_insert(0) += 1;
                reply_simple("OK")
            }
            b"DEL" => {
                let mut removed = 0i64;
                let mut store = state.store.lock().await;
                for key in &argv[1..] {
                    if store.remove(key).is_some() {
                        removed += 1;
                    }
                }
                reply_integer(removed)
            }
            b"INCR" => {
                let key = argv[1].clone();
                let mut store = state.store.lock().await;
                let current = store
                    .get(&key)
                    .map(|v| std::str::from_utf8(v).ok().and_then(|s| s.parse::<i64>().ok()).unwrap_or(0))
                    .unwrap_or(0);
                let next = current + 1;
                store.insert(key, next.to_string().into_bytes());
                reply_integer(next)
            }
            b"WATCH" => {
                let versions = state.watch_versions.lock().await;
                let mut watches = state.watches.lock().await;
                let entry = watches.entry(conn_id).or_default();
                for key in &argv[1..] {
                    let version = versions.get(key.as_slice()).copied().unwrap_or(0);
                    entry.push((key.clone(), version));
                }
                reply_simple("OK")
            }
            b"UNWATCH" => {
                state.watches.lock().await.remove(&conn_id);
                reply_simple("OK")
            }
            b"MULTI" => {
                *in_multi = true;
                queued.clear();
                reply_simple("OK")
            }
            b"DISCARD" => {
                *in_multi = false;
                queued.clear();
                reply_simple("OK")
            }
            b"EXEC" => {
                *in_multi = false;
                let watched = state.watches.lock().await.remove(&conn_id).unwrap_or_default();
                let dirty = {
                    let versions = state.watch_versions.lock().await;
                    watched.iter().any(|(key, at_watch)| {
                        versions.get(key.as_slice()).copied().unwrap_or(0) != *at_watch
                    })
                };
                let body: Vec<Vec<Vec<u8>>> = queued.drain(..).collect();
                if dirty {
                    return reply_null_array();
                }
                let mut out = Vec::with_capacity(body.len());
                let mut scratch_multi = false;
                let mut scratch_queue = Vec::new();
                for cmd in &body {
                    out.push(Self::dispatch(state, conn_id, cmd, &mut scratch_multi, &mut scratch_queue, push_tx).await);
                }
                reply_array_of_raw(out)
            }
            b"SUBSCRIBE" => {
                let mut subs = state.subscribers.lock().await;
                for channel in &argv[1..] {
                    subs.entry(channel.clone()).or_default().push(push_tx.clone());
                }
                reply_push_array(&[
                    b"subscribe".to_vec(),
                    argv.get(1).cloned().unwrap_or_default(),
                    b"1".to_vec(),
                ])
            }
            b"UNSUBSCRIBE" => {
                let mut subs = state.subscribers.lock().await;
                for channel in &argv[1..] {
                    if let Some(list) = subs.get_mut(channel) {
                        list.retain(|s| !s.same_channel(push_tx));
                    }
                }
                reply_push_array(&[b"unsubscribe".to_vec(), argv.get(1).cloned().unwrap_or_default(), b"0".to_vec()])
            }
            b"PSUBSCRIBE" => {
                let mut subs = state.pattern_subscribers.lock().await;
                for pattern in &argv[1..] {
                    subs.entry(pattern.clone()).or_default().push(push_tx.clone());
                }
                reply_push_array(&[
                    b"psubscribe".to_vec(),
                    argv.get(1).cloned().unwrap_or_default(),
                    b"1".to_vec(),
                ])
            }
            b"PUNSUBSCRIBE" => {
                let mut subs = state.pattern_subscribers.lock().await;
                for pattern in &argv[1..] {
                    if let Some(list) = subs.get_mut(pattern) {
                        list.retain(|s| !s.same_channel(push_tx));
                    }
                }
                reply_push_array(&[
                    b"punsubscribe".to_vec(),
                    argv.get(1).cloned().unwrap_or_default(),
                    b"0".to_vec(),
                ])
            }
            b"PUBLISH" => {
                let channel = &argv[1];
                let payload = &argv[2];
                let mut delivered = 0i64;
                let subs = state.subscribers.lock().await;
                if let Some(list) = subs.get(channel) {
                    for sender in list {
                        let frame = reply_push_array(&[b"message".to_vec(), channel.clone(), payload.clone()]);
                        if sender.send(frame).is_ok() {
                            delivered += 1;
                        }
                    }
                }
                drop(subs);
                let pattern_subs = state.pattern_subscribers.lock().await;
                for (pattern, list) in pattern_subs.iter() {
                    if !glob_match(pattern, channel) {
                        continue;
                    }
                    for sender in list {
                        let frame =
                            reply_push_array(&[b"pmessage".to_vec(), pattern.clone(), channel.clone(), payload.clone()]);
                        if sender.send(frame).is_ok() {
                            delivered += 1;
                        }
                    }
                }
                reply_integer(delivered)
            }
            b"ASKING" => reply_simple("OK"),
            _ => reply_error("ERR unknown command"),
        }
        })
    }

    async fn take_redirect(state: &Arc<ServerState>) -> Option<ScriptedRedirect> {
        state.redirect_once.lock().await.take()
    }
}

/// A small subset of Redis's glob matching (`*` and `?` wildcards, no
/// character classes) — enough to exercise `PSUBSCRIBE` fanout in tests.
fn glob_match(pattern: &[u8], text: &[u8]) -> bool {
    fn go(pattern: &[u8], text: &[u8]) -> bool {
        match pattern.first() {
            None => text.is_empty(),
            Some(b'*') => go(&pattern[1..], text) || (!text.is_empty() && go(pattern, &text[1..])),
            Some(b'?') => !text.is_empty() && go(&pattern[1..], &text[1..]),
            Some(c) => text.first() == Some(c) && go(&pattern[1..], &text[1..]),
        }
    }
    go(pattern, text)
}

fn as_command_argv(frame: &RawResult) -> Option<Vec<Vec<u8>>> {
    let RawResult::Array(Some(items)) = frame else { return None };
    items
        .iter()
        .map(|i| match i {
            RawResult::BulkString(Some(b)) => Some(b.clone()),
            RawResult::SimpleString(b) => Some(b.clone()),
            _ => None,
        })
        .collect()
}

fn redirect_reply(redirect: ScriptedRedirect) -> Vec<u8> {
    match redirect {
        ScriptedRedirect::Moved { slot, port } => {
            reply_error(&format!("MOVED {slot} 127.0.0.1:{port}"))
        }
        ScriptedRedirect::Ask { slot, port } => reply_error(&format!("ASK {slot} 127.0.0.1:{port}")),
    }
}

fn reply_hello() -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(b"%2\r\n");
    out.extend_from_slice(&reply_bulk(Some(b"proto")));
    out.extend_from_slice(b":2\r\n");
    out.extend_from_slice(&reply_bulk(Some(b"mode")));
    out.extend_from_slice(&reply_bulk(Some(b"standalone")));
    out
}

fn reply_simple(s: &str) -> Vec<u8> {
    format!("+{s}\r\n").into_bytes()
}

fn reply_error(s: &str) -> Vec<u8> {
    format!("-{s}\r\n").into_bytes()
}

fn reply_integer(i: i64) -> Vec<u8> {
    format!(":{i}\r\n").into_bytes()
}

fn reply_bulk(value: Option<&[u8]>) -> Vec<u8> {
    match value {
        None => b"$-1\r\n".to_vec(),
        Some(b) => {
            let mut out = format!("${}\r\n", b.len()).into_bytes();
            out.extend_from_slice(b);
            out.extend_from_slice(b"\r\n");
            out
        }
    }
}

fn reply_null_array() -> Vec<u8> {
    b"*-1\r\n".to_vec()
}

fn reply_push_array(items: &[Vec<u8>]) -> Vec<u8> {
    let mut out = format!(">{}\r\n", items.len()).into_bytes();
    for item in items {
        out.extend_from_slice(&reply_bulk(Some(item)));
    }
    out
}

fn reply_array_of_raw(items: Vec<Vec<u8>>) -> Vec<u8> {
    let mut out = format!("*{}\r\n", items.len()).into_bytes();
    for item in items {
        out.extend_from_slice(&item);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn server_starts_and_reports_local_addr() {
        let server = MockRedisServer::start().await.unwrap();
        assert!(server.local_addr().port() > 0);
    }

    #[tokio::test]
    async fn seeded_value_is_retrievable() {
        let server = MockRedisServer::start().await.unwrap();
        server.seed("foo", "bar").await;
        assert_eq!(server.get_seeded(b"foo").await, Some(b"bar".to_vec()));
    }

    async fn raw_roundtrip(stream: &mut TcpStream, command: &[u8]) -> Vec<u8> {
        stream.write_all(command).await.unwrap();
        let mut buf = [0u8; 4096];
        let n = stream.read(&mut buf).await.unwrap();
        buf[..n].to_vec()
    }

    /// Drives the dirty-`EXEC` check with full control over ordering: one
    /// connection watches a key, a second connection changes it, then the
    /// first's `EXEC` observes the drift and aborts (null array).
    #[tokio::test]
    async fn exec_aborts_when_a_watched_key_changes_on_another_connection() {
        let server = MockRedisServer::start().await.unwrap();
        let addr = server.local_addr();

        let mut watcher = TcpStream::connect(addr).await.unwrap();
        let mut writer = TcpStream::connect(addr).await.unwrap();

        raw_roundtrip(&mut watcher, b"*2\r\n$5\r\nWATCH\r\n$5\r\ncount\r\n").await;
        raw_roundtrip(&mut writer, b"*3\r\n$3\r\nSET\r\n$5\r\ncount\r\n$1\r\n9\r\n").await;

        raw_roundtrip(&mut watcher, b"*1\r\n$5\r\nMULTI\r\n").await;
        raw_roundtrip(&mut watcher, b"*2\r\n$3\r\nGET\r\n$5\r\ncount\r\n").await;
        let exec_reply = raw_roundtrip(&mut watcher, b"*1\r\n$4\r\nEXEC\r\n").await;

        assert_eq!(exec_reply, b"*-1\r\n");
    }

    #[tokio::test]
    async fn exec_commits_when_no_watched_key_changed() {
        let server = MockRedisServer::start().await.unwrap();
        let addr = server.local_addr();
        let mut conn = TcpStream::connect(addr).await.unwrap();

        raw_roundtrip(&mut conn, b"*3\r\n$3\r\nSET\r\n$5\r\ncount\r\n$1\r\n1\r\n").await;
        raw_roundtrip(&mut conn, b"*2\r\n$5\r\nWATCH\r\n$5\r\ncount\r\n").await;
        raw_roundtrip(&mut conn, b"*1\r\n$5\r\nMULTI\r\n").await;
        raw_roundtrip(&mut conn, b"*2\r\n$3\r\nGET\r\n$5\r\ncount\r\n").await;
        let exec_reply = raw_roundtrip(&mut conn, b"*1\r\n$4\r\nEXEC\r\n").await;

        assert_eq!(exec_reply, b"*1\r\n$1\r\n1\r\n");
    }
}
