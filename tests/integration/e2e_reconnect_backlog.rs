//! A connection the mock server force-closes mid-session gets reconnected
//! transparently, and a command submitted while the bridge is down is
//! queued and completes once the backlog drains.

use std::time::Duration;

#[path = "common.rs"]
mod common;

use redis_mux::{Multiplexer, ReconnectRetryPolicy, Topology};
use redis_test_support::MockRedisServer;

async fn connect_with_fast_retries(server: &MockRedisServer) -> std::sync::Arc<Multiplexer> {
    let config = common::custom_config(server, |b| {
        b.reconnect_retry_policy(ReconnectRetryPolicy::Fixed(Duration::from_millis(15)))
    });
    Multiplexer::connect(config, Topology::Standalone, common::connector_factory())
        .await
        .expect("multiplexer connects to mock server")
}

#[tokio::test]
async fn command_submitted_during_a_forced_disconnect_still_completes_after_reconnect() {
    let server = MockRedisServer::start().await.unwrap();
    let mux = connect_with_fast_retries(&server).await;
    let db = mux.database(0);

    db.set("seed", "1").await.unwrap();

    // Cut the connection after exactly one more command on it.
    server.close_connections_after(1).await;
    let bumped = db.incr("seed").await.unwrap();
    assert_eq!(bumped, 2);

    // The bridge notices the closed socket and starts reconnecting in the
    // background; commands issued in this window either queue in the
    // backlog or land on the fresh connection, either way completing once
    // the bridge is established again.
    let mut last_err = None;
    let mut value = None;
    for _ in 0..100 {
        match db.get("seed").await {
            Ok(v) => {
                value = v;
                break;
            }
            Err(e) => {
                last_err = Some(e);
                tokio::time::sleep(Duration::from_millis(15)).await;
            }
        }
    }

    assert_eq!(value, Some(b"2".to_vec()), "last error before success: {last_err:?}");
}

#[tokio::test]
async fn multiplexer_keeps_serving_requests_across_several_forced_disconnects() {
    let server = MockRedisServer::start().await.unwrap();
    let mux = connect_with_fast_retries(&server).await;
    let db = mux.database(0);

    for i in 0..3u32 {
        db.set("counter", i.to_string()).await.unwrap();
        server.close_connections_after(1).await;

        let mut observed = None;
        for _ in 0..100 {
            if let Ok(v) = db.get("counter").await {
                observed = v;
                break;
            }
            tokio::time::sleep(Duration::from_millis(15)).await;
        }
        assert_eq!(observed, Some(i.to_string().into_bytes()));
    }
}
