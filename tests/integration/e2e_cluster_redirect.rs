//! Cluster-topology redirect following: a `-MOVED`/`-ASK` reply is resolved
//! transparently and the retried command succeeds, all invisible to the
//! caller.

#[path = "common.rs"]
mod common;

use redis_mux::{slot_for_key, RedisKey};
use redis_test_support::MockRedisServer;

#[tokio::test]
async fn moved_reply_is_followed_and_retried_transparently() {
    let server = MockRedisServer::start().await.unwrap();
    server.seed("foo", "bar").await;

    let slot = slot_for_key(&RedisKey::from("foo"));
    let port = server.local_addr().port();
    server.inject_moved_once(slot, port).await;

    let mux = common::connect_cluster(&server).await;
    let db = mux.database(0);

    let value = db.get("foo").await.unwrap();
    assert_eq!(value, Some(b"bar".to_vec()));
}

#[tokio::test]
async fn ask_reply_is_followed_with_asking_preamble() {
    let server = MockRedisServer::start().await.unwrap();
    server.seed("foo", "bar").await;

    let slot = slot_for_key(&RedisKey::from("foo"));
    let port = server.local_addr().port();
    server.inject_ask_once(slot, port).await;

    let mux = common::connect_cluster(&server).await;
    let db = mux.database(0);

    let value = db.get("foo").await.unwrap();
    assert_eq!(value, Some(b"bar".to_vec()));
}

#[tokio::test]
async fn ask_reply_pointing_at_an_unknown_node_is_routed_there() {
    // Two independent nodes: the mux only knows about `origin` up front.
    // `origin` scripts an `-ASK` pointing at `target`, which is seeded with
    // the value `origin` doesn't have. Only a retry that actually reaches
    // `target` (not a re-select that lands back on `origin`) can succeed.
    let origin = MockRedisServer::start().await.unwrap();
    let target = MockRedisServer::start().await.unwrap();
    target.seed("foo", "bar").await;

    let slot = slot_for_key(&RedisKey::from("foo"));
    origin.inject_ask_once(slot, target.local_addr().port()).await;

    let mux = common::connect_cluster(&origin).await;
    let db = mux.database(0);

    let value = db.get("foo").await.unwrap();
    assert_eq!(value, Some(b"bar".to_vec()));
}

#[tokio::test]
async fn cross_slot_multi_key_watch_is_rejected_before_any_network_io() {
    let server = MockRedisServer::start().await.unwrap();
    let mux = common::connect_cluster(&server).await;

    let result = mux
        .execute_transaction(
            vec![RedisKey::from("{a}1"), RedisKey::from("{b}2")],
            Vec::new(),
            Vec::new(),
            0,
        )
        .await;

    assert!(result.is_err());
}
