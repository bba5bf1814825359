//! A standalone multiplexer performs `SET`/`GET`/`DEL`/`INCR` against a
//! single mock node end to end, over a real TCP loopback connection.

#[path = "common.rs"]
mod common;

use redis_test_support::MockRedisServer;

#[tokio::test]
async fn set_then_get_round_trips_the_value() {
    let server = MockRedisServer::start().await.unwrap();
    let mux = common::connect_standalone(&server).await;
    let db = mux.database(0);

    let set_ok = db.set("greeting", "hello").await.unwrap();
    assert!(set_ok);

    let value = db.get("greeting").await.unwrap();
    assert_eq!(value, Some(b"hello".to_vec()));
}

#[tokio::test]
async fn get_of_missing_key_is_none() {
    let server = MockRedisServer::start().await.unwrap();
    let mux = common::connect_standalone(&server).await;
    let db = mux.database(0);

    let value = db.get("never-set").await.unwrap();
    assert_eq!(value, None);
}

#[tokio::test]
async fn del_reports_how_many_keys_were_removed() {
    let server = MockRedisServer::start().await.unwrap();
    let mux = common::connect_standalone(&server).await;
    let db = mux.database(0);

    db.set("to-delete", "x").await.unwrap();
    let removed = db.del("to-delete").await.unwrap();
    assert_eq!(removed, 1);

    let removed_again = db.del("to-delete").await.unwrap();
    assert_eq!(removed_again, 0);
}

#[tokio::test]
async fn incr_on_missing_key_starts_at_one_and_increments() {
    let server = MockRedisServer::start().await.unwrap();
    let mux = common::connect_standalone(&server).await;
    let db = mux.database(0);

    assert_eq!(db.incr("counter").await.unwrap(), 1);
    assert_eq!(db.incr("counter").await.unwrap(), 2);
}
