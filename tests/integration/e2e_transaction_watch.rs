//! `MULTI`/`WATCH`/`EXEC` transactions pinned to a single connection: the
//! happy path commits and returns the body's results, and a failed
//! precondition skips the body and unwatches instead of running it.

#[path = "common.rs"]
mod common;

use redis_mux::{CommandId, RawResult, RedisKey, RedisValue};
use redis_test_support::MockRedisServer;

#[tokio::test]
async fn transaction_commits_and_returns_body_results_when_unwatched() {
    let server = MockRedisServer::start().await.unwrap();
    let mux = common::connect_standalone(&server).await;
    let db = mux.database(0);

    db.set("balance", "10").await.unwrap();

    let result = mux
        .execute_transaction(
            vec![RedisKey::from("balance")],
            Vec::new(),
            vec![(
                CommandId::Incr,
                Some(RedisKey::from("balance")),
                vec![RedisValue::Bytes(b"balance".to_vec())],
            )],
            0,
        )
        .await
        .unwrap();

    assert!(result.executed);
    assert_eq!(result.body_results.len(), 1);
    assert!(matches!(result.body_results[0], RawResult::Integer(11)));

    let value = db.get("balance").await.unwrap();
    assert_eq!(value, Some(b"11".to_vec()));
}

#[tokio::test]
async fn unsatisfied_condition_skips_body_and_leaves_key_untouched() {
    let server = MockRedisServer::start().await.unwrap();
    let mux = common::connect_standalone(&server).await;
    let db = mux.database(0);

    db.set("balance", "10").await.unwrap();

    let condition = redis_mux::TransactionCondition {
        command: CommandId::Get,
        key: Some(RedisKey::from("balance")),
        args: vec![RedisValue::Bytes(b"balance".to_vec())],
        predicate: |raw| matches!(raw, RawResult::BulkString(Some(b)) if b == b"not-the-actual-value"),
    };

    let result = mux
        .execute_transaction(
            vec![RedisKey::from("balance")],
            vec![condition],
            vec![(
                CommandId::Incr,
                Some(RedisKey::from("balance")),
                vec![RedisValue::Bytes(b"balance".to_vec())],
            )],
            0,
        )
        .await
        .unwrap();

    assert!(!result.executed);
    assert_eq!(result.conditions.len(), 1);
    assert!(!result.conditions[0].satisfied);
    assert!(result.body_results.is_empty());

    let value = db.get("balance").await.unwrap();
    assert_eq!(value, Some(b"10".to_vec()));
}
