//! Two handlers subscribed on the same channel both observe a published
//! message, delivered over the endpoint's dedicated subscription connection
//! while `PUBLISH` itself travels the ordinary interactive connection.

use std::sync::{Arc, Mutex};
use std::time::Duration;

#[path = "common.rs"]
mod common;

use redis_test_support::MockRedisServer;

async fn wait_until(mut check: impl FnMut() -> bool) {
    for _ in 0..200 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition never became true");
}

#[tokio::test]
async fn two_subscribers_on_one_channel_both_see_the_message() {
    let server = MockRedisServer::start().await.unwrap();
    let mux = common::connect_standalone(&server).await;

    let seen_a: Arc<Mutex<Vec<Vec<u8>>>> = Arc::new(Mutex::new(Vec::new()));
    let seen_b: Arc<Mutex<Vec<Vec<u8>>>> = Arc::new(Mutex::new(Vec::new()));

    let seen_a_clone = seen_a.clone();
    mux.subscribe(b"news".to_vec(), Arc::new(move |payload| seen_a_clone.lock().unwrap().push(payload)))
        .await
        .unwrap();

    let seen_b_clone = seen_b.clone();
    mux.subscribe(b"news".to_vec(), Arc::new(move |payload| seen_b_clone.lock().unwrap().push(payload)))
        .await
        .unwrap();

    let delivered = mux.publish(b"news".to_vec(), b"hi".to_vec()).await.unwrap();
    assert_eq!(delivered, 2);

    wait_until(|| seen_a.lock().unwrap().len() == 1 && seen_b.lock().unwrap().len() == 1).await;
    assert_eq!(seen_a.lock().unwrap()[0], b"hi");
    assert_eq!(seen_b.lock().unwrap()[0], b"hi");
}

#[tokio::test]
async fn unsubscribe_stops_further_delivery() {
    let server = MockRedisServer::start().await.unwrap();
    let mux = common::connect_standalone(&server).await;

    let seen: Arc<Mutex<Vec<Vec<u8>>>> = Arc::new(Mutex::new(Vec::new()));
    let seen_clone = seen.clone();
    mux.subscribe(b"alerts".to_vec(), Arc::new(move |payload| seen_clone.lock().unwrap().push(payload)))
        .await
        .unwrap();

    mux.publish(b"alerts".to_vec(), b"first".to_vec()).await.unwrap();
    wait_until(|| seen.lock().unwrap().len() == 1).await;

    mux.unsubscribe(b"alerts").await.unwrap();
    let delivered = mux.publish(b"alerts".to_vec(), b"second".to_vec()).await.unwrap();
    assert_eq!(delivered, 0);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(seen.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn pattern_subscription_receives_matching_channel_messages() {
    let server = MockRedisServer::start().await.unwrap();
    let mux = common::connect_standalone(&server).await;

    let seen: Arc<Mutex<Vec<Vec<u8>>>> = Arc::new(Mutex::new(Vec::new()));
    let seen_clone = seen.clone();
    mux.psubscribe(b"room.*".to_vec(), Arc::new(move |payload| seen_clone.lock().unwrap().push(payload)))
        .await
        .unwrap();

    mux.publish(b"room.1".to_vec(), b"hello".to_vec()).await.unwrap();
    wait_until(|| !seen.lock().unwrap().is_empty()).await;
    assert_eq!(seen.lock().unwrap()[0], b"hello");
}
