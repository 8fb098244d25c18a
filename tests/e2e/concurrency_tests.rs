//! Many clients sharing one device.

use crate::common::{exchange, trimmed, wait_until, TestBridge};
use serial_tcp_bridge::port::MockSerialPort;
use std::time::Duration;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_each_client_gets_its_own_reply() {
    // Echo with latency so round-trips from different clients contend.
    let mock = MockSerialPort::echo("MOCK0").with_latency(Duration::from_millis(5));
    let bridge = TestBridge::start_default(mock).await;

    let mut clients = Vec::new();
    for id in 1u8..=4 {
        let mut stream = bridge.connect().await;
        clients.push(tokio::spawn(async move {
            for seq in 1u8..=10 {
                let command = [b'C', id, seq];
                let frame = exchange(&mut stream, &command).await;
                assert_eq!(trimmed(&frame), &command, "client {id} got someone else's reply");
            }
        }));
    }
    for client in clients {
        client.await.unwrap();
    }

    assert_eq!(bridge.mock.writes().len(), 40);
    assert_eq!(bridge.mock.overlaps(), 0);
    bridge.stop().await.unwrap();
}

#[tokio::test]
async fn test_live_count_tracks_connections() {
    let bridge = TestBridge::start_default(MockSerialPort::echo("MOCK0")).await;

    let first = bridge.connect().await;
    let second = bridge.connect().await;
    assert!(wait_until(|| bridge.counter.live() == 2).await);

    drop(first);
    assert!(wait_until(|| bridge.counter.live() == 1).await);

    drop(second);
    assert!(wait_until(|| bridge.counter.live() == 0).await);
}

#[tokio::test]
async fn test_slow_client_does_not_block_others() {
    let bridge = TestBridge::start_default(MockSerialPort::echo("MOCK0")).await;

    // Connected but never sends anything.
    let _idle = bridge.connect().await;
    let mut active = bridge.connect().await;

    let frame = tokio::time::timeout(Duration::from_secs(2), exchange(&mut active, b"go"))
        .await
        .expect("active client was blocked");
    assert_eq!(trimmed(&frame), b"go");
}
