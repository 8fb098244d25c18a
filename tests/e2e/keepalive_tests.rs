//! Keepalive pings and idle reaping over real sockets.
//!
//! These run with a sub-second idle deadline so the whole ping/pong cycle
//! is observable in wall-clock time.

use crate::common::{
    exchange, fast_session, read_until_closed, trimmed, wait_until, TestBridge, IO_TIMEOUT,
};
use serial_tcp_bridge::arbiter::ArbiterSettings;
use serial_tcp_bridge::frame::PING;
use serial_tcp_bridge::port::MockSerialPort;
use serial_tcp_bridge::session::SessionSettings;
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

#[tokio::test]
async fn test_idle_client_is_pinged_then_closed() {
    let bridge = TestBridge::start(
        MockSerialPort::echo("MOCK0"),
        fast_session(400, 150),
        ArbiterSettings::default(),
    )
    .await;
    let mut client = bridge.connect().await;
    let started = Instant::now();

    let seen = read_until_closed(&mut client).await;

    // One ping at 250ms, then the 400ms deadline expires.
    assert_eq!(seen, PING);
    assert!(started.elapsed() >= Duration::from_millis(350));
    assert!(wait_until(|| bridge.counter.live() == 0).await);
    assert!(bridge.mock.transcript().is_empty());
}

#[tokio::test]
async fn test_pong_answers_keep_client_alive() {
    let bridge = TestBridge::start(
        MockSerialPort::echo("MOCK0"),
        fast_session(300, 100),
        ArbiterSettings::default(),
    )
    .await;
    let mut client = bridge.connect().await;

    // Answer pings for well over three idle deadlines.
    let until = Instant::now() + Duration::from_millis(1_000);
    let mut pings = 0;
    while Instant::now() < until {
        let mut ping = [0u8; 4];
        client.read_exact(&mut ping).await.unwrap();
        assert_eq!(&ping, PING);
        client.write_all(b"pong").await.unwrap();
        pings += 1;
    }

    assert!(pings >= 3, "only {pings} pings");
    assert_eq!(bridge.counter.live(), 1);
    assert!(bridge.mock.transcript().is_empty());

    // Wait for the next ping so the command cannot share a read with the
    // last pong; a frame starting with `pong` is never forwarded.
    let mut ping = [0u8; 4];
    client.read_exact(&mut ping).await.unwrap();
    assert_eq!(&ping, PING);

    let frame = exchange(&mut client, b"alive?").await;
    assert_eq!(trimmed(&frame), b"alive?");
}

#[tokio::test]
async fn test_command_sharing_a_read_with_pong_is_dropped() {
    let bridge = TestBridge::start_default(MockSerialPort::echo("MOCK0")).await;
    let mut client = bridge.connect().await;

    client.write_all(b"pongalive?").await.unwrap();
    assert!(wait_until(|| bridge.counter.live() == 1).await);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(bridge.mock.transcript().is_empty());

    // Sent on its own, the same command goes through.
    let frame = exchange(&mut client, b"alive?").await;
    assert_eq!(trimmed(&frame), b"alive?");
    assert_eq!(bridge.mock.writes(), vec![b"alive?".to_vec()]);
}

#[tokio::test]
async fn test_command_traffic_refreshes_deadline() {
    let settings = SessionSettings {
        pad_replies: false,
        ..fast_session(400, 150)
    };
    let bridge = TestBridge::start(
        MockSerialPort::echo("MOCK0"),
        settings,
        ArbiterSettings::default(),
    )
    .await;
    let mut client = bridge.connect().await;

    // A command every 150ms keeps the session alive without any pong.
    for i in 0..8 {
        let command = format!("cmd{i}");
        client.write_all(command.as_bytes()).await.unwrap();
        let reply = read_skipping_pings(&mut client, command.len()).await;
        assert_eq!(reply, command.as_bytes());
        tokio::time::sleep(Duration::from_millis(150)).await;
    }

    assert_eq!(bridge.counter.live(), 1);
    assert_eq!(bridge.mock.writes().len(), 8);
}

/// Read `len` reply bytes, discarding any pings interleaved with them.
async fn read_skipping_pings(client: &mut TcpStream, len: usize) -> Vec<u8> {
    let mut received = Vec::new();
    loop {
        if let Some(at) = received.windows(PING.len()).position(|w| w == PING) {
            received.drain(at..at + PING.len());
            continue;
        }
        if received.len() >= len {
            return received;
        }
        let mut chunk = [0u8; 64];
        let n = tokio::time::timeout(IO_TIMEOUT, client.read(&mut chunk))
            .await
            .expect("reply timed out")
            .unwrap();
        assert!(n > 0, "bridge closed the connection");
        received.extend_from_slice(&chunk[..n]);
    }
}
