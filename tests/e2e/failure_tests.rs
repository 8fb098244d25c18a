//! Device failures, write policies and shutdown.

use crate::common::{exchange, read_until_closed, trimmed, wait_until, TestBridge};
use serial_tcp_bridge::arbiter::ArbiterSettings;
use serial_tcp_bridge::bridge::serve;
use serial_tcp_bridge::config::Config;
use serial_tcp_bridge::error::BridgeError;
use serial_tcp_bridge::frame::MAX_FRAME_SIZE;
use serial_tcp_bridge::port::{MockSerialPort, Transaction};
use serial_tcp_bridge::session::SessionSettings;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn test_failed_write_still_answers_with_read() {
    let mock = MockSerialPort::echo("MOCK0");
    mock.fail_next_writes(1);
    let bridge = TestBridge::start_default(mock).await;
    let mut client = bridge.connect().await;

    // The write fails, the read still happens and finds nothing.
    let frame = exchange(&mut client, b"lost").await;
    assert_eq!(frame, [0u8; MAX_FRAME_SIZE]);

    // The device recovers for the next command.
    let frame = exchange(&mut client, b"kept").await;
    assert_eq!(trimmed(&frame), b"kept");

    assert_eq!(
        bridge.mock.transcript(),
        vec![
            Transaction::WriteFailed(b"lost".to_vec()),
            Transaction::ReadTimedOut,
            Transaction::Write(b"kept".to_vec()),
            Transaction::Read(b"kept".to_vec()),
        ]
    );
}

#[tokio::test]
async fn test_strict_policy_sends_no_reply_for_failed_write() {
    let mock = MockSerialPort::echo("MOCK0");
    mock.fail_next_writes(1);
    let arbiter = ArbiterSettings {
        continue_after_write_error: false,
        ..Default::default()
    };
    let bridge = TestBridge::start(mock, SessionSettings::default(), arbiter).await;
    let mut client = bridge.connect().await;

    client.write_all(b"lost").await.unwrap();
    assert!(wait_until(|| !bridge.mock.transcript().is_empty()).await);

    // The first bytes back belong to the second command.
    let frame = exchange(&mut client, b"kept").await;
    assert_eq!(trimmed(&frame), b"kept");
    assert_eq!(
        bridge.mock.transcript(),
        vec![
            Transaction::WriteFailed(b"lost".to_vec()),
            Transaction::Write(b"kept".to_vec()),
            Transaction::Read(b"kept".to_vec()),
        ]
    );
}

#[tokio::test]
async fn test_closed_device_keeps_sessions_up() {
    let mock = MockSerialPort::echo("MOCK0");
    mock.close();
    let bridge = TestBridge::start_default(mock).await;
    let mut client = bridge.connect().await;

    for _ in 0..3 {
        let frame = exchange(&mut client, b"anyone?").await;
        assert_eq!(frame, [0u8; MAX_FRAME_SIZE]);
    }
    assert_eq!(bridge.counter.live(), 1);
}

#[tokio::test]
async fn test_shutdown_closes_clients_and_stops_bridge() {
    let bridge = TestBridge::start_default(MockSerialPort::echo("MOCK0")).await;
    let mut first = bridge.connect().await;
    let mut second = bridge.connect().await;
    assert!(wait_until(|| bridge.counter.live() == 2).await);

    let counter = bridge.counter.clone();
    bridge.shutdown.cancel();

    assert!(read_until_closed(&mut first).await.is_empty());
    assert!(read_until_closed(&mut second).await.is_empty());
    assert!(wait_until(|| counter.live() == 0).await);
    bridge.stop().await.unwrap();
}

#[tokio::test]
async fn test_serve_reports_bind_failure() {
    let occupied = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let mut config = Config::default();
    config.server.host = "127.0.0.1".to_string();
    config.server.port = occupied.local_addr().unwrap().port();

    let err = serve(
        &config,
        Box::new(MockSerialPort::echo("MOCK0")),
        CancellationToken::new(),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, BridgeError::Bind { .. }), "{err}");
}

#[tokio::test]
async fn test_serve_returns_after_shutdown() {
    let mut config = Config::default();
    config.server.host = "127.0.0.1".to_string();
    config.server.port = 0;

    let shutdown = CancellationToken::new();
    let server = tokio::spawn({
        let shutdown = shutdown.clone();
        async move { serve(&config, Box::new(MockSerialPort::echo("MOCK0")), shutdown).await }
    });

    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    shutdown.cancel();
    server.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_serve_applies_configured_read_timeout() {
    let mut config = Config::default();
    config.server.host = "127.0.0.1".to_string();
    config.server.port = 0;
    config.serial.read_timeout_ms = 120;

    let mock = MockSerialPort::echo("MOCK0");
    let shutdown = CancellationToken::new();
    shutdown.cancel();
    serve(&config, Box::new(mock.clone()), shutdown).await.unwrap();

    assert_eq!(mock.read_timeout(), std::time::Duration::from_millis(120));
}
