//! Single-client command round-trips through the bridge.

use crate::common::{exchange, trimmed, wait_until, TestBridge};
use pretty_assertions::assert_eq;
use serial_tcp_bridge::arbiter::ArbiterSettings;
use serial_tcp_bridge::frame::MAX_FRAME_SIZE;
use serial_tcp_bridge::port::{MockSerialPort, Transaction};
use serial_tcp_bridge::session::SessionSettings;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

#[tokio::test]
async fn test_command_reaches_device_and_reply_returns() {
    let mock = MockSerialPort::new("MOCK0").with_responder(|_| vec![0xAA, 0xBB]);
    let bridge = TestBridge::start_default(mock).await;
    let mut client = bridge.connect().await;

    let frame = exchange(&mut client, &[0x01, 0x02]).await;

    assert_eq!(&frame[..2], &[0xAA, 0xBB]);
    assert!(frame[2..].iter().all(|b| *b == 0));
    assert_eq!(bridge.mock.writes(), vec![vec![0x01, 0x02]]);

    drop(client);
    bridge.stop().await.unwrap();
}

#[tokio::test]
async fn test_silent_device_yields_zero_frame() {
    let bridge = TestBridge::start_default(MockSerialPort::new("MOCK0")).await;
    let mut client = bridge.connect().await;

    let frame = exchange(&mut client, b"status?").await;

    assert_eq!(frame, [0u8; MAX_FRAME_SIZE]);
    assert_eq!(
        bridge.mock.transcript(),
        vec![
            Transaction::Write(b"status?".to_vec()),
            Transaction::ReadTimedOut,
        ]
    );
}

#[tokio::test]
async fn test_sequential_commands_on_one_connection() {
    let mock = MockSerialPort::new("MOCK0").with_responder(|cmd| {
        let mut answer = b"OK ".to_vec();
        answer.extend_from_slice(cmd);
        answer
    });
    let bridge = TestBridge::start_default(mock).await;
    let mut client = bridge.connect().await;

    for command in [&b"AT"[..], b"AT+GMR", b"AT+RST"] {
        let frame = exchange(&mut client, command).await;
        let mut expected = b"OK ".to_vec();
        expected.extend_from_slice(command);
        assert_eq!(trimmed(&frame), expected.as_slice());
    }
    assert_eq!(bridge.mock.writes().len(), 3);
}

#[tokio::test]
async fn test_unpadded_replies_carry_only_device_bytes() {
    let settings = SessionSettings {
        pad_replies: false,
        ..Default::default()
    };
    let bridge = TestBridge::start(
        MockSerialPort::echo("MOCK0"),
        settings,
        ArbiterSettings::default(),
    )
    .await;
    let mut client = bridge.connect().await;

    client.write_all(b"hello").await.unwrap();
    let mut reply = [0u8; 5];
    client.read_exact(&mut reply).await.unwrap();
    assert_eq!(&reply, b"hello");

    // Nothing else follows the five reply bytes.
    let mut extra = [0u8; 1];
    let more = tokio::time::timeout(Duration::from_millis(200), client.read(&mut extra)).await;
    assert!(more.is_err());
}

#[tokio::test]
async fn test_pong_frames_never_reach_device() {
    let bridge = TestBridge::start_default(MockSerialPort::echo("MOCK0")).await;
    let mut client = bridge.connect().await;

    client.write_all(b"pong").await.unwrap();
    assert!(wait_until(|| bridge.counter.live() == 1).await);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(bridge.mock.transcript().is_empty());

    // The session is still serving commands afterwards.
    let frame = exchange(&mut client, b"cmd").await;
    assert_eq!(trimmed(&frame), b"cmd");
    assert_eq!(bridge.mock.writes(), vec![b"cmd".to_vec()]);
}

#[tokio::test]
async fn test_device_reply_longer_than_frame_is_truncated() {
    let mock = MockSerialPort::new("MOCK0").with_responder(|cmd| {
        if cmd == b"dump" {
            vec![0x55; 200]
        } else {
            cmd.to_vec()
        }
    });
    let bridge = TestBridge::start_default(mock).await;
    let mut client = bridge.connect().await;

    let first = exchange(&mut client, b"dump").await;
    assert_eq!(first, [0x55; MAX_FRAME_SIZE]);

    // The leftover device bytes answer the next command.
    let second = exchange(&mut client, b"x").await;
    assert!(second[..72].iter().all(|b| *b == 0x55));
    assert_eq!(second[72], b'x');
}

#[tokio::test]
async fn test_client_close_releases_session() {
    let bridge = TestBridge::start_default(MockSerialPort::echo("MOCK0")).await;
    let mut client = bridge.connect().await;
    let _ = exchange(&mut client, b"hi").await;
    assert_eq!(bridge.counter.live(), 1);

    drop(client);
    assert!(wait_until(|| bridge.counter.live() == 0).await);

    let mut again = bridge.connect().await;
    let frame = exchange(&mut again, b"again").await;
    assert_eq!(trimmed(&frame), b"again");
}
