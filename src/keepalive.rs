//! Keepalive pulse: periodic `ping` frames on an otherwise idle connection.
//!
//! The pulse never reads. It relies on the peer answering with `pong`, which
//! is inbound traffic and therefore refreshes the session's read deadline.

use crate::frame::PING;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Write half of a connection, shared by the session and its pulse so a
/// ping never lands in the middle of a reply.
pub type SharedWriter<W> = Arc<Mutex<W>>;

/// Ping period for a session with the given idle deadline.
///
/// The ping goes out `margin` before the deadline would expire. A margin
/// that leaves no room falls back to half the deadline.
pub fn keepalive_interval(idle_timeout: Duration, margin: Duration) -> Duration {
    match idle_timeout.checked_sub(margin) {
        Some(interval) if !interval.is_zero() => interval,
        _ => idle_timeout / 2,
    }
}

pub struct KeepalivePulse;

impl KeepalivePulse {
    /// Start probing. The task ends on cancellation or on the first failed
    /// write and yields the number of pings sent.
    pub fn spawn<W>(
        writer: SharedWriter<W>,
        interval: Duration,
        token: CancellationToken,
        peer: String,
    ) -> JoinHandle<u64>
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        tokio::spawn(async move {
            let mut sent = 0u64;
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {}
                }

                let mut writer = writer.lock().await;
                let written = async {
                    writer.write_all(PING).await?;
                    writer.flush().await
                }
                .await;

                match written {
                    Ok(()) => {
                        sent += 1;
                        trace!(%peer, "keepalive ping sent");
                    }
                    Err(e) => {
                        debug!(%peer, error = %e, "keepalive write failed, pulse stopping");
                        break;
                    }
                }
            }
            sent
        })
    }
}
