//! Client session: one accepted connection turned into arbiter commands.
//!
//! Each session reads frames under a sliding idle deadline, answers `pong`
//! frames locally, forwards everything else to the arbiter and writes the
//! device reply back verbatim. A [`KeepalivePulse`] runs alongside and is
//! torn down with the session.

use crate::arbiter::{ArbiterError, ArbiterHandle, RoundTripStatus};
use crate::counter::{ClientCounter, ClientSlot};
use crate::frame::{classify, Inbound, MAX_FRAME_SIZE};
use crate::keepalive::{keepalive_interval, KeepalivePulse, SharedWriter};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

/// Idle read deadline used when nothing else is configured.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(30);

/// How long before the deadline the keepalive ping goes out.
pub const DEFAULT_KEEPALIVE_MARGIN: Duration = Duration::from_secs(2);

/// Per-session tunables, immutable for the life of the process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSettings {
    /// A read that sees nothing for this long ends the session.
    pub idle_timeout: Duration,
    pub keepalive_margin: Duration,
    /// Write the full zero-padded frame instead of only the bytes the device sent.
    pub pad_replies: bool,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            keepalive_margin: DEFAULT_KEEPALIVE_MARGIN,
            pad_replies: true,
        }
    }
}

impl SessionSettings {
    pub fn keepalive_interval(&self) -> Duration {
        keepalive_interval(self.idle_timeout, self.keepalive_margin)
    }
}

/// Why a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEnd {
    /// Nothing arrived within the idle deadline.
    IdleTimeout,
    /// The peer closed its side (zero-length read).
    PeerClosed,
    ReadError(String),
    WriteError(String),
    /// The arbiter is gone; no command can be served any more.
    ArbiterUnavailable,
    /// The bridge is shutting down.
    Shutdown,
}

impl fmt::Display for SessionEnd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IdleTimeout => write!(f, "client read timeout"),
            Self::PeerClosed => write!(f, "peer closed the connection"),
            Self::ReadError(e) => write!(f, "read error: {e}"),
            Self::WriteError(e) => write!(f, "write error: {e}"),
            Self::ArbiterUnavailable => write!(f, "command arbiter unavailable"),
            Self::Shutdown => write!(f, "bridge shutting down"),
        }
    }
}

/// One live client connection.
pub struct ClientSession<S> {
    id: u64,
    peer: String,
    stream: S,
    arbiter: ArbiterHandle,
    settings: SessionSettings,
    counter: ClientCounter,
    slot: ClientSlot,
    shutdown: CancellationToken,
}

impl<S> ClientSession<S>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    /// Count the client and prepare its session. Nothing is read until
    /// [`run`](Self::run).
    pub fn new(
        id: u64,
        peer: impl Into<String>,
        stream: S,
        arbiter: ArbiterHandle,
        settings: SessionSettings,
        counter: &ClientCounter,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            id,
            peer: peer.into(),
            stream,
            arbiter,
            settings,
            counter: counter.clone(),
            slot: counter.register(),
            shutdown,
        }
    }

    /// Serve the connection until it ends, then tear everything down.
    pub async fn run(self) -> SessionEnd {
        let ClientSession {
            id,
            peer,
            stream,
            arbiter,
            settings,
            counter,
            slot,
            shutdown,
        } = self;

        info!(
            session = id,
            %peer,
            clients = slot.count_at_register(),
            "client connected"
        );

        let (mut reader, writer) = tokio::io::split(stream);
        let writer: SharedWriter<WriteHalf<S>> = Arc::new(Mutex::new(writer));

        let pulse_token = shutdown.child_token();
        let pulse = KeepalivePulse::spawn(
            Arc::clone(&writer),
            settings.keepalive_interval(),
            pulse_token.clone(),
            peer.clone(),
        );

        let end = serve(id, &peer, &mut reader, &writer, &arbiter, &settings, &shutdown).await;

        pulse_token.cancel();
        let pings = pulse.await.unwrap_or_default();
        if let Err(e) = writer.lock().await.shutdown().await {
            trace!(session = id, %peer, error = %e, "connection shutdown failed");
        }
        drop(slot);

        match &end {
            SessionEnd::ReadError(_) | SessionEnd::WriteError(_) => warn!(
                session = id,
                %peer,
                reason = %end,
                pings,
                clients = counter.live(),
                "client disconnected"
            ),
            _ => info!(
                session = id,
                %peer,
                reason = %end,
                pings,
                clients = counter.live(),
                "client disconnected"
            ),
        }
        end
    }
}

async fn serve<S>(
    id: u64,
    peer: &str,
    reader: &mut ReadHalf<S>,
    writer: &SharedWriter<WriteHalf<S>>,
    arbiter: &ArbiterHandle,
    settings: &SessionSettings,
    shutdown: &CancellationToken,
) -> SessionEnd
where
    S: AsyncRead + AsyncWrite,
{
    let mut buffer = [0u8; MAX_FRAME_SIZE];

    loop {
        let read = tokio::select! {
            biased;
            _ = shutdown.cancelled() => return SessionEnd::Shutdown,
            read = tokio::time::timeout(settings.idle_timeout, reader.read(&mut buffer)) => read,
        };

        let n = match read {
            Err(_) => return SessionEnd::IdleTimeout,
            Ok(Err(e)) => return SessionEnd::ReadError(e.to_string()),
            Ok(Ok(0)) => return SessionEnd::PeerClosed,
            Ok(Ok(n)) => n,
        };

        let payload = match classify(&buffer[..n]) {
            Inbound::Pong => {
                debug!(session = id, %peer, "received pong");
                continue;
            }
            Inbound::Command(payload) => payload,
        };

        trace!(session = id, %peer, data = ?payload, "received command");
        let reply = match arbiter.submit(payload).await {
            Ok(round_trip) => {
                if round_trip.status != RoundTripStatus::Clean {
                    debug!(session = id, %peer, status = ?round_trip.status, "degraded round-trip");
                }
                round_trip.reply
            }
            // The device never saw the command, so the client gets no reply.
            Err(ArbiterError::WriteFailed(e)) => {
                debug!(session = id, %peer, error = %e, "command dropped by write policy");
                continue;
            }
            Err(e) => {
                debug!(session = id, %peer, error = %e, "command not served");
                return SessionEnd::ArbiterUnavailable;
            }
        };

        let frame = if settings.pad_replies {
            reply.as_frame()
        } else {
            reply.received()
        };
        if frame.is_empty() {
            continue;
        }

        trace!(session = id, %peer, data = ?reply.received(), "sending reply");
        let mut writer = writer.lock().await;
        let written = async {
            writer.write_all(frame).await?;
            writer.flush().await
        }
        .await;
        if let Err(e) = written {
            return SessionEnd::WriteError(e.to_string());
        }
    }
}
