//! Connection acceptor and startup glue.
//!
//! [`Bridge::run`] accepts TCP connections and spawns one [`ClientSession`]
//! per connection, all sharing a single [`ArbiterHandle`]. [`serve`] wires a
//! configuration, an open serial channel and a shutdown token into a running
//! bridge.

use crate::arbiter::{Arbiter, ArbiterHandle, SerialChannel};
use crate::config::Config;
use crate::counter::ClientCounter;
use crate::error::{BridgeError, BridgeResult};
use crate::session::{ClientSession, SessionSettings};
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Pause after a transient accept failure before trying again.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Accept failures that say something about one connection or a passing
/// resource shortage, not about the listener itself.
pub fn is_transient_accept_error(e: &io::Error) -> bool {
    if matches!(
        e.kind(),
        io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionRefused
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
            | io::ErrorKind::TimedOut
    ) {
        return true;
    }

    #[cfg(unix)]
    {
        matches!(
            e.raw_os_error(),
            Some(libc::EMFILE) | Some(libc::ENFILE) | Some(libc::ENOBUFS) | Some(libc::ENOMEM)
        )
    }

    #[cfg(not(unix))]
    {
        false
    }
}

/// The accept loop.
pub struct Bridge {
    listener: TcpListener,
    arbiter: ArbiterHandle,
    settings: SessionSettings,
    counter: ClientCounter,
    shutdown: CancellationToken,
    next_session_id: u64,
}

impl Bridge {
    pub fn new(
        listener: TcpListener,
        arbiter: ArbiterHandle,
        settings: SessionSettings,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            listener,
            arbiter,
            settings,
            counter: ClientCounter::new(),
            shutdown,
            next_session_id: 1,
        }
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Shared view of the live-client count.
    pub fn counter(&self) -> ClientCounter {
        self.counter.clone()
    }

    /// Accept until shutdown or an unrecoverable listener error.
    ///
    /// On shutdown the live sessions are told to stop and awaited before this
    /// returns. A fatal accept error returns immediately and aborts them.
    pub async fn run(mut self) -> BridgeResult<()> {
        let mut sessions = JoinSet::new();
        info!(addr = ?self.local_addr().ok(), "waiting for TCP connections");

        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                Some(joined) = sessions.join_next(), if !sessions.is_empty() => {
                    if let Err(e) = joined {
                        warn!(error = %e, "client session task failed");
                    }
                }
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        if let Err(e) = stream.set_nodelay(true) {
                            debug!(%addr, error = %e, "could not disable Nagle");
                        }
                        let id = self.next_session_id;
                        self.next_session_id += 1;
                        let session = ClientSession::new(
                            id,
                            addr.to_string(),
                            stream,
                            self.arbiter.clone(),
                            self.settings.clone(),
                            &self.counter,
                            self.shutdown.clone(),
                        );
                        sessions.spawn(session.run());
                    }
                    Err(e) if is_transient_accept_error(&e) => {
                        warn!(error = %e, "transient accept failure, retrying");
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                    }
                    Err(e) => {
                        error!(error = %e, "listener failed");
                        return Err(BridgeError::Accept(e));
                    }
                },
            }
        }

        info!(clients = self.counter.live(), "stopped accepting, waiting for sessions");
        while let Some(joined) = sessions.join_next().await {
            if let Err(e) = joined {
                warn!(error = %e, "client session task failed");
            }
        }
        Ok(())
    }
}

/// Apply the configured read timeout to `port`, bind the listener, start the
/// arbiter and run the bridge until `shutdown` is cancelled.
///
/// The arbiter is stopped only after every session has ended, so replies in
/// flight at shutdown still reach their clients.
pub async fn serve(
    config: &Config,
    mut port: SerialChannel,
    shutdown: CancellationToken,
) -> BridgeResult<()> {
    port.set_timeout(config.serial.read_timeout())?;

    let addr = config.server.bind_address();
    let listener = TcpListener::bind(addr.as_str())
        .await
        .map_err(|source| BridgeError::Bind {
            addr: addr.clone(),
            source,
        })?;
    info!(%addr, "TCP server listening");

    let arbiter_token = CancellationToken::new();
    let (handle, arbiter) =
        Arbiter::spawn(port, config.arbiter.settings(), arbiter_token.clone());

    let bridge = Bridge::new(listener, handle, config.session.settings(), shutdown);
    let result = bridge.run().await;

    arbiter_token.cancel();
    let port = arbiter
        .await
        .map_err(|e| BridgeError::Arbiter(e.to_string()))?;
    info!(port = port.name(), "serial port released");

    result
}
