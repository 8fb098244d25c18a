//! Command arbiter: the single owner of the serial channel.
//!
//! Sessions hand commands to an [`ArbiterHandle`]; one task pulls them off a
//! bounded FIFO queue and performs each device round-trip (write, then one
//! bounded read) before touching the next. Because the port lives inside that
//! task and is only ever moved onto the blocking pool for the duration of a
//! single round-trip, no two round-trips can overlap.
//!
//! ```text
//! Session ─┐                         ┌──────────────┐
//! Session ─┼─> mpsc (depth N) ─────> │ arbiter task │ ──> spawn_blocking(write + read)
//! Session ─┘   + oneshot reply  <─── └──────────────┘
//! ```

use crate::frame::{Reply, MAX_FRAME_SIZE};
use crate::port::{PortError, SerialPortAdapter};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Queue depth used when nothing else is configured.
pub const DEFAULT_QUEUE_DEPTH: usize = 4;

/// The serial device as owned by the arbiter.
pub type SerialChannel = Box<dyn SerialPortAdapter>;

/// Errors a submitter can observe.
#[derive(Debug, Error)]
pub enum ArbiterError {
    /// The arbiter stopped before this command was served.
    #[error("command arbiter has shut down")]
    Shutdown,

    /// The device write failed and the strict write policy skipped the read.
    #[error("device write failed: {0}")]
    WriteFailed(#[source] PortError),

    /// The blocking round-trip task panicked or was cancelled.
    #[error("device worker failed: {0}")]
    Worker(String),
}

/// Tunables for the arbiter loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArbiterSettings {
    /// Commands that may wait in the queue before submitters are held back.
    pub queue_depth: usize,
    /// Still read the device after a failed write.
    pub continue_after_write_error: bool,
}

impl Default for ArbiterSettings {
    fn default() -> Self {
        Self {
            queue_depth: DEFAULT_QUEUE_DEPTH,
            continue_after_write_error: true,
        }
    }
}

/// How a round-trip went. The reply is delivered in every case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoundTripStatus {
    Clean,
    /// The device produced nothing within its read timeout.
    ReadTimedOut,
    /// The read failed for a reason other than the timeout.
    ReadFailed { error: String },
    /// The write failed; the read was attempted anyway.
    WriteFailed { error: String },
}

/// Outcome of one device round-trip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundTrip {
    pub reply: Reply,
    pub status: RoundTripStatus,
}

/// One queued request: the payload plus where its reply goes.
struct Command {
    payload: Vec<u8>,
    respond_to: oneshot::Sender<Result<RoundTrip, ArbiterError>>,
}

/// Cloneable submission side of the arbiter, shared by every session.
#[derive(Clone)]
pub struct ArbiterHandle {
    tx: mpsc::Sender<Command>,
    shutdown: CancellationToken,
    round_trips: Arc<AtomicU64>,
}

impl ArbiterHandle {
    /// Queue `payload` for the device and wait for its reply.
    ///
    /// Waits for queue space when the queue is full. Returns
    /// [`ArbiterError::Shutdown`] instead of blocking once the arbiter stops.
    pub async fn submit(&self, payload: &[u8]) -> Result<RoundTrip, ArbiterError> {
        let (respond_to, response) = oneshot::channel();
        let command = Command {
            payload: payload.to_vec(),
            respond_to,
        };

        tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => return Err(ArbiterError::Shutdown),
            sent = self.tx.send(command) => {
                sent.map_err(|_| ArbiterError::Shutdown)?;
            }
        }

        // A dropped sender means the command was abandoned during shutdown.
        response.await.map_err(|_| ArbiterError::Shutdown)?
    }

    /// Number of round-trips completed so far.
    pub fn round_trips(&self) -> u64 {
        self.round_trips.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for ArbiterHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArbiterHandle")
            .field("queue_capacity", &self.tx.capacity())
            .field("round_trips", &self.round_trips())
            .finish()
    }
}

/// The arbiter task. Construct with [`Arbiter::spawn`].
pub struct Arbiter {
    port: SerialChannel,
    rx: mpsc::Receiver<Command>,
    settings: ArbiterSettings,
    shutdown: CancellationToken,
    round_trips: Arc<AtomicU64>,
}

impl Arbiter {
    /// Take ownership of `port` and start serving commands.
    ///
    /// The task ends when `shutdown` is cancelled or every handle is dropped;
    /// it then hands the port back through the join handle.
    pub fn spawn(
        port: SerialChannel,
        settings: ArbiterSettings,
        shutdown: CancellationToken,
    ) -> (ArbiterHandle, JoinHandle<SerialChannel>) {
        let (tx, rx) = mpsc::channel(settings.queue_depth.max(1));
        let round_trips = Arc::new(AtomicU64::new(0));

        let handle = ArbiterHandle {
            tx,
            shutdown: shutdown.clone(),
            round_trips: Arc::clone(&round_trips),
        };
        let arbiter = Arbiter {
            port,
            rx,
            settings,
            shutdown,
            round_trips,
        };

        (handle, tokio::spawn(arbiter.run()))
    }

    async fn run(mut self) -> SerialChannel {
        info!(
            port = self.port.name(),
            queue_depth = self.settings.queue_depth,
            "command arbiter started"
        );

        if let Err(e) = self.port.clear_buffers() {
            warn!(port = self.port.name(), error = %e, "could not discard stale device input");
        }

        loop {
            let command = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                next = self.rx.recv() => match next {
                    Some(command) => command,
                    None => {
                        debug!("all arbiter handles dropped");
                        break;
                    }
                },
            };

            let result = self.serve(command.payload).await;
            self.round_trips.fetch_add(1, Ordering::Relaxed);

            if command.respond_to.send(result).is_err() {
                debug!("submitter went away before its reply arrived");
            }
        }

        self.drain();
        info!(
            port = self.port.name(),
            round_trips = self.round_trips.load(Ordering::Relaxed),
            "command arbiter stopped"
        );
        self.port
    }

    /// Run one round-trip on the blocking pool and take the port back.
    async fn serve(&mut self, payload: Vec<u8>) -> Result<RoundTrip, ArbiterError> {
        let port = std::mem::replace(&mut self.port, Box::new(Detached));
        let continue_after_write_error = self.settings.continue_after_write_error;

        let joined = tokio::task::spawn_blocking(move || {
            let mut port = port;
            let result = round_trip(&mut *port, &payload, continue_after_write_error);
            (port, result)
        })
        .await;

        match joined {
            Ok((port, result)) => {
                self.port = port;
                result
            }
            Err(e) => {
                // The port went down with the worker; every later command fails the same way.
                warn!(error = %e, "device worker failed");
                Err(ArbiterError::Worker(e.to_string()))
            }
        }
    }

    /// Answer every queued command with `Shutdown`.
    fn drain(&mut self) {
        self.rx.close();
        let mut abandoned = 0usize;
        while let Ok(command) = self.rx.try_recv() {
            let _ = command.respond_to.send(Err(ArbiterError::Shutdown));
            abandoned += 1;
        }
        if abandoned > 0 {
            info!(abandoned, "released queued commands on shutdown");
        }
    }
}

/// Write `payload`, then perform one bounded read of up to one frame.
///
/// A write failure is logged and, unless the strict policy is in force, the
/// read still happens and its buffer is returned tagged `WriteFailed`.
pub fn round_trip(
    port: &mut dyn SerialPortAdapter,
    payload: &[u8],
    continue_after_write_error: bool,
) -> Result<RoundTrip, ArbiterError> {
    let write_error = match port.write_bytes(payload) {
        Ok(written) => {
            debug!(port = port.name(), written, "command written to device");
            None
        }
        Err(e) => {
            warn!(port = port.name(), error = %e, "device write failed");
            if !continue_after_write_error {
                return Err(ArbiterError::WriteFailed(e));
            }
            Some(e)
        }
    };

    let mut buffer = [0u8; MAX_FRAME_SIZE];
    let (len, read_status) = match port.read_bytes(&mut buffer) {
        Ok(n) => (n, RoundTripStatus::Clean),
        Err(e) if e.is_timeout() => {
            debug!(port = port.name(), "device read timed out");
            (0, RoundTripStatus::ReadTimedOut)
        }
        Err(e) => {
            warn!(port = port.name(), error = %e, "device read failed");
            (0, RoundTripStatus::ReadFailed { error: e.to_string() })
        }
    };

    let status = match write_error {
        Some(e) => RoundTripStatus::WriteFailed {
            error: e.to_string(),
        },
        None => read_status,
    };

    Ok(RoundTrip {
        reply: Reply::from_buffer(buffer, len),
        status,
    })
}

/// Stand-in that occupies the arbiter's slot while the real port is on the
/// blocking pool, or permanently after the worker failed.
#[derive(Debug)]
struct Detached;

impl SerialPortAdapter for Detached {
    fn write_bytes(&mut self, _data: &[u8]) -> Result<usize, PortError> {
        Err(PortError::config("serial channel is detached"))
    }

    fn read_bytes(&mut self, _buffer: &mut [u8]) -> Result<usize, PortError> {
        Err(PortError::config("serial channel is detached"))
    }

    fn name(&self) -> &str {
        "<detached>"
    }

    fn set_timeout(&mut self, _timeout: std::time::Duration) -> Result<(), PortError> {
        Ok(())
    }

    fn clear_buffers(&mut self) -> Result<(), PortError> {
        Ok(())
    }
}
