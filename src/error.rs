//! Bridge-level error type.
//!
//! Only startup failures and an unrecoverable listener reach this type; every
//! per-session problem ends that session and nothing else.

use crate::config::ConfigError;
use crate::port::PortError;
use thiserror::Error;

/// A specialized `Result` type for bridge startup and the accept loop.
pub type BridgeResult<T> = Result<T, BridgeError>;

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Failed to open serial port: {0}")]
    Port(#[from] PortError),

    #[error("Failed to start TCP server on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to accept TCP connection: {0}")]
    Accept(#[source] std::io::Error),

    /// The arbiter task panicked instead of returning the port.
    #[error("Command arbiter failed: {0}")]
    Arbiter(String),
}
