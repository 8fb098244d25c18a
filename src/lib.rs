//! Serial TCP Bridge Library
//!
//! Shares one half-duplex serial device between any number of TCP clients.
//! Every client command goes through a single arbiter that performs one
//! write-then-read round-trip at a time, so replies can never be interleaved
//! between clients.
//!
//! # Modules
//!
//! - `frame`: Wire constants and inbound frame classification
//! - `port`: Serial channel abstraction, real and mock devices, discovery
//! - `arbiter`: Serialized device access through a bounded command queue
//! - `session`: Per-connection read loop with idle deadline
//! - `keepalive`: Periodic `ping` frames on idle connections
//! - `counter`: Advisory live-client count
//! - `bridge`: TCP acceptor and startup glue
//! - `config`: Configuration management with TOML support
//! - `logging`: Tracing subscriber setup
//! - `error`: Bridge-level errors

pub mod arbiter;
pub mod bridge;
pub mod config;
pub mod counter;
pub mod error;
pub mod frame;
pub mod keepalive;
pub mod logging;
pub mod port;
pub mod session;

// Re-export commonly used types for convenience
pub use arbiter::{
    Arbiter, ArbiterError, ArbiterHandle, ArbiterSettings, RoundTrip, RoundTripStatus,
    SerialChannel,
};
pub use bridge::{serve, Bridge};
pub use counter::ClientCounter;
pub use error::{BridgeError, BridgeResult};
pub use frame::{Inbound, Reply, MAX_FRAME_SIZE, PING, PONG};
pub use port::{
    list_ports, MockSerialPort, PortConfiguration, PortError, PortInfo, SerialPortAdapter,
    SyncSerialPort,
};
pub use session::{ClientSession, SessionEnd, SessionSettings};

// Re-export config types
pub use config::{Config, ConfigError, ConfigLoader, ConfigResult};
