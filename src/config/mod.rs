//! Configuration for the bridge.
//!
//! TOML-based configuration with environment variable overrides. Command-line
//! flags are applied on top by the binary.
//!
//! # Configuration Resolution
//!
//! Configuration is loaded from the first of these that exists:
//!
//! 1. `SERIAL_BRIDGE_CONFIG` environment variable (explicit path)
//! 2. `./bridge.toml` (current directory)
//! 3. `<platform config dir>/serial-tcp-bridge/bridge.toml`
//! 4. Built-in defaults (no file required)
//!
//! # Environment Overrides
//!
//! Values can be overridden with `SERIAL_BRIDGE_<SECTION>_<KEY>`, for example:
//! - `SERIAL_BRIDGE_SERVER_PORT=3092`
//! - `SERIAL_BRIDGE_SERIAL_BAUD_RATE=115200`
//! - `SERIAL_BRIDGE_SESSION_IDLE_TIMEOUT_MS=30000`
//!
//! # Example
//!
//! ```rust,ignore
//! use serial_tcp_bridge::config::ConfigLoader;
//!
//! let loader = ConfigLoader::load()?;
//! let config = loader.config();
//! println!("Listening on {}", config.server.bind_address());
//! ```

mod error;
mod loader;
mod schema;

pub use error::{ConfigError, ConfigResult};
pub use loader::{resolve_config_path, ConfigLoader};
pub use schema::{
    ArbiterConfig, Config, LogFormat, LoggingConfig, SerialConfig, ServerConfig, SessionConfig,
};
