//! Configuration schema definitions.
//!
//! Every section has defaults, so an empty file (or no file) is a valid
//! configuration apart from the serial device name, which must come from
//! somewhere before the bridge can run.

use super::error::{ConfigError, ConfigResult};
use crate::arbiter::{ArbiterSettings, DEFAULT_QUEUE_DEPTH};
use crate::port::{DataBits, FlowControl, Parity, PortConfiguration, StopBits};
use crate::session::SessionSettings;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Root configuration structure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub serial: SerialConfig,
    pub session: SessionConfig,
    pub arbiter: ArbiterConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Reject values the bridge cannot run with.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.serial.baud_rate == 0 {
            return Err(ConfigError::validation("serial.baud_rate", "must be greater than zero"));
        }
        if self.serial.read_timeout_ms == 0 {
            return Err(ConfigError::validation(
                "serial.read_timeout_ms",
                "must be greater than zero",
            ));
        }
        if self.session.idle_timeout_ms == 0 {
            return Err(ConfigError::validation(
                "session.idle_timeout_ms",
                "must be greater than zero",
            ));
        }
        if self.arbiter.queue_depth == 0 {
            return Err(ConfigError::validation("arbiter.queue_depth", "must be at least 1"));
        }
        if let Some(port) = &self.serial.port {
            if port.trim().is_empty() {
                return Err(ConfigError::validation("serial.port", "must not be empty"));
            }
        }
        Ok(())
    }
}

/// TCP listener section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind to
    pub host: String,
    /// TCP port clients connect to
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3092,
        }
    }
}

impl ServerConfig {
    /// `host:port`, bracketing IPv6 literals.
    pub fn bind_address(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

/// Serial device section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    /// Device path or alias. Without one the binary lists devices instead.
    pub port: Option<String>,
    pub baud_rate: u32,
    /// Bound on each device read, in milliseconds
    pub read_timeout_ms: u64,
    pub data_bits: DataBits,
    pub parity: Parity,
    pub stop_bits: StopBits,
    pub flow_control: FlowControl,
    /// Port aliases for convenience
    pub port_aliases: HashMap<String, String>,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: None,
            baud_rate: 9600,
            read_timeout_ms: 300,
            data_bits: DataBits::Eight,
            parity: Parity::None,
            stop_bits: StopBits::One,
            flow_control: FlowControl::None,
            port_aliases: HashMap::new(),
        }
    }
}

impl SerialConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    /// Resolve a port name through aliases
    pub fn resolve_port(&self, name: &str) -> String {
        self.port_aliases
            .get(name)
            .cloned()
            .unwrap_or_else(|| name.to_string())
    }

    /// The configured device with aliases applied.
    pub fn resolved_port(&self) -> Option<String> {
        self.port.as_deref().map(|name| self.resolve_port(name))
    }

    /// Line settings for opening the device.
    pub fn port_configuration(&self) -> PortConfiguration {
        PortConfiguration {
            baud_rate: self.baud_rate,
            data_bits: self.data_bits,
            flow_control: self.flow_control,
            parity: self.parity,
            stop_bits: self.stop_bits,
            timeout: self.read_timeout(),
        }
    }
}

/// Client session section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Idle read deadline, in milliseconds
    pub idle_timeout_ms: u64,
    /// How long before the deadline the keepalive ping goes out, in milliseconds
    pub keepalive_margin_ms: u64,
    /// Send replies as full zero-padded frames
    pub pad_replies: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_timeout_ms: 30_000,
            keepalive_margin_ms: 2_000,
            pad_replies: true,
        }
    }
}

impl SessionConfig {
    pub fn settings(&self) -> SessionSettings {
        SessionSettings {
            idle_timeout: Duration::from_millis(self.idle_timeout_ms),
            keepalive_margin: Duration::from_millis(self.keepalive_margin_ms),
            pad_replies: self.pad_replies,
        }
    }
}

/// Command arbiter section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArbiterConfig {
    pub queue_depth: usize,
    /// Read the device even when the preceding write failed
    pub continue_after_write_error: bool,
}

impl Default for ArbiterConfig {
    fn default() -> Self {
        Self {
            queue_depth: DEFAULT_QUEUE_DEPTH,
            continue_after_write_error: true,
        }
    }
}

impl ArbiterConfig {
    pub fn settings(&self) -> ArbiterSettings {
        ArbiterSettings {
            queue_depth: self.queue_depth,
            continue_after_write_error: self.continue_after_write_error,
        }
    }
}

/// Logging section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset, e.g. "info" or "serial_tcp_bridge=debug"
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// JSON format
    Json,
    /// Pretty format with colors
    #[default]
    Pretty,
    /// Compact format
    Compact,
}
