//! Errors raised while loading, overriding or validating the bridge config.

use super::loader::env_var_name;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    /// `--config` or `SERIAL_BRIDGE_CONFIG` named a file that is not there.
    #[error("bridge config {} does not exist", .0.display())]
    NotFound(PathBuf),

    #[error("cannot read bridge config {}: {source}", .path.display())]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("bridge config {} is not valid TOML: {source}", .path.display())]
    ParseError {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// A setting the bridge cannot run with. `key` is the dotted TOML path,
    /// and the message names the env var that overrides it.
    #[error("invalid {key}: {message} (override with {})", env_var_name(.key))]
    ValidationError { key: String, message: String },

    #[error("{var}: {message}")]
    EnvParseError { var: String, message: String },
}

impl ConfigError {
    pub fn validation<K: Into<String>, M: Into<String>>(key: K, message: M) -> Self {
        Self::ValidationError {
            key: key.into(),
            message: message.into(),
        }
    }

    pub fn env_parse<V: Into<String>, M: Into<String>>(var: V, message: M) -> Self {
        Self::EnvParseError {
            var: var.into(),
            message: message.into(),
        }
    }

    pub fn parse<P: Into<PathBuf>>(path: P, source: toml::de::Error) -> Self {
        Self::ParseError {
            path: path.into(),
            source,
        }
    }
}

pub type ConfigResult<T> = Result<T, ConfigError>;
