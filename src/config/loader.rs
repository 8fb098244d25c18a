//! Configuration loader with file resolution and environment override support.

use super::error::{ConfigError, ConfigResult};
use super::schema::{Config, LogFormat};
use directories::ProjectDirs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Environment variable prefix for overrides
const ENV_PREFIX: &str = "SERIAL_BRIDGE";

/// Config file name
const CONFIG_FILE_NAME: &str = "bridge.toml";

/// Environment variable for explicit config path
const CONFIG_PATH_ENV: &str = "SERIAL_BRIDGE_CONFIG";

/// Configuration loader with resolution and override logic.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    /// Resolved config file path (if any)
    pub config_path: Option<PathBuf>,
    /// The loaded configuration
    pub config: Config,
}

impl ConfigLoader {
    /// Load configuration using the standard resolution order, then apply
    /// environment overrides and validate.
    pub fn load() -> ConfigResult<Self> {
        let config_path = resolve_config_path();

        let mut config = match config_path {
            Some(ref path) => load_from_file(path)?,
            None => Config::default(),
        };

        apply_env_overrides(&mut config)?;
        config.validate()?;

        Ok(Self {
            config_path,
            config,
        })
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            return Err(ConfigError::NotFound(path));
        }

        let mut config = load_from_file(&path)?;
        apply_env_overrides(&mut config)?;
        config.validate()?;

        Ok(Self {
            config_path: Some(path),
            config,
        })
    }

    /// Built-in defaults plus environment overrides; no file is consulted.
    pub fn with_defaults() -> ConfigResult<Self> {
        let mut config = Config::default();
        apply_env_overrides(&mut config)?;
        config.validate()?;

        Ok(Self {
            config_path: None,
            config,
        })
    }

    /// Get the loaded configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Consume the loader and return the configuration.
    pub fn into_config(self) -> Config {
        self.config
    }
}

/// Resolve the configuration file path using standard locations.
pub fn resolve_config_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        let path = PathBuf::from(path);
        if path.exists() {
            return Some(path);
        }
    }

    let cwd_config = PathBuf::from(CONFIG_FILE_NAME);
    if cwd_config.exists() {
        return Some(cwd_config);
    }

    ProjectDirs::from("", "", "serial-tcp-bridge")
        .map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
        .filter(|path| path.exists())
}

fn load_from_file(path: &Path) -> ConfigResult<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
        path: path.to_path_buf(),
        source: e,
    })?;

    toml::from_str(&content).map_err(|e| ConfigError::parse(path, e))
}

/// Env var that overrides a setting, from its dotted file key or a bare
/// `SECTION_KEY` suffix: `serial.baud_rate` is `SERIAL_BRIDGE_SERIAL_BAUD_RATE`.
pub(crate) fn env_var_name(key: &str) -> String {
    format!("{ENV_PREFIX}_{}", key.replace('.', "_").to_ascii_uppercase())
}

/// Read `SERIAL_BRIDGE_<suffix>` and parse it, if set.
fn env_value<T: FromStr>(suffix: &str, what: &str) -> ConfigResult<Option<T>> {
    let var = env_var_name(suffix);
    match std::env::var(&var) {
        Ok(val) => val
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::env_parse(var, format!("Invalid {what}: {val:?}"))),
        Err(_) => Ok(None),
    }
}

fn env_flag(suffix: &str) -> ConfigResult<Option<bool>> {
    let var = env_var_name(suffix);
    match std::env::var(&var) {
        Ok(val) => match val.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(Some(true)),
            "0" | "false" | "no" | "off" => Ok(Some(false)),
            _ => Err(ConfigError::env_parse(var, format!("Invalid flag: {val:?}"))),
        },
        Err(_) => Ok(None),
    }
}

/// Apply environment variable overrides to the configuration.
///
/// Variables follow the pattern `SERIAL_BRIDGE_<SECTION>_<KEY>`.
fn apply_env_overrides(config: &mut Config) -> ConfigResult<()> {
    if let Some(host) = env_value::<String>("SERVER_HOST", "host")? {
        config.server.host = host;
    }
    if let Some(port) = env_value("SERVER_PORT", "port number")? {
        config.server.port = port;
    }

    if let Some(port) = env_value::<String>("SERIAL_PORT", "serial port")? {
        config.serial.port = Some(port);
    }
    if let Some(baud) = env_value("SERIAL_BAUD_RATE", "baud rate")? {
        config.serial.baud_rate = baud;
    }
    if let Some(timeout) = env_value("SERIAL_READ_TIMEOUT_MS", "timeout")? {
        config.serial.read_timeout_ms = timeout;
    }

    if let Some(timeout) = env_value("SESSION_IDLE_TIMEOUT_MS", "timeout")? {
        config.session.idle_timeout_ms = timeout;
    }
    if let Some(margin) = env_value("SESSION_KEEPALIVE_MARGIN_MS", "margin")? {
        config.session.keepalive_margin_ms = margin;
    }
    if let Some(pad) = env_flag("SESSION_PAD_REPLIES")? {
        config.session.pad_replies = pad;
    }

    if let Some(depth) = env_value("ARBITER_QUEUE_DEPTH", "queue depth")? {
        config.arbiter.queue_depth = depth;
    }
    if let Some(lenient) = env_flag("ARBITER_CONTINUE_AFTER_WRITE_ERROR")? {
        config.arbiter.continue_after_write_error = lenient;
    }

    if let Some(level) = env_value::<String>("LOGGING_LEVEL", "log level")? {
        config.logging.level = level;
    }
    if let Some(format) = env_value::<String>("LOGGING_FORMAT", "log format")? {
        config.logging.format = match format.to_ascii_lowercase().as_str() {
            "json" => LogFormat::Json,
            "pretty" => LogFormat::Pretty,
            "compact" => LogFormat::Compact,
            _ => {
                return Err(ConfigError::env_parse(
                    env_var_name("logging.format"),
                    "expected json, pretty or compact",
                ))
            }
        };
    }

    Ok(())
}
