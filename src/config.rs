//! Configuration loading.
//!
//! Loads `config.toml` from `$BULKSEND_CONFIG_PATH` or `~/.bulksend/`.
//! Every section has defaults, so a missing or empty file is valid.
//! Precedence: env vars > config file > defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;

use crate::messaging::stats::DEFAULT_LOG_CAPACITY;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// WhatsApp bridge connection settings.
    pub bridge: BridgeConfig,

    /// Pacing, retry and validation policy for the delivery worker.
    pub delivery: DeliveryConfig,

    /// Log file settings.
    pub logging: LoggingConfig,
}

/// WhatsApp bridge sidecar settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Base URL of the bridge HTTP API.
    pub url: String,

    /// TCP connect timeout in seconds.
    pub connect_timeout_secs: u64,

    /// Per-request timeout in seconds. A send that times out is a transport
    /// failure.
    pub request_timeout_secs: u64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            url: default_bridge_url(),
            connect_timeout_secs: 5,
            request_timeout_secs: 30,
        }
    }
}

/// Delivery worker policy.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DeliveryConfig {
    /// Minimum wait between two rows, in milliseconds.
    pub pacing_ms: u64,

    /// Upper bound of the random extra wait added to `pacing_ms`.
    pub pacing_jitter_ms: u64,

    /// Wait before the single retry of a rate-limited or transport failure.
    pub retry_backoff_ms: u64,

    /// Ask the channel whether each destination is registered before sending.
    pub validate_destinations: bool,

    /// Number of recent outcomes kept for display.
    pub log_capacity: usize,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            pacing_ms: 4_000,
            pacing_jitter_ms: 2_000,
            retry_backoff_ms: 10_000,
            validate_destinations: false,
            log_capacity: DEFAULT_LOG_CAPACITY,
        }
    }
}

impl DeliveryConfig {
    /// Minimum inter-row delay.
    pub fn pacing(&self) -> Duration {
        Duration::from_millis(self.pacing_ms)
    }

    /// Delay before retrying a transient failure.
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

/// Log output settings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Directory for rotated JSON logs. Defaults to `~/.bulksend/logs`.
    pub dir: Option<PathBuf>,
}

fn default_bridge_url() -> String {
    "http://127.0.0.1:3001".to_owned()
}

impl Config {
    /// Apply environment variable overrides.
    ///
    /// Takes a resolver function so tests don't need to mutate the process
    /// environment.
    pub fn apply_overrides(&mut self, env: impl Fn(&str) -> Option<String>) {
        if let Some(url) = env("BULKSEND_BRIDGE_URL") {
            self.bridge.url = url;
        }
        if let Some(raw) = env("BULKSEND_PACING_MS") {
            match raw.parse::<u64>() {
                Ok(ms) => self.delivery.pacing_ms = ms,
                Err(e) => tracing::warn!(value = %raw, error = %e, "ignoring invalid BULKSEND_PACING_MS"),
            }
        }
    }
}

/// Load configuration from a TOML file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed.
pub fn load_config(path: &Path) -> anyhow::Result<Config> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config at {}", path.display()))?;
    let config: Config = toml::from_str(&contents)
        .with_context(|| format!("failed to parse config at {}", path.display()))?;
    Ok(config)
}

/// Load configuration from `path`, or the default location when `None`.
///
/// A missing file at the default location yields defaults. Environment
/// overrides are applied last.
///
/// # Errors
///
/// Returns an error if an existing file cannot be read or parsed, or an
/// explicitly given file does not exist.
pub fn load_or_default(path: Option<&Path>) -> anyhow::Result<Config> {
    let mut config = match path {
        Some(p) => load_config(p)?,
        None => {
            let default_path = config_path_with(|key| std::env::var(key).ok())?;
            if default_path.exists() {
                load_config(&default_path)?
            } else {
                tracing::info!(path = %default_path.display(), "no config file found, using defaults");
                Config::default()
            }
        }
    };
    config.apply_overrides(|key| std::env::var(key).ok());
    Ok(config)
}

/// Resolve the config file path using a custom env resolver.
///
/// `$BULKSEND_CONFIG_PATH` wins, otherwise `~/.bulksend/config.toml`.
///
/// # Errors
///
/// Returns an error if the home directory cannot be determined.
pub fn config_path_with(env: impl Fn(&str) -> Option<String>) -> anyhow::Result<PathBuf> {
    if let Some(p) = env("BULKSEND_CONFIG_PATH") {
        return Ok(PathBuf::from(p));
    }
    Ok(config_dir()?.join("config.toml"))
}

/// Resolve the default config directory (`~/.bulksend/`).
///
/// # Errors
///
/// Returns an error if the home directory cannot be determined.
pub fn config_dir() -> anyhow::Result<PathBuf> {
    let home = directories::BaseDirs::new()
        .ok_or_else(|| anyhow::anyhow!("cannot determine home directory"))?;
    Ok(home.home_dir().join(".bulksend"))
}

/// Directory for log files: the configured one or `~/.bulksend/logs`.
///
/// # Errors
///
/// Returns an error if no directory is configured and the home directory
/// cannot be determined.
pub fn logs_dir(config: &Config) -> anyhow::Result<PathBuf> {
    match &config.logging.dir {
        Some(dir) => Ok(dir.clone()),
        None => Ok(config_dir()?.join("logs")),
    }
}
