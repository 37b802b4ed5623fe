//! Environment variable names used by this crate for convenient
//! configuration of the logging core from services.
//!
//! These are purely helpers; [`CoreConfig`] itself stays decoupled from
//! environment access.

use crate::logger::parse_level;
use crate::error::ConfigError;
use crate::init::CoreConfig;
use tokio::time::Duration;

/// Minimum level name, e.g. `info` or `verbose`.
pub const NETWORK_LOG_LEVEL_ENV: &str = "NETWORK_LOG_LEVEL";

/// Output pattern, e.g. `{{written_at}} {{method}} {{request}}`.
pub const NETWORK_LOG_PATTERN_ENV: &str = "NETWORK_LOG_PATTERN";

/// Dispatcher channel capacity.
pub const NETWORK_LOG_CHANNEL_BUFFER_ENV: &str = "NETWORK_LOG_CHANNEL_BUFFER";

/// Records per sink batch.
pub const NETWORK_LOG_BATCH_SIZE_ENV: &str = "NETWORK_LOG_BATCH_SIZE";

/// Flush interval in milliseconds.
pub const NETWORK_LOG_FLUSH_MS_ENV: &str = "NETWORK_LOG_FLUSH_MS";

/// `true`/`false`: also print events through the `fmt` layer.
pub const NETWORK_LOG_STDOUT_ENV: &str = "NETWORK_LOG_STDOUT";

impl CoreConfig {
    /// Defaults overridden by whichever `NETWORK_LOG_*` variables are set.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with a custom variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(level) = lookup(NETWORK_LOG_LEVEL_ENV) {
            config.level = parse_level(&level)?;
        }
        if let Some(pattern) = lookup(NETWORK_LOG_PATTERN_ENV) {
            config.pattern = Some(pattern).filter(|p| !p.is_empty());
        }
        if let Some(value) = lookup(NETWORK_LOG_CHANNEL_BUFFER_ENV) {
            config.channel_buffer = parse_number(NETWORK_LOG_CHANNEL_BUFFER_ENV, &value)?;
        }
        if let Some(value) = lookup(NETWORK_LOG_BATCH_SIZE_ENV) {
            config.batch_size = parse_number(NETWORK_LOG_BATCH_SIZE_ENV, &value)?;
        }
        if let Some(value) = lookup(NETWORK_LOG_FLUSH_MS_ENV) {
            let millis = parse_number(NETWORK_LOG_FLUSH_MS_ENV, &value)?;
            config.flush_interval = Duration::from_millis(millis as u64);
        }
        if let Some(value) = lookup(NETWORK_LOG_STDOUT_ENV) {
            config.enable_stdout = !matches!(value.trim(), "0" | "false" | "no" | "off");
        }

        Ok(config)
    }
}

fn parse_number(key: &'static str, value: &str) -> Result<usize, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidNumber {
            key,
            value: value.to_string(),
        })
}
