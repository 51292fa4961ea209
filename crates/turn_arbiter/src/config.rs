//! Match and orchestrator configuration.

use derive_getters::Getters;
use derive_more::{Display, Error};
use derive_setters::Setters;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, instrument};

/// Settings for one `play` invocation.
///
/// ```
/// use std::time::Duration;
/// use turn_arbiter::MatchConfig;
///
/// let config = MatchConfig::default()
///     .with_tolerance(Duration::from_millis(50))
///     .with_timeout(Duration::from_secs(2));
/// assert_eq!(*config.timeout(), Some(Duration::from_secs(2)));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Getters, Setters)]
#[setters(prefix = "with_", strip_option)]
pub struct MatchConfig {
    /// Grace period added to a game's own per-move time limit.
    tolerance: Duration,
    /// Limit on every call into a player.
    timeout: Option<Duration>,
    /// Minimum time between two consecutive moves.
    min_time_between_moves: Duration,
    /// Cap on extra threads a player may occupy.
    max_extra_threads: Option<usize>,
    /// Size of the auxiliary pool handed to players.
    aux_pool_size: Option<usize>,
    /// Size of the background pool handed to players.
    background_pool_size: Option<usize>,
}

/// Orchestrator settings as read from a TOML file.
///
/// Every field is optional; missing fields fall back to defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Getters, Serialize, Deserialize)]
#[serde(default)]
pub struct ArbiterConfig {
    /// Limit applied to every confinement-worker call, in milliseconds.
    block_timeout_ms: Option<u64>,
    /// Grace period after a game's per-move limit, in milliseconds.
    tolerance_ms: u64,
    /// Per-call limit for each match, in milliseconds.
    timeout_ms: Option<u64>,
    /// Minimum pause between moves, in milliseconds.
    min_pause_ms: u64,
    /// Cap on extra player threads.
    max_extra_threads: Option<usize>,
    /// Auxiliary pool size.
    aux_pool_size: Option<usize>,
    /// Background pool size.
    background_pool_size: Option<usize>,
    /// Tracing filter used when `RUST_LOG` is unset.
    log_filter: Option<String>,
}

impl ArbiterConfig {
    /// Loads configuration from TOML file.
    #[instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        debug!("Loading config from file");
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::new(format!("Failed to read config file: {}", e)))?;
        let config = Self::from_toml(&content)?;
        info!(?config, "Config loaded successfully");
        Ok(config)
    }

    /// Parses configuration from TOML text.
    #[instrument(skip(content))]
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)
            .map_err(|e| ConfigError::new(format!("Failed to parse config: {}", e)))?;
        for (name, size) in [
            ("max_extra_threads", config.max_extra_threads),
            ("aux_pool_size", config.aux_pool_size),
            ("background_pool_size", config.background_pool_size),
        ] {
            if size == Some(0) {
                return Err(ConfigError::new(format!("{name} must be at least 1")));
            }
        }
        Ok(config)
    }

    /// Block timeout as a duration.
    pub fn block_timeout(&self) -> Option<Duration> {
        self.block_timeout_ms.map(Duration::from_millis)
    }

    /// Match settings described by this file.
    #[instrument(skip(self))]
    pub fn match_config(&self) -> MatchConfig {
        MatchConfig {
            tolerance: Duration::from_millis(self.tolerance_ms),
            timeout: self.timeout_ms.map(Duration::from_millis),
            min_time_between_moves: Duration::from_millis(self.min_pause_ms),
            max_extra_threads: self.max_extra_threads,
            aux_pool_size: self.aux_pool_size,
            background_pool_size: self.background_pool_size,
        }
    }
}

/// Configuration error.
#[derive(Debug, Clone, Display, Error)]
#[display("Config error: {} at {}:{}", message, file, line)]
pub struct ConfigError {
    /// Error message.
    pub message: String,
    /// Line number where error occurred.
    pub line: u32,
    /// Source file where error occurred.
    pub file: &'static str,
}

impl ConfigError {
    /// Creates a new configuration error.
    #[track_caller]
    #[instrument(skip(message))]
    pub fn new(message: String) -> Self {
        let loc = std::panic::Location::caller();
        Self {
            message,
            line: loc.line(),
            file: loc.file(),
        }
    }
}
