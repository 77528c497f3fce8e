//! Engine configuration
//!
//! Loaded from a TOML file located through
//! [`mpq_common::config::resolve_config_path`]. Every section and key is
//! optional; missing values fall back to built-in defaults.
//!
//! ```toml
//! [queue]
//! max_buffer_ahead_periods = 100
//!
//! [playback]
//! repeat_mode = "all"
//! shuffle = false
//! step_us = 100000
//! max_steps = 100000
//!
//! [logging]
//! level = "debug"
//! ```

use crate::error::{Error, Result};
use crate::queue::MAXIMUM_BUFFER_AHEAD_PERIODS;
use mpq_common::config::{read_config_file, resolve_config_path, CONFIG_ENV_VAR};
use mpq_common::{RepeatMode, TimeUs};
use serde::Deserialize;
use std::path::Path;
use tracing::{info, warn};

/// Complete engine configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub queue: QueueConfig,

    #[serde(default)]
    pub playback: PlaybackConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Media period queue settings
#[derive(Debug, Clone, Deserialize)]
pub struct QueueConfig {
    /// Maximum number of queued media periods
    ///
    /// Default: 100, which is also the upper limit
    #[serde(default = "default_max_buffer_ahead_periods")]
    pub max_buffer_ahead_periods: usize,
}

/// Simulated playback settings
#[derive(Debug, Clone, Deserialize)]
pub struct PlaybackConfig {
    #[serde(default)]
    pub repeat_mode: RepeatMode,

    #[serde(default)]
    pub shuffle: bool,

    /// Renderer clock advance per simulation step
    #[serde(default = "default_step_us")]
    pub step_us: TimeUs,

    /// Stop after this many steps even if playback has not ended
    #[serde(default = "default_max_steps")]
    pub max_steps: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_max_buffer_ahead_periods() -> usize {
    MAXIMUM_BUFFER_AHEAD_PERIODS
}

fn default_step_us() -> TimeUs {
    100_000
}

fn default_max_steps() -> u64 {
    100_000
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_buffer_ahead_periods: default_max_buffer_ahead_periods(),
        }
    }
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            repeat_mode: RepeatMode::default(),
            shuffle: false,
            step_us: default_step_us(),
            max_steps: default_max_steps(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl EngineConfig {
    /// Load configuration
    ///
    /// Uses `cli_path`, then the `MPQ_CONFIG` environment variable, then the
    /// per-user config file. Built-in defaults apply when none is found.
    pub fn load(cli_path: Option<&Path>) -> Result<Self> {
        match resolve_config_path(cli_path, CONFIG_ENV_VAR) {
            Some(path) => {
                let document = read_config_file(&path)?;
                let config = Self::from_toml_str(&document)
                    .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
                info!("Loaded configuration from {}", path.display());
                Ok(config)
            }
            None => {
                info!("No configuration file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Parse and validate a TOML configuration document
    pub fn from_toml_str(document: &str) -> Result<Self> {
        let mut config: Self =
            toml::from_str(document).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&mut self) -> Result<()> {
        let requested = self.queue.max_buffer_ahead_periods;
        if requested == 0 || requested > MAXIMUM_BUFFER_AHEAD_PERIODS {
            let clamped = requested.clamp(1, MAXIMUM_BUFFER_AHEAD_PERIODS);
            warn!(
                "max_buffer_ahead_periods {} out of range, using {}",
                requested, clamped
            );
            self.queue.max_buffer_ahead_periods = clamped;
        }
        if self.playback.step_us <= 0 {
            return Err(Error::Config(format!(
                "step_us must be positive, got {}",
                self.playback.step_us
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = EngineConfig::from_toml_str("").unwrap();
        assert_eq!(config.queue.max_buffer_ahead_periods, 100);
        assert_eq!(config.playback.repeat_mode, RepeatMode::Off);
        assert!(!config.playback.shuffle);
        assert_eq!(config.playback.step_us, 100_000);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_sections_override_defaults() {
        let config = EngineConfig::from_toml_str(
            r#"
            [queue]
            max_buffer_ahead_periods = 5

            [playback]
            repeat_mode = "all"
            shuffle = true
            step_us = 250

            [logging]
            level = "trace"
            "#,
        )
        .unwrap();
        assert_eq!(config.queue.max_buffer_ahead_periods, 5);
        assert_eq!(config.playback.repeat_mode, RepeatMode::All);
        assert!(config.playback.shuffle);
        assert_eq!(config.playback.step_us, 250);
        assert_eq!(config.playback.max_steps, 100_000);
        assert_eq!(config.logging.level, "trace");
    }

    #[test]
    fn test_buffer_ahead_limit_is_clamped() {
        let config = EngineConfig::from_toml_str("[queue]\nmax_buffer_ahead_periods = 500\n").unwrap();
        assert_eq!(config.queue.max_buffer_ahead_periods, MAXIMUM_BUFFER_AHEAD_PERIODS);

        let config = EngineConfig::from_toml_str("[queue]\nmax_buffer_ahead_periods = 0\n").unwrap();
        assert_eq!(config.queue.max_buffer_ahead_periods, 1);
    }

    #[test]
    fn test_non_positive_step_rejected() {
        let result = EngineConfig::from_toml_str("[playback]\nstep_us = 0\n");
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_unknown_repeat_mode_rejected() {
        let result = EngineConfig::from_toml_str("[playback]\nrepeat_mode = \"sometimes\"\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_load_from_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mpq.toml");
        std::fs::write(&path, "[playback]\nmax_steps = 42\n").unwrap();
        let config = EngineConfig::load(Some(&path)).unwrap();
        assert_eq!(config.playback.max_steps, 42);
    }

    #[test]
    fn test_load_missing_explicit_path_fails() {
        let dir = tempfile::tempdir().unwrap();
        let result = EngineConfig::load(Some(&dir.path().join("absent.toml")));
        assert!(matches!(result, Err(Error::Common(mpq_common::Error::Config(_)))));
    }
}
