//! Configuration types for Playback

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{PlaybackError, Result};

/// Environment variable that selects the mode for a run
pub const ENV_MODE: &str = "PLAYBACK_MODE";

/// Operating mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Capture live traffic and store it
    Record,
    /// Serve only from recordings
    Playback,
    /// Serve from recordings, record whatever is missing
    Hybrid,
}

impl Mode {
    /// Pick the mode for a run.
    ///
    /// A non-empty environment value wins, then the configured mode. Without
    /// either, headless runs play back and interactive runs are hybrid.
    ///
    /// # Errors
    ///
    /// Returns error if the environment value is not a mode
    pub fn resolve(env: Option<&str>, configured: Option<Self>, interactive: bool) -> Result<Self> {
        if let Some(value) = env.map(str::trim).filter(|v| !v.is_empty()) {
            return value.parse();
        }
        if let Some(mode) = configured {
            return Ok(mode);
        }
        Ok(if interactive { Self::Hybrid } else { Self::Playback })
    }

    /// [`resolve`](Self::resolve) with the value of [`ENV_MODE`]
    ///
    /// # Errors
    ///
    /// Returns error if the environment value is not a mode
    pub fn from_env(configured: Option<Self>, interactive: bool) -> Result<Self> {
        let env = std::env::var(ENV_MODE).ok();
        Self::resolve(env.as_deref(), configured, interactive)
    }

    /// Whether recorded responses are served
    #[must_use]
    pub fn plays_back(self) -> bool {
        matches!(self, Self::Playback | Self::Hybrid)
    }

    /// Whether live responses are captured
    #[must_use]
    pub fn records(self) -> bool {
        matches!(self, Self::Record | Self::Hybrid)
    }

    /// Hybrid mode
    #[must_use]
    pub fn is_hybrid(self) -> bool {
        self == Self::Hybrid
    }
}

impl FromStr for Mode {
    type Err = PlaybackError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "record" => Ok(Self::Record),
            "playback" => Ok(Self::Playback),
            "hybrid" => Ok(Self::Hybrid),
            other => Err(PlaybackError::ConfigError(format!(
                "Invalid mode: {other}; expected record, playback or hybrid"
            ))),
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Record => "record",
            Self::Playback => "playback",
            Self::Hybrid => "hybrid",
        })
    }
}

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Operating mode, overridden by `PLAYBACK_MODE`
    #[serde(default)]
    pub mode: Option<Mode>,
    /// Root for recordings; recordings sit beside spec files when unset
    #[serde(default)]
    pub fixtures_dir: Option<PathBuf>,
    /// Pending-request wait at the end of a test
    #[serde(default)]
    pub wait: WaitConfig,
    /// Log output
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// How long to wait for outstanding requests before saving
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaitConfig {
    /// Poll interval
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    /// Give up after this long
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_interval_ms() -> u64 {
    500
}

fn default_timeout_ms() -> u64 {
    10_000
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl WaitConfig {
    /// Poll interval
    #[must_use]
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// Total wait
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Log output settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Level filter, e.g. `debug`
    #[serde(default)]
    pub level: Option<String>,
    /// Output format
    #[serde(default)]
    pub format: Option<LogFormat>,
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Multi-line, human oriented
    #[default]
    Pretty,
    /// Single line per event
    Compact,
    /// Newline-delimited JSON
    Json,
}

impl Config {
    /// Load configuration from TOML file
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read or parsed
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| PlaybackError::ConfigError(format!("Failed to read config file: {e}")))?;

        Self::from_toml_str(&content)
    }

    /// Parse and validate TOML text
    ///
    /// # Errors
    ///
    /// Returns error if the text cannot be parsed or fails validation
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| PlaybackError::ConfigError(format!("Failed to parse config: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    ///
    /// # Errors
    ///
    /// Returns error if configuration is invalid
    pub fn validate(&self) -> Result<()> {
        if self.wait.interval_ms == 0 {
            return Err(PlaybackError::ConfigError(
                "wait.interval_ms must be > 0".to_string(),
            ));
        }

        if self.wait.timeout_ms < self.wait.interval_ms {
            return Err(PlaybackError::ConfigError(format!(
                "wait.timeout_ms ({}) must be >= wait.interval_ms ({})",
                self.wait.timeout_ms, self.wait.interval_ms
            )));
        }

        if let Some(dir) = &self.fixtures_dir {
            if dir.as_os_str().is_empty() {
                return Err(PlaybackError::ConfigError(
                    "fixtures_dir cannot be empty".to_string(),
                ));
            }
        }

        Ok(())
    }
}
