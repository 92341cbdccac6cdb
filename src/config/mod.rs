//! Daemon configuration.
//!
//! Settings live in a JSON file in the data directory (`~/.tomato`), next to
//! the control socket and the interval database. A missing file is created
//! with defaults on first load; missing keys fall back to their defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::TimerConfig;

/// Name of the data directory under the user's home.
const DATA_DIR_NAME: &str = ".tomato";

const SOCKET_FILE: &str = "tomato.sock";
const DATABASE_FILE: &str = "tomato.db";
const CONFIG_FILE: &str = "config.json";

/// Fallback socket location when no home directory can be resolved.
const FALLBACK_SOCKET_PATH: &str = "/tmp/tomato.sock";

// ============================================================================
// ConfigError
// ============================================================================

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The home directory could not be determined.
    #[error("home directory not found")]
    HomeDirectoryNotFound,

    /// Reading or writing the config file failed.
    #[error("failed to access config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid JSON for `AppConfig`.
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// A value is out of range.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

// ============================================================================
// AppConfig
// ============================================================================

fn default_work_minutes() -> u64 {
    30
}

fn default_short_break_minutes() -> u64 {
    5
}

fn default_long_break_minutes() -> u64 {
    20
}

fn default_long_break_after() -> u32 {
    4
}

fn default_daily_goal() -> u32 {
    12
}

fn default_block_enabled() -> bool {
    true
}

fn default_blocked_process() -> String {
    "Messages".to_string()
}

/// User-editable daemon settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Work phase length in minutes (1-240)
    #[serde(default = "default_work_minutes")]
    pub work_minutes: u64,

    /// Short break length in minutes (1-240)
    #[serde(default = "default_short_break_minutes")]
    pub short_break_minutes: u64,

    /// Long break length in minutes (1-240)
    #[serde(default = "default_long_break_minutes")]
    pub long_break_minutes: u64,

    /// Work intervals before a long break (1-12)
    #[serde(default = "default_long_break_after")]
    pub long_break_after: u32,

    /// Daily interval goal reported to front-ends
    #[serde(default = "default_daily_goal")]
    pub daily_goal: u32,

    /// Whether the blocker starts enabled
    #[serde(default = "default_block_enabled")]
    pub block_enabled: bool,

    /// Whether the blocker also runs outside focus intervals
    #[serde(default)]
    pub always_block: bool,

    /// Name of the process the blocker terminates
    #[serde(default = "default_blocked_process")]
    pub blocked_process: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            work_minutes: default_work_minutes(),
            short_break_minutes: default_short_break_minutes(),
            long_break_minutes: default_long_break_minutes(),
            long_break_after: default_long_break_after(),
            daily_goal: default_daily_goal(),
            block_enabled: default_block_enabled(),
            always_block: false,
            blocked_process: default_blocked_process(),
        }
    }
}

impl AppConfig {
    /// Loads the config file, writing defaults if it does not exist yet.
    pub fn load_or_create(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            let config = Self::default();
            config.save(path)?;
            tracing::info!("wrote default config to {}", path.display());
            return Ok(config);
        }

        let data = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&data).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Writes the config as pretty-printed JSON.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let io_err = |source: std::io::Error| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let data = serde_json::to_string_pretty(self).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        std::fs::write(path, data).map_err(io_err)
    }

    /// Validates ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, minutes) in [
            ("work_minutes", self.work_minutes),
            ("short_break_minutes", self.short_break_minutes),
            ("long_break_minutes", self.long_break_minutes),
        ] {
            if !(1..=240).contains(&minutes) {
                return Err(ConfigError::Invalid(format!(
                    "{name} must be between 1 and 240 (got {minutes})"
                )));
            }
        }
        if !(1..=12).contains(&self.long_break_after) {
            return Err(ConfigError::Invalid(format!(
                "long_break_after must be between 1 and 12 (got {})",
                self.long_break_after
            )));
        }
        if self.daily_goal < 1 {
            return Err(ConfigError::Invalid("daily_goal must be at least 1".to_string()));
        }
        if self.blocked_process.trim().is_empty() {
            return Err(ConfigError::Invalid("blocked_process must not be empty".to_string()));
        }
        Ok(())
    }

    /// Phase lengths for the timer.
    pub fn timer_config(&self) -> TimerConfig {
        TimerConfig::from_minutes(
            self.work_minutes,
            self.short_break_minutes,
            self.long_break_minutes,
            self.long_break_after,
        )
    }
}

// ============================================================================
// Paths
// ============================================================================

/// File locations used by the daemon and its clients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paths {
    data_dir: PathBuf,
}

impl Paths {
    /// Resolves `~/.tomato`.
    pub fn from_home() -> Result<Self, ConfigError> {
        let home = dirs::home_dir().ok_or(ConfigError::HomeDirectoryNotFound)?;
        Ok(Self::with_data_dir(home.join(DATA_DIR_NAME)))
    }

    /// Uses an explicit data directory.
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    /// Creates the data directory if needed.
    pub fn ensure_data_dir(&self) -> Result<(), ConfigError> {
        std::fs::create_dir_all(&self.data_dir).map_err(|source| ConfigError::Io {
            path: self.data_dir.clone(),
            source,
        })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn socket_path(&self) -> PathBuf {
        self.data_dir.join(SOCKET_FILE)
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(DATABASE_FILE)
    }

    pub fn config_path(&self) -> PathBuf {
        self.data_dir.join(CONFIG_FILE)
    }
}

/// Socket path for clients: `~/.tomato/tomato.sock`, or `/tmp` without a home.
pub fn default_socket_path() -> PathBuf {
    Paths::from_home()
        .map(|paths| paths.socket_path())
        .unwrap_or_else(|_| PathBuf::from(FALLBACK_SOCKET_PATH))
}

// ============================================================================
// Tests
// ============================================================================
