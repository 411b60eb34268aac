use anyhow::{Context, Result};
use proctor_storage::DisplayMetrics;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::supervisor::MAX_VIOLATIONS;

/// Get the local data directory for proctor.
///
/// # Errors
///
/// Returns an error if the local data directory cannot be determined.
pub fn get_data_dir() -> Result<PathBuf> {
    let mut path =
        dirs::data_local_dir().ok_or_else(|| anyhow::anyhow!("Failed to get local data dir"))?;
    path.push("proctor");
    Ok(path)
}

/// Default location of `config.toml`
///
/// # Errors
///
/// Returns an error if the local data directory cannot be determined.
pub fn default_config_path() -> Result<PathBuf> {
    Ok(get_data_dir()?.join("config.toml"))
}

/// Session policy and cadence settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProctorConfig {
    /// Attempt identifier stamped on every event
    pub attempt_id: String,
    pub duration_secs: u32,
    pub max_violations: u32,
    pub tick_interval_ms: u64,
    pub flush_interval_secs: u64,
    /// Record a `TIMER_TICK` event for every countdown tick
    pub log_timer_ticks: bool,
    pub user_agent: String,
    pub display_width: u32,
    pub display_height: u32,
    /// Where the database and outbox live; the local data dir when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,
}

impl Default for ProctorConfig {
    fn default() -> Self {
        Self {
            attempt_id: String::from("attempt-local"),
            duration_secs: 3600,
            max_violations: MAX_VIOLATIONS,
            tick_interval_ms: 1000,
            flush_interval_secs: 10,
            log_timer_ticks: false,
            user_agent: format!("proctor/{}", env!("CARGO_PKG_VERSION")),
            display_width: 1920,
            display_height: 1080,
            data_dir: None,
        }
    }
}

impl ProctorConfig {
    /// Load from `path`, falling back to defaults when the file is missing
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: Self = toml::from_str(&raw)
            .with_context(|| format!("Malformed config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Write the config as TOML, creating parent directories
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }
        let raw = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, raw)
            .with_context(|| format!("Failed to write config {}", path.display()))?;
        Ok(())
    }

    /// Reject settings the scheduler cannot run with
    ///
    /// # Errors
    ///
    /// Returns an error naming the first invalid field
    pub fn validate(&self) -> Result<()> {
        if self.tick_interval_ms == 0 {
            anyhow::bail!("tick_interval_ms must be greater than zero");
        }
        if self.flush_interval_secs == 0 {
            anyhow::bail!("flush_interval_secs must be greater than zero");
        }
        if self.max_violations == 0 {
            anyhow::bail!("max_violations must be at least 1");
        }
        if self.attempt_id.trim().is_empty() {
            anyhow::bail!("attempt_id must not be empty");
        }
        Ok(())
    }

    /// Directory holding the database and outbox
    ///
    /// # Errors
    ///
    /// Returns an error if no directory is configured and the local data
    /// directory cannot be determined
    pub fn data_dir(&self) -> Result<PathBuf> {
        match &self.data_dir {
            Some(dir) => Ok(dir.clone()),
            None => get_data_dir(),
        }
    }

    /// SQLite file backing the durable store
    ///
    /// # Errors
    ///
    /// Same as [`ProctorConfig::data_dir`]
    pub fn database_path(&self) -> Result<PathBuf> {
        Ok(self.data_dir()?.join("proctor.db"))
    }

    /// JSON-lines file the local sink spools delivered batches to
    ///
    /// # Errors
    ///
    /// Same as [`ProctorConfig::data_dir`]
    pub fn outbox_path(&self) -> Result<PathBuf> {
        Ok(self.data_dir()?.join("outbox.jsonl"))
    }

    #[must_use]
    pub const fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    #[must_use]
    pub const fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.flush_interval_secs)
    }

    #[must_use]
    pub const fn display(&self) -> DisplayMetrics {
        DisplayMetrics::new(self.display_width, self.display_height)
    }
}
