use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use dirs::config_dir;
use serde::{Deserialize, Serialize};

use crate::error::Error;

const APP_NAME: &str = "workline";
const CONFIG_FILE: &str = "config.json";
const CONFIG_ENV: &str = "WORKLINE_CONFIG";

/// Thresholds and periods used by the notification engine and scanner.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NotificationSettings {
    /// Days before an end date when a Medium deadline notice starts.
    pub deadline_warning_days: i64,
    /// Days remaining at or below which a deadline notice is High.
    pub deadline_critical_days: i64,
    /// Progress percentages that raise a milestone notice when crossed.
    pub milestones: Vec<u8>,
    /// Progress must reach this share of the elapsed schedule to count as on track.
    pub progress_delay_ratio: f64,
    /// Progress below which a process close to its end date is flagged.
    pub low_progress_percent: f64,
    pub scan_interval_secs: u64,
    /// Read notices older than this are purged.
    pub retention_days: i64,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            deadline_warning_days: 7,
            deadline_critical_days: 3,
            milestones: vec![25, 50, 75, 100],
            progress_delay_ratio: 0.5,
            low_progress_percent: 50.0,
            scan_interval_secs: 1800,
            retention_days: 30,
        }
    }
}

impl NotificationSettings {
    pub fn validate(&self) -> crate::Result<()> {
        if self.deadline_critical_days < 0 || self.deadline_warning_days < 0 {
            return Err(Error::validation("Deadline windows must not be negative"));
        }
        if self.deadline_critical_days > self.deadline_warning_days {
            return Err(Error::validation(format!(
                "deadline_critical_days ({}) exceeds deadline_warning_days ({})",
                self.deadline_critical_days, self.deadline_warning_days
            )));
        }
        if let Some(bad) = self.milestones.iter().find(|m| !(1..=100).contains(*m)) {
            return Err(Error::validation(format!(
                "Milestone {bad} is outside 1..=100"
            )));
        }
        if !(self.progress_delay_ratio > 0.0 && self.progress_delay_ratio <= 1.0) {
            return Err(Error::validation(format!(
                "progress_delay_ratio must be in (0, 1], got {}",
                self.progress_delay_ratio
            )));
        }
        if !(0.0..=100.0).contains(&self.low_progress_percent) {
            return Err(Error::validation(format!(
                "low_progress_percent must be between 0 and 100, got {}",
                self.low_progress_percent
            )));
        }
        if self.scan_interval_secs == 0 {
            return Err(Error::validation("scan_interval_secs must be positive"));
        }
        if self.retention_days < 0 {
            return Err(Error::validation("retention_days must not be negative"));
        }
        Ok(())
    }

    /// Milestones sorted ascending without duplicates.
    pub fn sorted_milestones(&self) -> Vec<u8> {
        let mut milestones = self.milestones.clone();
        milestones.sort_unstable();
        milestones.dedup();
        milestones
    }

    pub fn scan_interval(&self) -> Duration {
        Duration::from_secs(self.scan_interval_secs)
    }

    pub fn retention(&self) -> chrono::Duration {
        chrono::Duration::days(self.retention_days)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TrackerConfig {
    /// Database file. Defaults to the platform data directory.
    pub database_path: Option<PathBuf>,
    pub notifications: NotificationSettings,
}

impl TrackerConfig {
    /// Load configuration from the user's config directory.
    /// Returns default config if the file doesn't exist or fails to parse.
    pub fn load() -> Self {
        match Self::try_load() {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to load config, using defaults");
                Self::default()
            }
        }
    }

    pub fn try_load() -> Result<Self> {
        let config_path = config_path()?;
        if !config_path.exists() {
            return Ok(Self::default());
        }
        Self::load_from(&config_path)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let config: Self =
            serde_json::from_str(&content).context("Failed to parse config file")?;
        config
            .notifications
            .validate()
            .context("Invalid notification settings")?;

        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let content = serde_json::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(path, content).context("Failed to write config file")?;

        Ok(())
    }
}

/// `$WORKLINE_CONFIG` if set, else `<config dir>/workline/config.json`.
pub fn config_path() -> Result<PathBuf> {
    if let Some(path) = std::env::var_os(CONFIG_ENV) {
        return Ok(PathBuf::from(path));
    }
    let mut path =
        config_dir().ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
    path.push(APP_NAME);
    path.push(CONFIG_FILE);
    Ok(path)
}
