//! Configuration loading and management
//!
//! Handles parsing of `tokkakari.toml` configuration files. Every knob
//! has a default matching the shipped behavior; a missing file is not
//! an error.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Storage quota and health settings
    #[serde(default)]
    pub storage: StorageConfig,

    /// Trash ledger settings
    #[serde(default)]
    pub trash: TrashConfig,

    /// Cleanup scheduler settings
    #[serde(default)]
    pub cleanup: CleanupConfig,

    /// Task lifecycle settings
    #[serde(default)]
    pub tasks: TasksConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage: StorageConfig::default(),
            trash: TrashConfig::default(),
            cleanup: CleanupConfig::default(),
            tasks: TasksConfig::default(),
        }
    }
}

/// Storage quota and health-check configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Assumed device quota in bytes (heuristic, not authoritative)
    #[serde(default = "default_quota_bytes")]
    pub quota_bytes: u64,

    /// Usage percentage above which emergency cleanup runs proactively
    #[serde(default = "default_health_threshold")]
    pub health_threshold_percent: u8,
}

fn default_quota_bytes() -> u64 {
    5 * 1024 * 1024
}

fn default_health_threshold() -> u8 {
    80
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            quota_bytes: default_quota_bytes(),
            health_threshold_percent: default_health_threshold(),
        }
    }
}

/// Trash ledger configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrashConfig {
    /// Maximum number of entries kept in the trash log
    #[serde(default = "default_trash_capacity")]
    pub capacity: usize,

    /// Entries older than this many days are pruned by periodic cleanup
    #[serde(default = "default_trash_retention_days")]
    pub retention_days: i64,
}

fn default_trash_capacity() -> usize {
    50
}

fn default_trash_retention_days() -> i64 {
    30
}

impl Default for TrashConfig {
    fn default() -> Self {
        Self {
            capacity: default_trash_capacity(),
            retention_days: default_trash_retention_days(),
        }
    }
}

/// Cleanup scheduler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanupConfig {
    /// Minimum hours between periodic cleanup sweeps
    #[serde(default = "default_cleanup_interval_hours")]
    pub interval_hours: i64,

    /// Progress records older than this many days are removed by
    /// emergency cleanup
    #[serde(default = "default_stale_progress_days")]
    pub stale_progress_days: i64,
}

fn default_cleanup_interval_hours() -> i64 {
    24
}

fn default_stale_progress_days() -> i64 {
    7
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            interval_hours: default_cleanup_interval_hours(),
            stale_progress_days: default_stale_progress_days(),
        }
    }
}

/// Task lifecycle configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TasksConfig {
    /// Grace window in seconds between completing a task and moving it
    /// to the trash; undo within this window keeps the task
    #[serde(default = "default_completion_grace_secs")]
    pub completion_grace_secs: i64,
}

fn default_completion_grace_secs() -> i64 {
    5
}

impl Default for TasksConfig {
    fn default() -> Self {
        Self {
            completion_grace_secs: default_completion_grace_secs(),
        }
    }
}

impl Config {
    /// Load configuration from a `tokkakari.toml` file
    pub fn load(path: &Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a directory, or return defaults
    pub fn load_from_dir(dir: &Path) -> Self {
        let config_path = dir.join("tokkakari.toml");
        if config_path.exists() {
            Self::load(&config_path).unwrap_or_default()
        } else {
            Self::default()
        }
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> crate::error::Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    fn validate(&self) -> crate::error::Result<()> {
        if self.storage.quota_bytes == 0 {
            return Err(crate::error::Error::InvalidConfig(
                "storage.quota_bytes must be > 0".to_string(),
            ));
        }
        if self.storage.health_threshold_percent == 0 || self.storage.health_threshold_percent > 100
        {
            return Err(crate::error::Error::InvalidConfig(
                "storage.health_threshold_percent must be in 1..=100".to_string(),
            ));
        }
        if self.trash.capacity == 0 {
            return Err(crate::error::Error::InvalidConfig(
                "trash.capacity must be > 0".to_string(),
            ));
        }
        if self.trash.retention_days <= 0 {
            return Err(crate::error::Error::InvalidConfig(
                "trash.retention_days must be > 0".to_string(),
            ));
        }
        if self.cleanup.interval_hours <= 0 {
            return Err(crate::error::Error::InvalidConfig(
                "cleanup.interval_hours must be > 0".to_string(),
            ));
        }
        if self.cleanup.stale_progress_days <= 0 {
            return Err(crate::error::Error::InvalidConfig(
                "cleanup.stale_progress_days must be > 0".to_string(),
            ));
        }
        if self.tasks.completion_grace_secs < 0 {
            return Err(crate::error::Error::InvalidConfig(
                "tasks.completion_grace_secs must be >= 0".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn defaults_are_expected() {
        let cfg = Config::default();
        assert_eq!(cfg.storage.quota_bytes, 5 * 1024 * 1024);
        assert_eq!(cfg.storage.health_threshold_percent, 80);
        assert_eq!(cfg.trash.capacity, 50);
        assert_eq!(cfg.trash.retention_days, 30);
        assert_eq!(cfg.cleanup.interval_hours, 24);
        assert_eq!(cfg.cleanup.stale_progress_days, 7);
        assert_eq!(cfg.tasks.completion_grace_secs, 5);
    }

    #[test]
    fn load_parses_overrides() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("tokkakari.toml");
        let content = r#"
[storage]
quota_bytes = 1048576
health_threshold_percent = 70

[trash]
capacity = 20
retention_days = 14

[cleanup]
interval_hours = 12
stale_progress_days = 3

[tasks]
completion_grace_secs = 10
"#;
        fs::write(&path, content.trim()).expect("write config");

        let cfg = Config::load(&path).expect("load config");
        assert_eq!(cfg.storage.quota_bytes, 1048576);
        assert_eq!(cfg.storage.health_threshold_percent, 70);
        assert_eq!(cfg.trash.capacity, 20);
        assert_eq!(cfg.trash.retention_days, 14);
        assert_eq!(cfg.cleanup.interval_hours, 12);
        assert_eq!(cfg.cleanup.stale_progress_days, 3);
        assert_eq!(cfg.tasks.completion_grace_secs, 10);
    }

    #[test]
    fn invalid_threshold_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("tokkakari.toml");
        fs::write(&path, "[storage]\nhealth_threshold_percent = 0\n").expect("write config");

        let err = Config::load(&path).expect_err("invalid config");
        match err {
            crate::error::Error::InvalidConfig(_) => {}
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn invalid_trash_capacity_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("tokkakari.toml");
        fs::write(&path, "[trash]\ncapacity = 0\n").expect("write config");

        let err = Config::load(&path).expect_err("invalid config");
        match err {
            crate::error::Error::InvalidConfig(_) => {}
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn load_from_dir_defaults_when_missing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cfg = Config::load_from_dir(dir.path());
        assert_eq!(cfg.trash.capacity, 50);
    }

    #[test]
    fn save_writes_toml() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("out.toml");
        let cfg = Config::default();
        cfg.save(&path).expect("save config");

        let written = fs::read_to_string(&path).expect("read config");
        assert!(written.contains("quota_bytes"));
    }
}
