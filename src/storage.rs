//! Storage gateway.
//!
//! Owns the persisted key namespace and all serialization. Every other
//! component reads and writes through here.
//!
//! # Key layout
//!
//! ```text
//! tokkakari-tasks                 # active task list (JSON array)
//! task-progress-<task-id>         # per-task step progress (JSON)
//! task-breakdown-text-<task-id>   # per-task free-text draft (raw)
//! tokkakari-trash                 # trash log, newest first (JSON array)
//! tokkakari-tutorial-completed    # "true" / "false"
//! tokkakari-last-cleanup          # epoch milliseconds
//! ```
//!
//! Unparseable stored values are treated as absent on read and logged;
//! cleanup sweeps remove them for good. Writes that hit the quota go
//! through one emergency-cleanup-and-retry cycle before the failure is
//! surfaced.

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, warn};

use crate::cleanup;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::kv::{KeyValueStore, MemoryStore};
use crate::progress::TaskProgress;
use crate::task::Task;
use crate::trash::TrashItem;

/// Key holding the active task list
pub const TASKS_KEY: &str = "tokkakari-tasks";
/// Key holding the trash log
pub const TRASH_KEY: &str = "tokkakari-trash";
/// Key holding the tutorial-completed flag
pub const TUTORIAL_COMPLETED_KEY: &str = "tokkakari-tutorial-completed";
/// Key holding the last periodic-cleanup timestamp (epoch ms)
pub const LAST_CLEANUP_KEY: &str = "tokkakari-last-cleanup";
/// Prefix for per-task progress records
pub const TASK_PROGRESS_PREFIX: &str = "task-progress-";
/// Prefix for per-task breakdown drafts
pub const TASK_BREAKDOWN_TEXT_PREFIX: &str = "task-breakdown-text-";

/// Storage key for a task's progress record
pub fn progress_key(task_id: &str) -> String {
    format!("{TASK_PROGRESS_PREFIX}{task_id}")
}

/// Storage key for a task's breakdown draft
pub fn draft_key(task_id: &str) -> String {
    format!("{TASK_BREAKDOWN_TEXT_PREFIX}{task_id}")
}

/// Heuristic storage usage against the assumed device quota.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StorageUsage {
    pub used: u64,
    pub total: u64,
    pub percentage: u8,
}

/// Gateway over the injected key-value store.
pub struct Storage {
    store: Box<dyn KeyValueStore>,
    config: Config,
}

impl Storage {
    pub fn new(store: Box<dyn KeyValueStore>, config: Config) -> Self {
        Self { store, config }
    }

    /// In-memory storage with default configuration.
    pub fn in_memory() -> Self {
        Self::new(Box::new(MemoryStore::new()), Config::default())
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    // =========================================================================
    // Raw access (used by the cleanup scheduler's key scans)
    // =========================================================================

    /// Snapshot of all stored keys.
    pub fn keys(&self) -> Vec<String> {
        self.store.keys()
    }

    pub fn get_raw(&self, key: &str) -> Option<String> {
        self.store.get(key)
    }

    pub fn remove_raw(&mut self, key: &str) {
        self.store.remove(key);
    }

    // =========================================================================
    // Serialization boundary
    // =========================================================================

    /// Read and deserialize a stored value. Corrupt values are treated
    /// as absent.
    fn read_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = self.store.get(key)?;
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(err) => {
                warn!(key, %err, "unparseable stored value, treating as absent");
                None
            }
        }
    }

    fn write_json<T: Serialize>(&mut self, key: &str, value: &T, now: DateTime<Utc>) -> Result<()> {
        let json = serde_json::to_string(value)?;
        self.set_with_recovery(key, &json, now)
    }

    /// Write a value; on quota failure run emergency cleanup and retry
    /// exactly once. A second failure surfaces as
    /// [`Error::QuotaExhausted`] and is not retried further.
    pub fn set_with_recovery(&mut self, key: &str, value: &str, now: DateTime<Utc>) -> Result<()> {
        match self.store.set(key, value) {
            Ok(()) => Ok(()),
            Err(Error::QuotaExceeded) => {
                warn!(key, "storage quota exceeded, running emergency cleanup");
                cleanup::emergency_cleanup(self, now);
                match self.store.set(key, value) {
                    Ok(()) => {
                        debug!(key, "save succeeded after emergency cleanup");
                        Ok(())
                    }
                    Err(Error::QuotaExceeded) => Err(Error::QuotaExhausted),
                    Err(err) => Err(err),
                }
            }
            Err(err) => Err(err),
        }
    }

    // =========================================================================
    // Usage and health
    // =========================================================================

    /// Byte-length sum of all stored key+value pairs against the
    /// configured quota. A heuristic percentage, not authoritative.
    pub fn usage(&self) -> StorageUsage {
        let used = self.store.byte_len();
        let total = self.config.storage.quota_bytes;
        let percentage = if total == 0 {
            0
        } else {
            ((used * 100) / total).min(100) as u8
        };
        StorageUsage {
            used,
            total,
            percentage,
        }
    }

    /// Preventive health check, run on every task-list load and save.
    /// Above the configured threshold, emergency cleanup runs
    /// proactively; returns false when that happened.
    pub fn check_health(&mut self, now: DateTime<Utc>) -> bool {
        let usage = self.usage();
        debug!(
            percentage = usage.percentage,
            used = usage.used,
            "storage usage"
        );
        if usage.percentage > self.config.storage.health_threshold_percent {
            warn!(
                percentage = usage.percentage,
                threshold = self.config.storage.health_threshold_percent,
                "storage usage above threshold, running emergency cleanup"
            );
            cleanup::emergency_cleanup(self, now);
            return false;
        }
        true
    }

    // =========================================================================
    // Task list
    // =========================================================================

    /// Load the active task list. Absent or corrupt data yields an
    /// empty list. Runs the storage health check.
    pub fn load_tasks(&mut self, now: DateTime<Utc>) -> Vec<Task> {
        let tasks: Vec<Task> = self.read_json(TASKS_KEY).unwrap_or_default();
        debug!(count = tasks.len(), "loaded task list");
        self.check_health(now);
        tasks
    }

    /// Persist the active task list. Runs the storage health check.
    pub fn save_tasks(&mut self, tasks: &[Task], now: DateTime<Utc>) -> Result<()> {
        self.write_json(TASKS_KEY, &tasks, now)?;
        debug!(count = tasks.len(), "saved task list");
        self.check_health(now);
        Ok(())
    }

    // =========================================================================
    // Progress records
    // =========================================================================

    pub fn load_progress(&self, task_id: &str) -> Option<TaskProgress> {
        self.read_json(&progress_key(task_id))
    }

    pub fn save_progress(
        &mut self,
        task_id: &str,
        progress: &TaskProgress,
        now: DateTime<Utc>,
    ) -> Result<()> {
        self.write_json(&progress_key(task_id), progress, now)
    }

    pub fn remove_progress(&mut self, task_id: &str) {
        self.store.remove(&progress_key(task_id));
    }

    // =========================================================================
    // Breakdown drafts (raw text, not JSON)
    // =========================================================================

    pub fn load_draft(&self, task_id: &str) -> Option<String> {
        self.store.get(&draft_key(task_id))
    }

    pub fn save_draft(&mut self, task_id: &str, text: &str, now: DateTime<Utc>) -> Result<()> {
        self.set_with_recovery(&draft_key(task_id), text, now)
    }

    pub fn remove_draft(&mut self, task_id: &str) {
        self.store.remove(&draft_key(task_id));
    }

    // =========================================================================
    // Trash log
    // =========================================================================

    pub fn load_trash(&self) -> Vec<TrashItem> {
        self.read_json(TRASH_KEY).unwrap_or_default()
    }

    /// Overwrite the whole trash log. A failed write leaves the prior
    /// log intact; there is nothing to roll back.
    pub fn save_trash(&mut self, items: &[TrashItem], now: DateTime<Utc>) -> Result<()> {
        self.write_json(TRASH_KEY, &items, now)
    }

    pub fn clear_trash(&mut self) {
        self.store.remove(TRASH_KEY);
    }

    // =========================================================================
    // Flags and timestamps
    // =========================================================================

    pub fn tutorial_completed(&self) -> bool {
        self.store
            .get(TUTORIAL_COMPLETED_KEY)
            .map(|value| value == "true")
            .unwrap_or(false)
    }

    pub fn set_tutorial_completed(&mut self, completed: bool, now: DateTime<Utc>) -> Result<()> {
        let value = if completed { "true" } else { "false" };
        self.set_with_recovery(TUTORIAL_COMPLETED_KEY, value, now)
    }

    /// Timestamp of the last periodic cleanup (epoch ms), if any.
    pub fn last_cleanup(&self) -> Option<i64> {
        let raw = self.store.get(LAST_CLEANUP_KEY)?;
        raw.trim().parse().ok()
    }

    pub fn set_last_cleanup(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.set_with_recovery(LAST_CLEANUP_KEY, &now.timestamp_millis().to_string(), now)
    }

    // =========================================================================
    // Backup
    // =========================================================================

    /// Snapshot tasks, tutorial flag, and trash as a single JSON blob.
    pub fn create_backup(&self, now: DateTime<Utc>) -> Result<String> {
        let backup = Backup {
            timestamp: now.timestamp_millis(),
            tasks: self.store.get(TASKS_KEY),
            tutorial_completed: self.store.get(TUTORIAL_COMPLETED_KEY),
            trash: self.store.get(TRASH_KEY),
        };
        Ok(serde_json::to_string(&backup)?)
    }

    /// Restore a backup produced by [`Storage::create_backup`]. Absent
    /// fields leave the current values in place.
    pub fn restore_backup(&mut self, data: &str, now: DateTime<Utc>) -> Result<()> {
        let backup: Backup = serde_json::from_str(data)?;
        if let Some(tasks) = backup.tasks {
            self.set_with_recovery(TASKS_KEY, &tasks, now)?;
        }
        if let Some(flag) = backup.tutorial_completed {
            self.set_with_recovery(TUTORIAL_COMPLETED_KEY, &flag, now)?;
        }
        if let Some(trash) = backup.trash {
            self.set_with_recovery(TRASH_KEY, &trash, now)?;
        }
        debug!("restored storage from backup");
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Backup {
    timestamp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    tasks: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tutorial_completed: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    trash: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{Category, Task};
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap()
    }

    #[test]
    fn task_list_round_trips() {
        let mut storage = Storage::in_memory();
        assert!(storage.load_tasks(now()).is_empty());

        let tasks = vec![
            Task::new("write report", None, Category::Immediate, now()),
            Task::new("buy milk", None, Category::Later, now()),
        ];
        storage.save_tasks(&tasks, now()).unwrap();

        let loaded = storage.load_tasks(now());
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].title, "write report");
        assert_eq!(loaded[1].category, Category::Later);
    }

    #[test]
    fn corrupt_task_list_reads_as_empty() {
        let mut storage = Storage::in_memory();
        storage
            .set_with_recovery(TASKS_KEY, "not json at all", now())
            .unwrap();
        assert!(storage.load_tasks(now()).is_empty());
    }

    #[test]
    fn draft_round_trips_raw() {
        let mut storage = Storage::in_memory();
        assert!(storage.load_draft("t1").is_none());

        storage.save_draft("t1", "call the venue\nthen email", now()).unwrap();
        assert_eq!(
            storage.load_draft("t1").as_deref(),
            Some("call the venue\nthen email")
        );

        storage.remove_draft("t1");
        assert!(storage.load_draft("t1").is_none());
    }

    #[test]
    fn tutorial_flag_round_trips() {
        let mut storage = Storage::in_memory();
        assert!(!storage.tutorial_completed());
        storage.set_tutorial_completed(true, now()).unwrap();
        assert!(storage.tutorial_completed());
    }

    #[test]
    fn last_cleanup_round_trips() {
        let mut storage = Storage::in_memory();
        assert!(storage.last_cleanup().is_none());
        storage.set_last_cleanup(now()).unwrap();
        assert_eq!(storage.last_cleanup(), Some(now().timestamp_millis()));
    }

    #[test]
    fn usage_reports_percentage_of_quota() {
        let mut config = Config::default();
        config.storage.quota_bytes = 1000;
        let mut storage = Storage::new(Box::new(MemoryStore::new()), config);

        storage
            .set_with_recovery("k", &"v".repeat(499), now())
            .unwrap();
        let usage = storage.usage();
        assert_eq!(usage.used, 500);
        assert_eq!(usage.total, 1000);
        assert_eq!(usage.percentage, 50);
    }

    #[test]
    fn quota_failure_recovers_by_evicting_disposable_data() {
        let mut config = Config::default();
        config.storage.quota_bytes = 400;
        let mut storage = Storage::new(Box::new(MemoryStore::with_quota(400)), config);

        // Fill most of the store with a disposable draft.
        storage.save_draft("old-task", &"x".repeat(300), now()).unwrap();

        // This write cannot fit until emergency cleanup drops the draft.
        let value = "y".repeat(200);
        storage.set_with_recovery("k", &value, now()).unwrap();
        assert_eq!(storage.get_raw("k").as_deref(), Some(value.as_str()));
        assert!(storage.load_draft("old-task").is_none());
    }

    #[test]
    fn quota_failure_after_cleanup_surfaces() {
        let mut config = Config::default();
        config.storage.quota_bytes = 50;
        let mut storage = Storage::new(Box::new(MemoryStore::with_quota(50)), config);

        let err = storage
            .set_with_recovery("k", &"v".repeat(100), now())
            .unwrap_err();
        assert!(matches!(err, Error::QuotaExhausted));
    }

    #[test]
    fn backup_round_trips() {
        let mut storage = Storage::in_memory();
        let tasks = vec![Task::new("keep me", None, Category::Immediate, now())];
        storage.save_tasks(&tasks, now()).unwrap();
        storage.set_tutorial_completed(true, now()).unwrap();

        let backup = storage.create_backup(now()).unwrap();

        let mut restored = Storage::in_memory();
        restored.restore_backup(&backup, now()).unwrap();
        assert_eq!(restored.load_tasks(now())[0].title, "keep me");
        assert!(restored.tutorial_completed());
    }
}
