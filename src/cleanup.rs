//! Periodic and emergency storage cleanup.
//!
//! Periodic cleanup runs at most once per configured interval
//! (timestamp-gated, persisted): it prunes expired trash and reclaims
//! progress/draft entries orphaned by tasks that no longer exist.
//! Emergency cleanup runs on quota failure or when usage crosses the
//! health threshold: it empties the trash, drops stale or unparseable
//! progress records, and drops every draft (drafts are disposable).
//!
//! Both sweeps snapshot the key set before deleting and are safe to
//! run with zero effect on an empty or already-clean store.

use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn};

use crate::error::Result;
use crate::progress::TaskProgress;
use crate::storage::{
    Storage, TASKS_KEY, TASK_BREAKDOWN_TEXT_PREFIX, TASK_PROGRESS_PREFIX,
};
use crate::task::Task;
use crate::trash;

/// What a cleanup sweep did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupReport {
    /// False when the periodic gate skipped the sweep.
    pub ran: bool,
    pub trash_pruned: usize,
    pub orphans_removed: usize,
    pub stale_progress_removed: usize,
    pub drafts_removed: usize,
}

/// Task ids currently present in the stored task list.
fn live_task_ids(storage: &Storage) -> HashSet<String> {
    let tasks: Vec<Task> = storage
        .get_raw(TASKS_KEY)
        .and_then(|raw| serde_json::from_str(&raw).ok())
        .unwrap_or_default();
    tasks.into_iter().map(|task| task.id).collect()
}

/// Run the periodic sweep if the configured interval has elapsed since
/// the last run. Prunes expired trash and removes progress/draft
/// entries whose owning task id is no longer in the task list.
pub fn periodic_cleanup(storage: &mut Storage, now: DateTime<Utc>) -> Result<CleanupReport> {
    let interval = Duration::hours(storage.config().cleanup.interval_hours);
    let last = storage.last_cleanup().unwrap_or(0);
    if now.timestamp_millis() - last <= interval.num_milliseconds() {
        return Ok(CleanupReport::default());
    }

    info!("running periodic cleanup");
    let mut report = CleanupReport {
        ran: true,
        ..CleanupReport::default()
    };

    report.trash_pruned = trash::prune_expired(storage, now)?;

    let live = live_task_ids(storage);

    // Snapshot first, delete after: scanning a live key set while
    // removing from it is unsafe.
    let mut orphaned = Vec::new();
    for key in storage.keys() {
        let owner = if let Some(id) = key.strip_prefix(TASK_PROGRESS_PREFIX) {
            id
        } else if let Some(id) = key.strip_prefix(TASK_BREAKDOWN_TEXT_PREFIX) {
            id
        } else {
            continue;
        };
        if !live.contains(owner) {
            orphaned.push(key);
        }
    }

    for key in &orphaned {
        storage.remove_raw(key);
    }
    report.orphans_removed = orphaned.len();

    storage.set_last_cleanup(now)?;
    info!(
        trash_pruned = report.trash_pruned,
        orphans_removed = report.orphans_removed,
        "periodic cleanup finished"
    );
    Ok(report)
}

/// Reclaim space aggressively. Invoked on quota failure and when the
/// health check crosses its threshold. Only removes entries, so it
/// cannot itself fail on quota.
pub fn emergency_cleanup(storage: &mut Storage, now: DateTime<Utc>) -> CleanupReport {
    warn!("running emergency cleanup");
    let mut report = CleanupReport {
        ran: true,
        ..CleanupReport::default()
    };

    let trashed = trash::list_trash(storage).len();
    trash::empty_all(storage);
    report.trash_pruned = trashed;

    let stale_cutoff =
        now.timestamp_millis() - Duration::days(storage.config().cleanup.stale_progress_days)
            .num_milliseconds();

    let mut to_remove = Vec::new();
    for key in storage.keys() {
        if key.strip_prefix(TASK_PROGRESS_PREFIX).is_some() {
            let stale = match storage
                .get_raw(&key)
                .and_then(|raw| serde_json::from_str::<TaskProgress>(&raw).ok())
            {
                Some(progress) => progress.timestamp < stale_cutoff,
                // Unparseable progress goes too.
                None => true,
            };
            if stale {
                to_remove.push(key);
                report.stale_progress_removed += 1;
            }
        } else if key.strip_prefix(TASK_BREAKDOWN_TEXT_PREFIX).is_some() {
            // Drafts are disposable: removed unconditionally.
            to_remove.push(key);
            report.drafts_removed += 1;
        }
    }

    for key in &to_remove {
        storage.remove_raw(key);
    }

    warn!(
        trash_emptied = report.trash_pruned,
        stale_progress = report.stale_progress_removed,
        drafts = report.drafts_removed,
        "emergency cleanup finished"
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::progress_key;
    use crate::task::Category;
    use crate::trash::TrashItem;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap()
    }

    fn seed_task(storage: &mut Storage, title: &str) -> String {
        let mut tasks = storage.load_tasks(now());
        let task = Task::new(title, None, Category::Immediate, now());
        let id = task.id.clone();
        tasks.push(task);
        storage.save_tasks(&tasks, now()).unwrap();
        id
    }

    #[test]
    fn periodic_reclaims_orphaned_entries() {
        let mut storage = Storage::in_memory();
        let live_id = seed_task(&mut storage, "alive");

        crate::progress::start(&mut storage, &live_id, &["a".to_string()], now()).unwrap();
        storage.save_draft(&live_id, "live draft", now()).unwrap();
        crate::progress::start(&mut storage, "ghost", &["x".to_string()], now()).unwrap();
        storage.save_draft("ghost", "ghost draft", now()).unwrap();

        let report = periodic_cleanup(&mut storage, now()).unwrap();
        assert!(report.ran);
        assert_eq!(report.orphans_removed, 2);

        assert!(storage.load_progress(&live_id).is_some());
        assert!(storage.load_draft(&live_id).is_some());
        assert!(storage.load_progress("ghost").is_none());
        assert!(storage.load_draft("ghost").is_none());
    }

    #[test]
    fn periodic_is_gated_to_once_per_interval() {
        let mut storage = Storage::in_memory();
        let first = periodic_cleanup(&mut storage, now()).unwrap();
        assert!(first.ran);

        let second = periodic_cleanup(&mut storage, now() + Duration::hours(1)).unwrap();
        assert!(!second.ran);

        let third = periodic_cleanup(&mut storage, now() + Duration::hours(25)).unwrap();
        assert!(third.ran);
    }

    #[test]
    fn periodic_prunes_expired_trash() {
        let mut storage = Storage::in_memory();
        let old = TrashItem {
            id: "old".to_string(),
            title: "old".to_string(),
            deleted_at: now() - Duration::days(40),
            category: Category::Later,
        };
        trash::add_to_trash(&mut storage, old, now()).unwrap();

        let report = periodic_cleanup(&mut storage, now()).unwrap();
        assert_eq!(report.trash_pruned, 1);
        assert!(trash::list_trash(&storage).is_empty());
    }

    #[test]
    fn emergency_empties_trash_and_drafts_unconditionally() {
        let mut storage = Storage::in_memory();
        let id = seed_task(&mut storage, "alive");
        let fresh = TrashItem {
            id: "fresh".to_string(),
            title: "fresh".to_string(),
            deleted_at: now(),
            category: Category::Immediate,
        };
        trash::add_to_trash(&mut storage, fresh, now()).unwrap();
        storage.save_draft(&id, "a fresh draft", now()).unwrap();

        let report = emergency_cleanup(&mut storage, now());
        assert_eq!(report.trash_pruned, 1);
        assert_eq!(report.drafts_removed, 1);
        assert!(trash::list_trash(&storage).is_empty());
        assert!(storage.load_draft(&id).is_none());
    }

    #[test]
    fn emergency_keeps_recent_progress_drops_stale_and_corrupt() {
        let mut storage = Storage::in_memory();
        let recent_id = seed_task(&mut storage, "recent");
        crate::progress::start(&mut storage, &recent_id, &["a".to_string()], now()).unwrap();

        // Stale: touched over a week ago.
        crate::progress::start(&mut storage, "stale", &["x".to_string()], now() - Duration::days(8))
            .unwrap();
        // Corrupt: not parseable at all.
        storage
            .set_with_recovery(&progress_key("broken"), "{{{", now())
            .unwrap();

        let report = emergency_cleanup(&mut storage, now());
        assert_eq!(report.stale_progress_removed, 2);
        assert!(storage.load_progress(&recent_id).is_some());
        assert!(storage.load_progress("stale").is_none());
        assert!(storage.get_raw(&progress_key("broken")).is_none());
    }

    #[test]
    fn both_sweeps_are_idempotent_on_empty_storage() {
        let mut storage = Storage::in_memory();
        let report = emergency_cleanup(&mut storage, now());
        assert_eq!(report.trash_pruned, 0);
        assert_eq!(report.drafts_removed, 0);

        let report = periodic_cleanup(&mut storage, now()).unwrap();
        assert!(report.ran);
        assert_eq!(report.orphans_removed, 0);

        // Running emergency twice changes nothing further.
        let again = emergency_cleanup(&mut storage, now());
        assert_eq!(again.stale_progress_removed, 0);
    }
}
