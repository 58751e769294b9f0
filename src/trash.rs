//! Trash ledger: a bounded, append-at-head log of deleted tasks.
//!
//! Every task that leaves the active set through delete or timed
//! auto-delete lands here. The log keeps the newest entries up to the
//! configured capacity (default 50); periodic cleanup prunes entries
//! past the retention window (default 30 days) without user action.
//! Removal from the trash is permanent; upstream UI is expected to
//! confirm before calling [`remove_one`] or [`empty_all`].

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::Result;
use crate::storage::Storage;
use crate::task::{Category, Task};

/// A deleted task, as remembered by the trash log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrashItem {
    pub id: String,
    pub title: String,
    pub deleted_at: DateTime<Utc>,
    pub category: Category,
}

impl TrashItem {
    /// Build a trash entry for a task leaving the active set.
    pub fn from_task(task: &Task, deleted_at: DateTime<Utc>) -> Self {
        Self {
            id: task.id.clone(),
            title: task.title.clone(),
            deleted_at,
            category: task.category,
        }
    }
}

/// Prepend an item and truncate the log to the configured capacity.
/// The oldest entries beyond capacity are silently dropped.
pub fn add_to_trash(storage: &mut Storage, item: TrashItem, now: DateTime<Utc>) -> Result<()> {
    let capacity = storage.config().trash.capacity;
    let mut items = storage.load_trash();
    items.insert(0, item);
    items.truncate(capacity);
    storage.save_trash(&items, now)?;
    debug!(total = items.len(), "added item to trash");
    Ok(())
}

/// All trash entries, newest first.
pub fn list_trash(storage: &Storage) -> Vec<TrashItem> {
    storage.load_trash()
}

/// Permanently remove a single entry. Returns whether it existed.
pub fn remove_one(storage: &mut Storage, id: &str, now: DateTime<Utc>) -> Result<bool> {
    let mut items = storage.load_trash();
    let before = items.len();
    items.retain(|item| item.id != id);
    if items.len() == before {
        return Ok(false);
    }
    storage.save_trash(&items, now)?;
    Ok(true)
}

/// Clear the entire log.
pub fn empty_all(storage: &mut Storage) {
    storage.clear_trash();
    info!("trash emptied");
}

/// Remove entries older than the retention window. Returns how many
/// were pruned. Non-recoverable; run by periodic cleanup.
pub fn prune_expired(storage: &mut Storage, now: DateTime<Utc>) -> Result<usize> {
    let retention = Duration::days(storage.config().trash.retention_days);
    let cutoff = now - retention;

    let items = storage.load_trash();
    let before = items.len();
    let kept: Vec<TrashItem> = items
        .into_iter()
        .filter(|item| item.deleted_at > cutoff)
        .collect();
    let pruned = before - kept.len();

    if pruned > 0 {
        storage.save_trash(&kept, now)?;
        info!(pruned, "pruned expired trash items");
    }
    Ok(pruned)
}
