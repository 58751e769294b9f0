//! Task records and ordering.
//!
//! A task is owned by the planner's active list from creation until it
//! is deleted (ownership moves to the trash ledger) or purged outright
//! when every breakdown step is completed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// The two fixed task categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Immediate,
    Later,
}

impl Category {
    /// Display accent for a category. Pure function of the variant;
    /// nothing beyond `category` itself is persisted.
    pub fn accent(&self) -> &'static str {
        match self {
            Category::Immediate => "orange",
            Category::Later => "blue",
        }
    }
}

/// A task in the active list.
///
/// `is_breakdown` is true exactly when a progress record exists for
/// this id. `generated_tasks` mirrors the progress record's step list
/// at the time of breakdown and may go stale; the progress record is
/// authoritative for execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub title: String,
    pub completed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<DateTime<Utc>>,
    pub category: Category,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_breakdown: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub generated_tasks: Vec<String>,
}

impl Task {
    /// Build a new incomplete task with a fresh id.
    pub fn new(
        title: impl Into<String>,
        due_date: Option<DateTime<Utc>>,
        category: Category,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: new_task_id(),
            title: title.into(),
            completed: false,
            due_date,
            category,
            created_at,
            is_breakdown: false,
            generated_tasks: Vec::new(),
        }
    }
}

/// Generate a task id: time-ordered with random entropy, so bulk
/// inserts within the same millisecond cannot collide.
pub fn new_task_id() -> String {
    Ulid::new().to_string()
}

/// Sort tasks by due date ascending, undated tasks last. The sort is
/// stable, so insertion order is preserved among equal and undated
/// keys.
pub fn sort_by_due_date(tasks: &mut [Task]) {
    tasks.sort_by(|left, right| match (left.due_date, right.due_date) {
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => std::cmp::Ordering::Equal,
    });
}
