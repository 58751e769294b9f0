//! Breakdown service boundary and draft persistence.
//!
//! Turning "task title + free-text description" into ordered step
//! strings is an external AI concern; the core only consumes the
//! result. Step strings are opaque here - any embedded display
//! convention (such as "purpose\nhint") belongs to the UI layer.
//!
//! While the user is still writing the description, the text is kept
//! as a per-task draft so an interrupted session can resume. Drafts
//! are disposable: emergency cleanup drops them all.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::error::Result;
use crate::storage::Storage;

/// Why a breakdown request failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakdownErrorKind {
    /// The service reported an error.
    Service,
    /// The call timed out.
    Timeout,
    /// The service answered with no usable steps.
    Empty,
}

/// Failure from the breakdown service. Surfaced to the user; the core
/// never retries automatically.
#[derive(Debug, Clone, Error)]
#[error("{kind:?}: {message}")]
pub struct BreakdownFailure {
    pub kind: BreakdownErrorKind,
    pub message: String,
}

impl BreakdownFailure {
    pub fn new(kind: BreakdownErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// External service that expands a task into ordered substeps.
pub trait BreakdownService {
    fn breakdown(
        &self,
        task_title: &str,
        description: &str,
    ) -> std::result::Result<Vec<String>, BreakdownFailure>;
}

/// Load the saved description draft for a task.
pub fn load_draft(storage: &Storage, task_id: &str) -> Option<String> {
    storage.load_draft(task_id)
}

/// Persist the in-progress description draft for a task.
pub fn save_draft(
    storage: &mut Storage,
    task_id: &str,
    text: &str,
    now: DateTime<Utc>,
) -> Result<()> {
    storage.save_draft(task_id, text, now)
}

/// Drop a task's draft (after a successful breakdown, or on purge).
pub fn clear_draft(storage: &mut Storage, task_id: &str) {
    storage.remove_draft(task_id);
}
