//! Per-task step-execution progress.
//!
//! A progress record exists exactly for tasks that have been broken
//! down. Only the current step (the first incomplete one) can be
//! toggled complete; any completed step can be toggled back, which
//! recomputes the pointer. When every step is complete the record is
//! purged together with the task's draft; the owning task is then
//! removed from the active list without passing through the trash.
//!
//! State machine per task: NotStarted -> InProgress -> AllComplete ->
//! purged. InProgress is re-entrant via un-toggles; an all-false record
//! is just a degenerate InProgress, not a distinct persisted state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::storage::Storage;

/// Persisted progress for one task's breakdown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskProgress {
    /// Completion bitmap, one entry per step.
    pub completed: Vec<bool>,
    /// Index of the first incomplete step, or `completed.len()` when
    /// all steps are done.
    pub current_index: usize,
    /// Last-touched time, epoch milliseconds.
    pub timestamp: i64,
    /// The authoritative ordered step list.
    pub generated_tasks: Vec<String>,
}

impl TaskProgress {
    fn new(steps: Vec<String>, now: DateTime<Utc>) -> Self {
        Self {
            completed: vec![false; steps.len()],
            current_index: 0,
            timestamp: now.timestamp_millis(),
            generated_tasks: steps,
        }
    }

    pub fn completed_count(&self) -> usize {
        self.completed.iter().filter(|done| **done).count()
    }

    pub fn total_steps(&self) -> usize {
        self.generated_tasks.len()
    }

    fn first_incomplete(&self) -> usize {
        self.completed
            .iter()
            .position(|done| !done)
            .unwrap_or(self.completed.len())
    }

    fn valid(&self) -> bool {
        self.completed.len() == self.generated_tasks.len()
    }
}

/// Load a task's progress record, discarding records whose bitmap and
/// step list have drifted apart (corrupt by definition).
pub fn get(storage: &Storage, task_id: &str) -> Option<TaskProgress> {
    let progress = storage.load_progress(task_id)?;
    if !progress.valid() {
        warn!(
            task_id,
            bitmap = progress.completed.len(),
            steps = progress.generated_tasks.len(),
            "progress record shape mismatch, treating as absent"
        );
        return None;
    }
    Some(progress)
}

/// Create initial progress for a breakdown (all steps incomplete,
/// pointer at 0). Idempotent: existing progress with a non-empty step
/// list wins, so an interrupted breakdown resumes where it left off.
pub fn start(
    storage: &mut Storage,
    task_id: &str,
    steps: &[String],
    now: DateTime<Utc>,
) -> Result<TaskProgress> {
    if let Some(existing) = get(storage, task_id) {
        if !existing.generated_tasks.is_empty() {
            debug!(task_id, "resuming existing progress");
            return Ok(existing);
        }
    }
    if steps.is_empty() {
        return Err(Error::NoSteps(task_id.to_string()));
    }

    let progress = TaskProgress::new(steps.to_vec(), now);
    storage.save_progress(task_id, &progress, now)?;
    debug!(task_id, steps = steps.len(), "started progress");
    Ok(progress)
}

/// Toggle a step and persist the updated record.
///
/// Marking complete is only valid for the current step; completed and
/// future steps are reached via toggle-off only. Un-marking is always
/// permitted and recomputes the pointer.
pub fn toggle(
    storage: &mut Storage,
    task_id: &str,
    step_index: usize,
    now: DateTime<Utc>,
) -> Result<TaskProgress> {
    let mut progress = get(storage, task_id).ok_or_else(|| Error::NoProgress(task_id.to_string()))?;

    if step_index >= progress.completed.len() {
        return Err(Error::StepOutOfRange {
            index: step_index,
            len: progress.completed.len(),
        });
    }

    if progress.completed[step_index] {
        // Un-mark: always permitted.
        progress.completed[step_index] = false;
        progress.current_index = progress.first_incomplete();
    } else {
        if step_index != progress.current_index {
            return Err(Error::StepNotCurrent {
                index: step_index,
                current: progress.current_index,
            });
        }
        progress.completed[step_index] = true;
        progress.current_index = progress
            .completed
            .iter()
            .skip(step_index + 1)
            .position(|done| !done)
            .map(|offset| step_index + 1 + offset)
            .unwrap_or(progress.completed.len());
    }

    progress.timestamp = now.timestamp_millis();
    storage.save_progress(task_id, &progress, now)?;
    debug!(
        task_id,
        step_index,
        current = progress.current_index,
        "toggled step"
    );
    Ok(progress)
}

/// Completion as a rounded 0..=100 percentage; 0 without a record.
pub fn progress_percentage(storage: &Storage, task_id: &str) -> u8 {
    match get(storage, task_id) {
        Some(progress) if progress.total_steps() > 0 => {
            let ratio = progress.completed_count() as f64 / progress.total_steps() as f64;
            (ratio * 100.0).round() as u8
        }
        _ => 0,
    }
}

/// Some but not all steps are complete.
pub fn is_in_progress(storage: &Storage, task_id: &str) -> bool {
    match get(storage, task_id) {
        Some(progress) => {
            let done = progress.completed_count();
            done > 0 && done < progress.total_steps()
        }
        None => false,
    }
}

/// A progress record exists at all.
pub fn is_breakdown(storage: &Storage, task_id: &str) -> bool {
    get(storage, task_id).is_some()
}

/// Every step is complete (and there is at least one step).
pub fn is_fully_completed(storage: &Storage, task_id: &str) -> bool {
    match get(storage, task_id) {
        Some(progress) => {
            progress.total_steps() > 0 && progress.completed_count() == progress.total_steps()
        }
        None => false,
    }
}

/// If the task's breakdown is fully completed, purge its progress and
/// draft entries. Returns whether a purge happened; the caller removes
/// the task record itself.
pub fn cleanup_if_completed(storage: &mut Storage, task_id: &str) -> bool {
    if !is_fully_completed(storage, task_id) {
        return false;
    }
    storage.remove_progress(task_id);
    storage.remove_draft(task_id);
    info!(task_id, "breakdown complete, purged progress and draft");
    true
}
