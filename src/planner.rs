//! Task list planner: the root orchestrator.
//!
//! Owns the in-memory task list and drives every lifecycle transition
//! against the storage gateway, the trash ledger, and the progress
//! tracker. Construction mirrors app startup: run the periodic cleanup
//! sweep, load the task list, check storage health.
//!
//! Completion is a timed soft-delete: the task is marked complete
//! immediately and a grace timer is scheduled; when the host's event
//! loop polls past the deadline the task moves to the trash and its
//! progress/draft entries are purged. Undo or re-toggle inside the
//! window cancels the timer. Pending timers are keyed by task id, so
//! several completions can be in flight independently.
//!
//! Manual deletion skips the grace window. Natural completion of every
//! breakdown step purges the task outright - it never reaches the
//! trash.
//!
//! A persistence switch supports the tutorial's demo tasks: while
//! disabled, task-list saves, trash writes, and storage purges are
//! suppressed, but signals still fire so the tutorial driver can
//! observe progress.

use std::collections::{HashMap, VecDeque};

use chrono::Duration;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::breakdown::{self, BreakdownService};
use crate::cleanup::{self, CleanupReport};
use crate::clock::Clock;
use crate::error::{Error, Result};
use crate::events::{Signal, SignalDestination, SignalKind, SignalSink};
use crate::progress::{self, TaskProgress};
use crate::storage::{Storage, StorageUsage};
use crate::task::{self, Category, Task};
use crate::timer::{TimerHandle, TimerQueue};
use crate::trash::{self, TrashItem};

pub struct TaskPlanner {
    storage: Storage,
    clock: Box<dyn Clock>,
    tasks: Vec<Task>,
    timers: TimerQueue<String>,
    pending: HashMap<String, TimerHandle>,
    signals: VecDeque<Signal>,
    sink: Option<SignalSink>,
    persist: bool,
}

impl TaskPlanner {
    /// Start the planner: periodic cleanup, then load the task list
    /// (which also health-checks storage).
    pub fn new(mut storage: Storage, clock: Box<dyn Clock>) -> Self {
        let now = clock.now();
        if let Err(err) = cleanup::periodic_cleanup(&mut storage, now) {
            error!(%err, "periodic cleanup failed during startup");
        }
        let tasks = storage.load_tasks(now);
        info!(count = tasks.len(), "planner started");
        Self {
            storage,
            clock,
            tasks,
            timers: TimerQueue::new(),
            pending: HashMap::new(),
            signals: VecDeque::new(),
            sink: None,
            persist: true,
        }
    }

    // =========================================================================
    // Views
    // =========================================================================

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn task(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|task| task.id == id)
    }

    /// Tasks in a category, due date ascending with undated tasks
    /// last; insertion order preserved among ties.
    pub fn tasks_for_category(&self, category: Category) -> Vec<Task> {
        let mut filtered: Vec<Task> = self
            .tasks
            .iter()
            .filter(|task| task.category == category)
            .cloned()
            .collect();
        task::sort_by_due_date(&mut filtered);
        filtered
    }

    /// Whether a completed task is waiting out its deletion grace
    /// window.
    pub fn pending_deletion(&self, id: &str) -> bool {
        self.pending.contains_key(id)
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    pub fn usage(&self) -> StorageUsage {
        self.storage.usage()
    }

    // =========================================================================
    // Task lifecycle
    // =========================================================================

    /// Append a new task.
    pub fn add_task(
        &mut self,
        title: impl Into<String>,
        due_date: Option<chrono::DateTime<chrono::Utc>>,
        category: Category,
    ) -> Result<Task> {
        let now = self.clock.now();
        let task = Task::new(title, due_date, category, now);
        let created = task.clone();
        self.tasks.push(task);
        self.emit(SignalKind::TaskCreated, Some(created.id.clone()));
        self.persist_tasks()?;
        Ok(created)
    }

    /// Append a batch of tasks (e.g. from a breakdown result promoted
    /// to standalone tasks). Ids carry random entropy beyond the
    /// timestamp, so same-millisecond bulk inserts cannot collide.
    pub fn add_generated_tasks(
        &mut self,
        titles: &[String],
        category: Category,
    ) -> Result<Vec<Task>> {
        let now = self.clock.now();
        let mut created = Vec::with_capacity(titles.len());
        for title in titles {
            let task = Task::new(title.clone(), None, category, now);
            self.emit(SignalKind::TaskCreated, Some(task.id.clone()));
            created.push(task.clone());
            self.tasks.push(task);
        }
        self.persist_tasks()?;
        Ok(created)
    }

    /// In-place edit of title and due date.
    pub fn edit_task(
        &mut self,
        id: &str,
        title: impl Into<String>,
        due_date: Option<chrono::DateTime<chrono::Utc>>,
    ) -> Result<()> {
        let task = self.require_task_mut(id)?;
        task.title = title.into();
        task.due_date = due_date;
        self.emit(SignalKind::TaskEdited, Some(id.to_string()));
        self.persist_tasks()
    }

    /// Flip a task's completed flag.
    ///
    /// Incomplete -> complete marks it immediately and schedules the
    /// timed soft-delete. Complete -> incomplete cancels any pending
    /// deletion for this task.
    pub fn toggle_complete(&mut self, id: &str) -> Result<()> {
        let now = self.clock.now();
        let grace = Duration::seconds(self.storage.config().tasks.completion_grace_secs);
        let task = self.require_task_mut(id)?;

        if !task.completed {
            task.completed = true;
            let handle = self.timers.schedule(now + grace, id.to_string());
            if let Some(stale) = self.pending.insert(id.to_string(), handle) {
                // A leftover timer for this id must never fire twice.
                self.timers.cancel(stale);
            }
            debug!(task_id = id, "completed, deletion timer scheduled");
            self.emit(SignalKind::TaskCompleted, Some(id.to_string()));
        } else {
            task.completed = false;
            if let Some(handle) = self.pending.remove(id) {
                self.timers.cancel(handle);
                debug!(task_id = id, "re-toggle cancelled pending deletion");
            }
            self.emit(SignalKind::TaskUncompleted, Some(id.to_string()));
        }
        self.persist_tasks()
    }

    /// Explicit undo of a completion inside the grace window. Returns
    /// whether an undo applied; the trash is untouched either way.
    pub fn undo_completion(&mut self, id: &str) -> Result<bool> {
        let handle = match self.pending.remove(id) {
            Some(handle) => handle,
            None => return Ok(false),
        };
        self.timers.cancel(handle);
        if let Some(task) = self.tasks.iter_mut().find(|task| task.id == id) {
            task.completed = false;
        }
        info!(task_id = id, "completion undone");
        self.emit(SignalKind::UndoApplied, Some(id.to_string()));
        self.persist_tasks()?;
        Ok(true)
    }

    /// Fire all elapsed deletion timers. Called by the host's event
    /// loop. Returns the ids that were moved to the trash.
    pub fn poll(&mut self) -> Result<Vec<String>> {
        let now = self.clock.now();
        let due = self.timers.due(now);
        if due.is_empty() {
            return Ok(Vec::new());
        }

        let mut trashed = Vec::new();
        let mut first_err = None;
        for id in due {
            self.pending.remove(&id);
            let idx = match self.tasks.iter().position(|task| task.id == id) {
                Some(idx) => idx,
                None => continue,
            };
            let task = self.tasks.remove(idx);
            if let Err(err) = self.trash_and_purge(&task) {
                error!(task_id = %task.id, %err, "failed to trash auto-deleted task");
                first_err.get_or_insert(err);
            }
            info!(task_id = %task.id, title = %task.title, "auto-deleted completed task");
            self.emit(SignalKind::TaskTrashed, Some(task.id.clone()));
            trashed.push(task.id);
        }

        if let Err(err) = self.persist_tasks() {
            first_err.get_or_insert(err);
        }
        match first_err {
            Some(err) => Err(err),
            None => Ok(trashed),
        }
    }

    /// Manual delete: immediate removal to trash, no grace window.
    pub fn delete_task(&mut self, id: &str) -> Result<()> {
        let idx = self
            .tasks
            .iter()
            .position(|task| task.id == id)
            .ok_or_else(|| Error::TaskNotFound(id.to_string()))?;
        let task = self.tasks.remove(idx);

        if let Some(handle) = self.pending.remove(id) {
            self.timers.cancel(handle);
        }

        self.trash_and_purge(&task)?;
        info!(task_id = id, title = %task.title, "deleted task");
        self.emit(SignalKind::TaskTrashed, Some(id.to_string()));
        self.persist_tasks()
    }

    fn trash_and_purge(&mut self, task: &Task) -> Result<()> {
        if !self.persist {
            return Ok(());
        }
        let now = self.clock.now();
        trash::add_to_trash(&mut self.storage, TrashItem::from_task(task, now), now)?;
        self.storage.remove_progress(&task.id);
        self.storage.remove_draft(&task.id);
        Ok(())
    }

    // =========================================================================
    // Breakdown and execution
    // =========================================================================

    /// Hand a task to the breakdown flow (read-only transition).
    pub fn open_breakdown(&self, id: &str) -> Result<Task> {
        self.task(id)
            .cloned()
            .ok_or_else(|| Error::TaskNotFound(id.to_string()))
    }

    /// Ask the external service to break a task into steps and attach
    /// the result. Failures surface to the caller; the core never
    /// retries on its own.
    pub fn request_breakdown(
        &mut self,
        service: &dyn BreakdownService,
        id: &str,
        description: &str,
    ) -> Result<Vec<String>> {
        let title = self
            .task(id)
            .map(|task| task.title.clone())
            .ok_or_else(|| Error::TaskNotFound(id.to_string()))?;

        let steps = service
            .breakdown(&title, description)
            .map_err(|failure| Error::ServiceFailure(failure.to_string()))?;
        if steps.is_empty() {
            return Err(Error::ServiceFailure(
                "service returned no steps".to_string(),
            ));
        }

        self.apply_breakdown_result(id, &steps)?;
        Ok(steps)
    }

    /// Attach generated steps to a task, start its progress record,
    /// and drop the now-redundant description draft.
    pub fn apply_breakdown_result(&mut self, id: &str, steps: &[String]) -> Result<()> {
        if steps.is_empty() {
            return Err(Error::NoSteps(id.to_string()));
        }
        let now = self.clock.now();
        let task = self.require_task_mut(id)?;
        task.is_breakdown = true;
        task.generated_tasks = steps.to_vec();

        progress::start(&mut self.storage, id, steps, now)?;
        breakdown::clear_draft(&mut self.storage, id);
        self.emit(SignalKind::BreakdownAttached, Some(id.to_string()));
        self.persist_tasks()
    }

    /// Begin or resume executing a task's steps. The saved progress
    /// record is authoritative; the task's own step list is the
    /// fallback for a breakdown whose progress was swept. A task with
    /// neither is an error, not a silent no-op.
    pub fn open_execution(&mut self, id: &str) -> Result<Vec<String>> {
        let now = self.clock.now();
        let task = self
            .task(id)
            .cloned()
            .ok_or_else(|| Error::TaskNotFound(id.to_string()))?;

        let steps = match progress::get(&self.storage, id) {
            Some(saved) if !saved.generated_tasks.is_empty() => saved.generated_tasks,
            _ => {
                if !task.is_breakdown || task.generated_tasks.is_empty() {
                    return Err(Error::NoSteps(id.to_string()));
                }
                progress::start(&mut self.storage, id, &task.generated_tasks, now)?;
                task.generated_tasks
            }
        };

        self.emit(SignalKind::ExecutionStarted, Some(id.to_string()));
        Ok(steps)
    }

    /// Toggle one step of a task's breakdown. When the toggle
    /// completes the final step, the task is purged outright: progress
    /// and draft removed, task dropped from the active list, nothing
    /// written to the trash.
    pub fn toggle_step(&mut self, id: &str, step_index: usize) -> Result<TaskProgress> {
        let now = self.clock.now();
        let updated = progress::toggle(&mut self.storage, id, step_index, now)?;
        self.emit(SignalKind::StepToggled, Some(id.to_string()));

        if progress::cleanup_if_completed(&mut self.storage, id) {
            if let Some(idx) = self.tasks.iter().position(|task| task.id == id) {
                let task = self.tasks.remove(idx);
                info!(task_id = id, title = %task.title, "all steps complete, task purged");
            }
            self.emit(SignalKind::TaskPurged, Some(id.to_string()));
            self.persist_tasks()?;
        }
        Ok(updated)
    }

    // Progress views, all defined by the stored record.

    pub fn progress_percentage(&self, id: &str) -> u8 {
        progress::progress_percentage(&self.storage, id)
    }

    pub fn is_in_progress(&self, id: &str) -> bool {
        progress::is_in_progress(&self.storage, id)
    }

    pub fn is_breakdown(&self, id: &str) -> bool {
        progress::is_breakdown(&self.storage, id)
    }

    pub fn is_fully_completed(&self, id: &str) -> bool {
        progress::is_fully_completed(&self.storage, id)
    }

    // Description drafts.

    pub fn load_draft(&self, id: &str) -> Option<String> {
        breakdown::load_draft(&self.storage, id)
    }

    pub fn save_draft(&mut self, id: &str, text: &str) -> Result<()> {
        if !self.persist {
            return Ok(());
        }
        let now = self.clock.now();
        breakdown::save_draft(&mut self.storage, id, text, now)
    }

    pub fn clear_draft(&mut self, id: &str) {
        breakdown::clear_draft(&mut self.storage, id);
    }

    // =========================================================================
    // Trash
    // =========================================================================

    pub fn list_trash(&self) -> Vec<TrashItem> {
        trash::list_trash(&self.storage)
    }

    /// Permanently remove one trash entry. Upstream UI confirms first.
    pub fn remove_trash_item(&mut self, id: &str) -> Result<bool> {
        let now = self.clock.now();
        trash::remove_one(&mut self.storage, id, now)
    }

    /// Permanently clear the trash. Upstream UI confirms first.
    pub fn empty_trash(&mut self) {
        trash::empty_all(&mut self.storage);
        self.emit(SignalKind::TrashEmptied, None);
    }

    // =========================================================================
    // Cleanup and tutorial
    // =========================================================================

    pub fn run_periodic_cleanup(&mut self) -> Result<CleanupReport> {
        let now = self.clock.now();
        let report = cleanup::periodic_cleanup(&mut self.storage, now)?;
        if report.ran {
            self.emit(SignalKind::CleanupRan, None);
        }
        Ok(report)
    }

    pub fn tutorial_completed(&self) -> bool {
        self.storage.tutorial_completed()
    }

    pub fn set_tutorial_completed(&mut self, completed: bool) -> Result<()> {
        let now = self.clock.now();
        self.storage.set_tutorial_completed(completed, now)
    }

    /// Toggle persistence suppression for tutorial demo tasks. While
    /// disabled, nothing is written to storage or the trash.
    pub fn set_persistence_enabled(&mut self, enabled: bool) {
        self.persist = enabled;
    }

    pub fn persistence_enabled(&self) -> bool {
        self.persist
    }

    // =========================================================================
    // Signals
    // =========================================================================

    /// Drain queued signals for an external observer (the tutorial
    /// driver polls this).
    pub fn drain_signals(&mut self) -> Vec<Signal> {
        self.signals.drain(..).collect()
    }

    /// Mirror signals to a JSONL sink as they are emitted.
    pub fn set_signal_sink(&mut self, sink: SignalSink) {
        self.sink = Some(sink);
    }

    /// Configure the sink from a host-supplied destination string:
    /// `-` for stdout, anything else as a file path, empty or absent
    /// to disable mirroring. Returns whether a sink was installed.
    pub fn set_signal_sink_from(&mut self, raw: Option<&str>) -> Result<bool> {
        match SignalDestination::parse(raw) {
            Some(destination) => {
                self.sink = Some(destination.open()?);
                Ok(true)
            }
            None => {
                self.sink = None;
                Ok(false)
            }
        }
    }

    fn emit(&mut self, kind: SignalKind, task_id: Option<String>) {
        let signal = Signal::new(kind, self.clock.now(), task_id);
        if let Some(sink) = &mut self.sink {
            if let Err(err) = sink.emit(&signal) {
                warn!(%err, "failed to mirror signal to sink");
            }
        }
        self.signals.push_back(signal);
    }

    fn require_task_mut(&mut self, id: &str) -> Result<&mut Task> {
        self.tasks
            .iter_mut()
            .find(|task| task.id == id)
            .ok_or_else(|| Error::TaskNotFound(id.to_string()))
    }

    /// Persist the active list; on final failure the in-memory list
    /// stays the source of truth and the error carries the
    /// user-visible "save failed even after cleanup" notice.
    fn persist_tasks(&mut self) -> Result<()> {
        if !self.persist {
            debug!("persistence suppressed, skipping task-list save");
            return Ok(());
        }
        let now = self.clock.now();
        match self.storage.save_tasks(&self.tasks, now) {
            Ok(()) => Ok(()),
            Err(err) => {
                error!(%err, "task-list save failed, in-memory state remains authoritative");
                Err(err)
            }
        }
    }
}

/// Planner state summary, handy for host status displays.
#[derive(Debug, Clone, Serialize)]
pub struct PlannerStats {
    pub active_tasks: usize,
    pub pending_deletions: usize,
    pub trash_items: usize,
    pub usage: StorageUsage,
}

impl TaskPlanner {
    pub fn stats(&self) -> PlannerStats {
        PlannerStats {
            active_tasks: self.tasks.len(),
            pending_deletions: self.pending.len(),
            trash_items: self.list_trash().len(),
            usage: self.usage(),
        }
    }
}
