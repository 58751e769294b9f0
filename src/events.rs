//! Signals for external observers.
//!
//! The planner emits a signal for every state change an outside party
//! might care about - chiefly the interactive tutorial, which advances
//! by observing "a task was just completed", "breakdown attached",
//! "execution started", and so on. The core never depends on observer
//! state for correctness.
//!
//! Signals are queued on the planner for polling and can optionally be
//! mirrored as JSON lines to stdout or a file.

use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::{Error, Result};

pub const SIGNAL_SCHEMA_VERSION: &str = "tokkakari.signal.v1";

/// High-level signal kinds emitted by the planner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    TaskCreated,
    TaskEdited,
    TaskCompleted,
    TaskUncompleted,
    TaskTrashed,
    TaskPurged,
    UndoApplied,
    BreakdownAttached,
    ExecutionStarted,
    StepToggled,
    TrashEmptied,
    CleanupRan,
}

/// A structured signal with optional payload.
#[derive(Debug, Clone, Serialize)]
pub struct Signal {
    pub schema_version: &'static str,
    pub signal: SignalKind,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl Signal {
    /// Build a new signal for an optional owning task.
    pub fn new(signal: SignalKind, timestamp: DateTime<Utc>, task_id: Option<String>) -> Self {
        Self {
            schema_version: SIGNAL_SCHEMA_VERSION,
            signal,
            timestamp,
            task_id,
            data: None,
        }
    }

    /// Attach a serializable payload to the signal.
    pub fn with_data<T: Serialize>(mut self, data: T) -> Result<Self> {
        self.data = Some(serde_json::to_value(data)?);
        Ok(self)
    }
}

#[derive(Debug, Clone)]
pub enum SignalDestination {
    Stdout,
    File(PathBuf),
}

impl SignalDestination {
    pub fn parse(raw: Option<&str>) -> Option<Self> {
        raw.and_then(|value| {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                return None;
            }
            if trimmed == "-" {
                return Some(SignalDestination::Stdout);
            }
            Some(SignalDestination::File(PathBuf::from(trimmed)))
        })
    }

    pub fn open(&self) -> Result<SignalSink> {
        match self {
            SignalDestination::Stdout => Ok(SignalSink::stdout()),
            SignalDestination::File(path) => SignalSink::file(path),
        }
    }
}

/// Signal sink that writes JSONL output to a destination.
pub struct SignalSink {
    writer: Box<dyn Write + Send>,
}

impl SignalSink {
    /// Emit signals to stdout.
    pub fn stdout() -> Self {
        Self {
            writer: Box::new(std::io::stdout()),
        }
    }

    /// Emit signals to a file, creating it if necessary.
    pub fn file(path: &Path) -> Result<Self> {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        Ok(Self {
            writer: Box::new(file),
        })
    }

    /// Write a single signal as JSONL.
    pub fn emit(&mut self, signal: &Signal) -> Result<()> {
        let serialized = serde_json::to_vec(signal)?;
        self.writer.write_all(&serialized)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush().map_err(Error::Io)?;
        Ok(())
    }
}
