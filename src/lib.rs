//! tokkakari - Task Planning Core Library
//!
//! This library provides the state and persistence core for the
//! tokkakari task planner: a small, host-agnostic engine behind the
//! interactive UI.
//!
//! # Core Concepts
//!
//! - **Tasks**: Two-category list (immediate vs later) with due dates
//! - **Timed soft-delete**: Completion schedules a grace-window trash
//!   move that undo can cancel
//! - **Trash ledger**: Bounded, newest-first log of deleted tasks
//! - **Progress tracking**: Step-by-step execution of broken-down tasks
//! - **Cleanup scheduler**: Periodic orphan reclamation and emergency
//!   space recovery on quota pressure
//!
//! # Module Organization
//!
//! - `config`: Configuration loading from `tokkakari.toml`
//! - `error`: Error types and result aliases
//! - `clock`: Injected time source for deterministic scheduling
//! - `kv`: Key-value store abstraction (in-memory and on-disk)
//! - `storage`: Storage gateway owning the persisted key namespace
//! - `task`: Task model and ordering
//! - `trash`: Trash ledger operations
//! - `progress`: Per-task step-execution progress
//! - `cleanup`: Periodic and emergency storage sweeps
//! - `timer`: Cancellable scheduled actions
//! - `breakdown`: Breakdown service boundary and draft persistence
//! - `events`: Signals for external observers
//! - `planner`: The task list planner orchestrating all of the above

pub mod breakdown;
pub mod cleanup;
pub mod clock;
pub mod config;
pub mod error;
pub mod events;
pub mod kv;
pub mod planner;
pub mod progress;
pub mod storage;
pub mod task;
pub mod timer;
pub mod trash;

pub use error::{Error, Result};
