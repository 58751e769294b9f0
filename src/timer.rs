//! Cancellable scheduled actions.
//!
//! Replaces ad hoc timer-as-side-effect control flow with an explicit
//! queue: `schedule` returns a handle, `cancel` revokes it, and the
//! host's event loop drains due payloads with `due`. Single-threaded by
//! design; nothing fires until the owner polls.

use chrono::{DateTime, Utc};

/// Opaque handle to a scheduled entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerHandle(u64);

#[derive(Debug)]
struct TimerEntry<T> {
    id: u64,
    fires_at: DateTime<Utc>,
    payload: T,
}

/// Queue of pending scheduled payloads.
#[derive(Debug)]
pub struct TimerQueue<T> {
    entries: Vec<TimerEntry<T>>,
    next_id: u64,
}

impl<T> Default for TimerQueue<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            next_id: 0,
        }
    }
}

impl<T> TimerQueue<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule a payload to come due at `fires_at`.
    pub fn schedule(&mut self, fires_at: DateTime<Utc>, payload: T) -> TimerHandle {
        let id = self.next_id;
        self.next_id += 1;
        self.entries.push(TimerEntry {
            id,
            fires_at,
            payload,
        });
        TimerHandle(id)
    }

    /// Cancel a scheduled entry, returning its payload if it had not
    /// yet been drained.
    pub fn cancel(&mut self, handle: TimerHandle) -> Option<T> {
        let idx = self.entries.iter().position(|entry| entry.id == handle.0)?;
        Some(self.entries.remove(idx).payload)
    }

    /// Remove and return every payload due at or before `now`, in
    /// firing order.
    pub fn due(&mut self, now: DateTime<Utc>) -> Vec<T> {
        let mut fired = Vec::new();
        let mut remaining = Vec::new();
        self.entries.sort_by_key(|entry| (entry.fires_at, entry.id));
        for entry in self.entries.drain(..) {
            if entry.fires_at <= now {
                fired.push(entry.payload);
            } else {
                remaining.push(entry);
            }
        }
        self.entries = remaining;
        fired
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
