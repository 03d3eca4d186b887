//! Append-only task ledger.
//!
//! The ledger is the single source of truth for every accounting query. It
//! only ever grows: a task changes state when a new record with the same id is
//! appended, and "current state" means the last record for that id by ledger
//! position (not by timestamp).
//!
//! # Design
//!
//! - Records live in a `Mutex<Vec<Task<P>>>`; every append is one lock hold.
//! - Readers take a cloned snapshot and run the pure helpers in this module
//!   ([`current_tasks`], [`first_task`], [`most_recent_task`]) on it.
//! - All methods take `&self` so the ledger can be shared via `Arc`.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use crate::error::{QueueError, Result};

use super::task::{Task, TaskStatus};

/// Collapses a record sequence to the latest record per id.
///
/// Output keeps ledger order: each surviving record appears at the position
/// it was appended. With `by_status`, only records in that state are kept.
pub fn current_tasks<P: Clone>(tasks: &[Task<P>], by_status: Option<TaskStatus>) -> Vec<Task<P>> {
    let mut last_index: HashMap<&str, usize> = HashMap::with_capacity(tasks.len());
    for (i, task) in tasks.iter().enumerate() {
        last_index.insert(task.id.as_str(), i);
    }

    tasks
        .iter()
        .enumerate()
        .filter(|(i, task)| last_index.get(task.id.as_str()) == Some(i))
        .map(|(_, task)| task)
        .filter(|task| by_status.map_or(true, |status| task.status == status))
        .cloned()
        .collect()
}

/// First record of a list (the oldest by ledger position).
pub fn first_task<P>(tasks: &[Task<P>]) -> Option<&Task<P>> {
    tasks.first()
}

/// Last record of a list (the newest by ledger position).
pub fn most_recent_task<P>(tasks: &[Task<P>]) -> Option<&Task<P>> {
    tasks.last()
}

/// Append-only, thread-safe sequence of task records.
#[derive(Debug)]
pub struct Ledger<P> {
    records: Mutex<Vec<Task<P>>>,
}

impl<P> Default for Ledger<P> {
    fn default() -> Self {
        Self {
            records: Mutex::new(Vec::new()),
        }
    }
}

impl<P> Ledger<P> {
    /// Creates an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    // Records are only ever pushed, so a panic while holding the lock cannot
    // leave the vector half-edited.
    fn records(&self) -> MutexGuard<'_, Vec<Task<P>>> {
        self.records.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Appends a record. No validation beyond the type's shape.
    pub fn append(&self, task: Task<P>) {
        self.records().push(task);
    }

    /// Validated producer entry point.
    ///
    /// Rejects a record with an empty id, a status other than `idle`, or an id
    /// that already has history in the ledger. A rejected record never reaches
    /// the ledger.
    pub fn submit(&self, task: Task<P>) -> Result<()> {
        if task.id.trim().is_empty() {
            return Err(QueueError::InvalidTask("task id is empty".to_string()));
        }
        if task.status != TaskStatus::Idle {
            return Err(QueueError::InvalidTask(format!(
                "task {} submitted with status {}, expected idle",
                task.id, task.status
            )));
        }

        let mut records = self.records();
        if records.iter().any(|r| r.id == task.id) {
            return Err(QueueError::DuplicateTask(task.id));
        }
        records.push(task);
        Ok(())
    }

    /// Total number of records (not distinct tasks).
    pub fn len(&self) -> usize {
        self.records().len()
    }

    /// Returns `true` if nothing has been appended yet.
    pub fn is_empty(&self) -> bool {
        self.records().is_empty()
    }
}

impl<P: Clone> Ledger<P> {
    /// Consistent copy of every record in append order.
    pub fn snapshot(&self) -> Vec<Task<P>> {
        self.records().clone()
    }

    /// Latest record per id, optionally filtered by status.
    pub fn current_tasks(&self, by_status: Option<TaskStatus>) -> Vec<Task<P>> {
        current_tasks(&self.records(), by_status)
    }

    /// Latest record for `id`, if the id has any history.
    pub fn get_task(&self, id: &str) -> Option<Task<P>> {
        self.records().iter().rev().find(|r| r.id == id).cloned()
    }

    /// Submits a batch, stopping at the first rejected record.
    pub fn submit_all(&self, tasks: impl IntoIterator<Item = Task<P>>) -> Result<Vec<String>> {
        let mut ids = Vec::new();
        for task in tasks {
            let id = task.id.clone();
            self.submit(task)?;
            ids.push(id);
        }
        Ok(ids)
    }

    /// Returns `true` while any task is idle or pending.
    pub fn has_unfinished(&self) -> bool {
        let records = self.records();
        let mut seen: HashSet<&str> = HashSet::new();
        // Walk backwards so the first record seen for an id is its latest.
        records
            .iter()
            .rev()
            .filter(|r| seen.insert(r.id.as_str()))
            .any(|r| !r.status.is_terminal())
    }
}
