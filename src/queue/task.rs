//! Task records stored in the ledger.
//!
//! A [`Task`] is one *state record* of a unit of throttled work. A task's
//! history is every record sharing its `id`; its current state is the last
//! such record appended to the ledger. Transitions never edit a record in
//! place, they build a new one with [`Task::transition`] and friends.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle state of a task: `idle → pending → {complete | error}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Submitted, waiting for the dispatch loop.
    Idle,
    /// Dispatched; the processor call is in flight.
    Pending,
    /// Processor returned; `num_tokens` is the measured usage.
    Complete,
    /// Processor failed; `num_tokens` is zero.
    Error,
}

impl TaskStatus {
    /// Every status, in lifecycle order.
    pub const ALL: [TaskStatus; 4] = [
        TaskStatus::Idle,
        TaskStatus::Pending,
        TaskStatus::Complete,
        TaskStatus::Error,
    ];

    /// Returns `true` for `complete` and `error`, which never transition again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Complete | TaskStatus::Error)
    }

    /// Lowercase name used in logs and the status line.
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Idle => "idle",
            TaskStatus::Pending => "pending",
            TaskStatus::Complete => "complete",
            TaskStatus::Error => "error",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One state record of a unit of throttled work.
///
/// `P` is the caller's payload (chat messages, an embeddings batch, ...). The
/// queue never inspects it; it is cloned into each new state record and handed
/// to the processor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task<P> {
    /// Opaque identifier shared by every record of the same task.
    pub id: String,
    /// State carried by this record.
    pub status: TaskStatus,
    /// Wall-clock milliseconds of the transition that produced this record.
    pub timestamp: u64,
    /// Rate-limited resource class this task consumes quota from.
    pub model: String,
    /// Caller data forwarded to the processor.
    pub payload: P,
    /// Estimated tokens while idle/pending, measured once complete, zero on error.
    pub num_tokens: u64,
}

impl<P> Task<P> {
    /// Creates an idle record with a generated UUID v4 id.
    pub fn idle(model: impl Into<String>, payload: P, num_tokens: u64, timestamp: u64) -> Self {
        Self::idle_with_id(
            Uuid::new_v4().to_string(),
            model,
            payload,
            num_tokens,
            timestamp,
        )
    }

    /// Creates an idle record with a caller-assigned id.
    pub fn idle_with_id(
        id: impl Into<String>,
        model: impl Into<String>,
        payload: P,
        num_tokens: u64,
        timestamp: u64,
    ) -> Self {
        Self {
            id: id.into(),
            status: TaskStatus::Idle,
            timestamp,
            model: model.into(),
            payload,
            num_tokens,
        }
    }

    /// Marks this record complete with the measured token usage.
    ///
    /// Processors return the result of this call. The timestamp is left as is;
    /// the queue stamps the transition time when it records the result.
    pub fn complete_with(mut self, measured_tokens: u64) -> Self {
        self.status = TaskStatus::Complete;
        self.num_tokens = measured_tokens;
        self
    }
}

impl<P: Clone> Task<P> {
    /// Builds the next state record for this task.
    pub fn transition(&self, status: TaskStatus, num_tokens: u64, timestamp: u64) -> Self {
        Self {
            id: self.id.clone(),
            status,
            timestamp,
            model: self.model.clone(),
            payload: self.payload.clone(),
            num_tokens,
        }
    }

    /// `pending` record carrying the pre-flight estimate forward.
    pub fn to_pending(&self, timestamp: u64) -> Self {
        self.transition(TaskStatus::Pending, self.num_tokens, timestamp)
    }

    /// `error` record; failed calls are accounted as zero usage.
    pub fn to_error(&self, timestamp: u64) -> Self {
        self.transition(TaskStatus::Error, 0, timestamp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idle_generates_unique_ids() {
        let a = Task::idle("gpt-4", (), 100, 1);
        let b = Task::idle("gpt-4", (), 100, 1);
        assert_ne!(a.id, b.id);
        assert_eq!(a.status, TaskStatus::Idle);
        assert_eq!(a.num_tokens, 100);
    }

    #[test]
    fn test_to_pending_keeps_estimate() {
        let idle = Task::idle_with_id("t1", "gpt-4", "hello".to_string(), 500, 10);
        let pending = idle.to_pending(20);
        assert_eq!(pending.id, "t1");
        assert_eq!(pending.status, TaskStatus::Pending);
        assert_eq!(pending.timestamp, 20);
        assert_eq!(pending.num_tokens, 500);
        assert_eq!(pending.payload, "hello");
        // The source record is untouched.
        assert_eq!(idle.status, TaskStatus::Idle);
    }

    #[test]
    fn test_to_error_zeroes_usage() {
        let idle = Task::idle_with_id("t1", "gpt-4", (), 500, 10);
        let errored = idle.to_error(30);
        assert_eq!(errored.status, TaskStatus::Error);
        assert_eq!(errored.num_tokens, 0);
    }

    #[test]
    fn test_complete_with_measured_tokens() {
        let task = Task::idle_with_id("t1", "gpt-4", (), 500, 10).complete_with(321);
        assert_eq!(task.status, TaskStatus::Complete);
        assert_eq!(task.num_tokens, 321);
        assert_eq!(task.timestamp, 10);
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(!TaskStatus::Idle.is_terminal());
        assert!(!TaskStatus::Pending.is_terminal());
        assert!(TaskStatus::Complete.is_terminal());
        assert!(TaskStatus::Error.is_terminal());
    }

    #[test]
    fn test_status_serializes_lowercase() {
        let json = serde_json::to_string(&TaskStatus::Pending).unwrap();
        assert_eq!(json, "\"pending\"");
        let parsed: TaskStatus = serde_json::from_str("\"complete\"").unwrap();
        assert_eq!(parsed, TaskStatus::Complete);
        assert_eq!(TaskStatus::Error.to_string(), "error");
    }
}
