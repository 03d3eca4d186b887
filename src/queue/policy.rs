//! Availability policy: may the dispatch loop start another task right now?
//!
//! The policy runs a fixed list of named checks over the collapsed task list.
//! The first check that fails names the reason admission was deferred. A
//! deferral is not an error; the loop simply polls again later. Tasks that
//! are already pending keep running whatever the policy says.

use std::fmt;

use crate::config::{QueueConfig, MINUTE_SECS};

use super::accountant::{count, usage, usage_within};
use super::task::{Task, TaskStatus};

/// Why new work is not being admitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deferral {
    /// Total pending usage is above the per-minute budget.
    PendingOverBudget { usage: u64, limit: u64 },
    /// Pending usage inside the short window is above its share of the budget.
    PendingBurst { usage: u64, limit: u64 },
    /// Completed usage over the last minute is above the budget.
    CompleteOverBudget { usage: u64, limit: u64 },
    /// Completed usage inside the short window is above its share of the budget.
    CompleteBurst { usage: u64, limit: u64 },
    /// The concurrency cap is reached.
    ConcurrencyCap { pending: usize, limit: usize },
}

impl fmt::Display for Deferral {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Deferral::PendingOverBudget { usage, limit } => {
                write!(f, "pending usage {} exceeds budget {}", usage, limit)
            }
            Deferral::PendingBurst { usage, limit } => {
                write!(f, "recent pending usage {} exceeds window share {}", usage, limit)
            }
            Deferral::CompleteOverBudget { usage, limit } => {
                write!(f, "completed usage {} in the last minute exceeds budget {}", usage, limit)
            }
            Deferral::CompleteBurst { usage, limit } => {
                write!(f, "recent completed usage {} exceeds window share {}", usage, limit)
            }
            Deferral::ConcurrencyCap { pending, limit } => {
                write!(f, "queue is full: {} pending tasks (cap {})", pending, limit)
            }
        }
    }
}

/// Outcome of one policy evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// A new task may start.
    Available,
    /// Hold off; the reason is the first failing check.
    Deferred(Deferral),
}

impl Admission {
    /// Returns `true` for [`Admission::Available`].
    pub fn is_available(&self) -> bool {
        matches!(self, Admission::Available)
    }
}

/// Composite admission predicate for one rate-limit domain.
#[derive(Debug, Clone)]
pub struct AvailabilityPolicy {
    tokens_per_minute: u64,
    short_window_ms: u64,
    short_window_budget: u64,
    max_pending_tasks: usize,
}

impl AvailabilityPolicy {
    /// Builds a policy from the thresholds in `config`.
    pub fn new(config: &QueueConfig) -> Self {
        Self {
            tokens_per_minute: config.tokens_per_minute,
            short_window_ms: config.short_window_ms(),
            short_window_budget: config.short_window_budget(),
            max_pending_tasks: config.max_pending_tasks,
        }
    }

    /// Evaluates every check over the collapsed list `tasks` at time `now`.
    pub fn check<P>(&self, tasks: &[Task<P>], now: u64) -> Admission {
        let checks = [
            self.check_total_pending(tasks),
            self.check_recent_pending(tasks, now),
            self.check_minute_complete(tasks, now),
            self.check_recent_complete(tasks, now),
            self.check_concurrency(tasks),
        ];
        match checks.into_iter().flatten().next() {
            Some(deferral) => Admission::Deferred(deferral),
            None => Admission::Available,
        }
    }

    /// Boolean view of [`check`](Self::check).
    pub fn is_available<P>(&self, tasks: &[Task<P>], now: u64) -> bool {
        self.check(tasks, now).is_available()
    }

    fn check_total_pending<P>(&self, tasks: &[Task<P>]) -> Option<Deferral> {
        let pending = usage(tasks, 0, TaskStatus::Pending, None);
        (pending > self.tokens_per_minute).then_some(Deferral::PendingOverBudget {
            usage: pending,
            limit: self.tokens_per_minute,
        })
    }

    fn check_recent_pending<P>(&self, tasks: &[Task<P>], now: u64) -> Option<Deferral> {
        let recent = usage_within(tasks, now, self.short_window_ms, TaskStatus::Pending);
        (recent > self.short_window_budget).then_some(Deferral::PendingBurst {
            usage: recent,
            limit: self.short_window_budget,
        })
    }

    fn check_minute_complete<P>(&self, tasks: &[Task<P>], now: u64) -> Option<Deferral> {
        let recent = usage_within(tasks, now, MINUTE_SECS * 1_000, TaskStatus::Complete);
        (recent > self.tokens_per_minute).then_some(Deferral::CompleteOverBudget {
            usage: recent,
            limit: self.tokens_per_minute,
        })
    }

    fn check_recent_complete<P>(&self, tasks: &[Task<P>], now: u64) -> Option<Deferral> {
        let recent = usage_within(tasks, now, self.short_window_ms, TaskStatus::Complete);
        (recent > self.short_window_budget).then_some(Deferral::CompleteBurst {
            usage: recent,
            limit: self.short_window_budget,
        })
    }

    fn check_concurrency<P>(&self, tasks: &[Task<P>]) -> Option<Deferral> {
        let pending = count(tasks, TaskStatus::Pending);
        (pending >= self.max_pending_tasks).then_some(Deferral::ConcurrencyCap {
            pending,
            limit: self.max_pending_tasks,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::ledger::Ledger;

    const NOW: u64 = 1_000_000;

    fn config(tokens_per_minute: u64, max_pending_tasks: usize) -> QueueConfig {
        QueueConfig {
            tokens_per_minute,
            max_pending_tasks,
            ..QueueConfig::chat_completion()
        }
    }

    fn record(id: &str, status: TaskStatus, tokens: u64, ts: u64) -> Task<()> {
        Task {
            id: id.to_string(),
            status,
            timestamp: ts,
            model: "gpt-4".to_string(),
            payload: (),
            num_tokens: tokens,
        }
    }

    #[test]
    fn test_empty_queue_is_available() {
        let policy = AvailabilityPolicy::new(&config(90_000, 20));
        let tasks: Vec<Task<()>> = Vec::new();
        assert_eq!(policy.check(&tasks, NOW), Admission::Available);
    }

    #[test]
    fn test_idle_usage_never_blocks() {
        let policy = AvailabilityPolicy::new(&config(1_000, 20));
        let tasks = vec![record("a", TaskStatus::Idle, 1_000_000, NOW)];
        assert!(policy.is_available(&tasks, NOW));
    }

    #[test]
    fn test_total_pending_over_budget() {
        // A 60s short window makes its share equal to the whole budget.
        let policy = AvailabilityPolicy::new(&QueueConfig {
            short_window_secs: 60,
            ..config(3_000, 20)
        });
        // Both records are outside the short window; the total is all-time.
        let tasks = vec![
            record("a", TaskStatus::Pending, 2_000, 1),
            record("b", TaskStatus::Pending, 1_500, 2),
        ];
        assert_eq!(
            policy.check(&tasks, NOW),
            Admission::Deferred(Deferral::PendingOverBudget {
                usage: 3_500,
                limit: 3_000
            })
        );
    }

    #[test]
    fn test_pending_at_budget_is_still_available() {
        let policy = AvailabilityPolicy::new(&QueueConfig {
            short_window_secs: 60,
            ..config(3_000, 20)
        });
        let tasks = vec![
            record("a", TaskStatus::Pending, 1_000, NOW),
            record("b", TaskStatus::Pending, 1_000, NOW),
            record("c", TaskStatus::Pending, 1_000, NOW),
        ];
        assert!(policy.is_available(&tasks, NOW));
    }

    #[test]
    fn test_recent_pending_burst() {
        // 60_000/min with a 20s window allows 20_000 per window.
        let policy = AvailabilityPolicy::new(&config(60_000, 20));
        let tasks = vec![
            record("a", TaskStatus::Pending, 15_000, NOW - 1_000),
            record("b", TaskStatus::Pending, 10_000, NOW - 2_000),
        ];
        assert_eq!(
            policy.check(&tasks, NOW),
            Admission::Deferred(Deferral::PendingBurst {
                usage: 25_000,
                limit: 20_000
            })
        );

        // The same pending usage spread outside the window is fine.
        let tasks = vec![
            record("a", TaskStatus::Pending, 15_000, NOW - 30_000),
            record("b", TaskStatus::Pending, 10_000, NOW - 2_000),
        ];
        assert!(policy.is_available(&tasks, NOW));
    }

    #[test]
    fn test_completed_minute_over_budget() {
        let policy = AvailabilityPolicy::new(&config(60_000, 20));
        let tasks = vec![
            record("a", TaskStatus::Complete, 19_000, NOW - 50_000),
            record("b", TaskStatus::Complete, 19_000, NOW - 45_000),
            record("c", TaskStatus::Complete, 19_000, NOW - 40_000),
            record("d", TaskStatus::Complete, 19_000, NOW - 30_000),
        ];
        assert_eq!(
            policy.check(&tasks, NOW),
            Admission::Deferred(Deferral::CompleteOverBudget {
                usage: 76_000,
                limit: 60_000
            })
        );

        // A minute later the window has slid past all of it.
        assert!(policy.is_available(&tasks, NOW + 60_000));
    }

    #[test]
    fn test_recent_complete_burst() {
        let policy = AvailabilityPolicy::new(&config(60_000, 20));
        let tasks = vec![record("a", TaskStatus::Complete, 20_001, NOW - 100)];
        assert_eq!(
            policy.check(&tasks, NOW),
            Admission::Deferred(Deferral::CompleteBurst {
                usage: 20_001,
                limit: 20_000
            })
        );
    }

    #[test]
    fn test_concurrency_cap() {
        let policy = AvailabilityPolicy::new(&config(1_000_000, 2));
        let one = vec![record("a", TaskStatus::Pending, 1, NOW)];
        assert!(policy.is_available(&one, NOW));

        let two = vec![
            record("a", TaskStatus::Pending, 1, NOW),
            record("b", TaskStatus::Pending, 1, NOW),
        ];
        assert_eq!(
            policy.check(&two, NOW),
            Admission::Deferred(Deferral::ConcurrencyCap {
                pending: 2,
                limit: 2
            })
        );
    }

    #[test]
    fn test_gating_lifts_after_completion() {
        let policy = AvailabilityPolicy::new(&QueueConfig {
            short_window_secs: 60,
            ..config(3_000, 20)
        });
        let ledger = Ledger::new();
        let tasks: Vec<Task<()>> = (0..4)
            .map(|n| Task::idle_with_id(format!("t{n}"), "gpt-4", (), 1_000, 1))
            .collect();
        for task in &tasks {
            ledger.append(task.to_pending(NOW - 120_000));
        }
        assert!(!policy.is_available(&ledger.current_tasks(None), NOW));

        // Completed usage that is older than a minute does not count.
        let mut done = tasks[0].clone().complete_with(1_000);
        done.timestamp = NOW - 61_000;
        ledger.append(done);
        assert!(policy.is_available(&ledger.current_tasks(None), NOW));
    }

    #[test]
    fn test_deferral_display() {
        let d = Deferral::ConcurrencyCap {
            pending: 20,
            limit: 20,
        };
        assert_eq!(d.to_string(), "queue is full: 20 pending tasks (cap 20)");
    }
}
