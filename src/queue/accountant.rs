//! Token usage accounting over task records.
//!
//! Pure functions; callers pass the collapsed task list from
//! [`current_tasks`](super::ledger::current_tasks) so each task is counted
//! once, in its latest state.

use super::task::{Task, TaskStatus};

/// Sums `num_tokens` over records newer than `since` in the given state.
///
/// `since = 0` means all time. With `model`, only records for that model are
/// counted. An empty match is `0`, not an error.
pub fn usage<P>(tasks: &[Task<P>], since: u64, status: TaskStatus, model: Option<&str>) -> u64 {
    tasks
        .iter()
        .filter(|t| t.timestamp > since)
        .filter(|t| model.map_or(true, |m| t.model == m))
        .filter(|t| t.status == status)
        .fold(0u64, |total, t| total.saturating_add(t.num_tokens))
}

/// Usage within the trailing `window_ms` before `now`.
pub fn usage_within<P>(tasks: &[Task<P>], now: u64, window_ms: u64, status: TaskStatus) -> u64 {
    usage(tasks, now.saturating_sub(window_ms), status, None)
}

/// Milliseconds since the first task's timestamp, or `None` for an empty list.
pub fn elapsed_time<P>(tasks: &[Task<P>], now: u64) -> Option<u64> {
    tasks.first().map(|first| now.saturating_sub(first.timestamp))
}

/// Completed tokens per second since the first task.
///
/// `None` when there is no first task or no time has elapsed yet.
pub fn tokens_per_second<P>(tasks: &[Task<P>], now: u64) -> Option<f64> {
    let elapsed_ms = elapsed_time(tasks, now)?;
    if elapsed_ms == 0 {
        return None;
    }
    let completed = usage(tasks, 0, TaskStatus::Complete, None);
    Some(completed as f64 / (elapsed_ms as f64 / 1000.0))
}

/// Number of records in the given state.
pub fn count<P>(tasks: &[Task<P>], status: TaskStatus) -> usize {
    tasks.iter().filter(|t| t.status == status).count()
}
