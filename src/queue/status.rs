//! Status line for a running queue.
//!
//! Snapshots counts per status, usage per status and window, per-model usage
//! and cost, elapsed time and throughput, and renders them as a fixed-width
//! two-row table or as JSON. This is the only human-facing signal the queue
//! produces; it prints `null` for anything that does not exist yet instead of
//! failing on an empty ledger.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::config::MINUTE_SECS;
use crate::utils::cost::{estimate_cost, ModelPricing};

use super::accountant::{count, elapsed_time, tokens_per_second, usage, usage_within};
use super::ledger::most_recent_task;
use super::task::{Task, TaskStatus};

/// Column width of the text table.
const COLUMN_WIDTH: usize = 20;
/// Values longer than this are cut before padding.
const VALUE_WIDTH: usize = 15;
/// Without a transition for this long, the line highlights usage instead.
const HEARTBEAT_MS: u64 = 1_000;

/// Status output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusFormat {
    #[default]
    Text,
    Json,
}

/// Completed usage and its cost for one model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelUsage {
    pub usage: u64,
    /// `None` when the model has no known price.
    pub cost_usd: Option<f64>,
}

/// Point-in-time view of a queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub idle_tasks: usize,
    pub pending_tasks: usize,
    pub completed_tasks: usize,
    pub errored_tasks: usize,
    pub idle_usage: u64,
    pub pending_usage: u64,
    /// Completed usage over the last minute.
    pub recent_usage: u64,
    /// All-time completed usage per model.
    pub models: BTreeMap<String, ModelUsage>,
    pub elapsed_ms: Option<u64>,
    pub tokens_per_second: Option<f64>,
    /// Status of the most recent record, if any.
    pub last_status: Option<TaskStatus>,
    /// `true` when nothing has transitioned for a while.
    pub heartbeat: bool,
}

impl StatusSnapshot {
    /// Builds a snapshot from the collapsed task list.
    pub fn collect<P>(
        tasks: &[Task<P>],
        now: u64,
        custom_pricing: &HashMap<String, ModelPricing>,
    ) -> Self {
        let mut models = BTreeMap::new();
        for task in tasks {
            models.entry(task.model.clone()).or_insert_with(|| {
                let used = usage(tasks, 0, TaskStatus::Complete, Some(&task.model));
                ModelUsage {
                    usage: used,
                    cost_usd: estimate_cost(&task.model, used, custom_pricing),
                }
            });
        }

        let last = most_recent_task(tasks);

        Self {
            idle_tasks: count(tasks, TaskStatus::Idle),
            pending_tasks: count(tasks, TaskStatus::Pending),
            completed_tasks: count(tasks, TaskStatus::Complete),
            errored_tasks: count(tasks, TaskStatus::Error),
            idle_usage: usage(tasks, 0, TaskStatus::Idle, None),
            pending_usage: usage(tasks, 0, TaskStatus::Pending, None),
            recent_usage: usage_within(tasks, now, MINUTE_SECS * 1_000, TaskStatus::Complete),
            models,
            elapsed_ms: elapsed_time(tasks, now),
            tokens_per_second: tokens_per_second(tasks, now),
            last_status: last.map(|t| t.status),
            heartbeat: last.is_some_and(|t| now.saturating_sub(t.timestamp) > HEARTBEAT_MS),
        }
    }

    /// Renders in the requested format.
    pub fn render(&self, format: StatusFormat) -> String {
        match format {
            StatusFormat::Text => self.render_table(),
            StatusFormat::Json => self.render_json(),
        }
    }

    /// Two fixed-width rows: field names, then values.
    ///
    /// Highlighted fields are marked with `*`: usage fields on a heartbeat,
    /// otherwise the fields matching the most recent transition.
    pub fn render_table(&self) -> String {
        let fields = self.fields();

        let header = fields
            .iter()
            .map(|(name, _)| {
                let label = if self.is_highlighted(name) {
                    format!("*{}", name)
                } else {
                    name.clone()
                };
                format!("{:<width$}", label, width = COLUMN_WIDTH)
            })
            .collect::<Vec<_>>()
            .join(" | ");

        let values = fields
            .iter()
            .map(|(_, value)| {
                let text = value.as_deref().unwrap_or("null");
                let cut: String = text.chars().take(VALUE_WIDTH).collect();
                format!("{:>width$}", cut, width = COLUMN_WIDTH)
            })
            .collect::<Vec<_>>()
            .join(" | ");

        format!("{}\n{}", header, values)
    }

    /// Pretty-printed JSON.
    pub fn render_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| "{}".to_string())
    }

    fn fields(&self) -> Vec<(String, Option<String>)> {
        let mut fields = vec![
            ("idle tasks".to_string(), Some(self.idle_tasks.to_string())),
            ("pending tasks".to_string(), Some(self.pending_tasks.to_string())),
            ("completed tasks".to_string(), Some(self.completed_tasks.to_string())),
            ("errored tasks".to_string(), Some(self.errored_tasks.to_string())),
            ("idle usage".to_string(), Some(self.idle_usage.to_string())),
            ("pending usage".to_string(), Some(self.pending_usage.to_string())),
            ("recent usage".to_string(), Some(self.recent_usage.to_string())),
        ];
        for (model, m) in &self.models {
            fields.push((format!("{} usage", model), Some(m.usage.to_string())));
            fields.push((format!("{} $$$", model), m.cost_usd.map(|c| format!("{:.6}", c))));
        }
        fields.push((
            "elapsed time".to_string(),
            self.elapsed_ms.map(|ms| ms.to_string()),
        ));
        fields.push((
            "rate".to_string(),
            self.tokens_per_second.map(|r| format!("{:.3}", r)),
        ));
        fields
    }

    fn is_highlighted(&self, field: &str) -> bool {
        if self.heartbeat {
            return field == "pending usage" || field == "recent usage";
        }
        match self.last_status {
            Some(status) => field.contains(status.as_str()),
            None => false,
        }
    }
}
