//! The rate-limited task queue and its dispatch loop.
//!
//! [`TaskQueue`] owns one rate-limit domain: a shared [`Ledger`], the
//! [`AvailabilityPolicy`] built from its [`QueueConfig`], and the clock used to
//! stamp transitions.
//!
//! # Dispatch loop
//!
//! ```text
//! while any task is idle or pending:
//!     sleep(poll_interval)
//!     if policy defers: continue
//!     oldest idle task  ──append pending──▶ ledger
//!                       ──tokio::spawn──▶ processor ──▶ append complete | error
//! ```
//!
//! The pending record is appended before the processor is spawned, so the
//! next poll already sees the task in flight. Processor failures (errors,
//! unexpected results, panics) become `error` records and never reach the
//! loop.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tracing::{debug, info, warn};

use crate::config::QueueConfig;
use crate::error::{QueueError, Result};
use crate::utils::retry::jittered;

use super::clock::{Clock, SystemClock};
use super::ledger::{current_tasks, Ledger};
use super::policy::{Admission, AvailabilityPolicy};
use super::processor::Processor;
use super::status::StatusSnapshot;
use super::task::{Task, TaskStatus};

/// Summary of one [`TaskQueue::process`] run.
#[derive(Debug, Clone)]
pub struct ProcessReport {
    /// Ids dispatched by this run, in dispatch order.
    pub dispatched: Vec<String>,
    /// How many of them ended `complete`.
    pub completed: usize,
    /// How many of them ended `error`.
    pub errored: usize,
    /// Queue status when the loop finished.
    pub status: StatusSnapshot,
}

/// A rate-limited, retry-tolerant task queue for one rate-limit domain.
pub struct TaskQueue<P> {
    ledger: Arc<Ledger<P>>,
    config: QueueConfig,
    policy: AvailabilityPolicy,
    clock: Arc<dyn Clock>,
}

impl<P> std::fmt::Debug for TaskQueue<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskQueue")
            .field("config", &self.config)
            .field("policy", &self.policy)
            .field("clock", &self.clock)
            .finish()
    }
}

impl<P> TaskQueue<P>
where
    P: Clone + Send + Sync + 'static,
{
    /// Creates a queue with its own empty ledger.
    pub fn new(config: QueueConfig) -> Result<Self> {
        Self::with_ledger(Arc::new(Ledger::new()), config)
    }

    /// Creates a queue over an existing, possibly shared, ledger.
    pub fn with_ledger(ledger: Arc<Ledger<P>>, config: QueueConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            ledger,
            policy: AvailabilityPolicy::new(&config),
            config,
            clock: Arc::new(SystemClock),
        })
    }

    /// Replaces the clock used to stamp transitions and evaluate windows.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// The ledger this queue reads and appends to.
    pub fn ledger(&self) -> &Arc<Ledger<P>> {
        &self.ledger
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Current time according to the queue's clock.
    pub fn now(&self) -> u64 {
        self.clock.now_ms()
    }

    /// Submits a new idle task with a generated id and returns the id.
    pub fn submit(&self, model: impl Into<String>, payload: P, estimate: u64) -> Result<String> {
        let task = Task::idle(model, payload, estimate, self.now());
        let id = task.id.clone();
        self.ledger.submit(task)?;
        debug!(task_id = %id, estimate, "Task submitted");
        Ok(id)
    }

    /// Submits a caller-built idle record.
    pub fn submit_task(&self, task: Task<P>) -> Result<()> {
        self.ledger.submit(task)
    }

    /// Evaluates the availability policy against the current ledger.
    pub fn admission(&self) -> Admission {
        let current = self.ledger.current_tasks(None);
        self.policy.check(&current, self.now())
    }

    /// Boolean view of [`admission`](Self::admission).
    pub fn is_available(&self) -> bool {
        self.admission().is_available()
    }

    /// Snapshot for the status line.
    pub fn status(&self) -> StatusSnapshot {
        let current = self.ledger.current_tasks(None);
        StatusSnapshot::collect(&current, self.now(), &self.config.pricing)
    }

    /// Runs the dispatch loop until no task is idle or pending.
    ///
    /// Tasks submitted while the loop runs are picked up as long as the loop
    /// has not yet terminated. Only one loop should drive a given ledger.
    pub async fn process<R>(&self, processor: R) -> ProcessReport
    where
        R: Processor<P> + 'static,
    {
        let processor: Arc<dyn Processor<P>> = Arc::new(processor);
        let mut dispatched = Vec::new();

        info!(
            tokens_per_minute = self.config.tokens_per_minute,
            max_pending_tasks = self.config.max_pending_tasks,
            poll_interval_ms = self.config.poll_interval_ms,
            "Dispatch loop started"
        );

        while self.ledger.has_unfinished() {
            tokio::time::sleep(self.config.poll_interval()).await;

            if let Some(id) = self.poll(&processor) {
                dispatched.push(id);
            }
        }

        let report = self.report(dispatched);
        info!(
            dispatched = report.dispatched.len(),
            completed = report.completed,
            errored = report.errored,
            "Dispatch loop finished"
        );
        report
    }

    /// One loop iteration after the sleep. Returns the id it dispatched, if any.
    fn poll(&self, processor: &Arc<dyn Processor<P>>) -> Option<String> {
        let now = self.now();
        let current = self.ledger.current_tasks(None);

        if tracing::enabled!(tracing::Level::DEBUG) {
            let status = StatusSnapshot::collect(&current, now, &self.config.pricing);
            debug!("\n{}", status.render_table());
        }

        if let Admission::Deferred(reason) = self.policy.check(&current, now) {
            debug!(%reason, "Admission deferred");
            return None;
        }

        // Collapsed records keep ledger order, so the first idle one is the oldest.
        let next = current.into_iter().find(|t| t.status == TaskStatus::Idle)?;

        self.ledger.append(next.to_pending(now));
        debug!(task_id = %next.id, model = %next.model, estimate = next.num_tokens, "Task dispatched");

        let id = next.id.clone();
        self.spawn(next, Arc::clone(processor));
        Some(id)
    }

    fn spawn(&self, task: Task<P>, processor: Arc<dyn Processor<P>>) {
        let ledger = Arc::clone(&self.ledger);
        let clock = Arc::clone(&self.clock);

        tokio::spawn(async move {
            let outcome = AssertUnwindSafe(processor.process(task.clone()))
                .catch_unwind()
                .await;

            let result = match outcome {
                Ok(result) => result.and_then(|done| check_result(&task, done)),
                Err(_) => Err(QueueError::Processor("processor panicked".to_string())),
            };

            let now = clock.now_ms();
            match result {
                Ok(mut done) => {
                    done.timestamp = now;
                    debug!(task_id = %done.id, measured = done.num_tokens, "Task complete");
                    ledger.append(done);
                }
                Err(e) => {
                    warn!(task_id = %task.id, error = %e, "Task failed");
                    ledger.append(task.to_error(now));
                }
            }
        });
    }

    fn report(&self, dispatched: Vec<String>) -> ProcessReport {
        let snapshot = self.ledger.snapshot();
        let current = current_tasks(&snapshot, None);
        let final_status = |id: &str| current.iter().find(|t| t.id == id).map(|t| t.status);

        let completed = dispatched
            .iter()
            .filter(|id| final_status(id) == Some(TaskStatus::Complete))
            .count();
        let errored = dispatched
            .iter()
            .filter(|id| final_status(id) == Some(TaskStatus::Error))
            .count();

        ProcessReport {
            dispatched,
            completed,
            errored,
            status: StatusSnapshot::collect(&current, self.now(), &self.config.pricing),
        }
    }

    /// Runs one call inline, gated by the same policy.
    ///
    /// Submits an idle record, waits with jittered back-off until the policy
    /// admits new work, records pending, awaits `call`, and records complete
    /// with the measured usage `call` reports (or error). Unlike the dispatch
    /// loop, the call's error is returned to the caller; a panicking call is
    /// returned as [`QueueError::Processor`].
    ///
    /// If the returned future is dropped before the call finishes (a timeout,
    /// a cancelled `select!`), the task is recorded as `error` so it does not
    /// hold budget or a concurrency slot.
    ///
    /// Meant for ledgers that are not also driven by [`process`](Self::process).
    pub async fn execute<T, F, Fut>(
        &self,
        model: impl Into<String>,
        payload: P,
        estimate: u64,
        call: F,
    ) -> Result<T>
    where
        F: FnOnce(Task<P>) -> Fut,
        Fut: Future<Output = Result<(T, u64)>>,
    {
        let task = Task::idle(model, payload, estimate, self.now());
        self.ledger.submit(task.clone())?;
        let guard = InlineGuard {
            ledger: &self.ledger,
            clock: self.clock.as_ref(),
            task: Some(task.clone()),
        };

        while let Admission::Deferred(reason) = self.admission() {
            let delay = jittered(
                std::time::Duration::from_millis(self.config.inline_retry_base_ms),
                std::time::Duration::from_millis(self.config.inline_retry_jitter_ms),
            );
            debug!(task_id = %task.id, %reason, delay_ms = delay.as_millis() as u64, "Inline call waiting");
            tokio::time::sleep(delay).await;
        }

        self.ledger.append(task.to_pending(self.now()));

        let outcome = AssertUnwindSafe(call(task.clone())).catch_unwind().await;
        let result = outcome
            .unwrap_or_else(|_| Err(QueueError::Processor("inline call panicked".to_string())));

        match result {
            Ok((value, measured)) => {
                guard.disarm();
                self.ledger
                    .append(task.transition(TaskStatus::Complete, measured, self.now()));
                Ok(value)
            }
            Err(e) => {
                warn!(task_id = %task.id, error = %e, "Inline call failed");
                // Dropping the armed guard records the error.
                drop(guard);
                Err(e)
            }
        }
    }

    /// Resubmits every errored task as a fresh idle task.
    ///
    /// Each new task gets a new id and the model, payload and estimate of the
    /// original submission. Returns the new ids in ledger order.
    pub fn resubmit_errors(&self) -> Result<Vec<String>> {
        let snapshot = self.ledger.snapshot();
        let errored = current_tasks(&snapshot, Some(TaskStatus::Error));

        let mut ids = Vec::with_capacity(errored.len());
        for failed in errored {
            // The error record carries zero usage; the estimate lives on the
            // first record for the id.
            let estimate = snapshot
                .iter()
                .find(|r| r.id == failed.id)
                .map_or(0, |r| r.num_tokens);
            let id = self.submit(failed.model.clone(), failed.payload.clone(), estimate)?;
            info!(failed_id = %failed.id, new_id = %id, "Errored task resubmitted");
            ids.push(id);
        }
        Ok(ids)
    }
}

/// Records `error` for an inline task that is dropped before it finishes.
struct InlineGuard<'a, P: Clone> {
    ledger: &'a Ledger<P>,
    clock: &'a dyn Clock,
    task: Option<Task<P>>,
}

impl<P: Clone> InlineGuard<'_, P> {
    /// The call succeeded; the caller records completion.
    fn disarm(mut self) {
        self.task = None;
    }
}

impl<P: Clone> Drop for InlineGuard<'_, P> {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            debug!(task_id = %task.id, "Inline task ended without completing");
            self.ledger.append(task.to_error(self.clock.now_ms()));
        }
    }
}

/// A processor must hand back the same task, marked complete.
fn check_result<P>(task: &Task<P>, done: Task<P>) -> Result<Task<P>> {
    if done.id != task.id {
        return Err(QueueError::Processor(format!(
            "processor returned task {} for task {}",
            done.id, task.id
        )));
    }
    if done.status != TaskStatus::Complete {
        return Err(QueueError::Processor(format!(
            "processor returned status {}, expected complete",
            done.status
        )));
    }
    Ok(done)
}
