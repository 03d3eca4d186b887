//! The caller-supplied side of the queue.
//!
//! A [`Processor`] performs the external call for one task and returns the
//! task's `complete` record carrying the measured token usage. Any error it
//! returns is recorded as an `error` state; it never reaches the dispatch
//! loop.

use std::future::Future;

use async_trait::async_trait;

use crate::error::Result;

use super::task::Task;

/// Performs the throttled work for one task.
///
/// Implementations receive the task's idle record and must return
/// `task.complete_with(measured_tokens)` on success. They must not touch the
/// ledger themselves.
#[async_trait]
pub trait Processor<P>: Send + Sync {
    /// Runs the external call for `task`.
    async fn process(&self, task: Task<P>) -> Result<Task<P>>;
}

/// A [`Processor`] backed by an async closure. Built with [`processor_fn`].
pub struct FnProcessor<F> {
    f: F,
}

/// Adapts `Fn(Task<P>) -> impl Future<Output = Result<Task<P>>>` into a
/// [`Processor`].
///
/// ```rust,ignore
/// let processor = processor_fn(|task: Task<String>| async move {
///     let measured = call_api(&task.payload).await?;
///     Ok(task.complete_with(measured))
/// });
/// ```
pub fn processor_fn<F>(f: F) -> FnProcessor<F> {
    FnProcessor { f }
}

#[async_trait]
impl<P, F, Fut> Processor<P> for FnProcessor<F>
where
    P: Send + 'static,
    F: Fn(Task<P>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Task<P>>> + Send + 'static,
{
    async fn process(&self, task: Task<P>) -> Result<Task<P>> {
        (self.f)(task).await
    }
}
