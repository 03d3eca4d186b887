//! Producer-side retry with growing, jittered delays.
//!
//! The dispatch loop never retries a failed task. Producers that want retries
//! either resubmit errored tasks as new ones or wrap their own calls with
//! [`retry_with_backoff`].

use std::fmt;
use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::warn;

/// One delay step: `base` plus a random amount up to `jitter`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub base: Duration,
    pub jitter: Duration,
}

impl Backoff {
    pub const fn from_millis(base_ms: u64, jitter_ms: u64) -> Self {
        Self {
            base: Duration::from_millis(base_ms),
            jitter: Duration::from_millis(jitter_ms),
        }
    }

    /// Picks a concrete delay in `base..=base + jitter`.
    pub fn delay(&self) -> Duration {
        jittered(self.base, self.jitter)
    }
}

/// Delays before the 2nd, 3rd, 4th and 5th attempts.
pub const DEFAULT_SCHEDULE: [Backoff; 4] = [
    Backoff::from_millis(1_000, 250),
    Backoff::from_millis(4_000, 1_000),
    Backoff::from_millis(10_000, 3_000),
    Backoff::from_millis(35_000, 10_000),
];

/// `base` plus a uniformly random extra of at most `jitter`.
pub fn jittered(base: Duration, jitter: Duration) -> Duration {
    let jitter_ms = jitter.as_millis() as u64;
    if jitter_ms == 0 {
        return base;
    }
    base + Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_ms))
}

/// Runs `op` until it succeeds or the schedule is exhausted.
///
/// Makes `schedule.len() + 1` attempts at most; the last attempt's error is
/// returned unchanged.
pub async fn retry_with_backoff<T, E, F, Fut>(schedule: &[Backoff], mut op: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: fmt::Display,
{
    let mut attempt = 1;
    for step in schedule {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                let delay = step.delay();
                warn!(
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Attempt failed, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
    op().await
}
