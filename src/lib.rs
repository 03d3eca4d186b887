//! RateQueue - rate-limited, retry-tolerant task queue for token-budgeted LLM APIs

pub mod batch;
pub mod config;
pub mod error;
pub mod queue;
pub mod utils;

pub use config::{Profile, QueueConfig};
pub use error::{QueueError, Result};
pub use queue::{Processor, Task, TaskQueue, TaskStatus};
