//! The rate-limited task queue.
//!
//! - [`task`]: task records and their status
//! - [`ledger`]: the append-only record log and its collapse to current state
//! - [`accountant`]: token usage over windows and throughput
//! - [`policy`]: whether a new task may start now
//! - [`dispatcher`]: the dispatch loop and inline execution
//! - [`status`]: the status line

pub mod accountant;
pub mod clock;
pub mod dispatcher;
pub mod ledger;
pub mod policy;
pub mod processor;
pub mod status;
pub mod task;

pub use clock::{Clock, ManualClock, SystemClock};
pub use dispatcher::{ProcessReport, TaskQueue};
pub use ledger::Ledger;
pub use policy::{Admission, AvailabilityPolicy, Deferral};
pub use processor::{processor_fn, FnProcessor, Processor};
pub use status::{StatusFormat, StatusSnapshot};
pub use task::{Task, TaskStatus};
