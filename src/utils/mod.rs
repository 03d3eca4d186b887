//! Utility modules for RateQueue.

pub mod cost;
pub mod retry;
pub mod tokens;
