//! Pre-flight token estimates.
//!
//! The ledger only needs an estimate good enough to gate admission; the
//! measured usage replaces it once a task completes. Uses the ~4 bytes/token
//! heuristic.

/// Estimate the number of tokens in `text`.
pub fn estimate_tokens(text: &str) -> u64 {
    text.len().div_ceil(4) as u64
}

/// Estimate for a chat completion: prompt tokens plus the completion allowance.
pub fn estimate_chat_tokens<S: AsRef<str>>(messages: &[S], max_tokens: u64) -> u64 {
    messages
        .iter()
        .map(|m| estimate_tokens(m.as_ref()))
        .fold(max_tokens, u64::saturating_add)
}
