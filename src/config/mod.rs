//! Queue configuration for RateQueue
//!
//! Every threshold the availability policy applies is configuration: the
//! per-minute token budget, the short burst window, the concurrency cap and
//! the poll interval. Two presets mirror the rate limits of the chat
//! completion and embeddings endpoints the queue was first tuned for.
//!
//! Configuration can be loaded from a JSON file and then overridden with
//! `RATEQUEUE_*` environment variables.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{QueueError, Result};
use crate::utils::cost::ModelPricing;

/// Environment variable overriding [`QueueConfig::tokens_per_minute`].
pub const ENV_TOKENS_PER_MINUTE: &str = "RATEQUEUE_TOKENS_PER_MINUTE";
/// Environment variable overriding [`QueueConfig::short_window_secs`].
pub const ENV_SHORT_WINDOW_SECS: &str = "RATEQUEUE_SHORT_WINDOW_SECS";
/// Environment variable overriding [`QueueConfig::max_pending_tasks`].
pub const ENV_MAX_PENDING_TASKS: &str = "RATEQUEUE_MAX_PENDING_TASKS";
/// Environment variable overriding [`QueueConfig::poll_interval_ms`].
pub const ENV_POLL_INTERVAL_MS: &str = "RATEQUEUE_POLL_INTERVAL_MS";

/// Length of the sustained-usage window, in seconds.
pub const MINUTE_SECS: u64 = 60;

// ============================================================================
// Profile
// ============================================================================

/// Built-in configuration presets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Profile {
    /// Chat/text completions: 90 000 tokens/minute, 100 ms poll.
    #[default]
    ChatCompletion,
    /// Embeddings: 350 000 tokens/minute, 1 s poll.
    Embeddings,
}

impl Profile {
    /// Parses a profile name as accepted on the command line.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "chat" | "chat_completion" | "chat-completion" => Some(Self::ChatCompletion),
            "embeddings" | "embedding" => Some(Self::Embeddings),
            _ => None,
        }
    }

    /// The preset configuration for this profile.
    pub fn config(self) -> QueueConfig {
        match self {
            Self::ChatCompletion => QueueConfig::chat_completion(),
            Self::Embeddings => QueueConfig::embeddings(),
        }
    }
}

// ============================================================================
// QueueConfig
// ============================================================================

/// Thresholds and timings for one rate-limit domain.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Token budget per minute shared by pending and completed work.
    pub tokens_per_minute: u64,
    /// Length of the short burst window, in seconds (1..=60).
    pub short_window_secs: u64,
    /// Maximum number of tasks in flight at once.
    pub max_pending_tasks: usize,
    /// Delay between dispatch loop iterations, in milliseconds.
    pub poll_interval_ms: u64,
    /// Base delay between admission checks for inline execution.
    pub inline_retry_base_ms: u64,
    /// Random extra delay added to `inline_retry_base_ms`.
    pub inline_retry_jitter_ms: u64,
    /// Custom per-model pricing overrides for the status line.
    pub pricing: HashMap<String, ModelPricing>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self::chat_completion()
    }
}

impl QueueConfig {
    /// Preset for chat completions.
    pub fn chat_completion() -> Self {
        Self {
            tokens_per_minute: 90_000,
            short_window_secs: 20,
            max_pending_tasks: 20,
            poll_interval_ms: 100,
            inline_retry_base_ms: 3_000,
            inline_retry_jitter_ms: 1_000,
            pricing: HashMap::new(),
        }
    }

    /// Preset for embeddings.
    pub fn embeddings() -> Self {
        Self {
            tokens_per_minute: 350_000,
            poll_interval_ms: 1_000,
            ..Self::chat_completion()
        }
    }

    /// Poll interval as a [`Duration`].
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Share of the per-minute budget allowed inside the short window.
    ///
    /// Saturates instead of overflowing; [`validate`](Self::validate) rejects
    /// budgets where that would happen.
    pub fn short_window_budget(&self) -> u64 {
        self.tokens_per_minute.saturating_mul(self.short_window_secs) / MINUTE_SECS
    }

    /// Short window length in milliseconds.
    pub fn short_window_ms(&self) -> u64 {
        self.short_window_secs * 1_000
    }

    /// Default config file location (`~/.config/ratequeue/config.json`).
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("ratequeue")
            .join("config.json")
    }

    /// Loads a config file. Missing fields take the chat completion defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(QueueError::NotFound(format!(
                "Config file not found: {}",
                path.display()
            )));
        }
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        debug!(path = %path.display(), "Loaded queue config");
        Ok(config)
    }

    /// Applies `RATEQUEUE_*` overrides from the process environment.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Applies overrides from an arbitrary lookup (the environment in production).
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup(ENV_TOKENS_PER_MINUTE) {
            self.tokens_per_minute = parse_var(ENV_TOKENS_PER_MINUTE, &v)?;
        }
        if let Some(v) = lookup(ENV_SHORT_WINDOW_SECS) {
            self.short_window_secs = parse_var(ENV_SHORT_WINDOW_SECS, &v)?;
        }
        if let Some(v) = lookup(ENV_MAX_PENDING_TASKS) {
            self.max_pending_tasks = parse_var(ENV_MAX_PENDING_TASKS, &v)?;
        }
        if let Some(v) = lookup(ENV_POLL_INTERVAL_MS) {
            self.poll_interval_ms = parse_var(ENV_POLL_INTERVAL_MS, &v)?;
        }
        Ok(())
    }

    /// Rejects thresholds that would stall or never gate the queue.
    pub fn validate(&self) -> Result<()> {
        if self.tokens_per_minute == 0 {
            return Err(QueueError::Config(
                "tokens_per_minute must be greater than zero".to_string(),
            ));
        }
        if self.short_window_secs == 0 || self.short_window_secs > MINUTE_SECS {
            return Err(QueueError::Config(format!(
                "short_window_secs must be between 1 and {}, got {}",
                MINUTE_SECS, self.short_window_secs
            )));
        }
        if self
            .tokens_per_minute
            .checked_mul(self.short_window_secs)
            .is_none()
        {
            return Err(QueueError::Config(format!(
                "tokens_per_minute {} is too large for a {}s short window",
                self.tokens_per_minute, self.short_window_secs
            )));
        }
        if self.max_pending_tasks == 0 {
            return Err(QueueError::Config(
                "max_pending_tasks must be greater than zero".to_string(),
            ));
        }
        if self.poll_interval_ms == 0 {
            return Err(QueueError::Config(
                "poll_interval_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| QueueError::Config(format!("{} has invalid value '{}'", key, value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn create_temp_file(name: &str, content: &str) -> PathBuf {
        let path = std::env::temp_dir().join(name);
        let mut file = std::fs::File::create(&path).expect("Failed to create temp file");
        file.write_all(content.as_bytes())
            .expect("Failed to write temp file");
        path
    }

    #[test]
    fn test_chat_completion_preset() {
        let config = QueueConfig::chat_completion();
        assert_eq!(config.tokens_per_minute, 90_000);
        assert_eq!(config.short_window_secs, 20);
        assert_eq!(config.max_pending_tasks, 20);
        assert_eq!(config.poll_interval_ms, 100);
        assert_eq!(config.short_window_budget(), 30_000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_embeddings_preset() {
        let config = QueueConfig::embeddings();
        assert_eq!(config.tokens_per_minute, 350_000);
        assert_eq!(config.poll_interval(), Duration::from_secs(1));
        assert_eq!(config.max_pending_tasks, 20);
    }

    #[test]
    fn test_profile_from_name() {
        assert_eq!(Profile::from_name("chat"), Some(Profile::ChatCompletion));
        assert_eq!(Profile::from_name("Embeddings"), Some(Profile::Embeddings));
        assert_eq!(Profile::from_name("images"), None);
        assert_eq!(Profile::Embeddings.config().tokens_per_minute, 350_000);
    }

    #[test]
    fn test_serde_default_fills_missing_fields() {
        let config: QueueConfig =
            serde_json::from_str(r#"{"tokens_per_minute": 1000}"#).unwrap();
        assert_eq!(config.tokens_per_minute, 1000);
        assert_eq!(config.short_window_secs, 20);
        assert_eq!(config.poll_interval_ms, 100);
        assert!(config.pricing.is_empty());
    }

    #[test]
    fn test_load_from_file() {
        let path = create_temp_file(
            "ratequeue_test_config.json",
            r#"{"max_pending_tasks": 3, "poll_interval_ms": 5}"#,
        );
        let config = QueueConfig::load(&path).expect("Should load config");
        assert_eq!(config.max_pending_tasks, 3);
        assert_eq!(config.poll_interval_ms, 5);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_load_missing_file() {
        let err = QueueConfig::load(Path::new("/tmp/ratequeue_missing_config_xyz.json"))
            .unwrap_err();
        assert!(matches!(err, QueueError::NotFound(_)));
    }

    #[test]
    fn test_overrides() {
        let mut config = QueueConfig::chat_completion();
        config
            .apply_overrides(|key| match key {
                ENV_TOKENS_PER_MINUTE => Some("5000".to_string()),
                ENV_MAX_PENDING_TASKS => Some(" 4 ".to_string()),
                _ => None,
            })
            .unwrap();
        assert_eq!(config.tokens_per_minute, 5000);
        assert_eq!(config.max_pending_tasks, 4);
        assert_eq!(config.poll_interval_ms, 100);
    }

    #[test]
    fn test_override_invalid_value() {
        let mut config = QueueConfig::chat_completion();
        let err = config
            .apply_overrides(|key| (key == ENV_POLL_INTERVAL_MS).then(|| "fast".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains(ENV_POLL_INTERVAL_MS));
    }

    #[test]
    fn test_validate_rejects_bad_thresholds() {
        let mut config = QueueConfig::chat_completion();
        config.tokens_per_minute = 0;
        assert!(config.validate().is_err());

        let mut config = QueueConfig::chat_completion();
        config.short_window_secs = 61;
        assert!(config.validate().is_err());

        let mut config = QueueConfig::chat_completion();
        config.max_pending_tasks = 0;
        assert!(config.validate().is_err());

        let mut config = QueueConfig::chat_completion();
        config.poll_interval_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_oversized_budget_is_rejected_not_overflowed() {
        let mut config = QueueConfig::chat_completion();
        config
            .apply_overrides(|key| {
                (key == ENV_TOKENS_PER_MINUTE).then(|| u64::MAX.to_string())
            })
            .unwrap();
        assert_eq!(config.short_window_budget(), u64::MAX / MINUTE_SECS);
        let err = config.validate().unwrap_err();
        assert!(matches!(err, QueueError::Config(_)));
        assert!(err.to_string().contains("too large"));

        // The largest budget a 60s window can hold is still valid.
        config.short_window_secs = MINUTE_SECS;
        config.tokens_per_minute = u64::MAX / MINUTE_SECS;
        assert!(config.validate().is_ok());
    }
}
