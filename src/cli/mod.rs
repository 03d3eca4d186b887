//! Command handlers for the `ratequeue` binary.

pub(crate) mod config;
pub(crate) mod run;

use std::path::Path;

use anyhow::{Context, Result};

use ratequeue::config::{Profile, QueueConfig};

/// Resolves the effective configuration for a command.
///
/// An explicit `--config` file must exist. Otherwise the default config file
/// is used when present, else the profile preset. Environment overrides are
/// applied last.
pub(crate) fn resolve_config(profile: Profile, path: Option<&Path>) -> Result<QueueConfig> {
    let mut config = match path {
        Some(path) => QueueConfig::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => {
            let default_path = QueueConfig::default_path();
            if default_path.exists() {
                QueueConfig::load(&default_path).with_context(|| {
                    format!("Failed to load config from {}", default_path.display())
                })?
            } else {
                profile.config()
            }
        }
    };

    config
        .apply_env_overrides()
        .with_context(|| "Invalid RATEQUEUE_* environment override")?;
    config.validate()?;
    Ok(config)
}

/// Parses the `--profile` argument.
pub(crate) fn parse_profile(name: &str) -> Result<Profile> {
    Profile::from_name(name)
        .with_context(|| format!("Unknown profile '{}'. Use chat or embeddings", name))
}
