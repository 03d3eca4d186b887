//! Config command: print the effective queue configuration.

use std::path::PathBuf;

use anyhow::{Context, Result};

use super::{parse_profile, resolve_config};

pub(crate) fn cmd_config(profile: String, path: Option<PathBuf>) -> Result<()> {
    let profile = parse_profile(&profile)?;
    let config = resolve_config(profile, path.as_deref())?;
    let json =
        serde_json::to_string_pretty(&config).with_context(|| "Failed to serialize config")?;
    println!("{}", json);
    Ok(())
}
