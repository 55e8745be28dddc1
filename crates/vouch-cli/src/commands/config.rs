//! Configuration loading and display

use anyhow::{Context, Result};
use std::path::Path;
use vouch_core::TrustConfig;

/// Defaults, then the optional file, then `VOUCH_*` overrides, then validation
pub fn load_config(path: Option<&Path>) -> Result<TrustConfig> {
    let mut config = match path {
        Some(path) => TrustConfig::load_from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => TrustConfig::default(),
    };
    config
        .merge_with_env()
        .context("Invalid environment override")?;
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

/// Print the effective configuration as TOML
pub fn handle_config_command(config: &TrustConfig) -> Result<()> {
    print!("{}", config.to_toml_string()?);
    Ok(())
}
