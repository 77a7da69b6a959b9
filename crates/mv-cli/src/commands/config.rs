//! Config command implementations

use std::path::Path;

use anyhow::{Context, Result};

use mv_core::config::ClientConfig;

use crate::output::print_info;

/// Print the effective configuration as TOML
pub fn config_show(config: &ClientConfig, config_path: &Path) -> Result<()> {
    if !config_path.exists() {
        print_info(&format!(
            "No config file at {:?}, showing defaults",
            config_path
        ));
    }
    let rendered =
        toml::to_string_pretty(config).context("Failed to serialize configuration")?;
    println!("{}", rendered);
    Ok(())
}

/// Print the config file path
pub fn config_path(config_path: &Path) -> Result<()> {
    println!("{}", config_path.display());
    Ok(())
}
