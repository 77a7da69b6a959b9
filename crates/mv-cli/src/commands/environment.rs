//! Env command implementation

use std::path::Path;

use anyhow::{Context, Result};

use mv_core::config::{save_config, ClientConfig};
use mv_core::types::NetworkEnvironment;

use super::open_context;
use crate::output::{print_error, print_success};

/// Switch the daemon to another network environment and remember it
pub async fn env_command(
    config: &ClientConfig,
    config_path: &Path,
    environment: NetworkEnvironment,
) -> Result<()> {
    let (context, _) = open_context(config).await?;

    let result = context.set_environment(environment).await;
    context.shutdown();
    if let Err(e) = result {
        print_error(&format!("Failed to switch environment: {}", e));
        return Err(e.into());
    }

    let mut updated = config.clone();
    updated.environment = environment;
    save_config(config_path, &updated)
        .with_context(|| format!("Failed to save config to {:?}", config_path))?;

    print_success(&format!("Switched to {}", environment));
    Ok(())
}
