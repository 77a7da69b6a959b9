//! Status command implementation

use anyhow::Result;

use mv_core::config::ClientConfig;

use super::open_context;
use crate::output::format_status;

/// Execute the status command
pub async fn status_command(config: &ClientConfig) -> Result<()> {
    let (context, info) = open_context(config).await?;

    let state = context.session().state();
    let selection = context.gateways().selection().await;
    println!("{}", format_status(&state, &selection, Some(&info)));

    context.shutdown();
    Ok(())
}
