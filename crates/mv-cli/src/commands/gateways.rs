//! Gateways command implementation

use anyhow::Result;

use mv_core::config::ClientConfig;
use mv_core::GatewayType;
use mv_orchestrator::FetchSource;

use super::open_context;
use crate::output::{format_gateways, print_warning};

/// Execute the gateways command
pub async fn gateways_command(config: &ClientConfig, kind: GatewayType) -> Result<()> {
    let (context, _) = open_context(config).await?;

    let fetch = context.fetch_gateways(kind).await;
    if let Some(error) = fetch.error {
        print_warning(&format!("Gateway directory unavailable ({})", error));
    }
    if fetch.source == FetchSource::Stale {
        print_warning("Showing an outdated gateway list");
    }

    println!("{} gateways:", kind);
    println!("{}", format_gateways(&fetch.gateways));

    context.shutdown();
    Ok(())
}
