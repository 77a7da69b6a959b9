//! Select command implementation
//!
//! Writes the selection file directly; no daemon connection is needed. The
//! choice is checked against the gateway list on the next fetch.

use std::path::Path;

use anyhow::{Context, Result};

use mv_core::traits::SettingsStore;
use mv_core::{NodeHop, NodeLocation};
use mv_orchestrator::TomlSettingsStore;

use crate::output::print_success;

/// Execute the select command
pub async fn select_command(selection_path: &Path, hop: NodeHop, node: &str) -> Result<()> {
    let node = NodeLocation::parse(node);
    let store = TomlSettingsStore::new(selection_path);
    store
        .store_node(hop, &node)
        .await
        .with_context(|| format!("Failed to save selection to {:?}", selection_path))?;

    print_success(&format!("{} node set to {}", hop, node));
    Ok(())
}
