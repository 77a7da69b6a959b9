//! Persisted user settings

use async_trait::async_trait;

use crate::error::SettingsError;
use crate::types::{NodeHop, NodeLocation};

/// Storage for the selected entry and exit nodes
#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// Load the persisted node for a hop
    async fn load_node(&self, hop: NodeHop) -> Result<Option<NodeLocation>, SettingsError>;

    /// Persist the node for a hop
    async fn store_node(&self, hop: NodeHop, node: &NodeLocation) -> Result<(), SettingsError>;
}
