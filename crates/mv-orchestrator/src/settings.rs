//! [`SettingsStore`] implementations

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

use mv_core::config::{load_config_or_default, save_config};
use mv_core::error::SettingsError;
use mv_core::traits::SettingsStore;
use mv_core::{NodeHop, NodeLocation};

/// Volatile settings, lost on exit
#[derive(Debug, Default)]
pub struct MemorySettings {
    nodes: DashMap<NodeHop, NodeLocation>,
}

impl MemorySettings {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SettingsStore for MemorySettings {
    async fn load_node(&self, hop: NodeHop) -> Result<Option<NodeLocation>, SettingsError> {
        Ok(self.nodes.get(&hop).map(|node| node.value().clone()))
    }

    async fn store_node(&self, hop: NodeHop, node: &NodeLocation) -> Result<(), SettingsError> {
        self.nodes.insert(hop, node.clone());
        Ok(())
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
struct SelectionFile {
    entry: Option<NodeLocation>,
    exit: Option<NodeLocation>,
}

/// Node selection persisted in a TOML file
#[derive(Debug)]
pub struct TomlSettingsStore {
    path: PathBuf,
    /// Serializes read-modify-write of the file
    lock: Mutex<()>,
}

impl TomlSettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl SettingsStore for TomlSettingsStore {
    async fn load_node(&self, hop: NodeHop) -> Result<Option<NodeLocation>, SettingsError> {
        let _lock = self.lock.lock().await;
        let file: SelectionFile = load_config_or_default(&self.path)?;
        Ok(match hop {
            NodeHop::Entry => file.entry,
            NodeHop::Exit => file.exit,
        })
    }

    async fn store_node(&self, hop: NodeHop, node: &NodeLocation) -> Result<(), SettingsError> {
        let _lock = self.lock.lock().await;
        let mut file: SelectionFile = load_config_or_default(&self.path)?;
        match hop {
            NodeHop::Entry => file.entry = Some(node.clone()),
            NodeHop::Exit => file.exit = Some(node.clone()),
        }
        save_config(&self.path, &file)?;
        Ok(())
    }
}
