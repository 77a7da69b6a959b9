//! Gateway directory
//!
//! Fetch policy over the cache and the backend, plus reconciliation of the
//! selected entry and exit nodes against whatever list was obtained.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::instrument;

use mv_core::config::GatewayConfig;
use mv_core::error::SettingsError;
use mv_core::traits::{Backend, SettingsStore};
use mv_core::types::{NodeSelection, UserAgent};
use mv_core::{ErrorCategory, GatewayRecord, GatewayType, NodeHop, NodeLocation};

use crate::cache::{CacheKey, GatewayCache};
use crate::retry::RetryPolicy;

/// Where a gateway list came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchSource {
    /// Fresh cache entry
    Cache,
    /// Backend directory query
    Backend,
    /// Expired cache entry after a backend failure
    Stale,
    /// Nothing available
    Empty,
}

/// Outcome of a gateway list fetch
#[derive(Debug, Clone)]
pub struct GatewayFetch {
    pub gateways: Vec<GatewayRecord>,
    pub source: FetchSource,
    /// Set only for user-visible failures
    pub error: Option<ErrorCategory>,
}

/// Gateway lists and node selection
pub struct GatewayDirectory {
    backend: Arc<dyn Backend>,
    cache: Arc<GatewayCache>,
    settings: Arc<dyn SettingsStore>,
    retry: RetryPolicy,
    config: GatewayConfig,
    user_agent: UserAgent,
    selection: RwLock<NodeSelection>,
    fetch_locks: HashMap<GatewayType, Mutex<()>>,
}

impl GatewayDirectory {
    pub fn new(
        backend: Arc<dyn Backend>,
        cache: Arc<GatewayCache>,
        settings: Arc<dyn SettingsStore>,
        retry: RetryPolicy,
        config: GatewayConfig,
        user_agent: UserAgent,
    ) -> Self {
        let selection = NodeSelection::uniform(config.default_node.clone());
        Self {
            backend,
            cache,
            settings,
            retry,
            config,
            user_agent,
            selection: RwLock::new(selection),
            fetch_locks: GatewayType::ALL
                .iter()
                .map(|kind| (*kind, Mutex::new(())))
                .collect(),
        }
    }

    /// Fetch a gateway list: cache, then backend, then stale fallback
    ///
    /// Only [`GatewayType::MxEntry`] failures are surfaced; other kinds
    /// degrade to an empty list.
    #[instrument(skip(self))]
    pub async fn fetch(&self, kind: GatewayType) -> GatewayFetch {
        // Concurrent fetches of one kind collapse onto a single backend query
        let _fetching = match self.fetch_locks.get(&kind) {
            Some(lock) => Some(lock.lock().await),
            None => None,
        };
        let key = CacheKey::from(kind);

        // An expired list stays put until the backend has answered
        if let Some(gateways) = self.cache.get_fresh::<Vec<GatewayRecord>>(key).await {
            tracing::debug!(count = gateways.len(), "Gateway list served from cache");
            self.reconcile(kind, &gateways).await;
            return GatewayFetch {
                gateways,
                source: FetchSource::Cache,
                error: None,
            };
        }

        let backend = &self.backend;
        let user_agent = &self.user_agent;
        let result = self
            .retry
            .run("gateway list", || backend.get_gateway_list(kind, user_agent))
            .await;

        match result {
            Ok(gateways) => {
                tracing::debug!(count = gateways.len(), "Gateway list fetched");
                if let Err(e) = self
                    .cache
                    .set(key, &gateways, Some(self.config.cache_ttl))
                    .await
                {
                    tracing::warn!("Failed to cache gateway list: {}", e);
                }
                self.reconcile(kind, &gateways).await;
                GatewayFetch {
                    gateways,
                    source: FetchSource::Backend,
                    error: None,
                }
            }
            Err(e) if kind == GatewayType::MxEntry => {
                let category = e.category();
                tracing::warn!(error = %category, "Failed to fetch {} gateways: {}", kind, e);
                match self.cache.get::<Vec<GatewayRecord>>(key, true).await {
                    Some(gateways) => GatewayFetch {
                        gateways,
                        source: FetchSource::Stale,
                        error: Some(category),
                    },
                    None => GatewayFetch {
                        gateways: Vec::new(),
                        source: FetchSource::Empty,
                        error: Some(category),
                    },
                }
            }
            Err(e) => {
                tracing::warn!("Failed to fetch {} gateways: {}", kind, e);
                GatewayFetch {
                    gateways: Vec::new(),
                    source: FetchSource::Empty,
                    error: None,
                }
            }
        }
    }

    /// Revert selected nodes that are missing from a non-empty list
    async fn reconcile(&self, kind: GatewayType, gateways: &[GatewayRecord]) {
        if gateways.is_empty() {
            return;
        }

        for hop in kind.hops() {
            let current = self.selection.read().await.get(*hop).clone();
            if current.exists_in(gateways) {
                continue;
            }

            let fallback = self.config.default_node.clone();
            tracing::info!(
                "Selected {} node {} is not in the {} list, reverting to {}",
                hop,
                current,
                kind,
                fallback
            );
            self.selection.write().await.set(*hop, fallback.clone());
            if let Err(e) = self.settings.store_node(*hop, &fallback).await {
                tracing::warn!("Failed to persist {} node: {}", hop, e);
            }
        }
    }

    /// Restore persisted node selection
    pub async fn load_selection(&self) {
        for hop in [NodeHop::Entry, NodeHop::Exit] {
            match self.settings.load_node(hop).await {
                Ok(Some(node)) => self.selection.write().await.set(hop, node),
                Ok(None) => {}
                Err(e) => tracing::warn!("Failed to load {} node: {}", hop, e),
            }
        }
    }

    /// Choose and persist a node
    pub async fn select(&self, hop: NodeHop, node: NodeLocation) -> Result<(), SettingsError> {
        self.settings.store_node(hop, &node).await?;
        self.selection.write().await.set(hop, node);
        Ok(())
    }

    /// Current entry and exit nodes
    pub async fn selection(&self) -> NodeSelection {
        self.selection.read().await.clone()
    }
}
