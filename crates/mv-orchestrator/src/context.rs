//! Application context
//!
//! Owns one instance of every session-layer component and wires them
//! together. Platforms build one of these at startup and hand it to their UI
//! layer; nothing in this crate is global.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::instrument;

use mv_core::config::ClientConfig;
use mv_core::error::SettingsError;
use mv_core::traits::{Backend, NetworkEventSource, SettingsStore};
use mv_core::types::{BackendInfo, NetworkEnvironment};
use mv_core::{AccountError, GatewayType, MvError, NodeHop, NodeLocation, SessionError, TunnelState};

use crate::account::CredentialGate;
use crate::cache::GatewayCache;
use crate::gateways::{GatewayDirectory, GatewayFetch};
use crate::monitor::NetworkMonitor;
use crate::retry::RetryPolicy;
use crate::session::{CommandOutcome, SessionOrchestrator, SessionStateStream};

/// Explicit dependency container for the session layer
pub struct AppContext {
    config: ClientConfig,
    backend: Arc<dyn Backend>,
    retry: RetryPolicy,
    cache: Arc<GatewayCache>,
    monitor: NetworkMonitor,
    session: SessionOrchestrator,
    gateways: GatewayDirectory,
    account: CredentialGate,
    connectivity_attached: AtomicBool,
}

impl AppContext {
    /// Build all components
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(
        config: ClientConfig,
        backend: Arc<dyn Backend>,
        network: Arc<dyn NetworkEventSource>,
        settings: Arc<dyn SettingsStore>,
    ) -> Self {
        let retry = RetryPolicy::from_config(&config.backend);
        let cache = Arc::new(GatewayCache::new());
        let monitor = NetworkMonitor::new(network, &config.monitor);
        let session = SessionOrchestrator::spawn(backend.clone(), &config);
        let gateways = GatewayDirectory::new(
            backend.clone(),
            cache.clone(),
            settings,
            retry.clone(),
            config.gateways.clone(),
            config.user_agent.clone(),
        );
        let account = CredentialGate::new(
            backend.clone(),
            cache.clone(),
            session.clone(),
            retry.clone(),
            &config.account,
        );

        Self {
            config,
            backend,
            retry,
            cache,
            monitor,
            session,
            gateways,
            account,
            connectivity_attached: AtomicBool::new(false),
        }
    }

    /// Handshake, start following connectivity, restore settings
    #[instrument(skip_all)]
    pub async fn start(&self) -> Result<BackendInfo, MvError> {
        let info = self.session.initialize().await?;

        if !self.connectivity_attached.swap(true, Ordering::SeqCst) {
            self.session.attach_connectivity(self.monitor.observe());
        }
        self.gateways.load_selection().await;
        if let Err(e) = self.account.refresh().await {
            tracing::warn!("Failed to read credential status: {}", e);
        }

        tracing::info!(environment = %info.environment, "Client session layer started");
        Ok(info)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn session(&self) -> &SessionOrchestrator {
        &self.session
    }

    pub fn gateways(&self) -> &GatewayDirectory {
        &self.gateways
    }

    pub fn account(&self) -> &CredentialGate {
        &self.account
    }

    pub fn cache(&self) -> &Arc<GatewayCache> {
        &self.cache
    }

    pub fn observe_session_state(&self) -> SessionStateStream {
        self.session.observe()
    }

    pub async fn start_tunnel(&self) -> Result<CommandOutcome, SessionError> {
        self.session.start_tunnel().await
    }

    pub async fn stop_tunnel(&self) -> Result<CommandOutcome, SessionError> {
        self.session.stop_tunnel().await
    }

    pub async fn import_credential(&self, secret: &str) -> Result<(), AccountError> {
        self.account.import_credential(secret).await
    }

    pub async fn logout(&self) -> Result<(), AccountError> {
        self.account.logout().await
    }

    pub async fn fetch_gateways(&self, kind: GatewayType) -> GatewayFetch {
        self.gateways.fetch(kind).await
    }

    pub async fn select_node(&self, hop: NodeHop, node: NodeLocation) -> Result<(), SettingsError> {
        self.gateways.select(hop, node).await
    }

    /// Switch network environment
    ///
    /// Only allowed while the tunnel is down. Every cached gateway list and
    /// identifier belongs to the old environment and is dropped.
    #[instrument(skip(self))]
    pub async fn set_environment(
        &self,
        environment: NetworkEnvironment,
    ) -> Result<(), SessionError> {
        let state = self.session.state().tunnel_state;
        if state != TunnelState::Down {
            return Err(SessionError::TunnelActive(state));
        }

        let backend = &self.backend;
        self.retry
            .run("set environment", || backend.set_environment(environment))
            .await?;
        self.cache.invalidate_gateways().await;
        tracing::info!("Switched to {} environment", environment);
        Ok(())
    }

    pub fn shutdown(&self) {
        self.session.shutdown();
    }
}
