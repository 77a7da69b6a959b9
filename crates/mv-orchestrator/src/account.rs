//! Account and credential gate
//!
//! Tracks whether a usable credential is stored and keeps tunnel start
//! blocked until it is. Credential format is checked locally before the
//! backend ever sees it.

use std::sync::Arc;
use tracing::instrument;

use mv_core::config::{AccountConfig, MaxDevicesPolicy};
use mv_core::traits::Backend;
use mv_core::{AccountError, BackendError, ErrorCategory, SessionError, TunnelState};

use crate::cache::{CacheKey, GatewayCache};
use crate::retry::RetryPolicy;
use crate::session::SessionOrchestrator;

/// Validate a BIP-39 mnemonic without touching the backend
///
/// Whitespace is normalized and case is folded before parsing.
pub fn validate_mnemonic(input: &str) -> Result<String, AccountError> {
    let normalized = input
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();
    if normalized.is_empty() {
        return Err(AccountError::InvalidMnemonic("empty mnemonic".to_string()));
    }
    bip39::Mnemonic::parse_normalized(&normalized)
        .map_err(|e| AccountError::InvalidMnemonic(e.to_string()))?;
    Ok(normalized)
}

/// Gate between the stored credential and the tunnel
#[derive(Clone)]
pub struct CredentialGate {
    backend: Arc<dyn Backend>,
    cache: Arc<GatewayCache>,
    session: SessionOrchestrator,
    retry: RetryPolicy,
    policy: MaxDevicesPolicy,
}

impl CredentialGate {
    pub fn new(
        backend: Arc<dyn Backend>,
        cache: Arc<GatewayCache>,
        session: SessionOrchestrator,
        retry: RetryPolicy,
        config: &AccountConfig,
    ) -> Self {
        Self {
            backend,
            cache,
            session,
            retry,
            policy: config.max_devices_policy,
        }
    }

    /// Whether a usable credential is stored
    pub fn is_usable(&self) -> bool {
        self.session.state().is_account_usable
    }

    /// Re-read credential presence from the backend
    #[instrument(skip_all)]
    pub async fn refresh(&self) -> Result<bool, AccountError> {
        let backend = &self.backend;
        let stored = self
            .retry
            .run("check credential", || backend.is_credential_stored())
            .await?;
        self.session
            .set_account_usable(stored)
            .await
            .map_err(session_to_account)?;
        tracing::debug!(stored, "Credential status refreshed");
        Ok(stored)
    }

    /// Validate and store a credential
    #[instrument(skip_all)]
    pub async fn import_credential(&self, secret: &str) -> Result<(), AccountError> {
        self.ensure_down()?;

        let mnemonic = match validate_mnemonic(secret) {
            Ok(m) => m,
            Err(e) => {
                self.report(Some(ErrorCategory::InvalidMnemonic)).await?;
                return Err(e);
            }
        };

        let backend = &self.backend;
        let result = self
            .retry
            .run("store credential", || backend.store_credential(&mnemonic))
            .await;

        match result {
            Ok(()) => {
                self.cache.invalidate_identity().await;
                self.session
                    .set_account_usable(true)
                    .await
                    .map_err(session_to_account)?;
                self.report(None).await?;
                tracing::info!("Credential stored");
                Ok(())
            }
            Err(e) => {
                let error = classify_store_error(e);
                if let Some(category) = error.category() {
                    self.report(Some(category)).await?;
                }
                if matches!(error, AccountError::MaxDevicesReached) {
                    self.apply_max_devices_policy().await;
                }
                tracing::warn!("Credential import failed: {}", error);
                Err(error)
            }
        }
    }

    /// Remove the stored credential
    ///
    /// Identity caches are dropped and the account marked unusable even when
    /// the backend removal fails; that failure is still returned.
    #[instrument(skip_all)]
    pub async fn logout(&self) -> Result<(), AccountError> {
        self.ensure_down()?;

        let backend = &self.backend;
        let result = self
            .retry
            .run("remove credential", || backend.remove_credential())
            .await;

        self.cache.invalidate_identity().await;
        self.session
            .set_account_usable(false)
            .await
            .map_err(session_to_account)?;

        match result {
            Ok(()) => {
                tracing::info!("Credential removed");
                Ok(())
            }
            Err(e) => {
                tracing::warn!("Backend failed to remove credential: {}", e);
                Err(e.into())
            }
        }
    }

    /// Account identifier, read through the identity cache
    pub async fn account_id(&self) -> Result<Option<String>, AccountError> {
        self.cached_identity(CacheKey::AccountId).await
    }

    /// Device identifier, read through the identity cache
    pub async fn device_id(&self) -> Result<Option<String>, AccountError> {
        self.cached_identity(CacheKey::DeviceId).await
    }

    async fn cached_identity(&self, key: CacheKey) -> Result<Option<String>, AccountError> {
        if let Some(id) = self.cache.get::<String>(key, false).await {
            return Ok(Some(id));
        }

        let backend = &self.backend;
        let id = match key {
            CacheKey::DeviceId => self.retry.run("device id", || backend.device_id()).await?,
            _ => self.retry.run("account id", || backend.account_id()).await?,
        };

        if let Some(ref id) = id {
            if let Err(e) = self.cache.set(key, id, None).await {
                tracing::warn!(key = %key, "Failed to cache identity: {}", e);
            }
        }
        Ok(id)
    }

    fn ensure_down(&self) -> Result<(), AccountError> {
        match self.session.state().tunnel_state {
            TunnelState::Down => Ok(()),
            state => Err(AccountError::TunnelActive(state)),
        }
    }

    async fn report(&self, category: Option<ErrorCategory>) -> Result<(), AccountError> {
        self.session
            .set_last_error(category)
            .await
            .map_err(session_to_account)
    }

    async fn apply_max_devices_policy(&self) {
        if self.policy != MaxDevicesPolicy::ClearCredential {
            return;
        }
        tracing::info!("Device limit reached, removing partially stored credential");
        if let Err(e) = self.backend.remove_credential().await {
            tracing::warn!("Failed to remove credential after device limit: {}", e);
        }
        self.cache.invalidate_identity().await;
        if let Err(e) = self.session.set_account_usable(false).await {
            tracing::warn!("Failed to mark account unusable: {}", e);
        }
    }
}

fn classify_store_error(error: BackendError) -> AccountError {
    match error.category() {
        ErrorCategory::InvalidMnemonic => match error {
            BackendError::InvalidMnemonic(detail) => AccountError::InvalidMnemonic(detail),
            other => AccountError::InvalidMnemonic(other.to_string()),
        },
        ErrorCategory::MaxDevicesReached => AccountError::MaxDevicesReached,
        _ => AccountError::Backend(error),
    }
}

fn session_to_account(error: SessionError) -> AccountError {
    match error {
        SessionError::Backend(e) => AccountError::Backend(e),
        SessionError::TunnelActive(state) => AccountError::TunnelActive(state),
        _ => AccountError::Stopped,
    }
}
