//! Native tunnel backend capability surface

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::error::BackendError;
use crate::types::{
    BackendInfo, ConnectionData, GatewayRecord, GatewayType, NetworkEnvironment, Transport,
    TunnelState, UserAgent,
};

/// Push notification from the backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TunnelEvent {
    /// The backend moved to a new tunnel state
    StateChanged {
        state: TunnelState,
        #[serde(default)]
        connection: Option<ConnectionData>,
    },
    /// The backend hit an error
    Error { error: BackendError },
}

/// Stream of backend push notifications
pub type TunnelEventStream = BoxStream<'static, TunnelEvent>;

/// Black-box tunnel engine
///
/// Every platform binds this once: in-process bindings, a local daemon
/// socket, or a test double. All calls may fail with a typed
/// [`BackendError`].
#[async_trait]
pub trait Backend: Send + Sync {
    /// How this backend is reached
    fn transport(&self) -> Transport;

    /// Establish contact and report versions
    async fn handshake(&self) -> Result<BackendInfo, BackendError>;

    /// Begin bringing the tunnel up
    async fn start_tunnel(&self) -> Result<(), BackendError>;

    /// Begin tearing the tunnel down
    async fn stop_tunnel(&self) -> Result<(), BackendError>;

    /// Current tunnel state
    async fn get_state(&self) -> Result<TunnelState, BackendError>;

    /// Subscribe to tunnel events
    async fn tunnel_events(&self) -> Result<TunnelEventStream, BackendError>;

    /// Query the gateway directory
    async fn get_gateway_list(
        &self,
        kind: GatewayType,
        user_agent: &UserAgent,
    ) -> Result<Vec<GatewayRecord>, BackendError>;

    /// Store an account credential
    async fn store_credential(&self, secret: &str) -> Result<(), BackendError>;

    /// Remove the stored credential
    async fn remove_credential(&self) -> Result<(), BackendError>;

    /// Whether a credential is stored
    async fn is_credential_stored(&self) -> Result<bool, BackendError>;

    /// Account identifier derived from the stored credential
    async fn account_id(&self) -> Result<Option<String>, BackendError>;

    /// Identifier of this registered device
    async fn device_id(&self) -> Result<Option<String>, BackendError>;

    /// Switch the backend to another network environment
    async fn set_environment(&self, environment: NetworkEnvironment) -> Result<(), BackendError>;
}
