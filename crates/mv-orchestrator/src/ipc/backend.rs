//! [`Backend`] implementation over the daemon socket

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_util::codec::{Framed, LinesCodec};

use mv_core::ipc::{DaemonRequest, DaemonResponse};
use mv_core::traits::{Backend, TunnelEvent, TunnelEventStream};
use mv_core::types::{BackendInfo, NetworkEnvironment, Transport, UserAgent};
use mv_core::{BackendError, GatewayRecord, GatewayType, TunnelState};

/// Largest accepted line; gateway listings can be large
const MAX_LINE_LENGTH: usize = 8 * 1024 * 1024;

/// Default per-request timeout
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

type Connection = Framed<TcpStream, LinesCodec>;

/// Client for the local tunnel daemon
///
/// Requests share one lazily opened connection; a transport failure drops
/// it and the next request reconnects. Event subscriptions use their own
/// connection.
pub struct IpcBackend {
    address: String,
    client_version: String,
    timeout: Duration,
    connection: Mutex<Option<Connection>>,
}

impl IpcBackend {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            client_version: env!("CARGO_PKG_VERSION").to_string(),
            timeout: DEFAULT_REQUEST_TIMEOUT,
            connection: Mutex::new(None),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_client_version(mut self, version: impl Into<String>) -> Self {
        self.client_version = version.into();
        self
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    async fn open(&self) -> Result<Connection, BackendError> {
        tracing::debug!("Connecting to daemon at {}", self.address);
        let stream = tokio::time::timeout(self.timeout, TcpStream::connect(&self.address))
            .await
            .map_err(|_| unreachable_err(&self.address, "connect timed out"))?
            .map_err(|e| unreachable_err(&self.address, e))?;
        Ok(Framed::new(
            stream,
            LinesCodec::new_with_max_length(MAX_LINE_LENGTH),
        ))
    }

    async fn request(&self, request: DaemonRequest) -> Result<DaemonResponse, BackendError> {
        let mut guard = self.connection.lock().await;
        if guard.is_none() {
            *guard = Some(self.open().await?);
        }
        let Some(connection) = guard.as_mut() else {
            return Err(unreachable_err(&self.address, "no connection"));
        };

        let result = tokio::time::timeout(self.timeout, exchange(connection, &request)).await;
        let response = match result {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                *guard = None;
                return Err(e);
            }
            Err(_) => {
                *guard = None;
                return Err(BackendError::Timeout);
            }
        };

        match response {
            DaemonResponse::Error { error } => Err(error),
            other => Ok(other),
        }
    }
}

async fn exchange(
    connection: &mut Connection,
    request: &DaemonRequest,
) -> Result<DaemonResponse, BackendError> {
    let line = request
        .to_line()
        .map_err(|e| BackendError::Internal(format!("Failed to encode request: {}", e)))?;
    connection
        .send(line)
        .await
        .map_err(|e| BackendError::Unreachable(format!("send failed: {}", e)))?;

    match connection.next().await {
        Some(Ok(line)) => DaemonResponse::from_line(&line)
            .map_err(|e| BackendError::Internal(format!("Malformed daemon response: {}", e))),
        Some(Err(e)) => Err(BackendError::Unreachable(format!("read failed: {}", e))),
        None => Err(BackendError::Unreachable(
            "daemon closed the connection".to_string(),
        )),
    }
}

fn unreachable_err(address: &str, cause: impl std::fmt::Display) -> BackendError {
    BackendError::Unreachable(format!("{} ({})", address, cause))
}

fn unexpected(response: DaemonResponse) -> BackendError {
    BackendError::Internal(format!("Unexpected response: {:?}", response))
}

fn expect_ok(response: DaemonResponse) -> Result<(), BackendError> {
    match response {
        DaemonResponse::Ok => Ok(()),
        other => Err(unexpected(other)),
    }
}

#[async_trait]
impl Backend for IpcBackend {
    fn transport(&self) -> Transport {
        Transport::Ipc
    }

    async fn handshake(&self) -> Result<BackendInfo, BackendError> {
        let request = DaemonRequest::Handshake {
            client_version: self.client_version.clone(),
        };
        match self.request(request).await? {
            DaemonResponse::Info(info) => Ok(info),
            other => Err(unexpected(other)),
        }
    }

    async fn start_tunnel(&self) -> Result<(), BackendError> {
        expect_ok(self.request(DaemonRequest::Connect).await?)
    }

    async fn stop_tunnel(&self) -> Result<(), BackendError> {
        expect_ok(self.request(DaemonRequest::Disconnect).await?)
    }

    async fn get_state(&self) -> Result<TunnelState, BackendError> {
        match self.request(DaemonRequest::GetTunnelState).await? {
            DaemonResponse::TunnelState { state, .. } => Ok(state),
            other => Err(unexpected(other)),
        }
    }

    async fn tunnel_events(&self) -> Result<TunnelEventStream, BackendError> {
        let mut connection = self.open().await?;
        let ack = tokio::time::timeout(
            self.timeout,
            exchange(&mut connection, &DaemonRequest::Subscribe),
        )
        .await
        .map_err(|_| BackendError::Timeout)??;
        match ack {
            DaemonResponse::Ok => {}
            DaemonResponse::Error { error } => return Err(error),
            other => return Err(unexpected(other)),
        }
        tracing::debug!("Subscribed to daemon events");

        let events = connection.filter_map(|line| async move {
            match line {
                Ok(line) => match serde_json::from_str::<TunnelEvent>(&line) {
                    Ok(event) => Some(event),
                    Err(e) => {
                        tracing::warn!("Skipping malformed daemon event: {}", e);
                        None
                    }
                },
                Err(e) => {
                    tracing::warn!("Daemon event stream error: {}", e);
                    None
                }
            }
        });
        Ok(events.boxed())
    }

    async fn get_gateway_list(
        &self,
        kind: GatewayType,
        user_agent: &UserAgent,
    ) -> Result<Vec<GatewayRecord>, BackendError> {
        let request = DaemonRequest::ListGateways {
            kind,
            user_agent: user_agent.clone(),
        };
        match self.request(request).await? {
            DaemonResponse::Gateways { gateways } => Ok(gateways),
            other => Err(unexpected(other)),
        }
    }

    async fn store_credential(&self, secret: &str) -> Result<(), BackendError> {
        let request = DaemonRequest::StoreAccount {
            mnemonic: secret.to_string(),
        };
        expect_ok(self.request(request).await?)
    }

    async fn remove_credential(&self) -> Result<(), BackendError> {
        expect_ok(self.request(DaemonRequest::ForgetAccount).await?)
    }

    async fn is_credential_stored(&self) -> Result<bool, BackendError> {
        match self.request(DaemonRequest::IsAccountStored).await? {
            DaemonResponse::Stored { stored } => Ok(stored),
            other => Err(unexpected(other)),
        }
    }

    async fn account_id(&self) -> Result<Option<String>, BackendError> {
        match self.request(DaemonRequest::GetAccountId).await? {
            DaemonResponse::Identity { value } => Ok(value),
            other => Err(unexpected(other)),
        }
    }

    async fn device_id(&self) -> Result<Option<String>, BackendError> {
        match self.request(DaemonRequest::GetDeviceId).await? {
            DaemonResponse::Identity { value } => Ok(value),
            other => Err(unexpected(other)),
        }
    }

    async fn set_environment(&self, environment: NetworkEnvironment) -> Result<(), BackendError> {
        expect_ok(self.request(DaemonRequest::SetNetwork { environment }).await?)
    }
}
