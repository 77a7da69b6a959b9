//! Wire protocol between the client and the local tunnel daemon
//!
//! Newline-delimited JSON over TCP on localhost. Each request gets exactly
//! one response line. A connection that sends [`DaemonRequest::Subscribe`]
//! is switched to event mode and afterwards carries one
//! [`TunnelEvent`](crate::traits::TunnelEvent) per line.

use serde::{Deserialize, Serialize};

use crate::error::BackendError;
use crate::types::{
    BackendInfo, ConnectionData, GatewayRecord, GatewayType, NetworkEnvironment, TunnelState,
    UserAgent,
};

/// Request from client to daemon
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DaemonRequest {
    /// Exchange versions
    Handshake { client_version: String },

    /// Bring the tunnel up
    Connect,

    /// Take the tunnel down
    Disconnect,

    /// Read the current tunnel state
    GetTunnelState,

    /// Query the gateway directory
    ListGateways {
        kind: GatewayType,
        user_agent: UserAgent,
    },

    /// Store an account mnemonic
    StoreAccount { mnemonic: String },

    /// Remove the stored account
    ForgetAccount,

    /// Check whether an account is stored
    IsAccountStored,

    /// Read the account identifier
    GetAccountId,

    /// Read the device identifier
    GetDeviceId,

    /// Switch network environment
    SetNetwork { environment: NetworkEnvironment },

    /// Switch this connection to event streaming
    Subscribe,
}

/// Response from daemon to client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DaemonResponse {
    /// Handshake result
    Info(BackendInfo),

    /// Generic success
    Ok,

    /// Current tunnel state
    TunnelState {
        state: TunnelState,
        connection: Option<ConnectionData>,
    },

    /// Gateway directory listing
    Gateways { gateways: Vec<GatewayRecord> },

    /// Account presence
    Stored { stored: bool },

    /// Account or device identifier
    Identity { value: Option<String> },

    /// Request failed
    Error { error: BackendError },
}

impl DaemonRequest {
    /// Encode as a single JSON line (without the newline)
    pub fn to_line(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Decode from a single JSON line
    pub fn from_line(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line)
    }
}

impl DaemonResponse {
    /// Encode as a single JSON line (without the newline)
    pub fn to_line(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Decode from a single JSON line
    pub fn from_line(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line)
    }
}
