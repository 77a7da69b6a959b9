//! Client configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::serde_utils::{duration_millis, duration_secs};
use crate::types::{NetworkEnvironment, NodeLocation, UserAgent};

/// Configuration for the mixvpn client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Address of the local tunnel daemon
    pub daemon_address: String,

    /// Network environment to use
    pub environment: NetworkEnvironment,

    /// Identification sent with directory queries
    pub user_agent: UserAgent,

    pub session: SessionConfig,
    pub monitor: MonitorConfig,
    pub gateways: GatewayConfig,
    pub backend: BackendRetryConfig,
    pub account: AccountConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            daemon_address: "127.0.0.1:44190".to_string(),
            environment: NetworkEnvironment::default(),
            user_agent: UserAgent::default(),
            session: SessionConfig::default(),
            monitor: MonitorConfig::default(),
            gateways: GatewayConfig::default(),
            backend: BackendRetryConfig::default(),
            account: AccountConfig::default(),
        }
    }
}

/// Tunnel session behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// How long a command may wait for a stable state
    #[serde(with = "duration_secs")]
    pub watchdog_timeout: Duration,

    /// Restart the tunnel when connectivity returns
    pub always_on: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            watchdog_timeout: Duration::from_secs(60),
            always_on: false,
        }
    }
}

/// Connectivity monitor behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Quiet window before a connectivity change is delivered
    #[serde(with = "duration_millis")]
    pub debounce: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(500),
        }
    }
}

/// Gateway directory behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Time-to-live of cached gateway lists
    #[serde(with = "duration_secs")]
    pub cache_ttl: Duration,

    /// Node used when a selected node disappears
    pub default_node: NodeLocation,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            cache_ttl: Duration::from_secs(120),
            default_node: NodeLocation::Country("CH".to_string()),
        }
    }
}

/// Retry policy for unreachable-backend failures
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendRetryConfig {
    /// Total attempts including the first
    pub max_attempts: u32,

    pub backoff: BackoffConfig,
}

impl Default for BackendRetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: BackoffConfig::default(),
        }
    }
}

/// Exponential backoff configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackoffConfig {
    /// Initial delay
    #[serde(with = "duration_millis")]
    pub initial: Duration,

    /// Maximum delay
    #[serde(with = "duration_millis")]
    pub max: Duration,

    /// Multiplier for each retry
    pub multiplier: f64,

    /// Jitter factor (0.0 to 1.0)
    pub jitter: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(500),
            max: Duration::from_secs(10),
            multiplier: 2.0,
            jitter: 0.25,
        }
    }
}

/// What happens to a stored credential when registration hits the device limit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MaxDevicesPolicy {
    /// Leave whatever the backend stored in place
    #[default]
    KeepCredential,
    /// Remove the partially registered credential
    ClearCredential,
}

/// Account behaviour
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AccountConfig {
    pub max_devices_policy: MaxDevicesPolicy,
}
