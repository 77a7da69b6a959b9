//! Core error types for mixvpn

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

use crate::types::{ErrorCategory, TunnelCommand, TunnelState};

/// Message id the daemon attaches to device-limit rejections
pub const MAX_DEVICES_ID_PATTERN: &str = "register-device.max-devices-exceeded";

/// Top-level error type for the mixvpn client
#[derive(Error, Debug)]
pub enum MvError {
    /// Backend error
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    /// Session error
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    /// Account error
    #[error("Account error: {0}")]
    Account(#[from] AccountError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Settings store error
    #[error("Settings error: {0}")]
    Settings(#[from] SettingsError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Typed failures reported by the native backend
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum BackendError {
    /// Backend could not be reached
    #[error("Backend unreachable: {0}")]
    Unreachable(String),

    /// Device has no network
    #[error("No network connectivity")]
    NetworkDown,

    /// Credential was rejected as malformed
    #[error("Invalid mnemonic: {0}")]
    InvalidMnemonic(String),

    /// Account has too many registered devices
    #[error("Maximum number of registered devices reached")]
    MaxDevicesReached,

    /// Entry and exit resolve to the same gateway
    #[error("Entry and exit gateway are the same")]
    SameEntryExitGateway,

    /// No entry gateway in the requested country
    #[error("Invalid entry gateway country: {0}")]
    InvalidEntryCountry(String),

    /// No exit gateway in the requested country
    #[error("Invalid exit gateway country: {0}")]
    InvalidExitCountry(String),

    /// Backend operation did not finish in time
    #[error("Backend operation timed out")]
    Timeout,

    /// Anything else
    #[error("{0}")]
    Internal(String),
}

impl BackendError {
    /// Only transport failures are worth retrying
    pub fn is_retryable(&self) -> bool {
        matches!(self, BackendError::Unreachable(_))
    }

    /// Map to the user-facing category
    pub fn category(&self) -> ErrorCategory {
        match self {
            BackendError::Unreachable(_) => ErrorCategory::BackendUnreachable,
            BackendError::NetworkDown => ErrorCategory::NetworkDown,
            BackendError::InvalidMnemonic(_) => ErrorCategory::InvalidMnemonic,
            BackendError::MaxDevicesReached => ErrorCategory::MaxDevicesReached,
            BackendError::SameEntryExitGateway => ErrorCategory::SameEntryExitGateway,
            BackendError::InvalidEntryCountry(_) => ErrorCategory::InvalidEntryCountry,
            BackendError::InvalidExitCountry(_) => ErrorCategory::InvalidExitCountry,
            BackendError::Timeout => ErrorCategory::Timeout,
            BackendError::Internal(msg) if msg.contains(MAX_DEVICES_ID_PATTERN) => {
                ErrorCategory::MaxDevicesReached
            }
            BackendError::Internal(_) => ErrorCategory::Unknown,
        }
    }
}

/// Tunnel command errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// Another command or transition is in progress
    #[error("Busy: cannot {command} while tunnel is {state}")]
    Busy {
        command: TunnelCommand,
        state: TunnelState,
    },

    /// No usable credential is stored
    #[error("No usable credential stored")]
    CredentialRequired,

    /// Backend handshake has not completed
    #[error("Backend not initialized")]
    NotInitialized,

    /// Tunnel is already down
    #[error("Tunnel is not running")]
    NotRunning,

    /// Orchestrator has shut down
    #[error("Session orchestrator stopped")]
    Stopped,

    /// Operation requires the tunnel to be down
    #[error("Tunnel must be down (currently {0})")]
    TunnelActive(TunnelState),

    /// Backend failure
    #[error("{0}")]
    Backend(#[from] BackendError),
}

/// Account and credential errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AccountError {
    /// Credential failed format validation
    #[error("Invalid mnemonic: {0}")]
    InvalidMnemonic(String),

    /// Account device limit reached
    #[error("Maximum number of registered devices reached")]
    MaxDevicesReached,

    /// Operation requires the tunnel to be down
    #[error("Tunnel must be down (currently {0})")]
    TunnelActive(TunnelState),

    /// Backend failure
    #[error("{0}")]
    Backend(#[from] BackendError),

    /// Orchestrator has shut down
    #[error("Session orchestrator stopped")]
    Stopped,
}

impl AccountError {
    /// User-facing category, if this error has one
    pub fn category(&self) -> Option<ErrorCategory> {
        match self {
            AccountError::InvalidMnemonic(_) => Some(ErrorCategory::InvalidMnemonic),
            AccountError::MaxDevicesReached => Some(ErrorCategory::MaxDevicesReached),
            AccountError::Backend(e) => Some(e.category()),
            AccountError::TunnelActive(_) | AccountError::Stopped => None,
        }
    }
}

/// Gateway cache errors
#[derive(Error, Debug)]
pub enum CacheError {
    /// Value could not be converted to a cacheable form
    #[error("Failed to serialize cache value: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Settings store errors
#[derive(Error, Debug)]
pub enum SettingsError {
    /// Underlying storage failed
    #[error("Settings storage failed: {0}")]
    Storage(String),

    /// Configuration file error
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file not found
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    /// Invalid configuration
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialize error
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
}
