//! mv-core: Core abstractions and configuration for mixvpn
//!
//! This crate provides the domain types, error taxonomy, collaborator traits
//! and configuration structures shared by the session layer and the CLI.

pub mod config;
pub mod error;
pub mod ipc;
pub mod time;
pub mod traits;
pub mod types;

pub use error::{AccountError, BackendError, MvError, SessionError};
pub use types::{
    ConnectivitySignal, ErrorCategory, GatewayRecord, GatewayType, NodeHop, NodeLocation,
    SessionState, TunnelState,
};
