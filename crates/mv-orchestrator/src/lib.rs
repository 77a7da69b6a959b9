//! mv-orchestrator: client session orchestration for mixvpn
//!
//! This crate provides:
//! - Connectivity monitoring with debounce
//! - A TTL gateway cache and the gateway fetch policy
//! - The tunnel session state machine
//! - The account/credential gate
//! - A backend transport to the local tunnel daemon

pub mod account;
pub mod cache;
pub mod context;
pub mod gateways;
pub mod ipc;
pub mod monitor;
pub mod retry;
pub mod session;
pub mod settings;

pub use account::CredentialGate;
pub use cache::{CacheKey, GatewayCache};
pub use context::AppContext;
pub use gateways::{FetchSource, GatewayDirectory, GatewayFetch};
pub use ipc::IpcBackend;
pub use monitor::{ConnectivityStream, NetworkMonitor, StaticNetworkSource};
pub use retry::RetryPolicy;
pub use session::{CommandOutcome, SessionOrchestrator, SessionStateStream};
pub use settings::{MemorySettings, TomlSettingsStore};
