//! CLI command implementations

mod account;
mod config;
mod environment;
mod gateways;
mod select;
mod status;
mod tunnel;
mod watch;

pub use account::{login_command, logout_command};
pub use config::{config_path, config_show};
pub use environment::env_command;
pub use gateways::gateways_command;
pub use select::select_command;
pub use status::status_command;
pub use tunnel::{connect_command, disconnect_command};
pub use watch::watch_command;

use std::sync::Arc;

use anyhow::Result;

use mv_core::config::{default_selection_path, ClientConfig};
use mv_core::types::BackendInfo;
use mv_orchestrator::{AppContext, IpcBackend, StaticNetworkSource, TomlSettingsStore};

use crate::output::print_error;

/// Connect to the daemon and start the session layer
pub async fn open_context(config: &ClientConfig) -> Result<(AppContext, BackendInfo)> {
    let backend = IpcBackend::new(config.daemon_address.clone())
        .with_client_version(config.user_agent.version.clone());
    let context = AppContext::new(
        config.clone(),
        Arc::new(backend),
        Arc::new(StaticNetworkSource),
        Arc::new(TomlSettingsStore::new(default_selection_path())),
    );

    match context.start().await {
        Ok(info) => Ok((context, info)),
        Err(e) => {
            print_error(&format!(
                "Cannot reach the mixvpn daemon at {}: {}",
                config.daemon_address, e
            ));
            print_error("Is mixvpnd running?");
            Err(e.into())
        }
    }
}
