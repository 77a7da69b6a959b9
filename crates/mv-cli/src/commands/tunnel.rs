//! Connect and disconnect commands

use std::time::Duration;

use anyhow::Result;

use mv_core::config::ClientConfig;
use mv_core::{SessionError, TunnelState};
use mv_orchestrator::CommandOutcome;

use super::open_context;
use crate::output::{format_state_line, print_error, print_info, print_success, print_warning};

/// Extra time allowed beyond the watchdog before `--wait` gives up
const WAIT_GRACE: Duration = Duration::from_secs(5);

/// Execute the connect command
pub async fn connect_command(config: &ClientConfig, wait: bool) -> Result<()> {
    let (context, _) = open_context(config).await?;

    match context.start_tunnel().await {
        Ok(CommandOutcome::Dispatched) => print_info("Connecting..."),
        Ok(CommandOutcome::AlreadyPending) => print_info("Connect already in progress"),
        Err(SessionError::Busy { state, .. }) if state == TunnelState::Up => {
            print_success("Tunnel is already up");
            context.shutdown();
            return Ok(());
        }
        Err(SessionError::CredentialRequired) => {
            print_error("No account stored. Try: mixvpn login \"<mnemonic>\"");
            context.shutdown();
            return Err(SessionError::CredentialRequired.into());
        }
        Err(e) => {
            print_error(&format!("Failed to connect: {}", e));
            context.shutdown();
            return Err(e.into());
        }
    }

    if !context.session().state().is_network_compatible {
        print_warning("This client is older than the network requires; connecting may fail");
    }

    if !wait {
        context.shutdown();
        return Ok(());
    }

    let mut rx = context.session().subscribe();
    let limit = config.session.watchdog_timeout + WAIT_GRACE;
    let settled = tokio::time::timeout(
        limit,
        rx.wait_for(|s| s.tunnel_state == TunnelState::Up || s.last_error.is_some()),
    )
    .await;

    let result = match settled {
        Ok(Ok(state)) if state.tunnel_state == TunnelState::Up => {
            print_success(&format!("Connected: {}", format_state_line(&state)));
            Ok(())
        }
        Ok(Ok(state)) => {
            let line = format_state_line(&state);
            print_error(&format!("Connection failed: {}", line));
            Err(anyhow::anyhow!("connection failed: {}", line))
        }
        Ok(Err(_)) => Err(anyhow::anyhow!("session layer stopped")),
        Err(_) => {
            print_error(&format!("Tunnel did not come up within {:?}", limit));
            Err(anyhow::anyhow!("timed out waiting for tunnel"))
        }
    };

    context.shutdown();
    result
}

/// Execute the disconnect command
pub async fn disconnect_command(config: &ClientConfig) -> Result<()> {
    let (context, _) = open_context(config).await?;

    let result = match context.stop_tunnel().await {
        Ok(CommandOutcome::Dispatched) => {
            print_success("Disconnecting");
            Ok(())
        }
        Ok(CommandOutcome::AlreadyPending) => {
            print_info("Disconnect already in progress");
            Ok(())
        }
        Err(SessionError::NotRunning) => {
            print_info("Tunnel is not running");
            Ok(())
        }
        Err(e) => {
            print_error(&format!("Failed to disconnect: {}", e));
            Err(e.into())
        }
    };

    context.shutdown();
    result
}
