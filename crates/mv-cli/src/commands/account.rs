//! Login and logout commands

use anyhow::Result;

use mv_core::config::ClientConfig;
use mv_core::AccountError;

use super::open_context;
use crate::output::{print_error, print_success, print_warning};

/// Execute the login command
pub async fn login_command(config: &ClientConfig, mnemonic: &str) -> Result<()> {
    let (context, _) = open_context(config).await?;

    let result = match context.import_credential(mnemonic).await {
        Ok(()) => {
            match context.account().account_id().await {
                Ok(Some(id)) => print_success(&format!("Logged in as {}", id)),
                _ => print_success("Logged in"),
            }
            Ok(())
        }
        Err(AccountError::MaxDevicesReached) => {
            print_error("This account already has the maximum number of devices");
            print_error("Remove a device from the account, then try again");
            Err(AccountError::MaxDevicesReached.into())
        }
        Err(AccountError::TunnelActive(state)) => {
            print_error(&format!("Disconnect first (tunnel is {})", state));
            Err(AccountError::TunnelActive(state).into())
        }
        Err(e) => {
            print_error(&format!("Login failed: {}", e));
            Err(e.into())
        }
    };

    context.shutdown();
    result
}

/// Execute the logout command
pub async fn logout_command(config: &ClientConfig) -> Result<()> {
    let (context, _) = open_context(config).await?;

    let result = match context.logout().await {
        Ok(()) => {
            print_success("Logged out");
            Ok(())
        }
        Err(AccountError::TunnelActive(state)) => {
            print_error(&format!("Disconnect first (tunnel is {})", state));
            Err(AccountError::TunnelActive(state).into())
        }
        Err(e) => {
            print_warning(&format!("Local session cleared but the daemon reported: {}", e));
            Err(e.into())
        }
    };

    context.shutdown();
    result
}
