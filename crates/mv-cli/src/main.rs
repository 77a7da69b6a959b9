//! mixvpn CLI
//!
//! Controls the local mixvpn daemon:
//! - Tunnel connect/disconnect and live status
//! - Gateway listing and entry/exit node selection
//! - Account login/logout and network environment switching

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mixvpn::commands;
use mv_core::config::{self, ClientConfig};
use mv_core::types::NetworkEnvironment;
use mv_core::{GatewayType, NodeHop};

#[derive(Parser)]
#[command(name = "mixvpn")]
#[command(author, version, about = "Mixnet VPN client")]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Daemon address (overrides config)
    #[arg(short, long, global = true, env = "MIXVPN_DAEMON")]
    daemon: Option<String>,

    /// Enable verbose output
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show tunnel, account and node selection status
    Status,

    /// Bring the tunnel up
    #[command(alias = "up")]
    Connect {
        /// Wait until the tunnel is up or has failed
        #[arg(short, long)]
        wait: bool,
    },

    /// Take the tunnel down
    #[command(alias = "down")]
    Disconnect,

    /// List gateways of one kind (mx-entry, mx-exit, wg)
    Gateways {
        #[arg(default_value = "mx-entry")]
        kind: GatewayType,
    },

    /// Store an account recovery phrase
    Login {
        /// BIP-39 mnemonic (quote it)
        mnemonic: String,
    },

    /// Remove the stored account
    Logout,

    /// Choose the entry or exit node
    Select {
        /// entry or exit
        hop: NodeHop,
        /// Two-letter country code or gateway identity
        node: String,
    },

    /// Switch network environment (mainnet, canary, sandbox, qa)
    Env { environment: NetworkEnvironment },

    /// Stream session state changes
    Watch,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show effective configuration
    Show,
    /// Show config file path
    Path,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = match (cli.quiet, cli.verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, 2) => "debug",
        (false, _) => "trace",
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| log_level.into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let config_path = cli.config.unwrap_or_else(config::default_config_path);
    let mut client_config: ClientConfig = config::load_config_or_default(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;
    if let Some(daemon) = cli.daemon {
        client_config.daemon_address = daemon;
    }
    tracing::debug!(daemon = %client_config.daemon_address, "Configuration loaded");

    match cli.command {
        Commands::Status => commands::status_command(&client_config).await,
        Commands::Connect { wait } => commands::connect_command(&client_config, wait).await,
        Commands::Disconnect => commands::disconnect_command(&client_config).await,
        Commands::Gateways { kind } => commands::gateways_command(&client_config, kind).await,
        Commands::Login { mnemonic } => commands::login_command(&client_config, &mnemonic).await,
        Commands::Logout => commands::logout_command(&client_config).await,
        Commands::Select { hop, node } => {
            commands::select_command(&config::default_selection_path(), hop, &node).await
        }
        Commands::Env { environment } => {
            commands::env_command(&client_config, &config_path, environment).await
        }
        Commands::Watch => commands::watch_command(&client_config).await,
        Commands::Config { action } => match action {
            ConfigAction::Show => commands::config_show(&client_config, &config_path),
            ConfigAction::Path => commands::config_path(&config_path),
        },
    }
}
