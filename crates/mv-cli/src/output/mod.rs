//! Output formatting utilities for the CLI
//!
//! Gateway tables, session status blocks and coloured one-line messages.

use tabled::{settings::Style, Table, Tabled};

use mv_core::time::elapsed_secs;
use mv_core::types::{BackendInfo, NodeSelection};
use mv_core::{GatewayRecord, SessionState};

/// Format a gateway list as a table
///
/// Returns "No gateways available" for an empty list.
pub fn format_gateways(gateways: &[GatewayRecord]) -> String {
    if gateways.is_empty() {
        return "No gateways available".to_string();
    }

    #[derive(Tabled)]
    struct GatewayRow {
        #[tabled(rename = "IDENTITY")]
        identity: String,
        #[tabled(rename = "COUNTRY")]
        country: String,
        #[tabled(rename = "NAME")]
        name: String,
        #[tabled(rename = "MIXNET")]
        mixnet: String,
        #[tabled(rename = "WG")]
        wg: String,
    }

    let rows: Vec<GatewayRow> = gateways
        .iter()
        .map(|g| GatewayRow {
            identity: truncate(&g.identity, 16),
            country: g
                .country_code
                .as_deref()
                .map(str::to_ascii_uppercase)
                .unwrap_or_else(|| "-".to_string()),
            name: g.display_name.clone(),
            mixnet: g.mixnet_score.to_string(),
            wg: g.wg_score.to_string(),
        })
        .collect();

    Table::new(rows).with(Style::rounded()).to_string()
}

/// Format the session snapshot as a multi-line block
pub fn format_status(
    state: &SessionState,
    selection: &NodeSelection,
    info: Option<&BackendInfo>,
) -> String {
    let mut output = String::new();

    output.push_str(&format!("Tunnel: {}\n", state.tunnel_state));
    if let Some(command) = state.pending_command {
        output.push_str(&format!("Pending: {}\n", command));
    }
    if let Some(ref connection) = state.connection_data {
        output.push_str(&format!("Entry gateway: {}\n", connection.entry_gateway));
        output.push_str(&format!("Exit gateway: {}\n", connection.exit_gateway));
        if let Some(ipv4) = connection.ipv4 {
            output.push_str(&format!("IPv4: {}\n", ipv4));
        }
        if let Some(ipv6) = connection.ipv6 {
            output.push_str(&format!("IPv6: {}\n", ipv6));
        }
        if let Some(since) = connection.connected_at {
            output.push_str(&format!(
                "Connected for: {}\n",
                format_duration(elapsed_secs(since))
            ));
        }
    }
    output.push_str(&format!("Entry node: {}\n", selection.entry));
    output.push_str(&format!("Exit node: {}\n", selection.exit));
    output.push_str(&format!(
        "Account: {}\n",
        if state.is_account_usable {
            "ready"
        } else {
            "not logged in"
        }
    ));
    if let Some(info) = info {
        output.push_str(&format!(
            "Daemon: {} ({})\n",
            info.version, info.environment
        ));
    }
    if !state.is_network_compatible {
        output.push_str("Network: client version too old for this network\n");
    }
    if let Some(error) = state.last_error {
        output.push_str(&format!("Last error: {}\n", error));
    }

    output
}

/// One line per session change, for `watch`
pub fn format_state_line(state: &SessionState) -> String {
    let mut line = state.tunnel_state.to_string();
    if let Some(command) = state.pending_command {
        line.push_str(&format!(" (pending {})", command));
    }
    if let Some(ref connection) = state.connection_data {
        line.push_str(&format!(
            " via {} -> {}",
            connection.entry_gateway, connection.exit_gateway
        ));
    }
    if let Some(error) = state.last_error {
        line.push_str(&format!(" [error: {}]", error));
    }
    line
}

/// Format duration in human-readable form
fn format_duration(secs: u64) -> String {
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else if secs < 86400 {
        format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
    } else {
        format!("{}d {}h", secs / 86400, (secs % 86400) / 3600)
    }
}

/// Truncate a string with ellipsis if too long
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// Print a success message in green with a checkmark prefix
pub fn print_success(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stdout = std::io::stdout();
    let _ = crossterm::execute!(
        stdout,
        SetForegroundColor(Color::Green),
        Print("✓ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print an error message in red to stderr
pub fn print_error(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stderr = std::io::stderr();
    let _ = crossterm::execute!(
        stderr,
        SetForegroundColor(Color::Red),
        Print("✗ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print a warning message in yellow to stderr
pub fn print_warning(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stderr = std::io::stderr();
    let _ = crossterm::execute!(
        stderr,
        SetForegroundColor(Color::Yellow),
        Print("⚠ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

pub fn print_info(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stdout = std::io::stdout();
    let _ = crossterm::execute!(
        stdout,
        SetForegroundColor(Color::Cyan),
        Print("ℹ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}
