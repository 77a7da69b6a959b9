//! Core domain types

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

/// Tunnel lifecycle state as confirmed by the native backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TunnelState {
    /// No tunnel
    #[default]
    Down,
    /// Backend is bootstrapping the client
    InitializingClient,
    /// Backend is negotiating with the selected gateways
    EstablishingConnection,
    /// Tunnel is established and carrying traffic
    Up,
    /// Tunnel is being torn down
    Disconnecting,
    /// Tunnel is configured but the device has no connectivity
    Offline,
}

impl TunnelState {
    /// Whether the state is one the backend can rest in
    pub fn is_stable(&self) -> bool {
        matches!(self, Self::Down | Self::Up | Self::Offline)
    }

    /// Whether the backend is moving between stable states
    pub fn is_transitional(&self) -> bool {
        !self.is_stable()
    }
}

impl fmt::Display for TunnelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TunnelState::Down => write!(f, "down"),
            TunnelState::InitializingClient => write!(f, "initializing client"),
            TunnelState::EstablishingConnection => write!(f, "establishing connection"),
            TunnelState::Up => write!(f, "up"),
            TunnelState::Disconnecting => write!(f, "disconnecting"),
            TunnelState::Offline => write!(f, "offline"),
        }
    }
}

/// Details of an established tunnel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionData {
    /// Identity of the entry gateway
    pub entry_gateway: String,
    /// Identity of the exit gateway
    pub exit_gateway: String,
    /// Tunnel IPv4 address
    pub ipv4: Option<Ipv4Addr>,
    /// Tunnel IPv6 address
    pub ipv6: Option<Ipv6Addr>,
    /// Unix timestamp (seconds) at which the tunnel came up
    pub connected_at: Option<u64>,
}

/// User-facing error categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorCategory {
    NetworkDown,
    BackendUnreachable,
    InvalidMnemonic,
    MaxDevicesReached,
    SameEntryExitGateway,
    InvalidEntryCountry,
    InvalidExitCountry,
    Timeout,
    Unknown,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorCategory::NetworkDown => "network-down",
            ErrorCategory::BackendUnreachable => "backend-unreachable",
            ErrorCategory::InvalidMnemonic => "invalid-mnemonic",
            ErrorCategory::MaxDevicesReached => "max-devices-reached",
            ErrorCategory::SameEntryExitGateway => "same-entry-exit-gateway",
            ErrorCategory::InvalidEntryCountry => "invalid-entry-country",
            ErrorCategory::InvalidExitCountry => "invalid-exit-country",
            ErrorCategory::Timeout => "timeout",
            ErrorCategory::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Tunnel command issued by a consumer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TunnelCommand {
    Start,
    Stop,
}

impl TunnelCommand {
    /// The command that undoes this one
    pub fn opposite(&self) -> Self {
        match self {
            TunnelCommand::Start => TunnelCommand::Stop,
            TunnelCommand::Stop => TunnelCommand::Start,
        }
    }
}

impl fmt::Display for TunnelCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TunnelCommand::Start => write!(f, "start"),
            TunnelCommand::Stop => write!(f, "stop"),
        }
    }
}

/// Snapshot of the client session published to consumers
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    /// Backend-confirmed tunnel state
    pub tunnel_state: TunnelState,
    /// Most recent error, cleared when a new start is accepted
    pub last_error: Option<ErrorCategory>,
    /// Present only while the tunnel is up
    pub connection_data: Option<ConnectionData>,
    /// A usable credential is stored
    pub is_account_usable: bool,
    /// Backend and network versions are compatible
    pub is_network_compatible: bool,
    /// The first backend handshake has succeeded
    pub is_initialized: bool,
    /// Command dispatched and awaiting confirmation
    pub pending_command: Option<TunnelCommand>,
}

/// Output of the connectivity monitor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectivitySignal {
    Connected,
    Disconnected,
}

impl fmt::Display for ConnectivitySignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectivitySignal::Connected => write!(f, "connected"),
            ConnectivitySignal::Disconnected => write!(f, "disconnected"),
        }
    }
}

/// Kind of gateway list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GatewayType {
    /// Mixnet entry gateways
    MxEntry,
    /// Mixnet exit gateways
    MxExit,
    /// Two-hop WireGuard gateways
    Wg,
}

impl GatewayType {
    pub const ALL: [GatewayType; 3] = [GatewayType::MxEntry, GatewayType::MxExit, GatewayType::Wg];

    /// Hops whose selected node must exist in a list of this kind
    pub fn hops(&self) -> &'static [NodeHop] {
        match self {
            GatewayType::MxEntry => &[NodeHop::Entry],
            GatewayType::MxExit => &[NodeHop::Exit],
            GatewayType::Wg => &[NodeHop::Entry, NodeHop::Exit],
        }
    }
}

impl fmt::Display for GatewayType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GatewayType::MxEntry => write!(f, "mx-entry"),
            GatewayType::MxExit => write!(f, "mx-exit"),
            GatewayType::Wg => write!(f, "wg"),
        }
    }
}

impl FromStr for GatewayType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mx-entry" | "entry" => Ok(GatewayType::MxEntry),
            "mx-exit" | "exit" => Ok(GatewayType::MxExit),
            "wg" | "wireguard" => Ok(GatewayType::Wg),
            other => Err(format!("unknown gateway type: {}", other)),
        }
    }
}

/// Gateway performance score
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Score {
    #[default]
    None,
    Low,
    Medium,
    High,
}

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Score::None => write!(f, "-"),
            Score::Low => write!(f, "low"),
            Score::Medium => write!(f, "medium"),
            Score::High => write!(f, "high"),
        }
    }
}

/// A gateway as reported by the backend directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayRecord {
    /// Unique gateway identity key
    pub identity: String,
    /// Two-letter country code, lowercased
    pub country_code: Option<String>,
    #[serde(default)]
    pub mixnet_score: Score,
    #[serde(default)]
    pub wg_score: Score,
    pub display_name: String,
}

impl GatewayRecord {
    /// Create a gateway record, normalizing the country code
    pub fn new(
        identity: impl Into<String>,
        country_code: Option<&str>,
        display_name: impl Into<String>,
    ) -> Self {
        Self {
            identity: identity.into(),
            country_code: country_code.map(|c| c.to_ascii_lowercase()),
            mixnet_score: Score::None,
            wg_score: Score::None,
            display_name: display_name.into(),
        }
    }

    /// Whether the gateway can be used as a country endpoint
    pub fn has_location(&self) -> bool {
        self.country_code.is_some()
    }

    /// Whether this gateway is in the given country
    pub fn in_country(&self, code: &str) -> bool {
        self.country_code
            .as_deref()
            .is_some_and(|c| c.eq_ignore_ascii_case(code))
    }
}

/// Which hop of the route a node selection applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeHop {
    Entry,
    Exit,
}

impl fmt::Display for NodeHop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeHop::Entry => write!(f, "entry"),
            NodeHop::Exit => write!(f, "exit"),
        }
    }
}

impl FromStr for NodeHop {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "entry" => Ok(NodeHop::Entry),
            "exit" => Ok(NodeHop::Exit),
            other => Err(format!("unknown hop: {}", other)),
        }
    }
}

/// A selected entry or exit node
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum NodeLocation {
    /// Any gateway in the given country
    Country(String),
    /// A specific gateway by identity
    Gateway(String),
}

impl NodeLocation {
    /// Parse user input: two letters is a country code, anything else a gateway identity
    pub fn parse(input: &str) -> Self {
        let trimmed = input.trim();
        if trimmed.len() == 2 && trimmed.chars().all(|c| c.is_ascii_alphabetic()) {
            NodeLocation::Country(trimmed.to_ascii_uppercase())
        } else {
            NodeLocation::Gateway(trimmed.to_string())
        }
    }

    /// Whether any gateway in the list satisfies this selection
    pub fn exists_in(&self, gateways: &[GatewayRecord]) -> bool {
        match self {
            NodeLocation::Country(code) => gateways.iter().any(|g| g.in_country(code)),
            NodeLocation::Gateway(id) => gateways.iter().any(|g| &g.identity == id),
        }
    }
}

impl fmt::Display for NodeLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeLocation::Country(code) => write!(f, "country:{}", code),
            NodeLocation::Gateway(id) => write!(f, "gateway:{}", id),
        }
    }
}

/// Current entry and exit node selection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSelection {
    pub entry: NodeLocation,
    pub exit: NodeLocation,
}

impl NodeSelection {
    /// Both hops set to the same location
    pub fn uniform(node: NodeLocation) -> Self {
        Self {
            entry: node.clone(),
            exit: node,
        }
    }

    pub fn get(&self, hop: NodeHop) -> &NodeLocation {
        match hop {
            NodeHop::Entry => &self.entry,
            NodeHop::Exit => &self.exit,
        }
    }

    pub fn set(&mut self, hop: NodeHop, node: NodeLocation) {
        match hop {
            NodeHop::Entry => self.entry = node,
            NodeHop::Exit => self.exit = node,
        }
    }
}

/// Backend network environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkEnvironment {
    #[default]
    Mainnet,
    Canary,
    Sandbox,
    Qa,
}

impl fmt::Display for NetworkEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetworkEnvironment::Mainnet => write!(f, "mainnet"),
            NetworkEnvironment::Canary => write!(f, "canary"),
            NetworkEnvironment::Sandbox => write!(f, "sandbox"),
            NetworkEnvironment::Qa => write!(f, "qa"),
        }
    }
}

impl FromStr for NetworkEnvironment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mainnet" => Ok(NetworkEnvironment::Mainnet),
            "canary" => Ok(NetworkEnvironment::Canary),
            "sandbox" => Ok(NetworkEnvironment::Sandbox),
            "qa" => Ok(NetworkEnvironment::Qa),
            other => Err(format!("unknown environment: {}", other)),
        }
    }
}

/// Client identification passed to directory queries
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserAgent {
    pub application: String,
    pub version: String,
    pub platform: String,
    pub git_commit: String,
}

impl Default for UserAgent {
    fn default() -> Self {
        Self {
            application: "mixvpn".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            platform: format!("{}; {}", std::env::consts::OS, std::env::consts::ARCH),
            git_commit: "unknown".to_string(),
        }
    }
}

impl fmt::Display for UserAgent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}",
            self.application, self.version, self.platform, self.git_commit
        )
    }
}

/// Result of the backend handshake
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendInfo {
    /// Backend daemon version
    pub version: String,
    /// Oldest client version the network accepts, if any
    pub min_client_version: Option<String>,
    pub environment: NetworkEnvironment,
}

/// How a backend is reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transport {
    /// In-process bindings
    InProcess,
    /// JSON lines over a local socket
    Ipc,
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transport::InProcess => write!(f, "in-process"),
            Transport::Ipc => write!(f, "ipc"),
        }
    }
}
