//! OS network observer abstraction

use std::fmt;
use tokio::sync::mpsc;

/// Opaque OS interface handle
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InterfaceId(pub String);

impl InterfaceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for InterfaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Network capabilities of an interface or route
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capabilities {
    /// Interface claims internet access
    pub internet: bool,
    /// The OS has validated internet access
    pub validated: bool,
}

impl Capabilities {
    /// Fully usable internet
    pub const ONLINE: Capabilities = Capabilities {
        internet: true,
        validated: true,
    };

    /// Both flags set
    pub fn qualifies(&self) -> bool {
        self.internet && self.validated
    }
}

/// Raw OS network callback
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkEvent {
    /// Interface became available
    Available(InterfaceId, Capabilities),
    /// Interface capabilities changed
    CapabilitiesChanged(InterfaceId, Capabilities),
    /// Interface went away
    Lost(InterfaceId),
    /// Airplane mode toggled
    AirplaneMode(bool),
}

/// Network state at registration time
#[derive(Debug, Clone, Default)]
pub struct NetworkSnapshot {
    pub interfaces: Vec<(InterfaceId, Capabilities)>,
    pub airplane_mode: bool,
}

/// Keeps an OS observer registered; unregisters on drop
pub struct ObserverRegistration {
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl ObserverRegistration {
    /// Registration that runs `release` when dropped
    pub fn new(release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            release: Some(Box::new(release)),
        }
    }

    /// Registration with nothing to release
    pub fn noop() -> Self {
        Self { release: None }
    }
}

impl Drop for ObserverRegistration {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl fmt::Debug for ObserverRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObserverRegistration")
            .field("active", &self.release.is_some())
            .finish()
    }
}

/// Source of OS network callbacks
pub trait NetworkEventSource: Send + Sync {
    /// Register a sink for network callbacks
    fn register(&self, sink: mpsc::UnboundedSender<NetworkEvent>) -> ObserverRegistration;

    /// Interfaces and airplane mode right now
    fn snapshot(&self) -> NetworkSnapshot;

    /// Capabilities of the OS default route, if there is one
    fn default_route(&self) -> Option<Capabilities>;
}
