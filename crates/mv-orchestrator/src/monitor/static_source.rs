//! Network source for hosts where the daemon tracks connectivity itself

use tokio::sync::mpsc;

use mv_core::traits::{
    Capabilities, InterfaceId, NetworkEvent, NetworkEventSource, NetworkSnapshot,
    ObserverRegistration,
};

/// Always reports a single validated interface and never emits events
#[derive(Debug, Default, Clone, Copy)]
pub struct StaticNetworkSource;

impl NetworkEventSource for StaticNetworkSource {
    fn register(&self, _sink: mpsc::UnboundedSender<NetworkEvent>) -> ObserverRegistration {
        ObserverRegistration::noop()
    }

    fn snapshot(&self) -> NetworkSnapshot {
        NetworkSnapshot {
            interfaces: vec![(InterfaceId::new("default"), Capabilities::ONLINE)],
            airplane_mode: false,
        }
    }

    fn default_route(&self) -> Option<Capabilities> {
        Some(Capabilities::ONLINE)
    }
}
