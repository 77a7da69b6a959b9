//! Collaborator traits consumed by the session layer

mod backend;
mod network;
mod settings;

pub use backend::{Backend, TunnelEvent, TunnelEventStream};
pub use network::{
    Capabilities, InterfaceId, NetworkEvent, NetworkEventSource, NetworkSnapshot,
    ObserverRegistration,
};
pub use settings::SettingsStore;
