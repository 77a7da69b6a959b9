//! Qualifying-interface bookkeeping

use std::collections::HashSet;

use mv_core::traits::{Capabilities, InterfaceId, NetworkEvent, NetworkSnapshot};
use mv_core::ConnectivitySignal;

/// Tracks interfaces that currently have validated internet
#[derive(Debug, Default)]
pub struct InterfaceTracker {
    active: HashSet<InterfaceId>,
    airplane_mode: bool,
}

impl InterfaceTracker {
    pub fn from_snapshot(snapshot: &NetworkSnapshot) -> Self {
        let mut tracker = Self {
            airplane_mode: snapshot.airplane_mode,
            ..Self::default()
        };
        for (id, caps) in &snapshot.interfaces {
            tracker.update(id, *caps);
        }
        tracker
    }

    pub fn apply(&mut self, event: &NetworkEvent) {
        match event {
            NetworkEvent::Available(id, caps) | NetworkEvent::CapabilitiesChanged(id, caps) => {
                self.update(id, *caps)
            }
            NetworkEvent::Lost(id) => {
                self.active.remove(id);
            }
            NetworkEvent::AirplaneMode(on) => self.airplane_mode = *on,
        }
    }

    fn update(&mut self, id: &InterfaceId, caps: Capabilities) {
        if caps.qualifies() {
            self.active.insert(id.clone());
        } else {
            self.active.remove(id);
        }
    }

    pub fn has_qualifying(&self) -> bool {
        !self.active.is_empty()
    }

    /// Airplane mode is on and nothing qualifies
    pub fn airplane_forced(&self) -> bool {
        self.airplane_mode && self.active.is_empty()
    }

    /// Connectivity given the OS default route
    pub fn signal(&self, default_route: Option<Capabilities>) -> ConnectivitySignal {
        if self.has_qualifying() || default_route.is_some_and(|caps| caps.qualifies()) {
            ConnectivitySignal::Connected
        } else {
            ConnectivitySignal::Disconnected
        }
    }
}
