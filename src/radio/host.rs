//! Host radio simulation.
//!
//! On a development machine there is no WiFi driver to bring up; the OS
//! owns networking and both nodes talk over loopback. This radio walks
//! through the same steps as the device one, enforces their order, and
//! posts the link and address events a real access point or station would.

use super::{Radio, RadioFault, StorageFault};
use crate::config::{RoleConfig, COORDINATOR_ADDR};
use crate::events::{AddressEvent, EventCategory, EventSink, LinkEvent};
use crate::lifecycle::Role;
use log::{debug, info};
use std::net::Ipv4Addr;

/// Address the simulated coordinator leases to its peer.
const PEER_ADDR: Ipv4Addr = Ipv4Addr::new(192, 168, 4, 2);

/// MAC reported for the simulated peer.
#[cfg(test)]
const PEER_MAC: [u8; 6] = [0x02, 0x00, 0x00, 0x00, 0x00, 0x02];

/// Simulated radio for host builds.
#[derive(Debug, Default)]
pub struct HostRadio {
    storage_ready: bool,
    stack_up: bool,
    role: Option<Role>,
    started: bool,
    link_sink: Option<EventSink>,
    address_sink: Option<EventSink>,
}

impl HostRadio {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the simulated radio is running.
    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Report a peer joining the simulated access point.
    ///
    /// Only meaningful while running as coordinator.
    #[cfg(test)]
    pub(crate) fn simulate_peer_join(&self) {
        if self.started && self.role == Some(Role::Coordinator) {
            self.post_link(LinkEvent::PeerJoined { mac: PEER_MAC });
            self.post_address(AddressEvent::PeerAssigned { ip: PEER_ADDR });
        }
    }

    fn post_link(&self, event: LinkEvent) {
        if let Some(sink) = &self.link_sink {
            sink.post_link(event);
        }
    }

    fn post_address(&self, event: AddressEvent) {
        if let Some(sink) = &self.address_sink {
            sink.post_address(event);
        }
    }
}

impl Radio for HostRadio {
    fn prepare_persistent_storage(&mut self) -> Result<(), StorageFault> {
        self.storage_ready = true;
        Ok(())
    }

    fn erase_persistent_storage(&mut self) -> Result<(), RadioFault> {
        self.storage_ready = false;
        Ok(())
    }

    fn start_base_network_stack(&mut self) -> Result<(), RadioFault> {
        if !self.storage_ready {
            return Err(RadioFault::new("start network stack", "storage not prepared"));
        }
        self.stack_up = true;
        debug!("Host network stack ready");
        Ok(())
    }

    fn subscribe(&mut self, category: EventCategory, sink: EventSink) -> Result<(), RadioFault> {
        if !self.stack_up {
            return Err(RadioFault::new("subscribe", "event loop not running"));
        }
        match category {
            EventCategory::Link => self.link_sink = Some(sink),
            EventCategory::Address => self.address_sink = Some(sink),
        }
        Ok(())
    }

    fn apply_role_configuration(
        &mut self,
        role: Role,
        config: &RoleConfig,
    ) -> Result<(), RadioFault> {
        if !self.stack_up {
            return Err(RadioFault::new("apply configuration", "network stack not started"));
        }
        info!(
            "Host radio configured as {} for '{}' (channel {}, {})",
            role,
            config.ssid(),
            config.channel(),
            config.auth_mode()
        );
        self.role = Some(role);
        Ok(())
    }

    fn start(&mut self) -> Result<(), RadioFault> {
        let role = self
            .role
            .ok_or_else(|| RadioFault::new("start", "no configuration applied"))?;
        if self.started {
            return Err(RadioFault::new("start", "already started"));
        }
        self.started = true;

        match role {
            Role::Coordinator => {
                self.post_link(LinkEvent::AccessPointStarted);
                self.post_address(AddressEvent::Assigned {
                    ip: COORDINATOR_ADDR,
                });
            }
            Role::Peer => {
                self.post_link(LinkEvent::StationStarted);
                self.post_link(LinkEvent::StationConnected);
                self.post_address(AddressEvent::Assigned { ip: PEER_ADDR });
            }
        }
        Ok(())
    }

    fn stop(&mut self) -> Result<(), RadioFault> {
        if !self.started {
            return Err(RadioFault::new("stop", "not started"));
        }
        self.started = false;

        match self.role {
            Some(Role::Coordinator) => self.post_link(LinkEvent::AccessPointStopped),
            Some(Role::Peer) => {
                self.post_link(LinkEvent::StationDisconnected);
                self.post_link(LinkEvent::StationStopped);
            }
            None => {}
        }
        self.post_address(AddressEvent::Lost);
        Ok(())
    }

    fn release(&mut self) -> Result<(), RadioFault> {
        if self.started {
            return Err(RadioFault::new("release", "radio still running"));
        }
        self.link_sink = None;
        self.address_sink = None;
        self.role = None;
        self.stack_up = false;
        debug!("Host radio released");
        Ok(())
    }
}
