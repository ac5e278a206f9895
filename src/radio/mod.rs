//! Radio collaborator abstraction.
//!
//! The lifecycle state machine drives the radio stack only through the
//! [`Radio`] trait, so the same bring-up logic runs on:
//! - **ESP32** (`esp32` feature): [`EspRadio`] over ESP-IDF WiFi and NVS
//! - **Host**: [`HostRadio`], a simulation that reports the events a real
//!   radio would
//!
//! Every operation reports success or an opaque [`RadioFault`]. Storage
//! preparation additionally distinguishes a stale partition, which the
//! lifecycle recovers from by erasing it once.

#[cfg(feature = "esp32")]
mod esp;
mod host;

#[cfg(test)]
pub(crate) mod fake;

#[cfg(feature = "esp32")]
pub use esp::EspRadio;
pub use host::HostRadio;

use crate::config::RoleConfig;
use crate::events::{EventCategory, EventSink};
use crate::lifecycle::Role;
use std::fmt;

/// Operations the lifecycle needs from the radio stack.
///
/// Calls are serialized by the lifecycle; implementations need no locking
/// of their own. Events may be posted to the subscribed sinks from any
/// thread at any time after [`Radio::subscribe`].
pub trait Radio: Send {
    /// Prepare non-volatile storage the radio stack depends on.
    fn prepare_persistent_storage(&mut self) -> Result<(), StorageFault>;

    /// Erase non-volatile storage after a [`StorageFault::Stale`] report.
    fn erase_persistent_storage(&mut self) -> Result<(), RadioFault>;

    /// Start the network interface layer and the system event loop.
    fn start_base_network_stack(&mut self) -> Result<(), RadioFault>;

    /// Route events of `category` into `sink`.
    fn subscribe(&mut self, category: EventCategory, sink: EventSink) -> Result<(), RadioFault>;

    /// Apply the role's configuration without starting the radio.
    fn apply_role_configuration(&mut self, role: Role, config: &RoleConfig)
        -> Result<(), RadioFault>;

    /// Start the radio with the applied configuration.
    fn start(&mut self) -> Result<(), RadioFault>;

    /// Stop the radio.
    fn stop(&mut self) -> Result<(), RadioFault>;

    /// Release the radio driver and its event subscriptions.
    fn release(&mut self) -> Result<(), RadioFault>;
}

/// A radio operation failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RadioFault {
    op: &'static str,
    detail: String,
}

impl RadioFault {
    pub fn new(op: &'static str, detail: impl Into<String>) -> Self {
        Self {
            op,
            detail: detail.into(),
        }
    }

    /// Name of the failed operation.
    pub fn op(&self) -> &'static str {
        self.op
    }

    pub fn detail(&self) -> &str {
        &self.detail
    }
}

impl fmt::Display for RadioFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed: {}", self.op, self.detail)
    }
}

impl std::error::Error for RadioFault {}

/// Persistent storage could not be prepared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageFault {
    /// The partition is full or was written by an incompatible version.
    /// Erasing it is expected to fix the problem.
    Stale(RadioFault),
    /// Anything else.
    Fatal(RadioFault),
}

impl StorageFault {
    pub fn into_fault(self) -> RadioFault {
        match self {
            Self::Stale(f) | Self::Fatal(f) => f,
        }
    }
}

impl fmt::Display for StorageFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stale(fault) => write!(f, "stale storage: {}", fault),
            Self::Fatal(fault) => write!(f, "storage fault: {}", fault),
        }
    }
}

impl std::error::Error for StorageFault {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Stale(f) | Self::Fatal(f) => Some(f),
        }
    }
}
