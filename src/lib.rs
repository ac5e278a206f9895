//! ProtoPixel light network.
//!
//! Brings up the WiFi link between a coordinator node (access point) and its
//! single peer (station), and carries light commands between them as
//! fixed-size frames over TCP.
//!
//! Everything except the ESP-IDF radio backend is platform-independent and
//! tested on the host.

// Allow the crate to reference itself by name (needed for proc-macro generated code)
extern crate self as protopixel_net;

pub mod config;
pub mod events;
pub mod lifecycle;
pub mod lights;
pub mod protocol;
pub mod radio;
#[cfg(feature = "tap-tests")]
pub mod testing;

use std::sync::{Mutex, MutexGuard, PoisonError};

// Re-export commonly used items
pub use config::RoleConfig;
pub use events::{AddressEvent, EventBridge, EventMask, EventSubscriptions, LinkEvent};
pub use lifecycle::{InitError, NodeLifecycle, NodeState, Role, ShutdownError};
pub use lights::{LedBank, LightDriver};
pub use protocol::{CommandFrame, DecodeError, LightEffect, FRAME_SIZE};
pub use radio::{HostRadio, Radio, RadioFault};

#[cfg(feature = "esp32")]
pub use radio::EspRadio;

#[cfg(feature = "tap-tests")]
pub use testing::TestRunner;

/// Lock a mutex, recovering the data if a previous holder panicked.
///
/// Lifecycle and event state stay consistent across a panicking handler
/// because no handler ever runs with one of these locks held.
pub(crate) fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
