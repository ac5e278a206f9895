//! Node role lifecycle.
//!
//! A node is brought up once as either [`Role::Coordinator`] (hosts the
//! access point) or [`Role::Peer`] (joins it) and walks through
//! [`NodeState`]:
//!
//! ```text
//! Uninitialized ─► RadioReady ─► RoleConfigured ─► Active ─► Stopping ─► Stopped
//! ```
//!
//! [`NodeLifecycle`] owns that state and is the only thing that drives the
//! radio. Transitions are serialized; failures leave the node in a
//! well-defined state from which the caller can retry or tear down.

mod error;
mod machine;
mod role;
mod state;

pub use error::{InitError, ShutdownError};
pub use machine::NodeLifecycle;
pub use role::Role;
pub use state::NodeState;
