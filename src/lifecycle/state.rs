//! Lifecycle states.

use std::fmt;

/// Phase of a node's network bring-up or tear-down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum NodeState {
    /// Nothing brought up yet.
    #[default]
    Uninitialized,
    /// Storage prepared and base network stack running.
    RadioReady,
    /// Handlers registered and role configuration applied.
    RoleConfigured,
    /// Radio started.
    Active,
    /// Radio stopped, resources not yet released.
    Stopping,
    /// Fully torn down.
    Stopped,
}

impl NodeState {
    /// Whether the radio is running.
    pub fn is_active(self) -> bool {
        self == Self::Active
    }
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Uninitialized => "uninitialized",
            Self::RadioReady => "radio ready",
            Self::RoleConfigured => "role configured",
            Self::Active => "active",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
        };
        f.write_str(name)
    }
}
