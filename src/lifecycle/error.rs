//! Lifecycle errors.

use super::state::NodeState;
use crate::config::ConfigError;
use crate::events::EventError;
use crate::radio::RadioFault;
use std::fmt;

/// Errors from bringing a node up.
#[derive(Debug)]
pub enum InitError {
    /// Raw mode number is neither station nor access point.
    InvalidRole(u8),
    /// Role configuration failed validation.
    InvalidConfig(ConfigError),
    /// Persistent storage could not be prepared, even after erasing it.
    StorageFault(RadioFault),
    /// Base network stack, event subscription or configuration failed.
    TransportFault(RadioFault),
    /// The radio rejected the configuration at start.
    ActivationFault(RadioFault),
    /// Handler registration failed.
    Event(EventError),
    /// The node is already active.
    AlreadyActive,
    /// The operation is not valid in the current state.
    WrongState(NodeState),
}

impl fmt::Display for InitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidRole(mode) => write!(f, "invalid role: radio mode {}", mode),
            Self::InvalidConfig(e) => write!(f, "invalid configuration: {}", e),
            Self::StorageFault(e) => write!(f, "storage fault: {}", e),
            Self::TransportFault(e) => write!(f, "transport fault: {}", e),
            Self::ActivationFault(e) => write!(f, "activation fault: {}", e),
            Self::Event(e) => write!(f, "event registration: {}", e),
            Self::AlreadyActive => write!(f, "node already active"),
            Self::WrongState(state) => write!(f, "not allowed while {}", state),
        }
    }
}

impl std::error::Error for InitError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::InvalidConfig(e) => Some(e),
            Self::StorageFault(e) | Self::TransportFault(e) | Self::ActivationFault(e) => Some(e),
            Self::Event(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ConfigError> for InitError {
    fn from(e: ConfigError) -> Self {
        Self::InvalidConfig(e)
    }
}

impl From<EventError> for InitError {
    fn from(e: EventError) -> Self {
        Self::Event(e)
    }
}

/// Errors from tearing a node down.
#[derive(Debug)]
pub enum ShutdownError {
    /// The radio could not be stopped; the node stays active.
    StopFault(RadioFault),
    /// The radio stopped but its resources could not be released; the node
    /// stays in [`NodeState::Stopping`] and shutdown may be retried.
    ReleaseFault(RadioFault),
    /// Nothing to shut down in the current state.
    WrongState(NodeState),
}

impl fmt::Display for ShutdownError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StopFault(e) => write!(f, "stop fault: {}", e),
            Self::ReleaseFault(e) => write!(f, "release fault: {}", e),
            Self::WrongState(state) => write!(f, "cannot shut down while {}", state),
        }
    }
}

impl std::error::Error for ShutdownError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::StopFault(e) | Self::ReleaseFault(e) => Some(e),
            Self::WrongState(_) => None,
        }
    }
}
