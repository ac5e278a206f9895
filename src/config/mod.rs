//! Network configuration for the light network.
//!
//! The network a node joins or hosts is fixed per build: identifier,
//! passphrase, channel, authentication mode and command port are constants
//! in the `network` submodule. [`RoleConfig`] carries them into the lifecycle state
//! machine and validates them before any radio resource is touched.

mod network;

pub use network::{
    AuthMode, ConfigError, RoleConfig, COORDINATOR_ADDR, MAX_CHANNEL, MAX_PASSPHRASE_LEN,
    MAX_PEER_CONNECTIONS, MAX_SSID_LEN, MIN_CHANNEL, NETWORK_AUTH_MODE,
    NETWORK_CHANNEL, NETWORK_PASSPHRASE, NETWORK_SSID, TCP_COMMAND_PORT,
};
