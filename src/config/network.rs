//! Build-fixed network parameters and role configuration.
//!
//! # Example
//!
//! ```
//! use protopixel_net::config::{RoleConfig, NETWORK_SSID};
//! use protopixel_net::Role;
//!
//! let config = RoleConfig::fixed();
//! assert_eq!(config.ssid(), NETWORK_SSID);
//! assert!(config.validate(Role::Coordinator).is_ok());
//! ```

use crate::lifecycle::Role;
use std::fmt;
use std::net::Ipv4Addr;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Identifier of the network shared by the nodes of the light system.
pub const NETWORK_SSID: &str = "ProtoPixelNetwork";

/// Passphrase of the light network.
pub const NETWORK_PASSPHRASE: &str = "TheMostInsaneAndSecurePass";

/// Channel the coordinator hosts the network on.
pub const NETWORK_CHANNEL: u8 = 1;

/// Authentication mode of the light network.
pub const NETWORK_AUTH_MODE: AuthMode = AuthMode::Wpa2Personal;

/// Maximum number of stations the coordinator accepts.
pub const MAX_PEER_CONNECTIONS: u8 = 1;

/// TCP port the coordinator listens on for command frames.
pub const TCP_COMMAND_PORT: u16 = 7777;

/// Address of the coordinator on its own network (soft-AP default gateway).
pub const COORDINATOR_ADDR: Ipv4Addr = Ipv4Addr::new(192, 168, 4, 1);

/// Maximum SSID length per IEEE 802.11.
pub const MAX_SSID_LEN: usize = 32;

/// Maximum WPA passphrase length.
pub const MAX_PASSPHRASE_LEN: usize = 64;

/// Lowest 2.4 GHz channel.
pub const MIN_CHANNEL: u8 = 1;

/// Highest 2.4 GHz channel usable in every region.
pub const MAX_CHANNEL: u8 = 13;

/// Authentication mode of the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    /// No authentication.
    Open,
    /// WPA2 pre-shared key.
    Wpa2Personal,
    /// WPA3 SAE.
    Wpa3Personal,
    /// WPA2/WPA3 transition mode.
    Wpa2Wpa3Personal,
}

impl AuthMode {
    /// Whether this mode uses a passphrase.
    pub fn requires_passphrase(&self) -> bool {
        !matches!(self, Self::Open)
    }
}

impl fmt::Display for AuthMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Open => "open",
            Self::Wpa2Personal => "WPA2-PSK",
            Self::Wpa3Personal => "WPA3-SAE",
            Self::Wpa2Wpa3Personal => "WPA2/WPA3",
        };
        f.write_str(name)
    }
}

/// Role-specific radio parameters applied during bring-up.
///
/// The passphrase is wiped from memory when the configuration is dropped.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct RoleConfig {
    ssid: String,
    passphrase: String,
    #[zeroize(skip)]
    channel: u8,
    #[zeroize(skip)]
    auth_mode: AuthMode,
    #[zeroize(skip)]
    max_peers: u8,
}

impl RoleConfig {
    /// Build a configuration from explicit parameters.
    ///
    /// Nothing is validated here; [`RoleConfig::validate`] runs when the
    /// configuration is handed to the lifecycle.
    pub fn new(
        ssid: impl Into<String>,
        passphrase: impl Into<String>,
        channel: u8,
        auth_mode: AuthMode,
    ) -> Self {
        Self {
            ssid: ssid.into(),
            passphrase: passphrase.into(),
            channel,
            auth_mode,
            max_peers: MAX_PEER_CONNECTIONS,
        }
    }

    /// The configuration every node of this build uses.
    pub fn fixed() -> Self {
        Self::new(
            NETWORK_SSID,
            NETWORK_PASSPHRASE,
            NETWORK_CHANNEL,
            NETWORK_AUTH_MODE,
        )
    }

    /// Override the coordinator's station limit.
    pub fn with_max_peers(mut self, max_peers: u8) -> Self {
        self.max_peers = max_peers;
        self
    }

    pub fn ssid(&self) -> &str {
        &self.ssid
    }

    pub fn passphrase(&self) -> &str {
        &self.passphrase
    }

    pub fn channel(&self) -> u8 {
        self.channel
    }

    pub fn auth_mode(&self) -> AuthMode {
        self.auth_mode
    }

    pub fn max_peers(&self) -> u8 {
        self.max_peers
    }

    /// Validate the configuration for the given role.
    pub fn validate(&self, role: Role) -> Result<(), ConfigError> {
        if self.ssid.is_empty() {
            return Err(ConfigError::SsidEmpty);
        }
        if self.ssid.len() > MAX_SSID_LEN {
            return Err(ConfigError::SsidTooLong {
                len: self.ssid.len(),
                max: MAX_SSID_LEN,
            });
        }

        // No lower bound on the passphrase length.
        if !self.auth_mode.requires_passphrase() && !self.passphrase.is_empty() {
            return Err(ConfigError::PassphraseOnOpenNetwork);
        }
        if self.passphrase.len() > MAX_PASSPHRASE_LEN {
            return Err(ConfigError::PassphraseTooLong {
                len: self.passphrase.len(),
                max: MAX_PASSPHRASE_LEN,
            });
        }

        if !(MIN_CHANNEL..=MAX_CHANNEL).contains(&self.channel) {
            return Err(ConfigError::ChannelOutOfRange(self.channel));
        }

        if role == Role::Coordinator && self.max_peers != MAX_PEER_CONNECTIONS {
            return Err(ConfigError::UnsupportedPeerCount(self.max_peers));
        }

        Ok(())
    }
}

impl Default for RoleConfig {
    fn default() -> Self {
        Self::fixed()
    }
}

impl fmt::Debug for RoleConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RoleConfig")
            .field("ssid", &self.ssid)
            .field("passphrase", &"<redacted>")
            .field("channel", &self.channel)
            .field("auth_mode", &self.auth_mode)
            .field("max_peers", &self.max_peers)
            .finish()
    }
}

/// Errors raised while validating a [`RoleConfig`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// SSID is empty.
    SsidEmpty,
    /// SSID exceeds maximum length.
    SsidTooLong { len: usize, max: usize },
    /// Passphrase exceeds maximum length.
    PassphraseTooLong { len: usize, max: usize },
    /// A passphrase was given for an open network.
    PassphraseOnOpenNetwork,
    /// Channel outside the 2.4 GHz range.
    ChannelOutOfRange(u8),
    /// The coordinator only ever serves a single peer.
    UnsupportedPeerCount(u8),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SsidEmpty => write!(f, "SSID cannot be empty"),
            Self::SsidTooLong { len, max } => {
                write!(f, "SSID too long: {} bytes (max {})", len, max)
            }
            Self::PassphraseTooLong { len, max } => {
                write!(f, "passphrase too long: {} bytes (max {})", len, max)
            }
            Self::PassphraseOnOpenNetwork => {
                write!(f, "open networks take no passphrase")
            }
            Self::ChannelOutOfRange(ch) => write!(
                f,
                "channel {} out of range ({}-{})",
                ch, MIN_CHANNEL, MAX_CHANNEL
            ),
            Self::UnsupportedPeerCount(n) => {
                write!(f, "coordinator supports exactly 1 peer, got {}", n)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_config_is_valid_for_both_roles() {
        let config = RoleConfig::fixed();
        assert!(config.validate(Role::Coordinator).is_ok());
        assert!(config.validate(Role::Peer).is_ok());
        assert_eq!(config.channel(), 1);
        assert_eq!(config.auth_mode(), AuthMode::Wpa2Personal);
        assert_eq!(config.max_peers(), 1);
    }

    #[test]
    fn test_empty_ssid() {
        let config = RoleConfig::new("", "password123", 1, AuthMode::Wpa2Personal);
        assert_eq!(
            config.validate(Role::Peer),
            Err(ConfigError::SsidEmpty)
        );
    }

    #[test]
    fn test_ssid_too_long() {
        let config = RoleConfig::new("a".repeat(33), "password123", 1, AuthMode::Wpa2Personal);
        assert!(matches!(
            config.validate(Role::Peer),
            Err(ConfigError::SsidTooLong { len: 33, .. })
        ));
    }

    #[test]
    fn test_passphrase_bounds() {
        let short = RoleConfig::new("Net", "pass", 1, AuthMode::Wpa2Personal);
        assert!(short.validate(Role::Coordinator).is_ok());

        let long = RoleConfig::new("Net", "a".repeat(65), 1, AuthMode::Wpa2Personal);
        assert!(matches!(
            long.validate(Role::Coordinator),
            Err(ConfigError::PassphraseTooLong { .. })
        ));

        let max = RoleConfig::new("Net", "a".repeat(64), 1, AuthMode::Wpa3Personal);
        assert!(max.validate(Role::Coordinator).is_ok());
    }

    #[test]
    fn test_open_network_rejects_passphrase() {
        let open = RoleConfig::new("Net", "", 6, AuthMode::Open);
        assert!(open.validate(Role::Peer).is_ok());

        let bogus = RoleConfig::new("Net", "password123", 6, AuthMode::Open);
        assert_eq!(
            bogus.validate(Role::Peer),
            Err(ConfigError::PassphraseOnOpenNetwork)
        );
    }

    #[test]
    fn test_channel_range() {
        for ch in [0u8, 14, 255] {
            let config = RoleConfig::new("Net", "password123", ch, AuthMode::Wpa2Personal);
            assert_eq!(
                config.validate(Role::Coordinator),
                Err(ConfigError::ChannelOutOfRange(ch))
            );
        }
        let config = RoleConfig::new("Net", "password123", 13, AuthMode::Wpa2Personal);
        assert!(config.validate(Role::Coordinator).is_ok());
    }

    #[test]
    fn test_peer_count_only_checked_for_coordinator() {
        let config = RoleConfig::fixed().with_max_peers(4);
        assert_eq!(
            config.validate(Role::Coordinator),
            Err(ConfigError::UnsupportedPeerCount(4))
        );
        assert!(config.validate(Role::Peer).is_ok());
    }

    #[test]
    fn test_debug_redacts_passphrase() {
        let debug = format!("{:?}", RoleConfig::fixed());
        assert!(debug.contains(NETWORK_SSID));
        assert!(!debug.contains(NETWORK_PASSPHRASE));
    }
}
