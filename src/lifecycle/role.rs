//! Network role of a node.

use super::error::InitError;
use std::fmt;

/// Which side of the link a node plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Hosts the access point and listens for commands.
    Coordinator,
    /// Joins the coordinator's network and sends commands.
    Peer,
}

impl Role {
    /// Radio mode number of a station.
    pub const MODE_STATION: u8 = 1;
    /// Radio mode number of an access point.
    pub const MODE_ACCESS_POINT: u8 = 2;

    /// Map a raw radio mode number to a role.
    pub fn from_mode(mode: u8) -> Result<Self, InitError> {
        match mode {
            Self::MODE_STATION => Ok(Self::Peer),
            Self::MODE_ACCESS_POINT => Ok(Self::Coordinator),
            other => Err(InitError::InvalidRole(other)),
        }
    }

    /// Radio mode number of this role.
    pub fn mode(self) -> u8 {
        match self {
            Self::Coordinator => Self::MODE_ACCESS_POINT,
            Self::Peer => Self::MODE_STATION,
        }
    }
}

impl TryFrom<u8> for Role {
    type Error = InitError;

    fn try_from(mode: u8) -> Result<Self, Self::Error> {
        Self::from_mode(mode)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Coordinator => f.write_str("coordinator"),
            Self::Peer => f.write_str("peer"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_mapping() {
        assert_eq!(Role::from_mode(1).unwrap(), Role::Peer);
        assert_eq!(Role::from_mode(2).unwrap(), Role::Coordinator);
        assert_eq!(Role::Coordinator.mode(), 2);
        assert_eq!(Role::try_from(Role::Peer.mode()).unwrap(), Role::Peer);
    }

    #[test]
    fn test_out_of_range_modes() {
        for mode in [0u8, 3, 4, 255] {
            assert!(matches!(Role::from_mode(mode), Err(InitError::InvalidRole(m)) if m == mode));
        }
    }
}
