//! Fixed-size command frame.
//!
//! Wire format (8 bytes, no padding):
//!
//! ```text
//! ┌──────────────┬──────────────┐
//! │ led_id (u32) │ action (u32) │
//! │ little-end.  │ little-end.  │
//! └──────────────┴──────────────┘
//! ```
//!
//! This is the in-memory layout of the command struct on the device, so
//! frames produced here are interchangeable with firmware that sends the raw
//! struct bytes.
//!
//! # Example
//!
//! ```
//! use protopixel_net::protocol::{decode, encode, CommandFrame, LightEffect, FRAME_SIZE};
//!
//! let frame = CommandFrame::new(3, LightEffect::Toggle);
//! let bytes = encode(&frame);
//! assert_eq!(bytes.len(), FRAME_SIZE);
//! assert_eq!(decode(&bytes).unwrap(), frame);
//! ```

use std::fmt;

/// Identifier of a light on the receiving node.
///
/// Whether an identifier maps to a real LED is up to the light driver.
pub type LedId = u32;

const LED_ID_LEN: usize = 4;
const ACTION_LEN: usize = 4;

/// Encoded size of a [`CommandFrame`] in bytes.
pub const FRAME_SIZE: usize = LED_ID_LEN + ACTION_LEN;

/// Light effects a node can apply to an LED.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum LightEffect {
    /// Invert the LED's current state.
    Toggle = 0,
}

impl LightEffect {
    /// Number of defined effects. Wire values at or above this are invalid.
    pub const COUNT: u32 = 1;

    /// Wire value of this effect.
    pub fn as_u32(self) -> u32 {
        self as u32
    }
}

impl TryFrom<u32> for LightEffect {
    type Error = DecodeError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Toggle),
            other => Err(DecodeError::InvalidAction(other)),
        }
    }
}

impl fmt::Display for LightEffect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Toggle => f.write_str("toggle"),
        }
    }
}

/// A command addressed to one light.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CommandFrame {
    pub led_id: LedId,
    pub action: LightEffect,
}

impl CommandFrame {
    pub fn new(led_id: LedId, action: LightEffect) -> Self {
        Self { led_id, action }
    }

    /// Shorthand for a toggle command.
    pub fn toggle(led_id: LedId) -> Self {
        Self::new(led_id, LightEffect::Toggle)
    }
}

impl fmt::Display for CommandFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} led {}", self.action, self.led_id)
    }
}

/// Encode a frame into its wire representation.
pub fn encode(frame: &CommandFrame) -> [u8; FRAME_SIZE] {
    let mut buf = [0u8; FRAME_SIZE];
    buf[..LED_ID_LEN].copy_from_slice(&frame.led_id.to_le_bytes());
    buf[LED_ID_LEN..].copy_from_slice(&frame.action.as_u32().to_le_bytes());
    buf
}

/// Decode a frame from exactly [`FRAME_SIZE`] bytes.
///
/// A frame is either decoded whole or rejected; there is no partial result.
pub fn decode(bytes: &[u8]) -> Result<CommandFrame, DecodeError> {
    let buf: &[u8; FRAME_SIZE] = bytes.try_into().map_err(|_| DecodeError::WrongLength {
        expected: FRAME_SIZE,
        actual: bytes.len(),
    })?;

    let (led, action) = buf.split_at(LED_ID_LEN);
    let led_id = u32::from_le_bytes([led[0], led[1], led[2], led[3]]);
    let raw_action = u32::from_le_bytes([action[0], action[1], action[2], action[3]]);

    Ok(CommandFrame {
        led_id,
        action: LightEffect::try_from(raw_action)?,
    })
}

/// Errors produced while decoding a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    /// Buffer length differs from [`FRAME_SIZE`].
    WrongLength { expected: usize, actual: usize },
    /// Action field is not a known [`LightEffect`].
    InvalidAction(u32),
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WrongLength { expected, actual } => {
                write!(f, "wrong frame length: {} bytes (expected {})", actual, expected)
            }
            Self::InvalidAction(v) => write!(
                f,
                "invalid action {} (known actions: 0..{})",
                v,
                LightEffect::COUNT
            ),
        }
    }
}

impl std::error::Error for DecodeError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_size_has_no_padding() {
        assert_eq!(FRAME_SIZE, 8);
    }

    #[test]
    fn test_encode_layout() {
        let bytes = encode(&CommandFrame::toggle(3));
        assert_eq!(bytes, [3, 0, 0, 0, 0, 0, 0, 0]);

        let bytes = encode(&CommandFrame::toggle(0x0102_0304));
        assert_eq!(&bytes[..4], &[0x04, 0x03, 0x02, 0x01]);
    }

    #[test]
    fn test_roundtrip_led_id_edges() {
        for led_id in [0, 1, 3, 255, 256, u32::MAX] {
            let frame = CommandFrame::new(led_id, LightEffect::Toggle);
            assert_eq!(decode(&encode(&frame)), Ok(frame));
        }
    }

    #[test]
    fn test_decode_wrong_length() {
        for len in [0usize, 1, 7, 9, 16] {
            let buf = vec![0u8; len];
            assert_eq!(
                decode(&buf),
                Err(DecodeError::WrongLength {
                    expected: FRAME_SIZE,
                    actual: len
                })
            );
        }
    }

    #[test]
    fn test_wrong_length_wins_over_content() {
        // A bad action in an oversized buffer is still a length error.
        let mut buf = [0xFFu8; FRAME_SIZE + 1];
        buf[0] = 3;
        assert!(matches!(decode(&buf), Err(DecodeError::WrongLength { .. })));
    }

    #[test]
    fn test_decode_rejects_sentinel_and_above() {
        for action in [LightEffect::COUNT, LightEffect::COUNT + 1, u32::MAX] {
            let mut buf = [0u8; FRAME_SIZE];
            buf[..4].copy_from_slice(&7u32.to_le_bytes());
            buf[4..].copy_from_slice(&action.to_le_bytes());
            assert_eq!(decode(&buf), Err(DecodeError::InvalidAction(action)));
        }
    }

    #[test]
    fn test_light_effect_try_from() {
        assert_eq!(LightEffect::try_from(0), Ok(LightEffect::Toggle));
        assert_eq!(LightEffect::try_from(1), Err(DecodeError::InvalidAction(1)));
    }

    #[test]
    fn test_display() {
        assert_eq!(CommandFrame::toggle(2).to_string(), "toggle led 2");
        assert!(DecodeError::InvalidAction(9).to_string().contains('9'));
    }
}

#[cfg(feature = "tap-tests")]
mod tap_tests {
    use super::*;
    use protopixel_net_macros::tap_test;

    #[tap_test]
    fn frame_roundtrip_on_device() {
        let frame = CommandFrame::toggle(3);
        assert_eq!(decode(&encode(&frame)), Ok(frame));
    }

    #[tap_test]
    fn frame_size_matches_device_struct() {
        #[repr(C)]
        struct DeviceCommand {
            _id: u32,
            _action: u32,
        }
        assert_eq!(std::mem::size_of::<DeviceCommand>(), FRAME_SIZE);
    }
}
