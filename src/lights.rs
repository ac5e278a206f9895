//! Light driver seam.
//!
//! The coordinator hands every decoded [`CommandFrame`] to a [`LightDriver`].
//! Mapping an LED identifier to real hardware, and rejecting identifiers
//! that don't exist, is the driver's job; the frame codec accepts any value.

use crate::protocol::{CommandFrame, LedId, LightEffect};
use log::debug;
use std::fmt;

/// Something that can apply light commands.
pub trait LightDriver {
    fn apply(&mut self, frame: &CommandFrame) -> Result<(), LightError>;
}

/// In-memory LED states, used on the host and as a reference driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedBank {
    states: Vec<bool>,
}

impl LedBank {
    /// A bank of `count` LEDs, all off.
    pub fn new(count: usize) -> Self {
        Self {
            states: vec![false; count],
        }
    }

    /// Current state of an LED, `None` if it doesn't exist.
    pub fn is_on(&self, led_id: LedId) -> Option<bool> {
        self.states.get(led_id as usize).copied()
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

impl LightDriver for LedBank {
    fn apply(&mut self, frame: &CommandFrame) -> Result<(), LightError> {
        let count = self.states.len();
        let led = self
            .states
            .get_mut(frame.led_id as usize)
            .ok_or(LightError::UnknownLed {
                led_id: frame.led_id,
                count,
            })?;

        match frame.action {
            LightEffect::Toggle => *led = !*led,
        }
        debug!("LED {} is now {}", frame.led_id, if *led { "on" } else { "off" });
        Ok(())
    }
}

/// Errors applying a light command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LightError {
    /// No LED with this identifier.
    UnknownLed { led_id: LedId, count: usize },
}

impl fmt::Display for LightError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownLed { led_id, count } => {
                write!(f, "unknown LED {} (have {})", led_id, count)
            }
        }
    }
}

impl std::error::Error for LightError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toggle_flips_state() {
        let mut bank = LedBank::new(4);
        assert_eq!(bank.is_on(3), Some(false));

        bank.apply(&CommandFrame::toggle(3)).unwrap();
        assert_eq!(bank.is_on(3), Some(true));
        assert_eq!(bank.is_on(2), Some(false));

        bank.apply(&CommandFrame::toggle(3)).unwrap();
        assert_eq!(bank.is_on(3), Some(false));
    }

    #[test]
    fn test_unknown_led_rejected_without_change() {
        let mut bank = LedBank::new(2);
        let before = bank.clone();
        assert_eq!(
            bank.apply(&CommandFrame::toggle(2)),
            Err(LightError::UnknownLed { led_id: 2, count: 2 })
        );
        assert_eq!(bank, before);
        assert_eq!(bank.is_on(2), None);
    }
}
