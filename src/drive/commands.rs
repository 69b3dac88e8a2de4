use serde::Serialize;

use crate::error::CommandValueError;

const MIN_TURN: u8 = 0;
const MAX_TURN: u8 = 180;

/// Drive direction as written to the direction characteristic.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, derive_more::Display)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    #[display("forward")]
    Forward,
    #[display("reverse")]
    Reverse,
}

impl Direction {
    #[must_use]
    pub fn byte(self) -> u8 {
        match self {
            Self::Forward => 0,
            Self::Reverse => 1,
        }
    }
}

/// Motor speed; every byte value is valid.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, derive_more::From, derive_more::Into)]
pub struct Speed(u8);

impl Speed {
    #[must_use]
    pub fn value(self) -> u8 {
        self.0
    }
}

/// Validated turn byte in `0..=180`, 90 being straight ahead.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize)]
pub struct Turn(u8);

impl Turn {
    /// Creates a validated turn value.
    ///
    /// # Errors
    ///
    /// Returns an error when `value` is above 180.
    ///
    /// ```
    /// let turn = lambcar::Turn::new(120)?;
    /// assert_eq!(120, turn.value());
    /// assert!(lambcar::Turn::new(181).is_err());
    /// # Ok::<(), lambcar::CommandValueError>(())
    /// ```
    pub fn new(value: u8) -> Result<Self, CommandValueError> {
        if !(MIN_TURN..=MAX_TURN).contains(&value) {
            return Err(CommandValueError::TurnOutOfRange {
                value,
                min: MIN_TURN,
                max: MAX_TURN,
            });
        }
        Ok(Self(value))
    }

    #[must_use]
    pub fn value(self) -> u8 {
        self.0
    }
}
