//! Numeric station codes.

use serde::{Deserialize, Serialize};

/// Error when a wire field cannot be decoded as a station code.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid station code: {reason}")]
pub struct InvalidEvaNumber {
    reason: &'static str,
}

/// EVA number, the numeric code identifying a station in realtime messages.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct EvaNumber(u32);

impl EvaNumber {
    pub fn new(number: u32) -> Self {
        Self(number)
    }

    /// Decodes the four-byte big-endian signed encoding used by stream
    /// entries. Codes are never negative.
    pub fn from_be_bytes(bytes: &[u8]) -> Result<Self, InvalidEvaNumber> {
        let bytes: [u8; 4] = bytes.try_into().map_err(|_| InvalidEvaNumber {
            reason: "expected exactly 4 bytes",
        })?;
        let number = i32::from_be_bytes(bytes);
        if number < 0 {
            return Err(InvalidEvaNumber {
                reason: "must not be negative",
            });
        }
        Ok(Self(number as u32))
    }

    pub fn value(&self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for EvaNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
