use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Numeric identifier of a stored object or file collection.
///
/// A `SlotId` is mapped to a deterministic filesystem location by a slot
/// layout; it carries no meaning beyond its integer value.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SlotId(u64);

impl SlotId {
    /// Wrap a raw integer.
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// The raw integer value.
    pub const fn value(&self) -> u64 {
        self.0
    }

    /// The identifier that follows this one.
    pub fn next(&self) -> Self {
        Self(self.0.saturating_add(1))
    }

    /// Decimal representation left-padded with zeros to `width` digits.
    ///
    /// Values wider than `width` are rendered in full.
    pub fn padded(&self, width: usize) -> String {
        format!("{:0width$}", self.0, width = width)
    }
}

impl fmt::Debug for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SlotId({})", self.0)
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for SlotId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<SlotId> for u64 {
    fn from(id: SlotId) -> Self {
        id.0
    }
}

impl FromStr for SlotId {
    type Err = TypeError;

    /// Parse a decimal identifier. Leading zeros are accepted.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(TypeError::InvalidSlotId(s.to_string()));
        }
        s.parse::<u64>()
            .map(Self)
            .map_err(|_| TypeError::InvalidSlotId(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn padded_to_width() {
        assert_eq!(SlotId::new(137).padded(8), "00000137");
        assert_eq!(SlotId::new(0).padded(4), "0000");
        assert_eq!(SlotId::new(123_456).padded(3), "123456");
    }

    #[test]
    fn parse_accepts_leading_zeros() {
        let id: SlotId = "00000137".parse().unwrap();
        assert_eq!(id, SlotId::new(137));
    }

    #[test]
    fn parse_rejects_non_digits() {
        assert!("".parse::<SlotId>().is_err());
        assert!("12a".parse::<SlotId>().is_err());
        assert!("-5".parse::<SlotId>().is_err());
        assert!("+5".parse::<SlotId>().is_err());
    }

    #[test]
    fn next_saturates() {
        assert_eq!(SlotId::new(9).next(), SlotId::new(10));
        assert_eq!(SlotId::new(u64::MAX).next(), SlotId::new(u64::MAX));
    }

    #[test]
    fn serde_is_transparent() {
        let json = serde_json::to_string(&SlotId::new(42)).unwrap();
        assert_eq!(json, "42");
        let back: SlotId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, SlotId::new(42));
    }
}
