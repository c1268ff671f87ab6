//! Replication log positions
//!
//! A position is the two-part `hex/hex` counter PostgreSQL reports for its
//! write-ahead log. Positions are ordered by the high part, then the low
//! part, both numerically; the textual form never takes part in ordering.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors produced when handling replication positions
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PositionError {
    #[error("malformed replication position: {0:?}")]
    Malformed(String),

    #[error("replication position {position} cannot advance by {amount}")]
    Overflow { position: String, amount: u64 },
}

/// A totally ordered write-ahead log position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Position {
    high: u64,
    low: u64,
}

impl Position {
    /// The minimum position, marking the start of time
    pub const fn initial() -> Self {
        Self { high: 0, low: 0 }
    }

    pub const fn new(high: u64, low: u64) -> Self {
        Self { high, low }
    }

    pub fn high(&self) -> u64 {
        self.high
    }

    pub fn low(&self) -> u64 {
        self.low
    }

    /// Advance the low part by `amount`.
    pub fn increment(&self, amount: u64) -> Result<Self, PositionError> {
        let low = self
            .low
            .checked_add(amount)
            .ok_or_else(|| PositionError::Overflow {
                position: self.to_string(),
                amount,
            })?;
        Ok(Self { high: self.high, low })
    }
}

impl Default for Position {
    fn default() -> Self {
        Self::initial()
    }
}

fn parse_part(part: &str, input: &str) -> Result<u64, PositionError> {
    if part.is_empty() || !part.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(PositionError::Malformed(input.to_string()));
    }
    u64::from_str_radix(part, 16).map_err(|_| PositionError::Malformed(input.to_string()))
}

impl FromStr for Position {
    type Err = PositionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split('/');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(high), Some(low), None) => Ok(Self {
                high: parse_part(high, s)?,
                low: parse_part(low, s)?,
            }),
            _ => Err(PositionError::Malformed(s.to_string())),
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:x}/{:08x}", self.high, self.low)
    }
}

impl Serialize for Position {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Position {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Compare two positions in their wire form.
pub fn compare(a: &str, b: &str) -> Result<Ordering, PositionError> {
    let a: Position = a.parse()?;
    let b: Position = b.parse()?;
    Ok(a.cmp(&b))
}

/// Advance a position given in wire form by `amount`, returning the wire form.
pub fn increment(position: &str, amount: u64) -> Result<String, PositionError> {
    let position: Position = position.parse()?;
    Ok(position.increment(amount)?.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_wire_form() {
        assert_eq!(Position::initial().to_string(), "0/00000000");
        assert_eq!("0/00000000".parse::<Position>().unwrap(), Position::initial());
    }

    #[test]
    fn test_numeric_not_lexical_order() {
        assert_eq!(compare("0/A", "0/00000009").unwrap(), Ordering::Greater);
        assert_eq!(compare("1/0", "0/FFFFFFFF").unwrap(), Ordering::Greater);
        assert_eq!(compare("0/0000000a", "0/a").unwrap(), Ordering::Equal);
        assert_eq!(compare("0/10", "10/0").unwrap(), Ordering::Less);
    }

    #[test]
    fn test_malformed_positions() {
        for bad in ["", "0", "0/", "/0", "0/0/0", "g/0", "0/-1", "0/+1", " 0/1"] {
            assert!(
                matches!(compare(bad, "0/0"), Err(PositionError::Malformed(_))),
                "{bad:?} should be rejected"
            );
        }
        assert!(increment("nope", 1).is_err());
    }

    #[test]
    fn test_increment() {
        assert_eq!(increment("0/00000000", 10).unwrap(), "0/0000000a");
        assert_eq!(increment("0/0000000a", 10).unwrap(), "0/00000014");
        assert_eq!(increment("3/fffffff0", 0x20).unwrap(), "3/100000010");

        let top = Position::new(0, u64::MAX);
        assert!(matches!(top.increment(1), Err(PositionError::Overflow { .. })));
    }

    #[test]
    fn test_serde_uses_wire_form() {
        let pos: Position = serde_json::from_str("\"16/b374d848\"").unwrap();
        assert_eq!(pos, Position::new(0x16, 0xb374d848));
        assert_eq!(serde_json::to_string(&pos).unwrap(), "\"16/b374d848\"");
        assert!(serde_json::from_str::<Position>("\"16\"").is_err());
    }
}
