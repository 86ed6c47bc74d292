//! Movement taxonomy (RILSA codes) for a four-leg intersection.
//!
//! `MOVEMENTS` is the only place the (origin, destination) → code mapping
//! lives. Labels, descriptions, arrows and families are all derived from it.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::types::Cardinal;

/// Maneuver family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementFamily {
    Direct,
    LeftTurn,
    RightTurn,
    UTurn,
}

impl MovementFamily {
    /// Returns a human readable name.
    pub fn name(&self) -> &'static str {
        match self {
            MovementFamily::Direct => "direct",
            MovementFamily::LeftTurn => "left turn",
            MovementFamily::RightTurn => "right turn",
            MovementFamily::UTurn => "U-turn",
        }
    }

    /// Returns the arrow glyph used in tables and overlays.
    pub fn arrow(&self) -> &'static str {
        match self {
            MovementFamily::Direct => "↑",
            MovementFamily::LeftTurn => "↰",
            MovementFamily::RightTurn => "↱",
            MovementFamily::UTurn => "↶",
        }
    }
}

/// A RILSA movement code such as `1`, `8`, `9.3` or `10.2`.
///
/// Ordered numerically, so sorting yields 1..8, 9.1..9.4, 10.1..10.4.
/// `UNKNOWN` sorts first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct MovementCode {
    major: u8,
    minor: u8,
}

impl MovementCode {
    /// Sentinel for pairs outside the taxonomy.
    pub const UNKNOWN: MovementCode = MovementCode { major: 0, minor: 0 };

    const fn new(major: u8, minor: u8) -> Self {
        Self { major, minor }
    }

    /// Returns true unless this is the unknown sentinel.
    pub fn is_known(&self) -> bool {
        *self != Self::UNKNOWN
    }

    /// Returns the table entry for this code.
    pub fn movement(&self) -> Option<&'static Movement> {
        MOVEMENTS.iter().find(|m| m.code == *self)
    }

    /// Returns the maneuver family.
    pub fn family(&self) -> Option<MovementFamily> {
        self.movement().map(|m| m.family)
    }

    /// Returns the printed label ("1", "9.3", "?" for unknown).
    pub fn label(&self) -> String {
        match (self.major, self.minor) {
            (0, _) => "?".to_string(),
            (major, 0) => major.to_string(),
            (major, minor) => format!("{}.{}", major, minor),
        }
    }

    /// Returns a description such as "left turn N→E".
    pub fn description(&self) -> String {
        match self.movement() {
            Some(m) => format!("{} {}→{}", m.family.name(), m.origin, m.destination),
            None => "unknown movement".to_string(),
        }
    }

    /// Returns the arrow glyph of the family.
    pub fn arrow(&self) -> &'static str {
        self.family().map(|f| f.arrow()).unwrap_or("·")
    }

    /// All 16 known codes in canonical order.
    pub fn all() -> Vec<MovementCode> {
        let mut codes: Vec<MovementCode> = MOVEMENTS.iter().map(|m| m.code).collect();
        codes.sort();
        codes
    }

    /// Parses a printed label ("9.3").
    pub fn parse(label: &str) -> Option<MovementCode> {
        MOVEMENTS
            .iter()
            .map(|m| m.code)
            .find(|code| code.label() == label.trim())
    }
}

impl fmt::Display for MovementCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

impl FromStr for MovementCode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim() == "?" {
            return Ok(MovementCode::UNKNOWN);
        }
        MovementCode::parse(s).ok_or_else(|| format!("Unknown movement code: {}", s))
    }
}

impl From<MovementCode> for String {
    fn from(code: MovementCode) -> Self {
        code.label()
    }
}

impl TryFrom<String> for MovementCode {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// One row of the taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Movement {
    pub origin: Cardinal,
    pub destination: Cardinal,
    pub code: MovementCode,
    pub family: MovementFamily,
}

const fn row(origin: Cardinal, destination: Cardinal, major: u8, minor: u8, family: MovementFamily) -> Movement {
    Movement {
        origin,
        destination,
        code: MovementCode::new(major, minor),
        family,
    }
}

use Cardinal::{East as E, North as N, South as S, West as O};
use MovementFamily::{Direct, LeftTurn, RightTurn, UTurn};

/// The authoritative movement table.
pub const MOVEMENTS: [Movement; 16] = [
    row(N, S, 1, 0, Direct),
    row(S, N, 2, 0, Direct),
    row(O, E, 3, 0, Direct),
    row(E, O, 4, 0, Direct),
    row(N, E, 5, 0, LeftTurn),
    row(S, O, 6, 0, LeftTurn),
    row(O, S, 7, 0, LeftTurn),
    row(E, N, 8, 0, LeftTurn),
    row(N, O, 9, 1, RightTurn),
    row(S, E, 9, 2, RightTurn),
    row(O, N, 9, 3, RightTurn),
    row(E, S, 9, 4, RightTurn),
    // U-turns are keyed by the approach on which the reversal happens
    row(N, N, 10, 1, UTurn),
    row(S, S, 10, 2, UTurn),
    row(O, O, 10, 3, UTurn),
    row(E, E, 10, 4, UTurn),
];

/// Maps an (origin, destination) pair to its movement code.
pub fn classify(origin: Cardinal, destination: Cardinal) -> MovementCode {
    MOVEMENTS
        .iter()
        .find(|m| m.origin == origin && m.destination == destination)
        .map(|m| m.code)
        .unwrap_or(MovementCode::UNKNOWN)
}

/// Like [`classify`], but a missing endpoint yields `UNKNOWN`.
pub fn classify_pair(origin: Option<Cardinal>, destination: Option<Cardinal>) -> MovementCode {
    match (origin, destination) {
        (Some(o), Some(d)) => classify(o, d),
        _ => MovementCode::UNKNOWN,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn code(label: &str) -> MovementCode {
        MovementCode::parse(label).unwrap()
    }

    #[test]
    fn test_classify_all_canonical_pairs() {
        let expected = [
            (N, S, "1"), (S, N, "2"), (O, E, "3"), (E, O, "4"),
            (N, E, "5"), (S, O, "6"), (O, S, "7"), (E, N, "8"),
            (N, O, "9.1"), (S, E, "9.2"), (O, N, "9.3"), (E, S, "9.4"),
            (N, N, "10.1"), (S, S, "10.2"), (O, O, "10.3"), (E, E, "10.4"),
        ];

        for (origin, destination, label) in expected {
            assert_eq!(classify(origin, destination).label(), label, "{}→{}", origin, destination);
        }
    }

    #[test]
    fn test_table_covers_every_pair_once() {
        for origin in Cardinal::ALL {
            for destination in Cardinal::ALL {
                let hits = MOVEMENTS
                    .iter()
                    .filter(|m| m.origin == origin && m.destination == destination)
                    .count();
                assert_eq!(hits, 1);
            }
        }
        assert_eq!(MovementCode::all().len(), 16);
    }

    #[test]
    fn test_missing_endpoint_is_unknown() {
        assert_eq!(classify_pair(Some(N), None), MovementCode::UNKNOWN);
        assert_eq!(classify_pair(None, None).label(), "?");
        assert!(!MovementCode::UNKNOWN.is_known());
    }

    #[test]
    fn test_ordering_is_numeric() {
        let all = MovementCode::all();
        let labels: Vec<String> = all.iter().map(|c| c.label()).collect();
        assert_eq!(labels.first().map(String::as_str), Some("1"));
        assert_eq!(labels[8], "9.1");
        assert_eq!(labels.last().map(String::as_str), Some("10.4"));
        assert!(code("8") < code("9.1"));
        assert!(code("9.4") < code("10.1"));
    }

    #[test]
    fn test_derived_descriptions() {
        assert_eq!(code("5").description(), "left turn N→E");
        assert_eq!(code("10.2").family(), Some(MovementFamily::UTurn));
        assert_eq!(code("9.3").arrow(), "↱");
    }

    #[test]
    fn test_serde_uses_label() {
        let json = serde_json::to_string(&code("9.3")).unwrap();
        assert_eq!(json, "\"9.3\"");

        let back: MovementCode = serde_json::from_str("\"10.4\"").unwrap();
        assert_eq!(back, classify(E, E));
        assert!(serde_json::from_str::<MovementCode>("\"11\"").is_err());
    }
}
