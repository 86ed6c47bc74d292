//! Common types shared by every stage of the counting engine.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// One of the four approach labels of an intersection leg.
///
/// West is written `O` (oeste) on the wire, matching the field sheets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Cardinal {
    #[serde(rename = "N")]
    North,
    #[serde(rename = "S")]
    South,
    #[serde(rename = "E")]
    East,
    #[serde(rename = "O", alias = "W")]
    West,
}

impl Cardinal {
    /// All directions in canonical order (N, S, O, E).
    pub const ALL: [Cardinal; 4] = [Cardinal::North, Cardinal::South, Cardinal::West, Cardinal::East];

    /// Returns the single-letter code.
    pub fn code(&self) -> &'static str {
        match self {
            Cardinal::North => "N",
            Cardinal::South => "S",
            Cardinal::East => "E",
            Cardinal::West => "O",
        }
    }
}

impl fmt::Display for Cardinal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

impl FromStr for Cardinal {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "n" | "north" | "norte" => Ok(Cardinal::North),
            "s" | "south" | "sur" => Ok(Cardinal::South),
            "e" | "east" | "este" => Ok(Cardinal::East),
            "o" | "w" | "west" | "oeste" => Ok(Cardinal::West),
            _ => Err(format!("Unknown direction: {}", s)),
        }
    }
}

/// Closed set of object classes produced by the detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectClass {
    Car,
    Truck,
    Bus,
    Motorcycle,
    Bicycle,
    Person,
}

impl ObjectClass {
    /// All classes in export column order.
    pub const ALL: [ObjectClass; 6] = [
        ObjectClass::Car,
        ObjectClass::Truck,
        ObjectClass::Bus,
        ObjectClass::Motorcycle,
        ObjectClass::Bicycle,
        ObjectClass::Person,
    ];

    /// Returns the wire name.
    pub fn name(&self) -> &'static str {
        match self {
            ObjectClass::Car => "car",
            ObjectClass::Truck => "truck",
            ObjectClass::Bus => "bus",
            ObjectClass::Motorcycle => "motorcycle",
            ObjectClass::Bicycle => "bicycle",
            ObjectClass::Person => "person",
        }
    }

    /// Returns true for pedestrians.
    pub fn is_pedestrian(&self) -> bool {
        matches!(self, ObjectClass::Person)
    }
}

impl fmt::Display for ObjectClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for ObjectClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "car" | "auto" => Ok(ObjectClass::Car),
            "truck" | "camion" => Ok(ObjectClass::Truck),
            "bus" => Ok(ObjectClass::Bus),
            "motorcycle" | "motorbike" | "moto" => Ok(ObjectClass::Motorcycle),
            "bicycle" | "bike" | "bicicleta" => Ok(ObjectClass::Bicycle),
            "person" | "pedestrian" | "peaton" => Ok(ObjectClass::Person),
            _ => Err(format!("Unknown object class: {}", s)),
        }
    }
}

/// Stable identifier of one physically tracked object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackId(pub u64);

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Identifier of one counting scope (an intersection recording, an "aforo").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ScopeId(pub Uuid);

impl ScopeId {
    /// Creates a new random ScopeId.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a ScopeId from a UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the inner UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for ScopeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // First 8 chars are enough in logs
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

/// A configured access of the intersection.
///
/// The polygon bounds the area where trajectories enter or leave through
/// this approach. The gate is a short reference line used for rendering and
/// approximate matching when no polygon was drawn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessZone {
    /// Display name (e.g. "Av. Caracas norte")
    #[serde(default)]
    pub name: String,

    /// Compass direction this access represents
    pub direction: Cardinal,

    /// Bounding polygon, at least 3 vertices
    #[serde(default)]
    pub polygon: Option<Vec<[f64; 2]>>,

    /// Reference line [start, end]
    #[serde(default)]
    pub gate: Option<[[f64; 2]; 2]>,
}

impl AccessZone {
    /// Creates a zone with a polygon.
    pub fn with_polygon(direction: Cardinal, polygon: Vec<[f64; 2]>) -> Self {
        Self {
            name: direction.to_string(),
            direction,
            polygon: Some(polygon),
            gate: None,
        }
    }

    /// Creates a zone with only a gate line.
    pub fn with_gate(direction: Cardinal, gate: [[f64; 2]; 2]) -> Self {
        Self {
            name: direction.to_string(),
            direction,
            polygon: None,
            gate: Some(gate),
        }
    }
}

/// One tracked object's full life as produced by the tracking pipeline.
///
/// Class, directions and timestamps are kept as received; the normalizer
/// validates them so a single bad record cannot abort a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawTrajectory {
    pub track_id: TrackId,

    /// Object class as labelled by the detector
    pub class: String,

    /// Sampled positions [x, y] in image coordinates
    pub positions: Vec<[f64; 2]>,

    /// Frame index of each sample (may be empty when unknown)
    #[serde(default)]
    pub frames: Vec<u64>,

    pub frame_entry: u64,
    pub frame_exit: u64,

    /// ISO 8601 wall-clock entry time
    pub timestamp_entry: String,

    /// ISO 8601 wall-clock exit time
    pub timestamp_exit: String,

    /// Detection confidence [0.0 - 1.0]
    #[serde(default)]
    pub confidence: f64,

    /// Provisional origin assigned upstream
    #[serde(default)]
    pub origin: Option<String>,

    /// Provisional destination assigned upstream
    #[serde(default)]
    pub destination: Option<String>,
}

/// Reviewer override for a single track.
///
/// `None` fields keep the raw value. A later upsert for the same track
/// replaces the whole record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Correction {
    pub track_id: TrackId,

    #[serde(default)]
    pub origin: Option<Cardinal>,

    #[serde(default)]
    pub destination: Option<Cardinal>,

    #[serde(default)]
    pub class: Option<ObjectClass>,

    /// Exclude from all counting and rendering
    #[serde(default)]
    pub discard: bool,

    /// Exclude from exported artifacts only
    #[serde(default)]
    pub hide: bool,
}

impl Correction {
    /// Creates an empty correction (no overrides) for a track.
    pub fn for_track(track_id: TrackId) -> Self {
        Self {
            track_id,
            origin: None,
            destination: None,
            class: None,
            discard: false,
            hide: false,
        }
    }

    /// Sets the replacement origin and destination.
    pub fn with_movement(mut self, origin: Cardinal, destination: Cardinal) -> Self {
        self.origin = Some(origin);
        self.destination = Some(destination);
        self
    }

    /// Sets the replacement class.
    pub fn with_class(mut self, class: ObjectClass) -> Self {
        self.class = Some(class);
        self
    }

    /// Marks the track as discarded.
    pub fn discarded(mut self) -> Self {
        self.discard = true;
        self
    }

    /// Marks the track as hidden from exports.
    pub fn hidden(mut self) -> Self {
        self.hide = true;
        self
    }
}
