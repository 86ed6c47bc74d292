//! Access zone matching.
//!
//! Decides whether trajectory endpoints lie inside the configured access
//! polygons. Containment follows the even-odd rule; a point exactly on an
//! edge or vertex is outside, so two adjacent zones never both claim it.
//!
//! Zones without a polygon are pass-through: the check is skipped and the
//! upstream direction is trusted.

use geo::{Contains, EuclideanDistance, Line, LineString, Point, Polygon};
use std::collections::BTreeMap;
use tracing::warn;

use crate::error::AforoError;
use crate::types::{AccessZone, Cardinal};

/// Result of testing one endpoint against its claimed zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainmentCheck {
    Inside,
    Outside,
    /// No polygon configured for the direction
    Skipped,
}

impl ContainmentCheck {
    /// Returns false only for a definite miss.
    pub fn passes(&self) -> bool {
        !matches!(self, ContainmentCheck::Outside)
    }
}

/// Origin and destination derived from trajectory endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ZoneMatch {
    pub origin: Option<Cardinal>,
    pub destination: Option<Cardinal>,
}

/// Builds a geo polygon from raw vertices.
fn to_polygon(vertices: &[[f64; 2]]) -> Polygon<f64> {
    Polygon::new(LineString::from(vertices.to_vec()), vec![])
}

/// Even-odd containment test. Points on the boundary are outside.
pub fn contains_point(polygon: &[[f64; 2]], point: [f64; 2]) -> bool {
    if polygon.len() < 3 {
        return false;
    }
    to_polygon(polygon).contains(&Point::from(point))
}

/// A zone with its geometry prepared for repeated queries.
#[derive(Debug, Clone)]
struct PreparedZone {
    zone: AccessZone,
    polygon: Option<Polygon<f64>>,
    gate: Option<Line<f64>>,
}

impl PreparedZone {
    fn new(zone: AccessZone) -> Self {
        let polygon = match &zone.polygon {
            Some(vertices) if vertices.len() >= 3 => Some(to_polygon(vertices)),
            Some(vertices) => {
                warn!(
                    "Ignoring polygon of zone {} ({}): {} vertices, need at least 3",
                    zone.name, zone.direction, vertices.len()
                );
                None
            }
            None => None,
        };
        let gate = zone.gate.map(|[a, b]| Line::new(a, b));

        Self { zone, polygon, gate }
    }
}

/// The access configuration of one intersection.
///
/// Holds at most one zone per compass direction.
#[derive(Debug, Clone, Default)]
pub struct ZoneSet {
    zones: BTreeMap<Cardinal, PreparedZone>,

    /// Maximum distance for gate-based approximate matching
    gate_snap_distance: Option<f64>,
}

impl ZoneSet {
    /// Creates a zone set, rejecting two zones for the same direction.
    pub fn new(zones: Vec<AccessZone>) -> Result<Self, AforoError> {
        let mut prepared = BTreeMap::new();

        for zone in zones {
            let direction = zone.direction;
            if prepared.insert(direction, PreparedZone::new(zone)).is_some() {
                return Err(AforoError::DuplicateZone(direction));
            }
        }

        Ok(Self {
            zones: prepared,
            gate_snap_distance: None,
        })
    }

    /// Creates an empty set (every check is skipped).
    pub fn empty() -> Self {
        Self::default()
    }

    /// Enables approximate matching against gate lines.
    pub fn with_gate_snap(mut self, distance: Option<f64>) -> Self {
        self.gate_snap_distance = distance;
        self
    }

    /// Returns the zone configured for a direction.
    pub fn get(&self, direction: Cardinal) -> Option<&AccessZone> {
        self.zones.get(&direction).map(|p| &p.zone)
    }

    /// Iterates over configured zones in direction order.
    pub fn zones(&self) -> impl Iterator<Item = &AccessZone> {
        self.zones.values().map(|p| &p.zone)
    }

    pub fn len(&self) -> usize {
        self.zones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }

    /// Returns true if the direction has a usable polygon.
    pub fn has_polygon(&self, direction: Cardinal) -> bool {
        self.zones
            .get(&direction)
            .map(|p| p.polygon.is_some())
            .unwrap_or(false)
    }

    /// Tests a point against the zone claimed for `direction`.
    pub fn validate(&self, direction: Cardinal, point: [f64; 2]) -> ContainmentCheck {
        match self.zones.get(&direction).and_then(|p| p.polygon.as_ref()) {
            Some(polygon) if polygon.contains(&Point::from(point)) => ContainmentCheck::Inside,
            Some(_) => ContainmentCheck::Outside,
            None => ContainmentCheck::Skipped,
        }
    }

    /// Finds the direction whose polygon contains the point.
    ///
    /// Falls back to the nearest gate within the snap distance, if enabled.
    pub fn locate(&self, point: [f64; 2]) -> Option<Cardinal> {
        let p = Point::from(point);

        let by_polygon = self.zones.iter().find_map(|(direction, prepared)| {
            prepared
                .polygon
                .as_ref()
                .filter(|polygon| polygon.contains(&p))
                .map(|_| *direction)
        });
        if by_polygon.is_some() {
            return by_polygon;
        }

        let max_distance = self.gate_snap_distance?;
        self.zones
            .iter()
            .filter_map(|(direction, prepared)| {
                prepared.gate.map(|gate| (*direction, p.euclidean_distance(&gate)))
            })
            .filter(|(_, distance)| *distance <= max_distance)
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(direction, _)| direction)
    }

    /// Re-derives origin and destination from the first and last samples.
    ///
    /// An endpoint that no zone claims keeps the upstream direction.
    pub fn matches(
        &self,
        positions: &[[f64; 2]],
        upstream_origin: Option<Cardinal>,
        upstream_destination: Option<Cardinal>,
    ) -> ZoneMatch {
        let (first, last) = match (positions.first(), positions.last()) {
            (Some(first), Some(last)) => (*first, *last),
            _ => {
                return ZoneMatch {
                    origin: upstream_origin,
                    destination: upstream_destination,
                }
            }
        };

        ZoneMatch {
            origin: self.locate(first).or(upstream_origin),
            destination: self.locate(last).or(upstream_destination),
        }
    }
}
