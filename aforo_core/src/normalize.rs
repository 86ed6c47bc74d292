//! Event normalization and correction overlay.
//!
//! Turns a raw trajectory plus an optional reviewer correction into the one
//! canonical [`MovementEvent`] every downstream stage consumes:
//! 1. Overlay the correction (origin, destination, class)
//! 2. Validate samples, timestamps and zone containment
//! 3. Classify the movement
//! 4. Carry the discard/hide flags
//!
//! Normalization never fails. A malformed record becomes an invalid event
//! that is still inspectable but never counted.

use chrono::{DateTime, FixedOffset, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};

use crate::config::NormalizeOptions;
use crate::movement::{classify_pair, MovementCode};
use crate::types::{Cardinal, Correction, ObjectClass, RawTrajectory, TrackId};
use crate::zones::ZoneSet;

/// Why an event is excluded from counting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvalidReason {
    MissingSamples,
    SampleFrameMismatch,
    InvalidFrameWindow,
    UnknownClass,
    InvalidTimestamp,
    MissingOrigin,
    MissingDestination,
    OriginOutsideZone,
    DestinationOutsideZone,
    ExcludedApproach,
}

/// Outcome of validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Validity {
    Valid,
    Invalid(InvalidReason),
}

impl Validity {
    pub fn is_valid(&self) -> bool {
        matches!(self, Validity::Valid)
    }
}

/// The canonical movement event. One per raw trajectory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MovementEvent {
    pub track_id: TrackId,
    pub class: Option<ObjectClass>,
    pub origin: Option<Cardinal>,
    pub destination: Option<Cardinal>,
    pub movement: MovementCode,
    pub frame_entry: u64,
    pub frame_exit: u64,
    pub timestamp_entry: Option<DateTime<FixedOffset>>,
    pub timestamp_exit: Option<DateTime<FixedOffset>>,
    pub positions: Vec<[f64; 2]>,
    pub confidence: f64,
    pub validity: Validity,
    /// Counted and rendered live, left out of exports
    pub hidden: bool,
    /// Dropped from counting and rendering
    pub discarded: bool,
    /// A reviewer correction was applied
    pub corrected: bool,
}

/// The fields the aggregator needs, present only for countable events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CountableEvent {
    pub track_id: TrackId,
    pub class: ObjectClass,
    pub origin: Cardinal,
    pub movement: MovementCode,
    pub exit: DateTime<FixedOffset>,
    pub hidden: bool,
}

impl MovementEvent {
    /// Returns the typed counting view, or `None` if the event is invalid
    /// or discarded.
    pub fn countable(&self) -> Option<CountableEvent> {
        if self.discarded || !self.validity.is_valid() || !self.movement.is_known() {
            return None;
        }
        Some(CountableEvent {
            track_id: self.track_id,
            class: self.class?,
            origin: self.origin?,
            movement: self.movement,
            exit: self.timestamp_exit?,
            hidden: self.hidden,
        })
    }

    /// Number of position samples.
    pub fn sample_count(&self) -> usize {
        self.positions.len()
    }
}

/// Parses an ISO 8601 timestamp. Values without an offset are taken as UTC.
pub fn parse_timestamp(value: &str) -> Option<DateTime<FixedOffset>> {
    let value = value.trim();
    DateTime::parse_from_rfc3339(value).ok().or_else(|| {
        NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
            .ok()
            .map(|naive| naive.and_utc().fixed_offset())
    })
}

fn parse_direction(value: Option<&str>) -> Option<Cardinal> {
    value.and_then(|v| v.parse().ok())
}

/// Normalizes one raw trajectory.
pub fn normalize(
    raw: &RawTrajectory,
    correction: Option<&Correction>,
    zones: &ZoneSet,
    options: &NormalizeOptions,
) -> MovementEvent {
    // Step 1: correction overlay
    let corrected_origin = correction.and_then(|c| c.origin);
    let corrected_destination = correction.and_then(|c| c.destination);

    let class = correction
        .and_then(|c| c.class)
        .or_else(|| raw.class.parse().ok());

    let mut origin = corrected_origin.or_else(|| parse_direction(raw.origin.as_deref()));
    let mut destination = corrected_destination.or_else(|| parse_direction(raw.destination.as_deref()));

    // Geometry only fills gaps; a resolved endpoint is never replaced
    if options.derive_missing_directions && (origin.is_none() || destination.is_none()) {
        let derived = zones.matches(&raw.positions, origin, destination);
        origin = origin.or(derived.origin);
        destination = destination.or(derived.destination);
    }

    let timestamp_entry = parse_timestamp(&raw.timestamp_entry);
    let timestamp_exit = parse_timestamp(&raw.timestamp_exit);

    // Step 2: validation, first failure wins
    let reason = if raw.positions.is_empty() {
        Some(InvalidReason::MissingSamples)
    } else if !raw.frames.is_empty() && raw.frames.len() != raw.positions.len() {
        Some(InvalidReason::SampleFrameMismatch)
    } else if raw.frame_exit < raw.frame_entry {
        Some(InvalidReason::InvalidFrameWindow)
    } else if class.is_none() {
        Some(InvalidReason::UnknownClass)
    } else if timestamp_entry.is_none() || timestamp_exit.is_none() {
        Some(InvalidReason::InvalidTimestamp)
    } else {
        validate_endpoints(raw, origin, destination, corrected_origin.is_some(), corrected_destination.is_some(), zones, options)
    };

    // Step 3: classification from the resolved pair
    let movement = classify_pair(origin, destination);

    let reason = reason.or_else(|| match (&options.approach_exclusion, origin, class) {
        (Some(rule), Some(o), Some(c)) if rule.excludes(o, c) => Some(InvalidReason::ExcludedApproach),
        _ => None,
    });

    let validity = match reason {
        Some(reason) => {
            debug!("Track {} invalid: {:?}", raw.track_id, reason);
            Validity::Invalid(reason)
        }
        None => Validity::Valid,
    };

    // Step 4: flags
    MovementEvent {
        track_id: raw.track_id,
        class,
        origin,
        destination,
        movement,
        frame_entry: raw.frame_entry,
        frame_exit: raw.frame_exit,
        timestamp_entry,
        timestamp_exit,
        positions: raw.positions.clone(),
        confidence: raw.confidence,
        validity,
        hidden: correction.map(|c| c.hide).unwrap_or(false),
        discarded: correction.map(|c| c.discard).unwrap_or(false),
        corrected: correction.is_some(),
    }
}

fn validate_endpoints(
    raw: &RawTrajectory,
    origin: Option<Cardinal>,
    destination: Option<Cardinal>,
    origin_corrected: bool,
    destination_corrected: bool,
    zones: &ZoneSet,
    options: &NormalizeOptions,
) -> Option<InvalidReason> {
    let origin = match origin {
        Some(origin) => origin,
        None => return Some(InvalidReason::MissingOrigin),
    };
    let destination = match destination {
        Some(destination) => destination,
        None => return Some(InvalidReason::MissingDestination),
    };

    let (first, last) = match (raw.positions.first(), raw.positions.last()) {
        (Some(first), Some(last)) => (*first, *last),
        _ => return Some(InvalidReason::MissingSamples),
    };

    let check_origin = !(options.trust_corrections && origin_corrected);
    if check_origin && !zones.validate(origin, first).passes() {
        return Some(InvalidReason::OriginOutsideZone);
    }

    let check_destination = !(options.trust_corrections && destination_corrected);
    if check_destination && !zones.validate(destination, last).passes() {
        return Some(InvalidReason::DestinationOutsideZone);
    }

    None
}

/// Reviewer corrections keyed by track. Last write wins.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CorrectionStore {
    corrections: BTreeMap<TrackId, Correction>,
}

impl CorrectionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a store from a list; later entries replace earlier ones.
    pub fn from_corrections(corrections: impl IntoIterator<Item = Correction>) -> Self {
        let mut store = Self::new();
        for correction in corrections {
            store.upsert(correction);
        }
        store
    }

    /// Inserts or fully replaces the correction for a track.
    pub fn upsert(&mut self, correction: Correction) -> Option<Correction> {
        info!(
            "Correction for track {}: origin={:?} destination={:?} class={:?} discard={} hide={}",
            correction.track_id,
            correction.origin,
            correction.destination,
            correction.class,
            correction.discard,
            correction.hide
        );
        self.corrections.insert(correction.track_id, correction)
    }

    pub fn remove(&mut self, track_id: TrackId) -> Option<Correction> {
        self.corrections.remove(&track_id)
    }

    pub fn get(&self, track_id: TrackId) -> Option<&Correction> {
        self.corrections.get(&track_id)
    }

    pub fn len(&self) -> usize {
        self.corrections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.corrections.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Correction> {
        self.corrections.values()
    }
}

/// Whether a batch had anything to normalize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NormalizeStatus {
    Processed,
    NothingToProcess,
}

/// Result of normalizing a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizeReport {
    pub status: NormalizeStatus,

    /// Every non-discarded event, valid or not, in input order
    pub events: Vec<MovementEvent>,

    /// Number of trajectories dropped by a discard correction
    pub discarded: usize,

    /// Invalid event counts per reason
    pub invalid: BTreeMap<InvalidReason, usize>,
}

impl NormalizeReport {
    /// The explicit empty result.
    pub fn empty() -> Self {
        Self {
            status: NormalizeStatus::NothingToProcess,
            events: Vec::new(),
            discarded: 0,
            invalid: BTreeMap::new(),
        }
    }

    pub fn valid_count(&self) -> usize {
        self.events.iter().filter(|e| e.validity.is_valid()).count()
    }

    pub fn invalid_count(&self) -> usize {
        self.invalid.values().sum()
    }
}

/// Normalizes a batch. Discarded tracks are dropped from the output.
pub fn normalize_all(
    raws: &[RawTrajectory],
    corrections: &CorrectionStore,
    zones: &ZoneSet,
    options: &NormalizeOptions,
) -> NormalizeReport {
    if raws.is_empty() {
        info!("Nothing to process: empty trajectory set");
        return NormalizeReport::empty();
    }

    let mut report = NormalizeReport {
        status: NormalizeStatus::Processed,
        ..NormalizeReport::empty()
    };

    for raw in raws {
        let event = normalize(raw, corrections.get(raw.track_id), zones, options);

        if event.discarded {
            report.discarded += 1;
            continue;
        }
        if let Validity::Invalid(reason) = event.validity {
            *report.invalid.entry(reason).or_insert(0) += 1;
        }
        report.events.push(event);
    }

    debug!(
        "Normalized {} trajectories: {} valid, {} invalid, {} discarded",
        raws.len(),
        report.valid_count(),
        report.invalid_count(),
        report.discarded
    );

    report
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    /// A valid N→S car leaving at 07:07 UTC.
    pub fn raw(track_id: u64) -> RawTrajectory {
        RawTrajectory {
            track_id: TrackId(track_id),
            class: "car".to_string(),
            positions: vec![[50.0, 10.0], [50.0, 50.0], [50.0, 90.0]],
            frames: vec![100, 150, 200],
            frame_entry: 100,
            frame_exit: 200,
            timestamp_entry: "2025-08-13T07:06:50Z".to_string(),
            timestamp_exit: "2025-08-13T07:07:00Z".to_string(),
            confidence: 0.9,
            origin: Some("N".to_string()),
            destination: Some("S".to_string()),
        }
    }
}
