//! Recording bundles: one intersection recording as a single JSON file.
//!
//! ```json
//! {
//!   "scope": "6f1c...",
//!   "zones": [{ "direction": "N", "polygon": [[0, 0], [20, 0], [20, 20]] }],
//!   "trajectories": [{ "track_id": 1, "class": "car", ... }],
//!   "corrections": [{ "track_id": 1, "discard": true }]
//! }
//! ```

use aforo_core::{AccessZone, Correction, CorrectionStore, EngineConfig, RawTrajectory, ReviewSession, ScopeId};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

use crate::error::ReplayError;

/// Zones, trajectories and stored corrections of one recording.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordingBundle {
    /// Scope id; a fresh one is generated when absent
    #[serde(default)]
    pub scope: Option<ScopeId>,

    pub zones: Vec<AccessZone>,

    pub trajectories: Vec<RawTrajectory>,

    #[serde(default)]
    pub corrections: Vec<Correction>,
}

impl RecordingBundle {
    /// Loads a bundle from a JSON file.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, ReplayError> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let bundle = Self::from_json_str(&text)?;
        info!(
            "Loaded {} zones, {} trajectories, {} corrections from {}",
            bundle.zones.len(),
            bundle.trajectories.len(),
            bundle.corrections.len(),
            path.as_ref().display()
        );
        Ok(bundle)
    }

    pub fn from_json_str(text: &str) -> Result<Self, ReplayError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Builds an unprocessed review session from the bundle.
    pub fn to_session(&self, config: EngineConfig) -> Result<ReviewSession, ReplayError> {
        let scope = self.scope.unwrap_or_default();
        let session = ReviewSession::new(scope, self.zones.clone(), self.trajectories.clone(), config)?
            .with_corrections(CorrectionStore::from_corrections(self.corrections.iter().cloned()));
        Ok(session)
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use aforo_core::{Cardinal, TrackId};

    fn square(x0: f64, y0: f64) -> Vec<[f64; 2]> {
        vec![[x0, y0], [x0 + 20.0, y0], [x0 + 20.0, y0 + 20.0], [x0, y0 + 20.0]]
    }

    fn trajectory(track: u64, class: &str, origin: &str, destination: &str, positions: Vec<[f64; 2]>, minute: u32) -> RawTrajectory {
        let entry = track * 10;
        RawTrajectory {
            track_id: TrackId(track),
            class: class.to_string(),
            frames: Vec::new(),
            frame_entry: entry,
            frame_exit: entry + 60,
            timestamp_entry: format!("2025-08-13T07:{:02}:00Z", minute),
            timestamp_exit: format!("2025-08-13T07:{:02}:30Z", minute),
            confidence: 0.8,
            origin: Some(origin.to_string()),
            destination: Some(destination.to_string()),
            positions,
        }
    }

    /// A four-leg intersection with a dozen tracks over two slots.
    pub fn bundle() -> RecordingBundle {
        let north_south = vec![[50.0, 10.0], [50.0, 50.0], [50.0, 90.0]];
        let south_north = vec![[50.0, 90.0], [50.0, 50.0], [50.0, 10.0]];
        let west_east = vec![[10.0, 50.0], [50.0, 50.0], [90.0, 50.0]];
        let north_east = vec![[50.0, 10.0], [55.0, 45.0], [90.0, 50.0]];

        let classes = ["car", "truck", "bus", "motorcycle", "bicycle", "person"];
        let mut trajectories = Vec::new();
        for track in 1..=12u64 {
            let class = classes[(track as usize) % classes.len()];
            let minute = (track as u32 * 3) % 30;
            let (origin, destination, path) = match track % 4 {
                0 => ("N", "S", north_south.clone()),
                1 => ("S", "N", south_north.clone()),
                2 => ("O", "E", west_east.clone()),
                _ => ("N", "E", north_east.clone()),
            };
            trajectories.push(trajectory(track, class, origin, destination, path, minute));
        }

        // One malformed record
        let mut broken = trajectory(13, "tractor", "N", "S", north_south, 5);
        broken.timestamp_exit = "not a time".to_string();
        trajectories.push(broken);

        RecordingBundle {
            scope: None,
            zones: vec![
                AccessZone::with_polygon(Cardinal::North, square(40.0, 0.0)),
                AccessZone::with_polygon(Cardinal::South, square(40.0, 80.0)),
                AccessZone::with_polygon(Cardinal::West, square(0.0, 40.0)),
                AccessZone::with_polygon(Cardinal::East, square(80.0, 40.0)),
            ],
            trajectories,
            corrections: vec![
                Correction::for_track(TrackId(2)).discarded(),
                Correction::for_track(TrackId(3)).hidden(),
            ],
        }
    }
}
