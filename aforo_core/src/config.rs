//! Engine configuration.
//!
//! Every field has a default, so a config file only needs the values that
//! differ for a site.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::AforoError;
use crate::types::{Cardinal, ObjectClass};

/// Width of an aggregation bucket in minutes. Fixed.
pub const BUCKET_MINUTES: u32 = 15;

/// Render canvas used by the shared view transform.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CanvasConfig {
    pub width: f64,
    pub height: f64,
    /// Margin kept free on every side (pixels)
    pub padding: f64,
}

impl Default for CanvasConfig {
    fn default() -> Self {
        Self {
            width: 960.0,
            height: 540.0,
            padding: 24.0,
        }
    }
}

/// Drops trajectories entering through one approach unless their class is
/// listed.
///
/// Site-specific data-cleaning rule, off by default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApproachExclusion {
    pub origin: Cardinal,
    #[serde(default)]
    pub except_classes: Vec<ObjectClass>,
}

impl ApproachExclusion {
    /// The North-approach rule seen on the first deployment: only
    /// pedestrians are kept.
    pub fn north_pedestrians_only() -> Self {
        Self {
            origin: Cardinal::North,
            except_classes: vec![ObjectClass::Person],
        }
    }

    /// Returns true if an event with this origin and class is excluded.
    pub fn excludes(&self, origin: Cardinal, class: ObjectClass) -> bool {
        origin == self.origin && !self.except_classes.contains(&class)
    }
}

/// Options consumed by the normalizer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizeOptions {
    /// Derive a missing upstream direction from zone geometry
    pub derive_missing_directions: bool,

    /// Skip zone re-validation for endpoints a reviewer overrode
    pub trust_corrections: bool,

    pub approach_exclusion: Option<ApproachExclusion>,
}

/// Top-level engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub canvas: CanvasConfig,

    /// Click radius for picking a trajectory (pixels)
    pub nearest_threshold_px: f64,

    /// Recording frame rate driving the playback clock
    pub playback_fps: f64,

    /// Max distance to a gate line for approximate zone matching
    pub gate_snap_distance: Option<f64>,

    pub derive_missing_directions: bool,

    pub trust_corrections: bool,

    pub approach_exclusion: Option<ApproachExclusion>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            canvas: CanvasConfig::default(),
            nearest_threshold_px: 12.0,
            playback_fps: 30.0,
            gate_snap_distance: None,
            derive_missing_directions: true,
            trust_corrections: false,
            approach_exclusion: None,
        }
    }
}

impl EngineConfig {
    /// Loads a JSON configuration file.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, AforoError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Parses a JSON configuration string.
    pub fn from_json_str(text: &str) -> Result<Self, AforoError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Extracts the normalizer options.
    pub fn normalize_options(&self) -> NormalizeOptions {
        NormalizeOptions {
            derive_missing_directions: self.derive_missing_directions,
            trust_corrections: self.trust_corrections,
            approach_exclusion: self.approach_exclusion.clone(),
        }
    }
}
