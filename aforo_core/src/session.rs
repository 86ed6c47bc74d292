//! Review session: one recording, its corrections and its counts.
//!
//! The session ties the pipeline together for a single scope:
//! raw trajectories → normalize (with corrections) → aggregate, plus the
//! playback and export views over the result. Applying a correction resets
//! the scope and replays every trajectory so the override takes effect
//! while each track still counts at most once.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::aggregate::{AggregationState, RecordSummary};
use crate::config::EngineConfig;
use crate::error::AforoError;
use crate::export::{AggregateSnapshot, ExportOptions, ExportTable};
use crate::normalize::{normalize_all, CorrectionStore, MovementEvent, NormalizeReport, NormalizeStatus};
use crate::playback::{active_at, end_frame, nearest, ActiveSet, PlaybackClock, PlaybackFilter};
use crate::transform::{Bounds, ViewTransform};
use crate::types::{AccessZone, Correction, RawTrajectory, ScopeId, TrackId};
use crate::zones::ZoneSet;

/// Outcome of one `process` pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessSummary {
    pub status: NormalizeStatus,
    pub valid: usize,
    pub invalid: usize,
    pub discarded: usize,
    pub record: RecordSummary,
}

/// A recording under review.
#[derive(Debug, Clone)]
pub struct ReviewSession {
    scope: ScopeId,
    config: EngineConfig,
    zones: ZoneSet,
    trajectories: Vec<RawTrajectory>,
    corrections: CorrectionStore,
    report: NormalizeReport,
    state: AggregationState,
}

impl ReviewSession {
    /// Creates an unprocessed session.
    pub fn new(
        scope: ScopeId,
        zones: Vec<AccessZone>,
        trajectories: Vec<RawTrajectory>,
        config: EngineConfig,
    ) -> Result<Self, AforoError> {
        let zones = ZoneSet::new(zones)?.with_gate_snap(config.gate_snap_distance);

        Ok(Self {
            scope,
            config,
            zones,
            trajectories,
            corrections: CorrectionStore::new(),
            report: NormalizeReport::empty(),
            state: AggregationState::new(),
        })
    }

    /// Seeds the session with stored corrections. Takes effect on the next
    /// `process`.
    pub fn with_corrections(mut self, corrections: CorrectionStore) -> Self {
        self.corrections = corrections;
        self
    }

    /// Normalizes every trajectory and records the results into the scope.
    ///
    /// Calling it again without a reset only re-submits already counted
    /// tracks, which the aggregator ignores.
    pub fn process(&mut self) -> ProcessSummary {
        self.report = normalize_all(
            &self.trajectories,
            &self.corrections,
            &self.zones,
            &self.config.normalize_options(),
        );
        let record = self.state.record_all(&self.report.events);

        info!(
            "Scope {}: {} counted, {} duplicates, {} skipped, {} discarded",
            self.scope, record.counted, record.duplicates, record.skipped, self.report.discarded
        );

        ProcessSummary {
            status: self.report.status,
            valid: self.report.valid_count(),
            invalid: self.report.invalid_count(),
            discarded: self.report.discarded,
            record,
        }
    }

    /// Stores a correction and rebuilds the scope's counts.
    pub fn apply_correction(&mut self, correction: Correction) -> ProcessSummary {
        self.corrections.upsert(correction);
        self.replay()
    }

    /// Drops a track's correction and rebuilds the scope's counts.
    pub fn remove_correction(&mut self, track_id: TrackId) -> Option<ProcessSummary> {
        self.corrections.remove(track_id)?;
        Some(self.replay())
    }

    /// Resets the scope and processes everything again.
    pub fn replay(&mut self) -> ProcessSummary {
        self.state.reset();
        self.process()
    }

    pub fn scope(&self) -> ScopeId {
        self.scope
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn zones(&self) -> &ZoneSet {
        &self.zones
    }

    pub fn corrections(&self) -> &CorrectionStore {
        &self.corrections
    }

    /// Events of the last `process` pass, discarded tracks excluded.
    pub fn events(&self) -> &[MovementEvent] {
        &self.report.events
    }

    pub fn event(&self, track_id: TrackId) -> Option<&MovementEvent> {
        self.report.events.iter().find(|e| e.track_id == track_id)
    }

    pub fn report(&self) -> &NormalizeReport {
        &self.report
    }

    pub fn state(&self) -> &AggregationState {
        &self.state
    }

    /// Transform fitting zones and trajectories into the configured canvas.
    pub fn view_transform(&self) -> ViewTransform {
        Bounds::from_scene(&self.zones, &self.report.events)
            .map(|bounds| ViewTransform::fit(&bounds, &self.config.canvas))
            .unwrap_or_default()
    }

    pub fn active_at(&self, cursor_frame: u64, filter: &PlaybackFilter) -> ActiveSet {
        active_at(cursor_frame, &self.report.events, filter)
    }

    /// Track under a canvas click, within the configured radius.
    pub fn nearest(&self, click: [f64; 2]) -> Option<TrackId> {
        nearest(
            click,
            &self.report.events,
            &self.view_transform(),
            self.config.nearest_threshold_px,
        )
    }

    /// A paused clock spanning the processed events.
    pub fn clock(&self) -> PlaybackClock {
        PlaybackClock::new(self.config.playback_fps, end_frame(&self.report.events))
    }

    pub fn export_table(&self, options: &ExportOptions) -> ExportTable {
        ExportTable::from_state(&self.state, options)
    }

    /// Serializable counts; reports pass `include_hidden = false`.
    pub fn snapshot(&self, include_hidden: bool) -> AggregateSnapshot {
        AggregateSnapshot::from_state(&self.state, include_hidden)
    }
}
