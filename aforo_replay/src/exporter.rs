//! JSON snapshot of a replay run.
//!
//! Bundles the processing summary, the aggregate, an optional active set at
//! a cursor frame and the scenario results into one file for the reporting
//! side. Hidden tracks are left out unless the export asks to keep them.

use aforo_core::{ActiveSet, AggregateSnapshot, ProcessSummary, ReviewSession, ScopeId};
use serde::Serialize;
use std::fs::File;
use std::io::Write;
use std::path::Path;

use crate::error::ReplayError;
use crate::runner::ReplayResult;

/// Complete replay export.
#[derive(Debug, Clone, Serialize)]
pub struct ReplayExport {
    pub scope: ScopeId,

    pub summary: ProcessSummary,

    /// Whether hidden tracks appear in `aggregate` and `active`
    pub include_hidden: bool,

    pub aggregate: AggregateSnapshot,

    /// Tracks on screen at the requested cursor
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active: Option<ActiveSet>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub results: Vec<ReplayResult>,

    /// Final results
    pub passed: bool,
}

impl ReplayExport {
    /// Creates an export from a processed session.
    pub fn new(session: &ReviewSession, summary: ProcessSummary, include_hidden: bool) -> Self {
        Self {
            scope: session.scope(),
            summary,
            include_hidden,
            aggregate: session.snapshot(include_hidden),
            active: None,
            results: Vec::new(),
            passed: true,
        }
    }

    /// Attaches an active set, dropping hidden tracks unless kept.
    pub fn with_active(mut self, mut active: ActiveSet) -> Self {
        if !self.include_hidden {
            active.tracks.retain(|track| !track.hidden);
        }
        self.active = Some(active);
        self
    }

    /// Adds a scenario result.
    pub fn add_result(&mut self, result: ReplayResult) {
        self.passed &= result.passed;
        self.results.push(result);
    }

    /// Writes to a JSON file.
    pub fn write_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ReplayError> {
        let json = serde_json::to_string_pretty(self)?;
        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::fixtures;
    use crate::runner::ReplayRunner;
    use crate::scenarios::ReplayScenario;
    use aforo_core::{EngineConfig, PlaybackFilter, TrackId};

    fn processed() -> (ReviewSession, ProcessSummary) {
        let mut session = fixtures::bundle().to_session(EngineConfig::default()).unwrap();
        let summary = session.process();
        (session, summary)
    }

    #[test]
    fn test_export_shape() {
        let (session, summary) = processed();
        let active = session.active_at(60, &PlaybackFilter::default());

        let mut export = ReplayExport::new(&session, summary, true).with_active(active);
        export.add_result(ReplayRunner::new(1).run(&session, ReplayScenario::Reversed));

        let json = serde_json::to_value(&export).unwrap();
        assert_eq!(json["passed"], true);
        assert_eq!(json["summary"]["record"]["counted"], 11);
        assert_eq!(json["aggregate"]["grand_total"], 11);
        assert_eq!(json["results"][0]["scenario"], "reversed");
        assert!(json["active"]["tracks"].as_array().map(|t| !t.is_empty()).unwrap_or(false));
    }

    #[test]
    fn test_written_snapshot_drops_hidden_track() {
        let (session, summary) = processed();
        // Track 3 is hidden in the bundle and on screen at frame 60
        let active = session.active_at(60, &PlaybackFilter::default());
        assert!(active.contains(TrackId(3)));

        let export = ReplayExport::new(&session, summary, false).with_active(active);
        let path = std::env::temp_dir().join(format!("aforo_snapshot_{}.json", session.scope().as_uuid()));
        export.write_to_file(&path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        let json: serde_json::Value = serde_json::from_str(&text).unwrap();

        assert_eq!(json["include_hidden"], false);
        assert_eq!(json["aggregate"]["grand_total"], 10);
        let tracks = json["active"]["tracks"].as_array().unwrap();
        assert!(!tracks.is_empty());
        assert!(tracks.iter().all(|t| t["track_id"] != 3));
        assert!(tracks.iter().all(|t| t["hidden"] == false));
    }
}
