//! Aforo Core - Turning-movement counting engine
//!
//! Converts per-object trajectories recorded at an intersection into
//! 15-minute turning-movement counts:
//! 1. **Classification**: (origin, destination) → one of 16 movement codes
//! 2. **Zone matching**: endpoints validated against approach polygons
//! 3. **Normalization**: reviewer corrections overlaid on raw trajectories
//! 4. **Aggregation**: at-most-once counting into (slot, period, branch) buckets
//! 5. **Playback**: which tracks are on screen at a frame, and which one was clicked

pub mod aggregate;
pub mod config;
pub mod error;
pub mod export;
pub mod movement;
pub mod normalize;
pub mod playback;
pub mod session;
pub mod transform;
pub mod types;
pub mod zones;

// Re-export key types for convenience
pub use aggregate::{AggregationRegistry, AggregationState, BucketKey, Period, RecordOutcome, RecordSummary};
pub use config::EngineConfig;
pub use error::AforoError;
pub use export::{AggregateSnapshot, ExportOptions, ExportTable};
pub use movement::{classify, MovementCode};
pub use normalize::{normalize, normalize_all, CorrectionStore, MovementEvent, NormalizeReport, Validity};
pub use playback::{active_at, nearest, ActiveSet, PlaybackClock, PlaybackFilter};
pub use session::{ProcessSummary, ReviewSession};
pub use transform::{Bounds, ViewTransform};
pub use types::{AccessZone, Cardinal, Correction, ObjectClass, RawTrajectory, ScopeId, TrackId};
pub use zones::ZoneSet;
