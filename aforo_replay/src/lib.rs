//! Aforo Deterministic Replay Harness
//!
//! Loads a recording bundle, runs it through the counting engine and then
//! replays the resulting events under hostile delivery orders. Every run
//! must land on exactly the counts of the in-order baseline.
//!
//! # Core Principle: Seeded Chaos
//!
//! All randomness (shuffles, redeliveries, cursor jumps, tick jitter) comes
//! from a `ChaCha8Rng` seeded per run, so any failing seed reproduces
//! bit for bit.
//!
//! # Usage
//!
//! ```ignore
//! use aforo_replay::{RecordingBundle, ReplayRunner, ReplayScenario};
//!
//! let bundle = RecordingBundle::from_json_file("recording.json")?;
//! let mut session = bundle.to_session(Default::default())?;
//! session.process();
//!
//! let result = ReplayRunner::new(42).run(&session, ReplayScenario::Shuffled);
//! assert!(result.passed);
//! ```

mod bundle;
mod error;
mod exporter;
mod runner;
pub mod scenarios;

pub use bundle::RecordingBundle;
pub use error::ReplayError;
pub use exporter::ReplayExport;
pub use runner::{compare, ReplayMetrics, ReplayResult, ReplayRunner};
pub use scenarios::ReplayScenario;
