//! Scenario runner - replays a processed recording under adversarial
//! delivery orders and checks the counts never move.
//!
//! The baseline is the session's own aggregation state. Every scenario
//! builds a fresh state from the same events and must end equal to it.

use aforo_core::{AggregationState, MovementEvent, PlaybackFilter, RecordSummary, ReviewSession};
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info};

use crate::scenarios::ReplayScenario;

/// Results from running a scenario.
#[derive(Debug, Clone, Serialize)]
pub struct ReplayResult {
    /// Scenario that was run
    pub scenario: ReplayScenario,

    /// Seed used
    pub seed: u64,

    /// Whether the final counts matched the baseline
    pub passed: bool,

    /// Grand total of the replayed state
    pub grand_total: u64,

    /// Grand total of the baseline
    pub baseline_total: u64,

    /// Failure message if any
    pub failure_reason: Option<String>,

    /// Metrics collected during run
    pub metrics: ReplayMetrics,
}

/// Metrics collected during scenario execution.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReplayMetrics {
    /// `record` calls issued
    pub submissions: u64,

    pub counted: u64,

    /// Submissions ignored because the track was already counted
    pub duplicates: u64,

    /// Invalid or uncountable submissions
    pub skipped: u64,

    pub resets: u64,

    /// Cursor positions checked during scrubbing
    pub frames_checked: u64,
}

impl ReplayMetrics {
    fn absorb(&mut self, summary: RecordSummary) {
        self.submissions += (summary.counted + summary.duplicates + summary.skipped) as u64;
        self.counted += summary.counted as u64;
        self.duplicates += summary.duplicates as u64;
        self.skipped += summary.skipped as u64;
    }
}

/// Runs replay scenarios against a processed session.
pub struct ReplayRunner {
    /// Configuration seed
    seed: u64,

    /// Random cursor positions visited by the scrub scenario
    scrub_samples: usize,
}

impl ReplayRunner {
    /// Creates a new replay runner.
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            scrub_samples: 64,
        }
    }

    /// Sets how many cursor positions the scrub scenario visits.
    pub fn with_scrub_samples(mut self, samples: usize) -> Self {
        self.scrub_samples = samples;
        self
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Runs a scenario and returns the result.
    pub fn run(&self, session: &ReviewSession, scenario: ReplayScenario) -> ReplayResult {
        info!("Starting scenario: {} (seed={})", scenario.name(), self.seed);

        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        let mut metrics = ReplayMetrics::default();
        let events = session.events();

        let outcome = match scenario {
            ReplayScenario::InOrder => Ok(Self::replay(events.iter(), &mut metrics)),
            ReplayScenario::Reversed => Ok(Self::replay(events.iter().rev(), &mut metrics)),
            ReplayScenario::Shuffled => Ok(Self::replay(shuffled(events, &mut rng), &mut metrics)),
            ReplayScenario::Duplicated => Ok(self.run_duplicated(events, &mut rng, &mut metrics)),
            ReplayScenario::ResetReplay => Ok(self.run_reset_replay(events, &mut rng, &mut metrics)),
            ReplayScenario::Scrub => self.run_scrub(session, &mut rng, &mut metrics),
        };

        let baseline = session.state();
        let (state, failure_reason) = match outcome {
            Ok(state) => {
                let failure = compare(&state, baseline);
                (Some(state), failure)
            }
            Err(reason) => (None, Some(reason)),
        };

        let result = ReplayResult {
            scenario,
            seed: self.seed,
            passed: failure_reason.is_none(),
            grand_total: state.as_ref().map(AggregationState::grand_total).unwrap_or(0),
            baseline_total: baseline.grand_total(),
            failure_reason,
            metrics,
        };
        debug!("{} finished: {:?}", scenario.name(), result.metrics);
        result
    }

    fn replay<'a>(events: impl IntoIterator<Item = &'a MovementEvent>, metrics: &mut ReplayMetrics) -> AggregationState {
        let mut state = AggregationState::new();
        metrics.absorb(state.record_all(events));
        state
    }

    fn run_duplicated(&self, events: &[MovementEvent], rng: &mut ChaCha8Rng, metrics: &mut ReplayMetrics) -> AggregationState {
        let mut deliveries: Vec<&MovementEvent> = events.iter().chain(events.iter()).collect();
        deliveries.shuffle(rng);
        Self::replay(deliveries, metrics)
    }

    fn run_reset_replay(&self, events: &[MovementEvent], rng: &mut ChaCha8Rng, metrics: &mut ReplayMetrics) -> AggregationState {
        let mut state = AggregationState::new();

        // Partial first pass, then start over
        let cut = if events.is_empty() { 0 } else { rng.gen_range(0..=events.len()) };
        let first_pass = shuffled(events, rng);
        metrics.absorb(state.record_all(first_pass.into_iter().take(cut)));

        state.reset();
        metrics.resets += 1;

        metrics.absorb(state.record_all(shuffled(events, rng)));
        state
    }

    /// Live counting while the cursor jumps around: a track is submitted
    /// every time the cursor is at or past its exit frame.
    fn run_scrub(
        &self,
        session: &ReviewSession,
        rng: &mut ChaCha8Rng,
        metrics: &mut ReplayMetrics,
    ) -> Result<AggregationState, String> {
        let events = session.events();
        let filter = PlaybackFilter::default();
        let mut clock = session.clock();
        let end = clock.end_frame();
        let mut state = AggregationState::new();

        for _ in 0..self.scrub_samples {
            let frame = rng.gen_range(0..=end);
            clock.seek(frame);

            let active = session.active_at(clock.cursor_frame(), &filter);
            for track in &active.tracks {
                let event = session
                    .event(track.track_id)
                    .ok_or_else(|| format!("active track {} has no event", track.track_id))?;
                if event.discarded || frame < event.frame_entry || frame > event.frame_exit {
                    return Err(format!("track {} active outside its window at frame {}", track.track_id, frame));
                }
            }
            if session.active_at(frame, &filter) != active {
                return Err(format!("active set at frame {} is not reproducible", frame));
            }
            metrics.frames_checked += 1;

            metrics.absorb(state.record_all(events.iter().filter(|e| e.frame_exit <= frame)));
        }

        // Play through to the end with jittered ticks
        clock.seek(0);
        clock.play();
        let mut ticks = 0u64;
        while clock.is_playing() {
            let elapsed = Duration::from_millis(rng.gen_range(5..100));
            if let Some(frame) = clock.tick(elapsed) {
                metrics.absorb(state.record_all(events.iter().filter(|e| e.frame_exit <= frame)));
            }
            ticks += 1;
            if ticks > 10_000_000 {
                return Err("playback clock never reached the end".to_string());
            }
        }
        if clock.cursor_frame() != end {
            return Err(format!("playback stopped at {} instead of {}", clock.cursor_frame(), end));
        }

        metrics.absorb(state.record_all(events));
        Ok(state)
    }
}

fn shuffled<'a>(events: &'a [MovementEvent], rng: &mut ChaCha8Rng) -> Vec<&'a MovementEvent> {
    let mut order: Vec<&MovementEvent> = events.iter().collect();
    order.shuffle(rng);
    order
}

/// Describes how a replayed state differs from the baseline, if it does.
pub fn compare(replayed: &AggregationState, baseline: &AggregationState) -> Option<String> {
    if replayed == baseline {
        return None;
    }
    let differing = baseline
        .buckets()
        .filter(|(key, bucket)| replayed.bucket(key) != Some(*bucket))
        .count()
        + replayed.buckets().filter(|(key, _)| baseline.bucket(key).is_none()).count();

    Some(format!(
        "counts diverged: total {} vs baseline {}, {} buckets differ, {} vs {} tracks",
        replayed.grand_total(),
        baseline.grand_total(),
        differing,
        replayed.seen_count(),
        baseline.seen_count()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::fixtures;
    use aforo_core::EngineConfig;
    use proptest::prelude::*;

    fn processed() -> ReviewSession {
        let mut session = fixtures::bundle().to_session(EngineConfig::default()).unwrap();
        session.process();
        session
    }

    #[test]
    fn test_all_scenarios_pass() {
        let session = processed();
        let runner = ReplayRunner::new(42);

        for scenario in ReplayScenario::all() {
            let result = runner.run(&session, scenario);
            assert!(result.passed, "{} failed: {:?}", scenario, result.failure_reason);
            assert_eq!(result.grand_total, 11);
        }
    }

    #[test]
    fn test_duplicated_reports_redeliveries() {
        let session = processed();
        let result = ReplayRunner::new(7).run(&session, ReplayScenario::Duplicated);

        assert!(result.passed);
        assert_eq!(result.metrics.counted, 11);
        assert_eq!(result.metrics.duplicates, 11);
        // The invalid event is skipped on both deliveries
        assert_eq!(result.metrics.skipped, 2);
    }

    #[test]
    fn test_scrub_checks_frames() {
        let session = processed();
        let result = ReplayRunner::new(3).with_scrub_samples(20).run(&session, ReplayScenario::Scrub);

        assert!(result.passed, "{:?}", result.failure_reason);
        assert_eq!(result.metrics.frames_checked, 20);
    }

    #[test]
    fn test_same_seed_same_metrics() {
        let session = processed();
        let a = ReplayRunner::new(99).run(&session, ReplayScenario::ResetReplay);
        let b = ReplayRunner::new(99).run(&session, ReplayScenario::ResetReplay);

        assert_eq!(a.metrics, b.metrics);
        assert_eq!(a.metrics.resets, 1);
    }

    #[test]
    fn test_compare_detects_divergence() {
        let session = processed();
        let partial = ReplayRunner::replay(session.events().iter().take(3), &mut ReplayMetrics::default());

        assert!(compare(session.state(), session.state()).is_none());
        let reason = compare(&partial, session.state()).unwrap();
        assert!(reason.contains("baseline 11"));
    }

    #[test]
    fn test_empty_recording_passes() {
        let mut bundle = fixtures::bundle();
        bundle.trajectories.clear();
        let mut session = bundle.to_session(EngineConfig::default()).unwrap();
        session.process();

        for scenario in ReplayScenario::all() {
            let result = ReplayRunner::new(1).with_scrub_samples(4).run(&session, scenario);
            assert!(result.passed, "{} failed: {:?}", scenario, result.failure_reason);
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn prop_any_seed_converges(seed in any::<u64>()) {
            let session = processed();
            let runner = ReplayRunner::new(seed).with_scrub_samples(8);

            for scenario in [ReplayScenario::Shuffled, ReplayScenario::Duplicated, ReplayScenario::ResetReplay] {
                let result = runner.run(&session, scenario);
                prop_assert!(result.passed, "{:?}", result.failure_reason);
            }
        }
    }
}
