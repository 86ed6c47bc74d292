//! The bucket aggregator.
//!
//! Counts each physical track at most once into 15-minute buckets keyed by
//! (start, period, branch), with one counter per (movement, class).
//!
//! `AggregationState::record` and `AggregationState::reset` are the only
//! mutators. Final counts depend only on the set of distinct countable
//! events, never on arrival order.

use chrono::{DateTime, Duration, FixedOffset, Timelike};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

use crate::config::BUCKET_MINUTES;
use crate::error::AforoError;
use crate::movement::MovementCode;
use crate::normalize::{CountableEvent, InvalidReason, MovementEvent, Validity};
use crate::types::{Cardinal, ObjectClass, ScopeId, TrackId};

/// Floors a timestamp to the start of its 15-minute slot, in its own offset.
pub fn floor15(t: DateTime<FixedOffset>) -> DateTime<FixedOffset> {
    let into_slot = (t.minute() % BUCKET_MINUTES) as i64 * 60 + t.second() as i64;
    t - Duration::seconds(into_slot) - Duration::nanoseconds(t.nanosecond() as i64)
}

/// Half-day period of a bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Period {
    Morning,
    Afternoon,
}

impl Period {
    /// Morning before local noon, afternoon after.
    pub fn from_hour(hour: u32) -> Self {
        if hour < 12 {
            Period::Morning
        } else {
            Period::Afternoon
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Period::Morning => "morning",
            Period::Afternoon => "afternoon",
        }
    }
}

/// Aggregation key: slot start, half-day period and branch (origin approach).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BucketKey {
    pub start: DateTime<FixedOffset>,
    pub period: Period,
    pub branch: Cardinal,
}

impl BucketKey {
    /// Derives the key from an exit timestamp and branch.
    pub fn new(exit: DateTime<FixedOffset>, branch: Cardinal) -> Self {
        let start = floor15(exit);
        Self {
            start,
            period: Period::from_hour(start.hour()),
            branch,
        }
    }

    /// End of the slot (exclusive).
    pub fn end(&self) -> DateTime<FixedOffset> {
        self.start + Duration::minutes(BUCKET_MINUTES as i64)
    }
}

/// Counter key inside a bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CountKey {
    pub movement: MovementCode,
    pub class: ObjectClass,
}

/// The counters of one bucket.
///
/// `total` always equals the sum of `counts`; both change together in
/// `increment`, the only mutator.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Bucket {
    counts: BTreeMap<CountKey, u64>,

    /// Portion of `counts` coming from hidden events
    hidden: BTreeMap<CountKey, u64>,

    total: u64,
}

impl Bucket {
    fn increment(&mut self, key: CountKey, hidden: bool) {
        *self.counts.entry(key).or_insert(0) += 1;
        if hidden {
            *self.hidden.entry(key).or_insert(0) += 1;
        }
        self.total += 1;
    }

    /// Count for one (movement, class) pair.
    pub fn count(&self, movement: MovementCode, class: ObjectClass) -> u64 {
        self.counts
            .get(&CountKey { movement, class })
            .copied()
            .unwrap_or(0)
    }

    /// All counters in key order.
    pub fn counts(&self) -> impl Iterator<Item = (&CountKey, &u64)> {
        self.counts.iter()
    }

    /// Count of a key excluding hidden events.
    pub fn exported_count(&self, key: &CountKey) -> u64 {
        let count = self.counts.get(key).copied().unwrap_or(0);
        let hidden = self.hidden.get(key).copied().unwrap_or(0);
        count - hidden
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn hidden_total(&self) -> u64 {
        self.hidden.values().sum()
    }

    /// Checks the total-equals-sum invariant.
    pub fn is_consistent(&self) -> bool {
        self.counts.values().sum::<u64>() == self.total
            && self
                .hidden
                .iter()
                .all(|(key, hidden)| self.counts.get(key).map(|c| hidden <= c).unwrap_or(false))
    }
}

/// Why `record` did not count an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    Discarded,
    Invalid(InvalidReason),
    Uncountable,
}

/// Result of one `record` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    Counted(BucketKey),
    /// Track already counted; state unchanged
    Duplicate,
    Skipped(SkipReason),
}

/// Tally of a batch of `record` calls.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordSummary {
    pub counted: usize,
    pub duplicates: usize,
    pub skipped: usize,
}

/// Running counts of one scope.
#[derive(Debug, Clone, Default)]
pub struct AggregationState {
    seen_tracks: BTreeSet<TrackId>,
    buckets: BTreeMap<BucketKey, Bucket>,
    last_touched: Option<BucketKey>,
}

// `last_touched` reflects arrival order and is left out of equality.
impl PartialEq for AggregationState {
    fn eq(&self, other: &Self) -> bool {
        self.seen_tracks == other.seen_tracks && self.buckets == other.buckets
    }
}

impl Eq for AggregationState {}

impl AggregationState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts an event at most once per track.
    ///
    /// The first countable payload for a track id sticks; later submissions
    /// are `Duplicate` even if their fields differ. When a track's payload
    /// changes (a new correction), reset and replay instead, as
    /// `ReviewSession::replay` does.
    pub fn record(&mut self, event: &MovementEvent) -> RecordOutcome {
        let countable = match event.countable() {
            Some(countable) => countable,
            None => {
                let reason = skip_reason(event);
                debug!("Track {} not counted: {:?}", event.track_id, reason);
                return RecordOutcome::Skipped(reason);
            }
        };

        self.record_countable(countable)
    }

    fn record_countable(&mut self, event: CountableEvent) -> RecordOutcome {
        if !self.seen_tracks.insert(event.track_id) {
            debug!("Track {} already counted, ignoring", event.track_id);
            return RecordOutcome::Duplicate;
        }

        let key = BucketKey::new(event.exit, event.origin);
        let bucket = self.buckets.entry(key).or_default();
        bucket.increment(
            CountKey {
                movement: event.movement,
                class: event.class,
            },
            event.hidden,
        );
        debug_assert!(bucket.is_consistent());

        self.last_touched = Some(key);
        RecordOutcome::Counted(key)
    }

    /// Records a batch and tallies the outcomes.
    pub fn record_all<'a>(&mut self, events: impl IntoIterator<Item = &'a MovementEvent>) -> RecordSummary {
        let mut summary = RecordSummary::default();
        for event in events {
            match self.record(event) {
                RecordOutcome::Counted(_) => summary.counted += 1,
                RecordOutcome::Duplicate => summary.duplicates += 1,
                RecordOutcome::Skipped(_) => summary.skipped += 1,
            }
        }
        summary
    }

    /// Clears seen tracks, buckets and the last touched key together.
    pub fn reset(&mut self) {
        self.seen_tracks.clear();
        self.buckets.clear();
        self.last_touched = None;
    }

    pub fn is_seen(&self, track_id: TrackId) -> bool {
        self.seen_tracks.contains(&track_id)
    }

    pub fn seen_count(&self) -> usize {
        self.seen_tracks.len()
    }

    /// Buckets in (start, period, branch) order.
    pub fn buckets(&self) -> impl Iterator<Item = (&BucketKey, &Bucket)> {
        self.buckets.iter()
    }

    pub fn bucket(&self, key: &BucketKey) -> Option<&Bucket> {
        self.buckets.get(key)
    }

    pub fn last_touched(&self) -> Option<BucketKey> {
        self.last_touched
    }

    pub fn grand_total(&self) -> u64 {
        self.buckets.values().map(Bucket::total).sum()
    }

    pub fn totals_by_class(&self) -> BTreeMap<ObjectClass, u64> {
        self.fold_counts(|key| key.class)
    }

    pub fn totals_by_movement(&self) -> BTreeMap<MovementCode, u64> {
        self.fold_counts(|key| key.movement)
    }

    pub fn totals_by_branch(&self) -> BTreeMap<Cardinal, u64> {
        let mut totals = BTreeMap::new();
        for (key, bucket) in &self.buckets {
            *totals.entry(key.branch).or_insert(0) += bucket.total();
        }
        totals
    }

    fn fold_counts<K: Ord>(&self, project: impl Fn(&CountKey) -> K) -> BTreeMap<K, u64> {
        let mut totals = BTreeMap::new();
        for bucket in self.buckets.values() {
            for (key, count) in bucket.counts() {
                *totals.entry(project(key)).or_insert(0) += count;
            }
        }
        totals
    }

    /// Checks the bucket invariant across the whole state.
    pub fn is_consistent(&self) -> bool {
        self.buckets.values().all(Bucket::is_consistent)
    }
}

fn skip_reason(event: &MovementEvent) -> SkipReason {
    if event.discarded {
        return SkipReason::Discarded;
    }
    match event.validity {
        Validity::Invalid(reason) => SkipReason::Invalid(reason),
        Validity::Valid => SkipReason::Uncountable,
    }
}

/// Aggregation states of every scope in the process.
#[derive(Debug, Clone, Default)]
pub struct AggregationRegistry {
    scopes: BTreeMap<ScopeId, AggregationState>,
}

impl AggregationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records into a scope, creating its state on first use.
    pub fn record(&mut self, scope: ScopeId, event: &MovementEvent) -> RecordOutcome {
        self.scopes.entry(scope).or_default().record(event)
    }

    /// Resets one scope.
    pub fn reset(&mut self, scope: ScopeId) -> Result<(), AforoError> {
        let state = self
            .scopes
            .get_mut(&scope)
            .ok_or(AforoError::UnknownScope(scope))?;
        state.reset();
        info!("Reset aggregation scope {}", scope);
        Ok(())
    }

    pub fn get(&self, scope: ScopeId) -> Option<&AggregationState> {
        self.scopes.get(&scope)
    }

    pub fn scopes(&self) -> impl Iterator<Item = &ScopeId> {
        self.scopes.keys()
    }

    pub fn len(&self) -> usize {
        self.scopes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NormalizeOptions;
    use crate::movement::classify;
    use crate::normalize::{fixtures, normalize, parse_timestamp};
    use crate::types::Correction;
    use crate::zones::ZoneSet;
    use proptest::prelude::*;

    fn ts(value: &str) -> DateTime<FixedOffset> {
        parse_timestamp(value).unwrap()
    }

    fn event(track: u64, origin: Cardinal, destination: Cardinal, class: &str, exit: &str) -> MovementEvent {
        let mut raw = fixtures::raw(track);
        raw.origin = Some(origin.to_string());
        raw.destination = Some(destination.to_string());
        raw.class = class.to_string();
        raw.timestamp_exit = exit.to_string();
        normalize(&raw, None, &ZoneSet::empty(), &NormalizeOptions::default())
    }

    #[test]
    fn test_floor15() {
        assert_eq!(floor15(ts("2025-08-13T07:07:33Z")), ts("2025-08-13T07:00:00Z"));
        assert_eq!(floor15(ts("2025-08-13T07:15:00Z")), ts("2025-08-13T07:15:00Z"));
        assert_eq!(floor15(ts("2025-08-13T07:44:59.999Z")), ts("2025-08-13T07:30:00Z"));
        assert_eq!(floor15(ts("2025-08-13T23:59:59-05:00")), ts("2025-08-13T23:45:00-05:00"));
    }

    #[test]
    fn test_floor15_idempotent() {
        let t = ts("2025-08-13T16:52:17.250+02:00");
        assert_eq!(floor15(floor15(t)), floor15(t));
    }

    #[test]
    fn test_period_uses_local_hour() {
        let key = BucketKey::new(ts("2025-08-13T11:59:00-05:00"), Cardinal::North);
        assert_eq!(key.period, Period::Morning);

        let key = BucketKey::new(ts("2025-08-13T12:00:00-05:00"), Cardinal::North);
        assert_eq!(key.period, Period::Afternoon);
        assert_eq!(key.end(), ts("2025-08-13T12:15:00-05:00"));
    }

    #[test]
    fn test_scenario_a_single_count() {
        let mut state = AggregationState::new();
        let outcome = state.record(&event(1, Cardinal::North, Cardinal::South, "car", "2025-08-13T07:07:00Z"));

        let key = match outcome {
            RecordOutcome::Counted(key) => key,
            other => panic!("expected count, got {:?}", other),
        };
        assert_eq!(key.start, ts("2025-08-13T07:00:00Z"));
        assert_eq!(key.period, Period::Morning);
        assert_eq!(key.branch, Cardinal::North);

        let bucket = state.bucket(&key).unwrap();
        assert_eq!(bucket.count(classify(Cardinal::North, Cardinal::South), ObjectClass::Car), 1);
        assert_eq!(bucket.total(), 1);
        assert_eq!(state.last_touched(), Some(key));
    }

    #[test]
    fn test_scenario_b_duplicate_is_noop() {
        let mut state = AggregationState::new();
        let first = event(7, Cardinal::North, Cardinal::South, "car", "2025-08-13T07:07:00Z");
        let differing = event(7, Cardinal::East, Cardinal::West, "bus", "2025-08-13T09:00:00Z");

        state.record(&first);
        let snapshot = state.clone();

        assert_eq!(state.record(&first), RecordOutcome::Duplicate);
        assert_eq!(state.record(&differing), RecordOutcome::Duplicate);
        assert_eq!(state, snapshot);
        assert_eq!(state.grand_total(), 1);
    }

    #[test]
    fn test_invalid_and_discarded_not_counted() {
        let mut state = AggregationState::new();
        let mut raw = fixtures::raw(3);
        raw.class = "tractor".to_string();
        let invalid = normalize(&raw, None, &ZoneSet::empty(), &NormalizeOptions::default());
        let discard = Correction::for_track(TrackId(4)).discarded();
        let discarded = normalize(&fixtures::raw(4), Some(&discard), &ZoneSet::empty(), &NormalizeOptions::default());

        assert_eq!(
            state.record(&invalid),
            RecordOutcome::Skipped(SkipReason::Invalid(InvalidReason::UnknownClass))
        );
        assert_eq!(state.record(&discarded), RecordOutcome::Skipped(SkipReason::Discarded));
        assert_eq!(state.grand_total(), 0);
        // Skipped tracks are not marked as seen
        assert!(!state.is_seen(TrackId(3)));
    }

    #[test]
    fn test_hidden_counted_live() {
        let mut state = AggregationState::new();
        let hide = Correction::for_track(TrackId(5)).hidden();
        let hidden = normalize(&fixtures::raw(5), Some(&hide), &ZoneSet::empty(), &NormalizeOptions::default());

        state.record(&hidden);
        let (_, bucket) = state.buckets().next().unwrap();

        assert_eq!(bucket.total(), 1);
        assert_eq!(bucket.hidden_total(), 1);
        let (key, _) = bucket.counts().next().unwrap();
        assert_eq!(bucket.exported_count(key), 0);
    }

    #[test]
    fn test_totals() {
        let mut state = AggregationState::new();
        state.record(&event(1, Cardinal::North, Cardinal::South, "car", "2025-08-13T07:07:00Z"));
        state.record(&event(2, Cardinal::North, Cardinal::East, "car", "2025-08-13T07:20:00Z"));
        state.record(&event(3, Cardinal::South, Cardinal::North, "truck", "2025-08-13T07:21:00Z"));

        assert_eq!(state.grand_total(), 3);
        assert_eq!(state.buckets().count(), 3);
        assert_eq!(state.totals_by_class().get(&ObjectClass::Car), Some(&2));
        assert_eq!(state.totals_by_branch().get(&Cardinal::North), Some(&2));
        assert_eq!(state.totals_by_movement().len(), 3);
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut state = AggregationState::new();
        let e = event(1, Cardinal::North, Cardinal::South, "car", "2025-08-13T07:07:00Z");
        state.record(&e);

        state.reset();

        assert_eq!(state, AggregationState::new());
        assert_eq!(state.last_touched(), None);
        assert!(matches!(state.record(&e), RecordOutcome::Counted(_)));
    }

    #[test]
    fn test_registry_scopes_are_independent() {
        let mut registry = AggregationRegistry::new();
        let a = ScopeId::new();
        let b = ScopeId::new();
        let e = event(1, Cardinal::North, Cardinal::South, "car", "2025-08-13T07:07:00Z");

        registry.record(a, &e);
        registry.record(b, &e);
        registry.reset(a).unwrap();

        assert_eq!(registry.get(a).map(|s| s.grand_total()), Some(0));
        assert_eq!(registry.get(b).map(|s| s.grand_total()), Some(1));
        assert!(matches!(registry.reset(ScopeId::new()), Err(AforoError::UnknownScope(_))));
    }

    fn arb_events() -> impl Strategy<Value = Vec<MovementEvent>> {
        prop::collection::vec((0usize..4, 0usize..4, 0usize..6, 0u32..24, 0u32..60, 0u32..60), 1..40).prop_map(
            |specs| {
                specs
                    .into_iter()
                    .enumerate()
                    .map(|(i, (o, d, c, h, m, s))| {
                        let exit = format!("2025-08-13T{:02}:{:02}:{:02}Z", h, m, s);
                        event(i as u64, Cardinal::ALL[o], Cardinal::ALL[d], ObjectClass::ALL[c].name(), &exit)
                    })
                    .collect()
            },
        )
    }

    proptest! {
        #[test]
        fn prop_bucket_sum_holds_after_every_record(events in arb_events()) {
            let mut state = AggregationState::new();
            for e in &events {
                state.record(e);
                prop_assert!(state.is_consistent());
            }
            prop_assert_eq!(state.grand_total(), events.len() as u64);
        }

        #[test]
        fn prop_order_independent(
            (events, shuffled) in arb_events().prop_flat_map(|v| (Just(v.clone()), Just(v).prop_shuffle()))
        ) {
            let mut in_order = AggregationState::new();
            in_order.record_all(&events);

            let mut replayed = AggregationState::new();
            replayed.record_all(&shuffled);
            // Redelivery changes nothing
            replayed.record_all(&events);

            prop_assert_eq!(in_order, replayed);
        }
    }
}
