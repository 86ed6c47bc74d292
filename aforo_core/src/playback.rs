//! Playback correlation.
//!
//! Given a frame cursor, computes which trajectories are on screen, where
//! each one currently is, and which track a click lands on. All functions
//! are pure over the event set; the cursor itself is driven by
//! [`PlaybackClock`] ticks.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use crate::movement::MovementCode;
use crate::normalize::MovementEvent;
use crate::transform::{distance, ViewTransform};
use crate::types::{Cardinal, ObjectClass, TrackId};

/// Filters applied before activation.
///
/// `None` means "no restriction" for that dimension.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackFilter {
    pub classes: Option<BTreeSet<ObjectClass>>,
    pub movements: Option<BTreeSet<MovementCode>>,
    /// Keeps events whose origin or destination is listed
    pub zones: Option<BTreeSet<Cardinal>>,
    /// Hide events that failed validation
    pub valid_only: bool,
}

impl PlaybackFilter {
    /// Returns true if the event passes every filter. Discarded events never
    /// pass.
    pub fn accepts(&self, event: &MovementEvent) -> bool {
        if event.discarded {
            return false;
        }
        if self.valid_only && !event.validity.is_valid() {
            return false;
        }
        if let Some(classes) = &self.classes {
            match event.class {
                Some(class) if classes.contains(&class) => {}
                _ => return false,
            }
        }
        if let Some(movements) = &self.movements {
            if !movements.contains(&event.movement) {
                return false;
            }
        }
        if let Some(zones) = &self.zones {
            let touches = [event.origin, event.destination]
                .iter()
                .flatten()
                .any(|direction| zones.contains(direction));
            if !touches {
                return false;
            }
        }
        true
    }
}

/// Progress of an event at a frame, clamped to [0, 1].
pub fn progress_at(event: &MovementEvent, cursor_frame: u64) -> f64 {
    let span = event.frame_exit.saturating_sub(event.frame_entry).max(1) as f64;
    let elapsed = cursor_frame as f64 - event.frame_entry as f64;
    (elapsed / span).clamp(0.0, 1.0)
}

/// Sample index matching a progress value.
pub fn sample_index(progress: f64, sample_count: usize) -> usize {
    if sample_count == 0 {
        return 0;
    }
    let last = sample_count - 1;
    ((progress * last as f64).floor() as usize).min(last)
}

/// One trajectory currently on screen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveTrack {
    pub track_id: TrackId,
    pub class: Option<ObjectClass>,
    pub movement: MovementCode,
    pub progress: f64,
    pub sample_index: usize,
    /// Current position in scene coordinates
    pub position: [f64; 2],
    pub valid: bool,
    pub hidden: bool,
}

/// The trajectories active at one cursor frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveSet {
    pub frame: u64,
    pub tracks: Vec<ActiveTrack>,
}

impl ActiveSet {
    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn contains(&self, track_id: TrackId) -> bool {
        self.tracks.iter().any(|t| t.track_id == track_id)
    }

    /// Displayed count per class.
    pub fn counts_by_class(&self) -> BTreeMap<ObjectClass, usize> {
        let mut counts = BTreeMap::new();
        for class in self.tracks.iter().filter_map(|t| t.class) {
            *counts.entry(class).or_insert(0) += 1;
        }
        counts
    }
}

/// Computes the active set at `cursor_frame`.
///
/// An event is active iff `frame_entry <= cursor <= frame_exit` and it
/// passes `filter`. Events without samples are never active.
pub fn active_at(cursor_frame: u64, events: &[MovementEvent], filter: &PlaybackFilter) -> ActiveSet {
    let tracks = events
        .iter()
        .filter(|e| filter.accepts(e))
        .filter(|e| e.frame_entry <= cursor_frame && cursor_frame <= e.frame_exit)
        .filter_map(|e| {
            let progress = progress_at(e, cursor_frame);
            let index = sample_index(progress, e.positions.len());
            e.positions.get(index).map(|position| ActiveTrack {
                track_id: e.track_id,
                class: e.class,
                movement: e.movement,
                progress,
                sample_index: index,
                position: *position,
                valid: e.validity.is_valid(),
                hidden: e.hidden,
            })
        })
        .collect();

    ActiveSet {
        frame: cursor_frame,
        tracks,
    }
}

/// Finds the track with a sample closest to a canvas click.
///
/// Returns `None` if nothing lies within `threshold_px`. Ties go to the
/// earlier event.
pub fn nearest(
    click: [f64; 2],
    events: &[MovementEvent],
    transform: &ViewTransform,
    threshold_px: f64,
) -> Option<TrackId> {
    let mut best: Option<(TrackId, f64)> = None;

    for event in events.iter().filter(|e| !e.discarded) {
        for sample in &event.positions {
            let d = distance(click, transform.apply(*sample));
            if d <= threshold_px && best.map(|(_, best_d)| d < best_d).unwrap_or(true) {
                best = Some((event.track_id, d));
            }
        }
    }

    best.map(|(track_id, _)| track_id)
}

/// Frame cursor advanced by timer ticks.
///
/// Pausing just stops the cursor from moving; there is no in-flight work
/// to cancel.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackClock {
    fps: f64,
    speed: f64,
    cursor: f64,
    end_frame: u64,
    playing: bool,
}

impl PlaybackClock {
    /// Creates a paused clock at frame 0.
    pub fn new(fps: f64, end_frame: u64) -> Self {
        Self {
            fps: fps.max(0.0),
            speed: 1.0,
            cursor: 0.0,
            end_frame,
            playing: false,
        }
    }

    /// Sets the playback speed multiplier.
    pub fn with_speed(mut self, speed: f64) -> Self {
        self.speed = speed.max(0.0);
        self
    }

    pub fn play(&mut self) {
        self.playing = self.cursor_frame() < self.end_frame;
    }

    pub fn pause(&mut self) {
        self.playing = false;
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    /// Jumps to a frame (scrubbing). Clamped to the recording.
    pub fn seek(&mut self, frame: u64) {
        self.cursor = frame.min(self.end_frame) as f64;
    }

    /// Current cursor frame.
    pub fn cursor_frame(&self) -> u64 {
        self.cursor.floor() as u64
    }

    pub fn end_frame(&self) -> u64 {
        self.end_frame
    }

    /// Advances by the elapsed wall time. Returns the new frame if it
    /// changed. Stops at the last frame.
    pub fn tick(&mut self, elapsed: Duration) -> Option<u64> {
        if !self.playing {
            return None;
        }
        let before = self.cursor_frame();
        self.cursor = (self.cursor + elapsed.as_secs_f64() * self.fps * self.speed).min(self.end_frame as f64);

        if self.cursor_frame() >= self.end_frame {
            self.playing = false;
        }

        let after = self.cursor_frame();
        (after != before).then_some(after)
    }
}

/// The last exit frame over a set of events.
pub fn end_frame(events: &[MovementEvent]) -> u64 {
    events.iter().map(|e| e.frame_exit).max().unwrap_or(0)
}
