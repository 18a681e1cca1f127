//! The single "current time" shared by the renderer and the pitch loop.
//!
//! Preference order: a playing backing track's position, then wall-clock time
//! since recording started, then zero.

use crate::playback::SharedPlayback;
use crate::session::lock;
use std::time::{Duration, Instant};

/// Snapshot of the reference playback transport.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackClock {
    pub position: f64,
    pub is_playing: bool,
}

/// Pure resolution of the timeline, in seconds.
pub fn synchronized_time(playback: Option<PlaybackClock>, recording_elapsed: Option<Duration>) -> f64 {
    match (playback, recording_elapsed) {
        (Some(clock), _) if clock.is_playing => clock.position,
        (_, Some(elapsed)) => elapsed.as_secs_f64(),
        _ => 0.0,
    }
}

/// Handle to the optional reference playback, cloned into each loop.
#[derive(Clone, Default)]
pub struct Timeline {
    playback: Option<SharedPlayback>,
}

impl Timeline {
    pub fn new(playback: Option<SharedPlayback>) -> Self {
        Self { playback }
    }

    /// Sample the playback transport. Takes the playback lock only briefly,
    /// so callers must do this before taking the session lock.
    pub fn playback_clock(&self) -> Option<PlaybackClock> {
        self.playback.as_ref().map(|p| {
            let p = lock(p);
            PlaybackClock {
                position: p.position(),
                is_playing: p.is_playing(),
            }
        })
    }

    pub fn now(&self, recording_since: Option<Instant>) -> f64 {
        self.at(recording_since, Instant::now())
    }

    pub fn at(&self, recording_since: Option<Instant>, now: Instant) -> f64 {
        let elapsed = recording_since.map(|start| now.saturating_duration_since(start));
        synchronized_time(self.playback_clock(), elapsed)
    }
}
