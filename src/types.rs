use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;

// ─── Pitch data ─────────────────────────────────────────────────────────────

/// One fundamental-frequency estimate placed on the session timeline.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PitchSample {
    /// Seconds on the synchronized timeline (playback position or elapsed time)
    pub time: f64,
    /// Detected fundamental, always > 0 Hz
    pub frequency: f32,
}

impl PitchSample {
    pub fn new(time: f64, frequency: f32) -> Self {
        Self { time, frequency }
    }
}

impl fmt::Display for PitchSample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t={:>7.3}s  {:>7.2} Hz", self.time, self.frequency)
    }
}

/// A note the singer is asked to match during `[start_time, start_time + duration)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetNote {
    pub start_time: f64,
    pub duration: f64,
    pub frequency: f32,
    pub label: String,
}

impl TargetNote {
    pub fn end_time(&self) -> f64 {
        self.start_time + self.duration
    }

    /// Half-open interval membership.
    pub fn contains(&self, time: f64) -> bool {
        time >= self.start_time && time < self.end_time()
    }

    /// True if any part of the note falls inside `[from, to]`.
    pub fn overlaps(&self, from: f64, to: f64) -> bool {
        self.start_time <= to && self.end_time() >= from
    }
}

// ─── Audio data ─────────────────────────────────────────────────────────────

/// A chunk of mono samples from the capture device (or a simulated source).
#[derive(Debug, Clone)]
pub struct AudioChunk {
    /// Microseconds since the capture stream opened (timestamp of first sample)
    pub timestamp_us: u64,
    /// Mono f32 samples, normalized -1.0 to 1.0
    pub samples: Vec<f32>,
    /// Sample rate in Hz
    pub sample_rate: u32,
}

/// The finalized audio of one recording session.
///
/// An empty capture is still a valid artifact: a WAV header with zero frames.
/// What to do with it is the consumer's decision.
#[derive(Debug, Clone)]
pub struct RecordedAudio {
    /// Encoded file contents
    pub bytes: Vec<u8>,
    /// Declared media type of `bytes`
    pub media_type: &'static str,
    pub sample_rate: u32,
    pub sample_count: u64,
}

impl RecordedAudio {
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.sample_count as f64 / self.sample_rate as f64
    }

    pub fn is_empty(&self) -> bool {
        self.sample_count == 0
    }
}

// ─── Session state ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    Idle,
    Recording,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Idle => write!(f, "idle"),
            SessionState::Recording => write!(f, "recording"),
        }
    }
}

// ─── Session clock ──────────────────────────────────────────────────────────

/// Monotonic clock started when a capture stream opens.
#[derive(Debug, Clone)]
pub struct SessionClock {
    start: Instant,
}

impl SessionClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn now_us(&self) -> u64 {
        self.start.elapsed().as_micros() as u64
    }
}

impl Default for SessionClock {
    fn default() -> Self {
        Self::new()
    }
}
