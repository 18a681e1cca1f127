use crate::synth::render_notes;
use crate::types::TargetNote;
use crate::wav_source::decode_wav_mono;
use log::{info, warn};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Instant;

/// A reference playback element (backing track) whose transport position can
/// drive the timeline.
pub trait ReferencePlayback {
    /// Current transport position in seconds.
    fn position(&self) -> f64;
    fn is_playing(&self) -> bool;
    fn play(&mut self);
    fn pause(&mut self);
    fn seek(&mut self, secs: f64);
}

pub type SharedPlayback = Arc<Mutex<dyn ReferencePlayback + Send>>;

/// Backing track transport clocked by `Instant`.
///
/// Holds the decoded mono samples so an output stage can pull them, but the
/// transport itself never blocks on audio output. Playback stops by itself
/// once the end of the track is reached. Clones share the sample buffer.
#[derive(Clone)]
pub struct BackingTrack {
    samples: Arc<Vec<f32>>,
    sample_rate: u32,
    duration: f64,
    /// Position at the last play/seek/pause
    offset: f64,
    /// Set while playing
    started: Option<Instant>,
}

impl BackingTrack {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        let duration = if sample_rate == 0 {
            0.0
        } else {
            samples.len() as f64 / sample_rate as f64
        };
        Self {
            samples: Arc::new(samples),
            sample_rate,
            duration,
            offset: 0.0,
            started: None,
        }
    }

    /// A track of silence; useful when only the transport clock matters.
    pub fn silent(duration_secs: f64, sample_rate: u32) -> Self {
        let n = (duration_secs.max(0.0) * sample_rate as f64) as usize;
        Self::new(vec![0.0; n], sample_rate)
    }

    /// Render a guide track for a timed target sequence.
    pub fn from_notes(notes: &[TargetNote], sample_rate: u32) -> Self {
        Self::new(render_notes(notes, sample_rate), sample_rate)
    }

    /// Load a backing track from a WAV file (mixed down to mono).
    pub fn from_wav(path: &Path) -> Result<Self, hound::Error> {
        let (mono, sample_rate) = decode_wav_mono(path)?;
        let track = Self::new(mono, sample_rate);
        info!("Backing track: {:?}  {:.2}s", path.file_name().unwrap_or_default(), track.duration);
        if track.duration == 0.0 {
            warn!("Backing track {:?} is empty; timeline will use the wall clock", path);
        }
        Ok(track)
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn samples(&self) -> Arc<Vec<f32>> {
        Arc::clone(&self.samples)
    }

    fn raw_position(&self) -> f64 {
        match self.started {
            Some(t) => self.offset + t.elapsed().as_secs_f64(),
            None => self.offset,
        }
    }
}

impl ReferencePlayback for BackingTrack {
    fn position(&self) -> f64 {
        self.raw_position().min(self.duration)
    }

    fn is_playing(&self) -> bool {
        self.started.is_some() && self.raw_position() < self.duration
    }

    fn play(&mut self) {
        if self.started.is_none() {
            self.started = Some(Instant::now());
        }
    }

    fn pause(&mut self) {
        self.offset = self.position();
        self.started = None;
    }

    fn seek(&mut self, secs: f64) {
        self.offset = secs.clamp(0.0, self.duration);
        if self.started.is_some() {
            self.started = Some(Instant::now());
        }
    }
}
