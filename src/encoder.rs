use crate::error::EncodeError;
use crate::types::RecordedAudio;
use hound::{SampleFormat, WavSpec, WavWriter};
use log::{debug, info};
use std::io::Cursor;
use std::sync::{Arc, Mutex};

/// Media type of artifacts produced by [`WavEncoder`].
pub const WAV_MEDIA_TYPE: &str = "audio/wav";

/// Encoder/recorder sink for one session's captured audio.
///
/// Writes before `start()` or after `stop()` are ignored.
pub trait Encoder {
    fn start(&mut self, sample_rate: u32) -> Result<(), EncodeError>;
    fn write(&mut self, samples: &[f32]);
    /// Finalize the capture into an artifact. Zero samples is a valid artifact.
    fn stop(&mut self) -> Result<RecordedAudio, EncodeError>;
}

pub type SharedEncoder = Arc<Mutex<dyn Encoder + Send>>;

/// Accumulates 16-bit PCM in memory and emits a mono WAV on stop.
#[derive(Debug, Default)]
pub struct WavEncoder {
    samples: Vec<i16>,
    sample_rate: u32,
    recording: bool,
}

impl WavEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedEncoder {
        Arc::new(Mutex::new(Self::new()))
    }
}

impl Encoder for WavEncoder {
    fn start(&mut self, sample_rate: u32) -> Result<(), EncodeError> {
        self.samples.clear();
        self.sample_rate = sample_rate;
        self.recording = true;
        debug!("Encoder started at {} Hz", sample_rate);
        Ok(())
    }

    fn write(&mut self, samples: &[f32]) {
        if !self.recording {
            return;
        }
        self.samples.extend(
            samples
                .iter()
                .map(|&s| (s.clamp(-1.0, 1.0) * i16::MAX as f32).round() as i16),
        );
    }

    fn stop(&mut self) -> Result<RecordedAudio, EncodeError> {
        if !self.recording {
            return Err(EncodeError::NotStarted);
        }
        self.recording = false;

        let spec = WavSpec {
            channels: 1,
            sample_rate: self.sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = WavWriter::new(&mut cursor, spec)?;
            for &s in &self.samples {
                writer.write_sample(s)?;
            }
            writer.finalize()?;
        }

        let sample_count = self.samples.len() as u64;
        self.samples = Vec::new();
        let audio = RecordedAudio {
            bytes: cursor.into_inner(),
            media_type: WAV_MEDIA_TYPE,
            sample_rate: self.sample_rate,
            sample_count,
        };
        info!(
            "Encoder finalized: {} samples ({:.2}s), {} bytes",
            sample_count,
            audio.duration_secs(),
            audio.bytes.len()
        );
        Ok(audio)
    }
}
