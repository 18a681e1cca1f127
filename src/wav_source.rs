use crate::error::CaptureError;
use crate::microphone::{spawn_paced_stream, CaptureStream, MicrophoneSource};
use hound::{SampleFormat, WavReader};
use log::{info, warn};
use std::path::PathBuf;
use std::sync::Arc;

/// Microphone stand-in that streams a WAV file at real-time pace.
///
/// Useful for replaying a take through the full pitch pipeline without a
/// capture device: `--input-wav my_take.wav`.
pub struct WavFileMicrophone {
    path: PathBuf,
}

impl WavFileMicrophone {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

/// Read a WAV file as mono f32 in -1.0..1.0.
pub fn decode_wav_mono(path: &std::path::Path) -> Result<(Vec<f32>, u32), hound::Error> {
    let reader = WavReader::open(path)?;
    let spec = reader.spec();
    let channels = spec.channels.max(1) as usize;

    let samples: Vec<f32> = match spec.sample_format {
        SampleFormat::Float => reader
            .into_samples::<f32>()
            .filter_map(|s| s.ok())
            .collect(),
        SampleFormat::Int => {
            let max = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .into_samples::<i32>()
                .filter_map(|s| s.ok())
                .map(|s| s as f32 / max)
                .collect()
        }
    };

    info!(
        "WAV: {:?}  {} Hz  {} ch  {:?}  {} bit",
        path.file_name().unwrap_or_default(),
        spec.sample_rate,
        channels,
        spec.sample_format,
        spec.bits_per_sample,
    );
    Ok((mix_mono(samples, channels), spec.sample_rate))
}

fn mix_mono(samples: Vec<f32>, channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return samples;
    }
    samples
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

impl MicrophoneSource for WavFileMicrophone {
    fn acquire(&mut self) -> Result<CaptureStream, CaptureError> {
        let (mono, sample_rate) = decode_wav_mono(&self.path).map_err(|e| {
            CaptureError::DeviceUnavailable(format!("cannot open {:?}: {}", self.path, e))
        })?;
        if mono.is_empty() {
            warn!("WAV {:?} has no samples; streaming silence", self.path);
        }
        info!(
            "WAV: {:.2}s, {} samples → streaming at real-time pace",
            mono.len() as f64 / sample_rate.max(1) as f64,
            mono.len()
        );
        spawn_paced_stream("wav-source", Arc::new(mono), sample_rate)
    }
}
