use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BuildStreamError, SampleFormat, Stream, StreamConfig};
use crossbeam_channel::{bounded, TrySendError};
use log::{debug, error, info};
use std::thread::{self, JoinHandle};

use crate::error::CaptureError;
use crate::microphone::{CaptureStream, MicrophoneSource, StreamHandle, CHUNK_SIZE};
use crate::types::{AudioChunk, SessionClock};

/// The default input device via cpal.
///
/// Samples are mixed to mono f32 and delivered as chunks of `CHUNK_SIZE`.
/// The stream handle holds the cpal `Stream`; releasing it stops capture.
#[derive(Debug, Default)]
pub struct CpalMicrophone {
    /// Requested rate; the device default is used when unsupported
    preferred_rate: Option<u32>,
}

impl CpalMicrophone {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sample_rate(mut self, rate: u32) -> Self {
        self.preferred_rate = Some(rate);
        self
    }
}

struct CpalHandle {
    stream: Option<Stream>,
    worker: Option<JoinHandle<()>>,
}

impl StreamHandle for CpalHandle {
    fn release(mut self: Box<Self>) {
        // Dropping the stream ends the callback, which closes the worker's input
        drop(self.stream.take());
        if let Some(w) = self.worker.take() {
            let _ = w.join();
        }
        debug!("cpal input stream released");
    }
}

fn build_error(e: BuildStreamError) -> CaptureError {
    match e {
        BuildStreamError::DeviceNotAvailable => {
            CaptureError::DeviceUnavailable("input device disappeared".into())
        }
        BuildStreamError::StreamConfigNotSupported => {
            CaptureError::UnsupportedFormat("stream config not supported".into())
        }
        other => CaptureError::DeviceUnavailable(other.to_string()),
    }
}

impl MicrophoneSource for CpalMicrophone {
    fn acquire(&mut self) -> Result<CaptureStream, CaptureError> {
        let host = cpal::default_host();

        let device = host
            .default_input_device()
            .ok_or_else(|| CaptureError::DeviceUnavailable("no default audio input device".into()))?;

        info!(
            "Audio input: {}",
            device.name().unwrap_or_else(|_| "unknown".into())
        );

        let supported = device
            .default_input_config()
            .map_err(|e| CaptureError::DeviceUnavailable(format!("no supported input config: {e}")))?;

        // Use the preferred rate if a range with the same channel count covers it
        let preferred = self.preferred_rate.map(cpal::SampleRate);
        let matched = preferred.and_then(|rate| {
            device.supported_input_configs().ok().and_then(|configs| {
                configs
                    .filter(|c| {
                        c.channels() == supported.channels()
                            && c.min_sample_rate() <= rate
                            && c.max_sample_rate() >= rate
                    })
                    .max_by_key(|c| c.max_sample_rate())
                    .map(|c| c.with_sample_rate(rate))
            })
        });

        let (config, sample_rate, format): (StreamConfig, u32, SampleFormat) =
            if let Some(cfg) = matched {
                let sr = cfg.sample_rate().0;
                let fmt = cfg.sample_format();
                (cfg.into(), sr, fmt)
            } else {
                let sr = supported.sample_rate().0;
                let fmt = supported.sample_format();
                (supported.into(), sr, fmt)
            };

        let channels = config.channels as usize;
        info!(
            "Capture config: {}Hz  {} ch  {:?}",
            sample_rate, channels, format
        );

        // Realtime callback → worker thread; try_send never blocks the callback
        let (raw_tx, raw_rx) = bounded::<Vec<f32>>(64);
        let err_fn = |e: cpal::StreamError| error!("Audio stream error: {e}");

        let stream = match format {
            SampleFormat::F32 => device.build_input_stream(
                &config,
                move |data: &[f32], _| {
                    let _ = raw_tx.try_send(mix_mono_f32(data, channels));
                },
                err_fn,
                None,
            ),
            SampleFormat::I16 => device.build_input_stream(
                &config,
                move |data: &[i16], _| {
                    let _ = raw_tx.try_send(mix_mono_i16(data, channels));
                },
                err_fn,
                None,
            ),
            SampleFormat::U16 => device.build_input_stream(
                &config,
                move |data: &[u16], _| {
                    let _ = raw_tx.try_send(mix_mono_u16(data, channels));
                },
                err_fn,
                None,
            ),
            fmt => {
                return Err(CaptureError::UnsupportedFormat(format!(
                    "{fmt:?}; use an F32 or I16 device"
                )))
            }
        }
        .map_err(build_error)?;

        stream
            .play()
            .map_err(|e| CaptureError::DeviceUnavailable(e.to_string()))?;

        let (tx, rx) = bounded::<AudioChunk>(64);
        let clock = SessionClock::new();
        let worker = thread::Builder::new()
            .name("audio-capture".into())
            .spawn(move || {
                let mut accum: Vec<f32> = Vec::with_capacity(CHUNK_SIZE * 4);
                for chunk in raw_rx {
                    accum.extend_from_slice(&chunk);
                    while accum.len() >= CHUNK_SIZE {
                        let samples: Vec<f32> = accum.drain(..CHUNK_SIZE).collect();
                        let event = AudioChunk {
                            timestamp_us: clock.now_us(),
                            samples,
                            sample_rate,
                        };
                        if let Err(TrySendError::Disconnected(_)) = tx.try_send(event) {
                            return;
                        }
                    }
                }
            })
            .map_err(|e| CaptureError::DeviceUnavailable(e.to_string()))?;

        Ok(CaptureStream::new(
            rx,
            sample_rate,
            Box::new(CpalHandle {
                stream: Some(stream),
                worker: Some(worker),
            }),
        ))
    }
}

// ─── Per-format mono mixdown helpers ─────────────────────────────────────────

fn mix_mono_f32(data: &[f32], channels: usize) -> Vec<f32> {
    if channels == 1 {
        return data.to_vec();
    }
    data.chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

fn mix_mono_i16(data: &[i16], channels: usize) -> Vec<f32> {
    const SCALE: f32 = i16::MAX as f32;
    data.chunks(channels.max(1))
        .map(|frame| {
            let sum: i32 = frame.iter().map(|&s| s as i32).sum();
            sum as f32 / (frame.len() as f32 * SCALE)
        })
        .collect()
}

fn mix_mono_u16(data: &[u16], channels: usize) -> Vec<f32> {
    // U16: 0 = -1.0, 32768 = 0.0, 65535 = +1.0
    const MID: f32 = 32768.0;
    data.chunks(channels.max(1))
        .map(|frame| {
            let sum: f32 = frame.iter().map(|&s| (s as f32 - MID) / MID).sum();
            sum / frame.len() as f32
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mixdown_averages_channels() {
        assert_eq!(mix_mono_f32(&[0.5, -0.5, 1.0, 0.0], 2), vec![0.0, 0.5]);
        let m = mix_mono_i16(&[i16::MAX, i16::MAX, 0, 0], 2);
        assert!((m[0] - 1.0).abs() < 1e-6 && m[1] == 0.0);
        let u = mix_mono_u16(&[32768, 65535], 1);
        assert_eq!(u[0], 0.0);
        assert!((u[1] - 1.0).abs() < 1e-4);
    }
}
