use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, StreamConfig};
use crossbeam_channel::{bounded, Sender};
use log::{debug, error, info};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use crate::error::OutputError;
use crate::playback::{BackingTrack, ReferencePlayback};
use crate::session::lock;

/// Cursor drift from the transport (seconds) tolerated before resyncing.
const RESYNC_SECS: f64 = 0.05;

/// A backing track played through the default output device.
///
/// The transport stays an `Instant`-clocked [`BackingTrack`], so the timeline
/// reads the same position whether or not a device is attached. The output
/// callback follows that transport: it plays the track's samples from the
/// current position while playing and writes silence otherwise.
///
/// cpal streams are not `Send`, so the stream lives on its own
/// `audio-output` thread until this value is dropped.
pub struct SpeakerPlayback {
    track: Arc<Mutex<BackingTrack>>,
    shutdown: Option<Sender<()>>,
    worker: Option<JoinHandle<()>>,
}

impl SpeakerPlayback {
    pub fn open(track: BackingTrack) -> Result<Self, OutputError> {
        let samples = track.samples();
        let source_rate = track.sample_rate();
        let track = Arc::new(Mutex::new(track));

        let (ready_tx, ready_rx) = bounded::<Result<(), OutputError>>(1);
        let (shutdown_tx, shutdown_rx) = bounded::<()>(0);
        let shared = Arc::clone(&track);

        let worker = thread::Builder::new()
            .name("audio-output".into())
            .spawn(move || {
                let stream = match build_stream(shared, samples, source_rate) {
                    Ok(s) => s,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(()));
                // Blocks until the sender is dropped
                let _ = shutdown_rx.recv();
                drop(stream);
                debug!("Audio output stream closed");
            })
            .map_err(|e| OutputError::DeviceUnavailable(e.to_string()))?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Self {
                track,
                shutdown: Some(shutdown_tx),
                worker: Some(worker),
            }),
            Ok(Err(e)) => {
                let _ = worker.join();
                Err(e)
            }
            Err(_) => {
                let _ = worker.join();
                Err(OutputError::DeviceUnavailable("output thread exited".into()))
            }
        }
    }
}

impl ReferencePlayback for SpeakerPlayback {
    fn position(&self) -> f64 {
        lock(&self.track).position()
    }

    fn is_playing(&self) -> bool {
        lock(&self.track).is_playing()
    }

    fn play(&mut self) {
        lock(&self.track).play();
    }

    fn pause(&mut self) {
        lock(&self.track).pause();
    }

    fn seek(&mut self, secs: f64) {
        lock(&self.track).seek(secs);
    }
}

impl Drop for SpeakerPlayback {
    fn drop(&mut self) {
        drop(self.shutdown.take());
        if let Some(w) = self.worker.take() {
            let _ = w.join();
        }
    }
}

fn build_stream(
    track: Arc<Mutex<BackingTrack>>,
    samples: Arc<Vec<f32>>,
    source_rate: u32,
) -> Result<cpal::Stream, OutputError> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| OutputError::DeviceUnavailable("no default audio output device".into()))?;

    info!(
        "Audio output: {}",
        device.name().unwrap_or_else(|_| "unknown".into())
    );

    let supported = device
        .default_output_config()
        .map_err(|e| OutputError::DeviceUnavailable(format!("no supported output config: {e}")))?;
    let format = supported.sample_format();
    let config: StreamConfig = supported.into();
    let channels = config.channels as usize;
    info!(
        "Output config: {}Hz  {} ch  {:?}",
        config.sample_rate.0, channels, format
    );

    let mut cursor = OutputCursor::new(samples, source_rate, config.sample_rate.0);
    let err_fn = |e: cpal::StreamError| error!("Audio output error: {e}");

    let stream = match format {
        SampleFormat::F32 => device.build_output_stream(
            &config,
            move |data: &mut [f32], _| {
                if let Ok(t) = track.try_lock() {
                    cursor.sync(t.is_playing(), t.position());
                }
                cursor.fill(data, channels);
            },
            err_fn,
            None,
        ),
        SampleFormat::I16 => {
            let mut scratch: Vec<f32> = Vec::new();
            device.build_output_stream(
                &config,
                move |data: &mut [i16], _| {
                    if let Ok(t) = track.try_lock() {
                        cursor.sync(t.is_playing(), t.position());
                    }
                    scratch.resize(data.len(), 0.0);
                    cursor.fill(&mut scratch, channels);
                    for (out, &s) in data.iter_mut().zip(&scratch) {
                        *out = (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
                    }
                },
                err_fn,
                None,
            )
        }
        fmt => {
            return Err(OutputError::UnsupportedFormat(format!(
                "{fmt:?}; use an F32 or I16 device"
            )))
        }
    }
    .map_err(|e| OutputError::DeviceUnavailable(e.to_string()))?;

    stream
        .play()
        .map_err(|e| OutputError::DeviceUnavailable(e.to_string()))?;
    Ok(stream)
}

/// Read head for the output callback. Advances by one output frame per
/// written frame and snaps back to the transport when they drift apart.
struct OutputCursor {
    samples: Arc<Vec<f32>>,
    source_rate: f64,
    output_rate: f64,
    /// Seconds into the track
    position: f64,
    playing: bool,
}

impl OutputCursor {
    fn new(samples: Arc<Vec<f32>>, source_rate: u32, output_rate: u32) -> Self {
        Self {
            samples,
            source_rate: source_rate.max(1) as f64,
            output_rate: output_rate.max(1) as f64,
            position: 0.0,
            playing: false,
        }
    }

    fn sync(&mut self, playing: bool, transport: f64) {
        let drifted = (self.position - transport).abs() > RESYNC_SECS;
        if !playing || !self.playing || drifted {
            self.position = transport;
        }
        self.playing = playing;
    }

    /// Fill interleaved output, the same mono sample on every channel.
    fn fill(&mut self, data: &mut [f32], channels: usize) {
        for frame in data.chunks_mut(channels.max(1)) {
            let value = if self.playing {
                let idx = (self.position * self.source_rate) as usize;
                self.samples.get(idx).copied().unwrap_or(0.0)
            } else {
                0.0
            };
            frame.fill(value);
            if self.playing {
                self.position += 1.0 / self.output_rate;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Sample value equals its index.
    fn ramp() -> Arc<Vec<f32>> {
        Arc::new((0..128).map(|i| i as f32).collect())
    }

    #[test]
    fn test_paused_cursor_writes_silence() {
        let mut c = OutputCursor::new(ramp(), 64, 64);
        c.sync(false, 0.5);
        let mut out = [1.0f32; 8];
        c.fill(&mut out, 2);
        assert!(out.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_playing_cursor_follows_transport() {
        let mut c = OutputCursor::new(ramp(), 64, 64);
        c.sync(true, 0.5);
        let mut out = [0.0f32; 6];
        c.fill(&mut out, 2);
        assert_eq!(out, [32.0, 32.0, 33.0, 33.0, 34.0, 34.0]);

        // Small drift keeps the cursor; a seek snaps it
        c.sync(true, 0.55);
        let mut one = [0.0f32; 1];
        c.fill(&mut one, 1);
        assert_eq!(one[0], 35.0);
        c.sync(true, 0.125);
        c.fill(&mut one, 1);
        assert_eq!(one[0], 8.0);
    }

    #[test]
    fn test_resamples_by_rate_ratio() {
        // Device at twice the source rate: each source sample is written twice
        let mut c = OutputCursor::new(ramp(), 64, 128);
        c.sync(true, 0.0);
        let mut out = [9.0f32; 4];
        c.fill(&mut out, 1);
        assert_eq!(out, [0.0, 0.0, 1.0, 1.0]);
    }

    #[test]
    fn test_past_end_is_silent() {
        let mut c = OutputCursor::new(ramp(), 64, 64);
        c.sync(true, 127.0 / 64.0);
        let mut out = [9.0f32; 3];
        c.fill(&mut out, 1);
        assert_eq!(out, [127.0, 0.0, 0.0]);
    }
}
