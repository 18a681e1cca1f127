use crate::error::CaptureError;
use crate::synth::render_notes_detuned;
use crate::types::{AudioChunk, SessionClock, TargetNote};
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use log::{debug, info};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Samples per emitted chunk. ~23ms at 44.1kHz.
pub const CHUNK_SIZE: usize = 1024;

/// Something that can hand out a live capture stream.
pub trait MicrophoneSource {
    fn acquire(&mut self) -> Result<CaptureStream, CaptureError>;
}

/// Owner-side handle on the device behind a stream. Releasing stops capture
/// and frees the device.
pub trait StreamHandle {
    fn release(self: Box<Self>);
}

/// A live capture stream: mono chunks arrive on `chunks()` until released.
///
/// Dropping without calling [`CaptureStream::release`] still releases the device.
pub struct CaptureStream {
    chunks: Receiver<AudioChunk>,
    sample_rate: u32,
    handle: Option<Box<dyn StreamHandle>>,
}

impl CaptureStream {
    pub fn new(chunks: Receiver<AudioChunk>, sample_rate: u32, handle: Box<dyn StreamHandle>) -> Self {
        Self {
            chunks,
            sample_rate,
            handle: Some(handle),
        }
    }

    pub fn chunks(&self) -> &Receiver<AudioChunk> {
        &self.chunks
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Stop capture and free the device.
    pub fn release(mut self) {
        if let Some(h) = self.handle.take() {
            h.release();
        }
    }
}

impl Drop for CaptureStream {
    fn drop(&mut self) {
        if let Some(h) = self.handle.take() {
            h.release();
        }
    }
}

/// Handle for sources backed by one producer thread.
pub(crate) struct ThreadHandle {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl StreamHandle for ThreadHandle {
    fn release(mut self: Box<Self>) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(t) = self.thread.take() {
            let _ = t.join();
        }
    }
}

/// Stream `samples` as chunks at real-time pace on a named thread. After the
/// last sample the stream keeps delivering silence, the way an open
/// microphone does, until released.
pub(crate) fn spawn_paced_stream(
    name: &str,
    samples: Arc<Vec<f32>>,
    sample_rate: u32,
) -> Result<CaptureStream, CaptureError> {
    let (tx, rx) = bounded::<AudioChunk>(64);
    let stop = Arc::new(AtomicBool::new(false));
    let thread_stop = Arc::clone(&stop);

    let thread = thread::Builder::new()
        .name(name.into())
        .spawn(move || run_paced(tx, &samples, sample_rate, &thread_stop))
        .map_err(|e| CaptureError::DeviceUnavailable(e.to_string()))?;

    Ok(CaptureStream::new(
        rx,
        sample_rate,
        Box::new(ThreadHandle {
            stop,
            thread: Some(thread),
        }),
    ))
}

fn run_paced(tx: Sender<AudioChunk>, samples: &[f32], sample_rate: u32, stop: &AtomicBool) {
    let clock = SessionClock::new();
    let chunk_dur = Duration::from_secs_f64(CHUNK_SIZE as f64 / sample_rate.max(1) as f64);
    let start = Instant::now();
    let silence = vec![0.0f32; CHUNK_SIZE];
    let mut sent: u32 = 0;

    while !stop.load(Ordering::SeqCst) {
        // Pace to real time: wait until this chunk's expected send time
        let target = chunk_dur * sent;
        let elapsed = start.elapsed();
        if elapsed < target {
            thread::sleep(target - elapsed);
        }

        let offset = sent as usize * CHUNK_SIZE;
        let chunk = match samples.get(offset..) {
            Some(rest) if !rest.is_empty() => rest[..rest.len().min(CHUNK_SIZE)].to_vec(),
            _ => silence.clone(),
        };

        let event = AudioChunk {
            timestamp_us: clock.now_us(),
            samples: chunk,
            sample_rate,
        };
        // Never block on a stalled consumer: a full channel drops the chunk
        if let Err(TrySendError::Disconnected(_)) = tx.try_send(event) {
            break;
        }
        sent = sent.saturating_add(1);
    }
    debug!("Paced stream stopped after {} chunks", sent);
}

/// Stand-in microphone that "sings" a rendered note sequence.
///
/// `deny` makes every `acquire()` fail with `PermissionDenied`, to exercise
/// the failure path without real hardware.
pub struct SimulatedMicrophone {
    samples: Arc<Vec<f32>>,
    sample_rate: u32,
    deny: bool,
}

impl SimulatedMicrophone {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples: Arc::new(samples),
            sample_rate,
            deny: false,
        }
    }

    /// A singer following `notes`, off by `detune_cents`.
    pub fn singing(notes: &[TargetNote], sample_rate: u32, detune_cents: f64) -> Self {
        Self::new(render_notes_detuned(notes, sample_rate, detune_cents), sample_rate)
    }

    pub fn silent(sample_rate: u32) -> Self {
        Self::new(Vec::new(), sample_rate)
    }

    pub fn denying_permission(mut self) -> Self {
        self.deny = true;
        self
    }
}

impl MicrophoneSource for SimulatedMicrophone {
    fn acquire(&mut self) -> Result<CaptureStream, CaptureError> {
        if self.deny {
            return Err(CaptureError::PermissionDenied);
        }
        info!(
            "Simulated microphone: {:.2}s of voice at {} Hz",
            self.samples.len() as f64 / self.sample_rate.max(1) as f64,
            self.sample_rate
        );
        spawn_paced_stream("mic-sim", Arc::clone(&self.samples), self.sample_rate)
    }
}
