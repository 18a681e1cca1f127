use crate::encoder::SharedEncoder;
use crate::error::EstimateError;
use crate::session::lock;
use crate::types::AudioChunk;
use crossbeam_channel::{bounded, select, Receiver, RecvTimeoutError, Sender};
use log::{debug, info, trace};
use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Sliding window of the most recent samples, sized to one analysis frame.
#[derive(Debug)]
pub struct AnalysisBuffer {
    samples: VecDeque<f32>,
    capacity: usize,
    total: u64,
}

impl AnalysisBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
            total: 0,
        }
    }

    pub fn push(&mut self, samples: &[f32]) {
        for &s in samples {
            if self.samples.len() == self.capacity {
                self.samples.pop_front();
            }
            self.samples.push_back(s);
        }
        self.total += samples.len() as u64;
    }

    /// Copy of the window, oldest sample first.
    pub fn snapshot(&self) -> Vec<f32> {
        self.samples.iter().copied().collect()
    }

    pub fn is_full(&self) -> bool {
        self.samples.len() == self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Samples seen since the graph opened.
    pub fn total_samples(&self) -> u64 {
        self.total
    }
}

/// Estimator-side view of the graph: the analysis window plus a "new audio" signal.
///
/// The signal channel disconnects when the graph closes.
#[derive(Clone)]
pub struct AnalysisTap {
    window: Arc<Mutex<AnalysisBuffer>>,
    ready: Receiver<()>,
    sample_rate: u32,
}

impl AnalysisTap {
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn window_size(&self) -> usize {
        lock(&self.window).capacity()
    }

    /// Block until new audio arrives. `Ok(false)` on timeout.
    pub fn wait_ready(&self, timeout: Duration) -> Result<bool, EstimateError> {
        match self.ready.recv_timeout(timeout) {
            Ok(()) => Ok(true),
            Err(RecvTimeoutError::Timeout) => Ok(false),
            Err(RecvTimeoutError::Disconnected) => Err(EstimateError::SourceClosed),
        }
    }

    /// The current analysis frame, or None until the window has filled once.
    pub fn frame(&self) -> Option<Vec<f32>> {
        let window = lock(&self.window);
        window.is_full().then(|| window.snapshot())
    }
}

/// Per-session audio-processing graph.
///
/// One `audio-graph` thread drains the capture stream and fans every chunk
/// out to the encoder and to the analysis window.
pub struct AudioGraph {
    stop_tx: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
    window: Arc<Mutex<AnalysisBuffer>>,
    ready_rx: Receiver<()>,
    sample_rate: u32,
}

impl AudioGraph {
    pub fn open(
        chunks: Receiver<AudioChunk>,
        sample_rate: u32,
        encoder: SharedEncoder,
        analysis_window: usize,
    ) -> io::Result<Self> {
        let window = Arc::new(Mutex::new(AnalysisBuffer::new(analysis_window)));
        let (ready_tx, ready_rx) = bounded::<()>(1);
        let (stop_tx, stop_rx) = bounded::<()>(0);

        let thread_window = Arc::clone(&window);
        let thread = thread::Builder::new()
            .name("audio-graph".into())
            .spawn(move || run_graph(chunks, stop_rx, encoder, thread_window, ready_tx))?;

        info!(
            "Audio graph open: {} Hz, {}-sample analysis window",
            sample_rate, analysis_window
        );
        Ok(Self {
            stop_tx: Some(stop_tx),
            thread: Some(thread),
            window,
            ready_rx,
            sample_rate,
        })
    }

    pub fn tap(&self) -> AnalysisTap {
        AnalysisTap {
            window: Arc::clone(&self.window),
            ready: self.ready_rx.clone(),
            sample_rate: self.sample_rate,
        }
    }

    pub fn is_open(&self) -> bool {
        self.thread.is_some()
    }

    /// Stop the graph thread and wait for it. Idempotent.
    pub fn close(&mut self) {
        drop(self.stop_tx.take());
        if let Some(t) = self.thread.take() {
            let _ = t.join();
            info!("Audio graph closed");
        }
    }
}

impl Drop for AudioGraph {
    fn drop(&mut self) {
        self.close();
    }
}

fn run_graph(
    chunks: Receiver<AudioChunk>,
    stop_rx: Receiver<()>,
    encoder: SharedEncoder,
    window: Arc<Mutex<AnalysisBuffer>>,
    ready_tx: Sender<()>,
) {
    let mut chunk_count: u64 = 0;
    loop {
        select! {
            recv(chunks) -> msg => match msg {
                Ok(chunk) => {
                    lock(&encoder).write(&chunk.samples);
                    lock(&window).push(&chunk.samples);
                    // One pending signal is enough; the estimator reads the latest window
                    let _ = ready_tx.try_send(());

                    chunk_count += 1;
                    if chunk_count % 500 == 0 {
                        trace!("Audio graph: {} chunks", chunk_count);
                    }
                }
                Err(_) => {
                    debug!("Audio graph: capture stream ended");
                    break;
                }
            },
            recv(stop_rx) -> _ => break,
        }
    }
    debug!("Audio graph exiting after {} chunks", chunk_count);
}
