use crate::audio_graph::AudioGraph;
use crate::classifier::AccuracyTally;
use crate::config::EngineConfig;
use crate::encoder::{SharedEncoder, WavEncoder};
use crate::error::RecorderError;
use crate::estimator::EstimatorFactory;
use crate::microphone::{CaptureStream, MicrophoneSource};
use crate::pattern::TargetPattern;
use crate::pitch_loop::PitchLoop;
use crate::playback::SharedPlayback;
use crate::render::{RendererLoop, SharedSurface};
use crate::session::{lock, RecordingSession, SharedSession};
use crate::timeline::Timeline;
use crate::types::{PitchSample, RecordedAudio, SessionState};
use crossbeam_channel::Sender;
use log::{debug, error, info, warn};
use std::sync::Arc;
use std::time::Instant;

/// What a finished session hands to the artifact consumer.
#[derive(Debug, Clone)]
pub struct CompletedRecording {
    pub audio: RecordedAudio,
    pub history: Vec<PitchSample>,
    pub tally: AccuracyTally,
    pub pattern: Arc<TargetPattern>,
}

#[derive(Debug, Clone)]
pub enum RecorderEvent {
    /// Exactly one per successful `stop()`.
    RecordingComplete(CompletedRecording),
    /// `start()` failed; `message` is meant for the user.
    StartFailed { message: String },
}

/// Resources owned for the duration of one session.
///
/// Each field releases itself on drop, so a half-built session that is
/// abandoned during `start()` leaves nothing behind.
struct ActiveSession {
    stream: CaptureStream,
    graph: AudioGraph,
    renderer: RendererLoop,
    // Never joined: an inference may still be in flight at stop
    _pitch_loop: PitchLoop,
}

/// The recording lifecycle manager: `Idle → Recording → Idle`.
///
/// Owns the microphone stream, the audio graph and the encoder for the
/// length of a session and drives both loops.
pub struct Recorder {
    microphone: Box<dyn MicrophoneSource>,
    estimators: Box<dyn EstimatorFactory>,
    encoder: SharedEncoder,
    playback: Option<SharedPlayback>,
    surface: SharedSurface,
    events: Sender<RecorderEvent>,
    session: SharedSession,
    config: EngineConfig,
    pattern: Arc<TargetPattern>,
    active: Option<ActiveSession>,
}

impl Recorder {
    pub fn new(
        microphone: Box<dyn MicrophoneSource>,
        estimators: Box<dyn EstimatorFactory>,
        surface: SharedSurface,
        events: Sender<RecorderEvent>,
        config: EngineConfig,
    ) -> Self {
        Self {
            microphone,
            estimators,
            encoder: WavEncoder::shared(),
            playback: None,
            surface,
            events,
            session: RecordingSession::shared(),
            config,
            pattern: Arc::new(TargetPattern::empty()),
            active: None,
        }
    }

    pub fn with_encoder(mut self, encoder: SharedEncoder) -> Self {
        self.encoder = encoder;
        self
    }

    /// Backing track whose transport drives the timeline while it plays.
    pub fn with_playback(mut self, playback: SharedPlayback) -> Self {
        self.playback = Some(playback);
        self
    }

    pub fn with_pattern(mut self, pattern: TargetPattern) -> Self {
        self.pattern = Arc::new(pattern);
        self
    }

    /// Takes effect at the next `start()`; a running session keeps its pattern.
    pub fn set_pattern(&mut self, pattern: TargetPattern) {
        self.pattern = Arc::new(pattern);
    }

    pub fn state(&self) -> SessionState {
        lock(&self.session).state()
    }

    pub fn is_recording(&self) -> bool {
        self.active.is_some()
    }

    pub fn session(&self) -> SharedSession {
        Arc::clone(&self.session)
    }

    pub fn tally(&self) -> AccuracyTally {
        lock(&self.session).tally()
    }

    /// Acquire the microphone and start a new session.
    ///
    /// On failure the recorder stays idle, a `StartFailed` event is sent, and
    /// everything acquired so far has been released.
    pub fn start(&mut self) -> Result<(), RecorderError> {
        if self.active.is_some() {
            warn!("start() while already recording; ignored");
            return Ok(());
        }

        match self.launch() {
            Ok(active) => {
                self.active = Some(active);
                info!("Recording started");
                Ok(())
            }
            Err(e) => {
                error!("Could not start recording: {}", e);
                let _ = self.events.send(RecorderEvent::StartFailed {
                    message: e.to_string(),
                });
                Err(e)
            }
        }
    }

    fn launch(&mut self) -> Result<ActiveSession, RecorderError> {
        let stream = self.microphone.acquire()?;
        let sample_rate = stream.sample_rate();
        info!("Microphone acquired ({} Hz)", sample_rate);

        let graph = AudioGraph::open(
            stream.chunks().clone(),
            sample_rate,
            Arc::clone(&self.encoder),
            self.config.analysis_window,
        )?;
        let estimator = self
            .estimators
            .build(graph.tap())
            .map_err(RecorderError::EstimatorInit)?;

        let generation = lock(&self.session).begin(Arc::clone(&self.pattern), Instant::now());
        debug!("Session generation {}", generation);
        if let Some(p) = &self.playback {
            let mut p = lock(p);
            p.seek(0.0);
            p.play();
        }

        let timeline = Timeline::new(self.playback.clone());
        let started = PitchLoop::spawn(estimator, self.session(), timeline.clone(), generation)
            .and_then(|pitch_loop| {
                let renderer = RendererLoop::spawn(
                    self.session(),
                    timeline,
                    Arc::clone(&self.surface),
                    generation,
                    self.config.frame_interval(),
                )?;
                Ok((pitch_loop, renderer))
            })
            .map_err(RecorderError::from)
            .and_then(|loops| {
                lock(&self.encoder).start(sample_rate)?;
                Ok(loops)
            });

        match started {
            Ok((pitch_loop, renderer)) => Ok(ActiveSession {
                stream,
                graph,
                renderer,
                _pitch_loop: pitch_loop,
            }),
            Err(e) => {
                // Ending the generation stops any loop already spawned
                lock(&self.session).end();
                self.halt_playback();
                Err(e)
            }
        }
    }

    /// Finalize the recording and release every resource. No-op when idle.
    ///
    /// Releases happen even if encoding fails; in that case no completion
    /// event is sent and the error is returned.
    pub fn stop(&mut self) -> Result<(), RecorderError> {
        let Some(active) = self.active.take() else {
            debug!("stop() while idle; nothing to do");
            return Ok(());
        };
        let ActiveSession {
            stream,
            mut graph,
            mut renderer,
            _pitch_loop,
        } = active;

        let encoded = lock(&self.encoder).stop();

        stream.release();
        info!("Microphone released");
        renderer.cancel();
        graph.close();
        self.halt_playback();

        let (history, tally) = {
            let mut s = lock(&self.session);
            s.end();
            (s.history().to_vec(), s.tally())
        };
        info!(
            "Recording stopped: {} pitch samples, {}",
            history.len(),
            tally
        );

        let audio = encoded?;
        let event = RecorderEvent::RecordingComplete(CompletedRecording {
            audio,
            history,
            tally,
            pattern: Arc::clone(&self.pattern),
        });
        if self.events.send(event).is_err() {
            warn!("No consumer for the finished recording");
        }
        Ok(())
    }

    fn halt_playback(&self) {
        if let Some(p) = &self.playback {
            let mut p = lock(p);
            p.pause();
            p.seek(0.0);
        }
    }
}

impl Drop for Recorder {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            error!("Stopping on drop: {}", e);
        }
    }
}
