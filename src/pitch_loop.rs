use crate::error::EstimateError;
use crate::estimator::PitchEstimator;
use crate::session::{lock, SharedSession};
use crate::timeline::{synchronized_time, Timeline};
use crate::types::PitchSample;
use log::{debug, trace, warn};
use std::io;
use std::thread::{self, JoinHandle};

/// The pitch estimation loop: one request in flight, each completion
/// immediately issues the next.
///
/// The loop is bound to the session generation it was spawned for. A result
/// that completes after that generation ended is dropped and the loop exits.
pub struct PitchLoop {
    thread: JoinHandle<()>,
}

impl PitchLoop {
    pub fn spawn(
        estimator: Box<dyn PitchEstimator>,
        session: SharedSession,
        timeline: Timeline,
        generation: u64,
    ) -> io::Result<Self> {
        let thread = thread::Builder::new()
            .name("pitch-loop".into())
            .spawn(move || run(estimator, &session, &timeline, generation))?;
        Ok(Self { thread })
    }

    /// Wait for the loop to exit. Only meaningful after the session ended.
    pub fn join(self) {
        let _ = self.thread.join();
    }
}

fn run(
    mut estimator: Box<dyn PitchEstimator>,
    session: &SharedSession,
    timeline: &Timeline,
    generation: u64,
) {
    let mut requests: u64 = 0;
    let mut recorded: u64 = 0;

    loop {
        let result = estimator.request_pitch();
        requests += 1;

        // Playback lock before session lock
        let clock = timeline.playback_clock();
        let mut s = lock(session);
        if !s.is_live(generation) {
            debug!("Pitch loop: generation {} ended, dropping late result", generation);
            break;
        }

        match result {
            Ok(Some(frequency)) => {
                let elapsed = s.started_at().map(|t| t.elapsed());
                let sample = PitchSample::new(synchronized_time(clock, elapsed), frequency);
                s.record_pitch(sample);
                recorded += 1;
                trace!("Pitch: {}", sample);
            }
            Ok(None) => s.clear_current_pitch(),
            Err(EstimateError::SourceClosed) => {
                s.clear_current_pitch();
                warn!("Pitch loop: audio source closed while recording");
                break;
            }
            Err(e) => {
                s.clear_current_pitch();
                debug!("Pitch loop: {}", e);
            }
        }
        drop(s);

        if requests % 200 == 0 {
            debug!("Pitch loop: {} requests, {} samples", requests, recorded);
        }
    }

    debug!(
        "Pitch loop exiting after {} requests, {} samples",
        requests, recorded
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::TargetPattern;
    use crate::session::RecordingSession;
    use std::collections::VecDeque;
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    struct Scripted(VecDeque<Result<Option<f32>, EstimateError>>);

    impl PitchEstimator for Scripted {
        fn request_pitch(&mut self) -> Result<Option<f32>, EstimateError> {
            thread::sleep(Duration::from_millis(2));
            self.0.pop_front().unwrap_or(Err(EstimateError::SourceClosed))
        }
    }

    #[test]
    fn test_records_pitches_and_skips_failures() {
        let session = RecordingSession::shared();
        let gen = lock(&session).begin(Arc::new(TargetPattern::empty()), Instant::now());
        let script = Scripted(VecDeque::from(vec![
            Ok(Some(220.0)),
            Err(EstimateError::Failed("glitch".into())),
            Ok(None),
            Ok(Some(330.0)),
        ]));

        let lp = PitchLoop::spawn(Box::new(script), Arc::clone(&session), Timeline::default(), gen)
            .unwrap();
        lp.join();

        let s = lock(&session);
        let freqs: Vec<f32> = s.history().iter().map(|p| p.frequency).collect();
        assert_eq!(freqs, vec![220.0, 330.0]);
        // SourceClosed at the end cleared the readout
        assert_eq!(s.current_pitch(), None);
        let times: Vec<f64> = s.history().iter().map(|p| p.time).collect();
        assert!(times[0] > 0.0 && times[1] >= times[0]);
    }

    #[test]
    fn test_exits_without_writing_once_session_ends() {
        let session = RecordingSession::shared();
        let gen = lock(&session).begin(Arc::new(TargetPattern::empty()), Instant::now());
        lock(&session).end();

        let script = Scripted(VecDeque::from(vec![Ok(Some(440.0))]));
        let lp = PitchLoop::spawn(Box::new(script), Arc::clone(&session), Timeline::default(), gen)
            .unwrap();
        lp.join();
        assert!(lock(&session).history().is_empty());
    }
}
