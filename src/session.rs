use crate::classifier::AccuracyTally;
use crate::history::PitchHistory;
use crate::pattern::TargetPattern;
use crate::types::{PitchSample, SessionState};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

/// Lock, recovering the data if a loop thread panicked while holding it.
pub fn lock<T: ?Sized>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// The aggregate both loops read and the pitch loop writes.
///
/// Every `begin()` bumps `generation`. Loops capture the generation they were
/// started for and check [`RecordingSession::is_live`] before touching
/// anything, so a late result from a previous session is dropped.
#[derive(Debug)]
pub struct RecordingSession {
    generation: u64,
    state: SessionState,
    started_at: Option<Instant>,
    history: PitchHistory,
    current_pitch: Option<f32>,
    pattern: Arc<TargetPattern>,
}

pub type SharedSession = Arc<Mutex<RecordingSession>>;

impl RecordingSession {
    pub fn new() -> Self {
        Self {
            generation: 0,
            state: SessionState::Idle,
            started_at: None,
            history: PitchHistory::new(),
            current_pitch: None,
            pattern: Arc::new(TargetPattern::empty()),
        }
    }

    pub fn shared() -> SharedSession {
        Arc::new(Mutex::new(Self::new()))
    }

    /// Discard the previous history and open a new generation.
    pub fn begin(&mut self, pattern: Arc<TargetPattern>, now: Instant) -> u64 {
        self.generation += 1;
        self.state = SessionState::Recording;
        self.started_at = Some(now);
        self.history.clear();
        self.current_pitch = None;
        self.pattern = pattern;
        self.generation
    }

    /// Close the current generation. History stays readable until the next `begin()`.
    pub fn end(&mut self) {
        self.generation += 1;
        self.state = SessionState::Idle;
        self.started_at = None;
        self.current_pitch = None;
    }

    pub fn is_live(&self, generation: u64) -> bool {
        self.generation == generation && self.state == SessionState::Recording
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn started_at(&self) -> Option<Instant> {
        self.started_at
    }

    pub fn history(&self) -> &PitchHistory {
        &self.history
    }

    pub fn pattern(&self) -> Arc<TargetPattern> {
        Arc::clone(&self.pattern)
    }

    pub fn current_pitch(&self) -> Option<f32> {
        self.current_pitch
    }

    /// Record an estimate. Only valid frequencies reach the history.
    pub fn record_pitch(&mut self, sample: PitchSample) {
        if self.history.push(sample) {
            self.current_pitch = Some(sample.frequency);
        } else {
            self.current_pitch = None;
        }
    }

    pub fn clear_current_pitch(&mut self) {
        self.current_pitch = None;
    }

    pub fn tally(&self) -> AccuracyTally {
        AccuracyTally::from_samples(self.history.iter(), &self.pattern)
    }
}

impl Default for RecordingSession {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_begin_resets_history_and_bumps_generation() {
        let mut s = RecordingSession::new();
        let g1 = s.begin(Arc::new(TargetPattern::empty()), Instant::now());
        s.record_pitch(PitchSample::new(0.1, 220.0));
        assert_eq!(s.history().len(), 1);
        assert_eq!(s.current_pitch(), Some(220.0));

        let g2 = s.begin(Arc::new(TargetPattern::empty()), Instant::now());
        assert!(g2 > g1);
        assert!(s.history().is_empty());
        assert_eq!(s.current_pitch(), None);
        assert!(!s.is_live(g1));
        assert!(s.is_live(g2));
    }

    #[test]
    fn test_end_invalidates_generation_but_keeps_history() {
        let mut s = RecordingSession::new();
        let g = s.begin(Arc::new(TargetPattern::empty()), Instant::now());
        s.record_pitch(PitchSample::new(0.1, 220.0));
        s.end();
        assert!(!s.is_live(g));
        assert_eq!(s.state(), SessionState::Idle);
        assert_eq!(s.history().len(), 1);
        assert_eq!(s.current_pitch(), None);
    }

    #[test]
    fn test_invalid_pitch_clears_readout() {
        let mut s = RecordingSession::new();
        s.begin(Arc::new(TargetPattern::empty()), Instant::now());
        s.record_pitch(PitchSample::new(0.1, 220.0));
        s.record_pitch(PitchSample::new(0.2, -1.0));
        assert_eq!(s.current_pitch(), None);
        assert_eq!(s.history().len(), 1);
    }

    #[test]
    fn test_lock_recovers_from_poison() {
        let shared = RecordingSession::shared();
        let clone = Arc::clone(&shared);
        let _ = std::thread::spawn(move || {
            let _guard = clone.lock().unwrap();
            panic!("loop died");
        })
        .join();
        assert!(shared.is_poisoned());
        assert_eq!(lock(&shared).state(), SessionState::Idle);
    }
}
