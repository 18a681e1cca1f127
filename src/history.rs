use crate::types::PitchSample;
use std::collections::VecDeque;

/// Samples retained per session; older ones fall off the front.
pub const HISTORY_CAPACITY: usize = 500;

/// Bounded, time-ordered pitch trail for one session.
///
/// Appends never move time backwards: a sample stamped earlier than the
/// newest one is clamped to the newest time. This can only happen when the
/// timeline switches from a backing track's clock to the wall-clock fallback.
#[derive(Debug, Clone)]
pub struct PitchHistory {
    samples: VecDeque<PitchSample>,
    capacity: usize,
}

impl PitchHistory {
    pub fn new() -> Self {
        Self::with_capacity(HISTORY_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    /// Append a sample. Non-positive or non-finite frequencies are rejected
    /// (absence of pitch is "no sample", never a zero).
    pub fn push(&mut self, mut sample: PitchSample) -> bool {
        if !(sample.frequency > 0.0) || !sample.frequency.is_finite() || !sample.time.is_finite() {
            return false;
        }
        if let Some(last) = self.samples.back() {
            if sample.time < last.time {
                sample.time = last.time;
            }
        }
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
        true
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn latest(&self) -> Option<&PitchSample> {
        self.samples.back()
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &PitchSample> + ExactSizeIterator {
        self.samples.iter()
    }

    pub fn to_vec(&self) -> Vec<PitchSample> {
        self.samples.iter().copied().collect()
    }
}

impl Default for PitchHistory {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_caps_at_500_keeping_newest() {
        let mut h = PitchHistory::new();
        for i in 0..750 {
            h.push(PitchSample::new(i as f64 * 0.01, 200.0 + i as f32));
        }
        assert_eq!(h.len(), 500);
        let first = h.iter().next().unwrap();
        assert_eq!(first.frequency, 450.0);
        assert_eq!(h.latest().unwrap().frequency, 949.0);
    }

    #[test]
    fn test_rejects_zero_negative_and_nan() {
        let mut h = PitchHistory::new();
        assert!(!h.push(PitchSample::new(0.0, 0.0)));
        assert!(!h.push(PitchSample::new(0.0, -5.0)));
        assert!(!h.push(PitchSample::new(0.0, f32::NAN)));
        assert!(!h.push(PitchSample::new(f64::INFINITY, 440.0)));
        assert!(h.is_empty());
    }

    #[test]
    fn test_time_never_decreases() {
        let mut h = PitchHistory::new();
        h.push(PitchSample::new(1.0, 440.0));
        h.push(PitchSample::new(0.5, 440.0));
        h.push(PitchSample::new(1.2, 440.0));
        let times: Vec<f64> = h.iter().map(|s| s.time).collect();
        assert_eq!(times, [1.0, 1.0, 1.2]);
    }

    #[test]
    fn test_clear() {
        let mut h = PitchHistory::with_capacity(3);
        h.push(PitchSample::new(0.0, 100.0));
        h.clear();
        assert!(h.is_empty());
        assert_eq!(h.capacity(), 3);
    }
}
