use crate::notes::cents;
use crate::pattern::TargetPattern;
use crate::types::{PitchSample, TargetNote};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Quarter-tone tolerance. Strictly-less-than: exactly 50 cents is a miss.
pub const HIT_THRESHOLD_CENTS: f32 = 50.0;

/// Distances are judged to a tenth of a cent, so 49.96 cents counts as 50.0
/// (a miss) while 49.7 stays a hit.
fn within_threshold(distance_cents: f32) -> bool {
    (distance_cents.abs() * 10.0).round() / 10.0 < HIT_THRESHOLD_CENTS
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    Hit,
    Miss,
    /// No target is active at the sample's time; not scored.
    Neutral,
}

/// Interval mode: hit if the sample is within threshold of any offset above the root.
pub fn classify_interval(frequency: f32, root_hz: f32, offsets: &[i32]) -> Verdict {
    if offsets.is_empty() {
        return Verdict::Neutral;
    }
    let sung = cents(frequency, root_hz);
    let hit = offsets
        .iter()
        .any(|&o| within_threshold(sung - o as f32 * 100.0));
    if hit {
        Verdict::Hit
    } else {
        Verdict::Miss
    }
}

/// First note whose `[start, start + duration)` contains `time`.
pub fn active_note(notes: &[TargetNote], time: f64) -> Option<&TargetNote> {
    notes.iter().find(|n| n.contains(time))
}

/// Timed mode: compare against the note covering the sample, neutral if none.
pub fn classify_timed(sample: &PitchSample, notes: &[TargetNote]) -> Verdict {
    match active_note(notes, sample.time) {
        Some(note) => {
            // Both sides on a common 1 Hz anchor.
            let diff = cents(sample.frequency, 1.0) - cents(note.frequency, 1.0);
            if within_threshold(diff) {
                Verdict::Hit
            } else {
                Verdict::Miss
            }
        }
        None => Verdict::Neutral,
    }
}

pub fn classify(sample: &PitchSample, pattern: &TargetPattern) -> Verdict {
    match pattern {
        TargetPattern::Intervals { root_hz, offsets } => {
            classify_interval(sample.frequency, *root_hz, offsets)
        }
        TargetPattern::Timed(notes) => classify_timed(sample, notes),
    }
}

/// Running counts of verdicts over a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccuracyTally {
    pub hits: u32,
    pub misses: u32,
    pub neutral: u32,
}

impl AccuracyTally {
    pub fn from_samples<'a>(
        samples: impl IntoIterator<Item = &'a PitchSample>,
        pattern: &TargetPattern,
    ) -> Self {
        let mut tally = Self::default();
        for s in samples {
            tally.record(classify(s, pattern));
        }
        tally
    }

    pub fn record(&mut self, verdict: Verdict) {
        match verdict {
            Verdict::Hit => self.hits += 1,
            Verdict::Miss => self.misses += 1,
            Verdict::Neutral => self.neutral += 1,
        }
    }

    pub fn scored(&self) -> u32 {
        self.hits + self.misses
    }

    /// Fraction of scored samples that hit; None before anything was scored.
    pub fn hit_rate(&self) -> Option<f32> {
        match self.scored() {
            0 => None,
            n => Some(self.hits as f32 / n as f32),
        }
    }
}

impl fmt::Display for AccuracyTally {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} hit / {} miss / {} unscored", self.hits, self.misses, self.neutral)?;
        if let Some(rate) = self.hit_rate() {
            write!(f, " ({:.0}%)", rate * 100.0)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notes::{transpose, DEFAULT_ROOT_HZ};

    fn a440_note() -> TargetNote {
        TargetNote {
            start_time: 1.0,
            duration: 0.5,
            frequency: 440.0,
            label: "A4".into(),
        }
    }

    #[test]
    fn test_unison_hit() {
        assert_eq!(classify_interval(261.63, DEFAULT_ROOT_HZ, &[0]), Verdict::Hit);
    }

    #[test]
    fn test_semitone_up_is_miss() {
        assert_eq!(classify_interval(277.18, DEFAULT_ROOT_HZ, &[0]), Verdict::Miss);
    }

    #[test]
    fn test_fifty_cent_boundary_is_miss() {
        // 269.29 Hz is 49.96 cents above C4, which rounds to 50.0.
        assert_eq!(classify_interval(269.29, DEFAULT_ROOT_HZ, &[0]), Verdict::Miss);
        // 50.01 cents below
        assert_eq!(classify_interval(254.18, DEFAULT_ROOT_HZ, &[0]), Verdict::Miss);
        // 48 cents up
        assert_eq!(classify_interval(268.97, DEFAULT_ROOT_HZ, &[0]), Verdict::Hit);
    }

    #[test]
    fn test_just_under_fifty_cents_is_hit() {
        for cents in [49.6f32, 49.7, 49.9] {
            let up = transpose(DEFAULT_ROOT_HZ, cents / 100.0);
            let down = transpose(DEFAULT_ROOT_HZ, -cents / 100.0);
            assert_eq!(classify_interval(up, DEFAULT_ROOT_HZ, &[0]), Verdict::Hit, "+{cents}");
            assert_eq!(classify_interval(down, DEFAULT_ROOT_HZ, &[0]), Verdict::Hit, "-{cents}");
        }
    }

    #[test]
    fn test_major_triad_intervals() {
        let triad = [0, 4, 7];
        for hz in [261.63, 329.63, 392.00] {
            assert_eq!(classify_interval(hz, DEFAULT_ROOT_HZ, &triad), Verdict::Hit, "{hz}");
        }
        // F4 is 500 cents: between the third and the fifth
        assert_eq!(classify_interval(349.23, DEFAULT_ROOT_HZ, &triad), Verdict::Miss);
    }

    #[test]
    fn test_empty_interval_set_is_neutral() {
        assert_eq!(classify_interval(261.63, DEFAULT_ROOT_HZ, &[]), Verdict::Neutral);
    }

    #[test]
    fn test_timed_hit_inside_interval() {
        let notes = vec![a440_note()];
        assert_eq!(classify_timed(&PitchSample::new(1.2, 440.0), &notes), Verdict::Hit);
    }

    #[test]
    fn test_timed_outside_interval_is_neutral() {
        let notes = vec![a440_note()];
        assert_eq!(classify_timed(&PitchSample::new(1.6, 440.0), &notes), Verdict::Neutral);
        assert_eq!(classify_timed(&PitchSample::new(1.5, 440.0), &notes), Verdict::Neutral);
    }

    #[test]
    fn test_timed_wrong_pitch_is_miss() {
        let notes = vec![a440_note()];
        assert_eq!(classify_timed(&PitchSample::new(1.2, 466.16), &notes), Verdict::Miss);
        assert_eq!(classify_timed(&PitchSample::new(1.2, 445.0), &notes), Verdict::Hit);
    }

    #[test]
    fn test_overlap_uses_first_match() {
        let mut second = a440_note();
        second.frequency = 220.0;
        second.start_time = 1.1;
        let notes = vec![a440_note(), second];
        assert_eq!(classify_timed(&PitchSample::new(1.2, 440.0), &notes), Verdict::Hit);
    }

    #[test]
    fn test_tally_counts() {
        let pattern = TargetPattern::Timed(vec![a440_note()]);
        let samples = [
            PitchSample::new(1.0, 440.0),
            PitchSample::new(1.1, 300.0),
            PitchSample::new(3.0, 440.0),
        ];
        let tally = AccuracyTally::from_samples(&samples, &pattern);
        assert_eq!(tally, AccuracyTally { hits: 1, misses: 1, neutral: 1 });
        assert_eq!(tally.hit_rate(), Some(0.5));
        assert_eq!(AccuracyTally::default().hit_rate(), None);
        assert_eq!(tally.to_string(), "1 hit / 1 miss / 1 unscored (50%)");
    }
}
