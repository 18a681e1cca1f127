//! Target pattern input: either a flat set of semitone offsets from a root
//! (interval mode) or a timed sequence of notes. Supplied once per session and
//! immutable afterwards.

use crate::error::PatternError;
use crate::notes::{note_name, parse_note_name, transpose, DEFAULT_ROOT_HZ};
use crate::types::TargetNote;
use log::info;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Seconds each interval is held when a pattern is expanded into a timed sequence.
pub const DEFAULT_NOTE_DURATION: f64 = 0.8;
/// Silence between expanded notes.
pub const DEFAULT_NOTE_GAP: f64 = 0.05;

#[derive(Debug, Clone, PartialEq)]
pub enum TargetPattern {
    /// Hit = within threshold of any `root_hz · 2^(offset/12)`.
    Intervals { root_hz: f32, offsets: Vec<i32> },
    /// Hit = within threshold of the note covering the sample's time.
    Timed(Vec<TargetNote>),
}

impl TargetPattern {
    pub fn intervals(root_hz: f32, offsets: Vec<i32>) -> Self {
        TargetPattern::Intervals { root_hz, offsets }
    }

    /// Build a timed pattern, rejecting notes that break the data model.
    pub fn timed(mut notes: Vec<TargetNote>) -> Result<Self, PatternError> {
        for n in &notes {
            validate_note(n)?;
        }
        notes.sort_by(|a, b| a.start_time.total_cmp(&b.start_time));
        Ok(TargetPattern::Timed(notes))
    }

    pub fn empty() -> Self {
        TargetPattern::Timed(Vec::new())
    }

    pub fn is_empty(&self) -> bool {
        match self {
            TargetPattern::Intervals { offsets, .. } => offsets.is_empty(),
            TargetPattern::Timed(notes) => notes.is_empty(),
        }
    }

    /// Timed notes, empty in interval mode.
    pub fn notes(&self) -> &[TargetNote] {
        match self {
            TargetPattern::Timed(notes) => notes,
            TargetPattern::Intervals { .. } => &[],
        }
    }

    /// Absolute target frequencies of an interval pattern, empty in timed mode.
    pub fn interval_frequencies(&self) -> Vec<f32> {
        match self {
            TargetPattern::Intervals { root_hz, offsets } => offsets
                .iter()
                .map(|&o| transpose(*root_hz, o as f32))
                .collect(),
            TargetPattern::Timed(_) => Vec::new(),
        }
    }

    /// End of the last timed note (0 in interval mode).
    pub fn duration(&self) -> f64 {
        self.notes()
            .iter()
            .map(TargetNote::end_time)
            .fold(0.0, f64::max)
    }
}

fn validate_note(n: &TargetNote) -> Result<(), PatternError> {
    let reason = if !(n.frequency > 0.0) || !n.frequency.is_finite() {
        Some("frequency must be > 0 Hz")
    } else if !(n.duration >= 0.0) || !n.duration.is_finite() {
        Some("duration must be >= 0 s")
    } else if !n.start_time.is_finite() {
        Some("start time must be finite")
    } else {
        None
    };
    match reason {
        Some(r) => Err(PatternError::InvalidTargetNote {
            label: n.label.clone(),
            reason: r.to_string(),
        }),
        None => Ok(()),
    }
}

/// Lay intervals end to end: each note lasts `note_duration`, followed by `gap`
/// of silence. Labels are the nearest note names.
pub fn expand_intervals(
    root_hz: f32,
    offsets: &[i32],
    note_duration: f64,
    gap: f64,
) -> Vec<TargetNote> {
    let step = note_duration + gap;
    offsets
        .iter()
        .enumerate()
        .map(|(i, &o)| {
            let frequency = transpose(root_hz, o as f32);
            TargetNote {
                start_time: i as f64 * step,
                duration: note_duration,
                frequency,
                label: note_name(frequency),
            }
        })
        .collect()
}

/// Root can be given as a note name or a frequency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RootSpec {
    Hz(f32),
    Name(String),
}

impl RootSpec {
    pub fn to_hz(&self) -> Result<f32, PatternError> {
        match self {
            RootSpec::Hz(hz) if *hz > 0.0 => Ok(*hz),
            RootSpec::Hz(hz) => Err(PatternError::InvalidNoteName(hz.to_string())),
            RootSpec::Name(name) => parse_note_name(name),
        }
    }
}

impl Default for RootSpec {
    fn default() -> Self {
        RootSpec::Hz(DEFAULT_ROOT_HZ)
    }
}

fn default_note_duration() -> f64 {
    DEFAULT_NOTE_DURATION
}

fn default_gap() -> f64 {
    DEFAULT_NOTE_GAP
}

/// Exercise definition as stored on disk.
///
/// ```json
/// { "name": "Major triad", "root": "C4", "intervals": [0, 4, 7], "timed": true }
/// ```
/// An explicit `notes` list wins over `intervals`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exercise {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub root: RootSpec,
    #[serde(default)]
    pub intervals: Vec<i32>,
    /// Expand intervals into a timed sequence instead of interval mode
    #[serde(default)]
    pub timed: bool,
    #[serde(default = "default_note_duration")]
    pub note_duration: f64,
    #[serde(default = "default_gap")]
    pub gap: f64,
    #[serde(default)]
    pub notes: Option<Vec<TargetNote>>,
}

impl Exercise {
    pub fn load(path: &Path) -> Result<Self, PatternError> {
        let data = std::fs::read_to_string(path)?;
        let ex: Exercise = serde_json::from_str(&data)?;
        info!("Loaded exercise {:?} from {:?}", ex.name, path);
        Ok(ex)
    }

    pub fn to_pattern(&self) -> Result<TargetPattern, PatternError> {
        if let Some(notes) = &self.notes {
            return TargetPattern::timed(notes.clone());
        }
        let root_hz = self.root.to_hz()?;
        if self.timed {
            TargetPattern::timed(expand_intervals(
                root_hz,
                &self.intervals,
                self.note_duration,
                self.gap,
            ))
        } else {
            Ok(TargetPattern::intervals(root_hz, self.intervals.clone()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_major_triad() {
        let notes = expand_intervals(DEFAULT_ROOT_HZ, &[0, 4, 7], 0.8, 0.05);
        assert_eq!(notes.len(), 3);
        let labels: Vec<&str> = notes.iter().map(|n| n.label.as_str()).collect();
        assert_eq!(labels, ["C4", "E4", "G4"]);
        assert!((notes[1].start_time - 0.85).abs() < 1e-9);
        assert!((notes[2].start_time - 1.70).abs() < 1e-9);
        assert!((notes[2].frequency - 392.0).abs() < 0.05);
    }

    #[test]
    fn test_timed_rejects_bad_notes() {
        let bad = TargetNote {
            start_time: 0.0,
            duration: 1.0,
            frequency: 0.0,
            label: "x".into(),
        };
        assert!(TargetPattern::timed(vec![bad.clone()]).is_err());
        let neg = TargetNote {
            frequency: 440.0,
            duration: -0.1,
            ..bad
        };
        assert!(TargetPattern::timed(vec![neg]).is_err());
    }

    #[test]
    fn test_timed_sorts_by_start() {
        let mk = |t: f64| TargetNote {
            start_time: t,
            duration: 0.5,
            frequency: 440.0,
            label: "A4".into(),
        };
        let p = TargetPattern::timed(vec![mk(2.0), mk(0.0), mk(1.0)]).unwrap();
        let starts: Vec<f64> = p.notes().iter().map(|n| n.start_time).collect();
        assert_eq!(starts, [0.0, 1.0, 2.0]);
        assert!((p.duration() - 2.5).abs() < 1e-9);
    }

    #[test]
    fn test_exercise_json_interval_mode() {
        let ex: Exercise =
            serde_json::from_str(r#"{ "name": "Triad", "root": "C4", "intervals": [0, 4, 7] }"#)
                .unwrap();
        match ex.to_pattern().unwrap() {
            TargetPattern::Intervals { root_hz, offsets } => {
                assert!((root_hz - 261.63).abs() < 0.01);
                assert_eq!(offsets, [0, 4, 7]);
            }
            other => panic!("expected interval mode, got {:?}", other),
        }
    }

    #[test]
    fn test_exercise_json_timed_with_hz_root() {
        let ex: Exercise = serde_json::from_str(
            r#"{ "root": 220.0, "intervals": [0, 12], "timed": true, "note_duration": 1.0, "gap": 0.0 }"#,
        )
        .unwrap();
        let p = ex.to_pattern().unwrap();
        assert_eq!(p.notes().len(), 2);
        assert!((p.notes()[1].frequency - 440.0).abs() < 0.01);
        assert!((p.notes()[1].start_time - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_exercise_explicit_notes_win() {
        let ex: Exercise = serde_json::from_str(
            r#"{ "intervals": [0, 4], "notes": [
                { "start_time": 1.0, "duration": 0.5, "frequency": 440.0, "label": "A4" }
            ] }"#,
        )
        .unwrap();
        let p = ex.to_pattern().unwrap();
        assert_eq!(p.notes().len(), 1);
        assert_eq!(p.notes()[0].label, "A4");
    }

    #[test]
    fn test_exercise_default_root_is_c4() {
        let ex: Exercise = serde_json::from_str(r#"{ "intervals": [0] }"#).unwrap();
        assert_eq!(ex.root.to_hz().unwrap(), DEFAULT_ROOT_HZ);
        assert_eq!(ex.note_duration, DEFAULT_NOTE_DURATION);
    }

    #[test]
    fn test_interval_frequencies() {
        let p = TargetPattern::intervals(DEFAULT_ROOT_HZ, vec![0, 12]);
        let f = p.interval_frequencies();
        assert!((f[1] - 523.26).abs() < 0.05);
        assert!(p.notes().is_empty());
    }
}
