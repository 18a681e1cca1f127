//! Pitch math: Hz ↔ MIDI, cents, and note names.

use crate::error::PatternError;

const NOTE_NAMES: [&str; 12] = ["C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B"];

/// Default root for interval exercises (C4).
pub const DEFAULT_ROOT_HZ: f32 = 261.63;

pub fn midi_to_hz(midi: f64) -> f64 {
    440.0 * 2.0f64.powf((midi - 69.0) / 12.0)
}

pub fn hz_to_midi(hz: f64) -> f64 {
    69.0 + 12.0 * (hz / 440.0).log2()
}

/// Distance of `freq` from `reference` in cents (1200 per octave).
pub fn cents(freq: f32, reference: f32) -> f32 {
    1200.0 * (freq / reference).log2()
}

/// Frequency `semitones` above (or below) `root_hz`.
pub fn transpose(root_hz: f32, semitones: f32) -> f32 {
    root_hz * 2.0f32.powf(semitones / 12.0)
}

/// Nearest note name, e.g. 261.6 → "C4". Below 20 Hz there is no note.
pub fn note_name(hz: f32) -> String {
    if !(hz >= 20.0) {
        return "---".to_string();
    }
    let midi = hz_to_midi(hz as f64).round() as i32;
    let name = NOTE_NAMES[(((midi % 12) + 12) % 12) as usize];
    let octave = midi.div_euclid(12) - 1;
    format!("{}{}", name, octave)
}

/// Parse "C4", "F#3", "Bb2" into Hz (A4 = 440).
pub fn parse_note_name(name: &str) -> Result<f32, PatternError> {
    let invalid = || PatternError::InvalidNoteName(name.to_string());
    let trimmed = name.trim();
    let mut chars = trimmed.chars();
    let letter = chars.next().ok_or_else(invalid)?.to_ascii_uppercase();
    let base = match letter {
        'C' => 0,
        'D' => 2,
        'E' => 4,
        'F' => 5,
        'G' => 7,
        'A' => 9,
        'B' => 11,
        _ => return Err(invalid()),
    };
    let accidental = match chars.clone().next() {
        Some('#') | Some('♯') => 1,
        Some('b') | Some('♭') => -1,
        _ => 0,
    };
    if accidental != 0 {
        chars.next();
    }
    let octave: i32 = chars.as_str().parse().map_err(|_| invalid())?;
    let midi = (octave + 1) * 12 + base + accidental;
    Ok(midi_to_hz(midi as f64) as f32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_midi_to_hz_roundtrip() {
        assert!((midi_to_hz(69.0) - 440.0).abs() < 0.01);
        assert!((midi_to_hz(60.0) - 261.63).abs() < 0.01);
        assert!((hz_to_midi(440.0) - 69.0).abs() < 0.001);
    }

    #[test]
    fn test_cents_octave_and_semitone() {
        assert!((cents(880.0, 440.0) - 1200.0).abs() < 0.01);
        assert!((cents(277.18, 261.63) - 100.0).abs() < 0.1);
        assert!(cents(261.63, 261.63).abs() < 1e-4);
        assert!(cents(220.0, 440.0) < 0.0);
    }

    #[test]
    fn test_transpose_major_third() {
        assert!((transpose(DEFAULT_ROOT_HZ, 4.0) - 329.63).abs() < 0.05);
        assert!((transpose(DEFAULT_ROOT_HZ, 7.0) - 392.00).abs() < 0.05);
    }

    #[test]
    fn test_note_names() {
        assert_eq!(note_name(440.0), "A4");
        assert_eq!(note_name(261.63), "C4");
        assert_eq!(note_name(65.41), "C2");
        assert_eq!(note_name(10.0), "---");
        assert_eq!(note_name(f32::NAN), "---");
    }

    #[test]
    fn test_parse_note_names() {
        assert!((parse_note_name("C4").unwrap() - 261.63).abs() < 0.01);
        assert!((parse_note_name("A4").unwrap() - 440.0).abs() < 0.01);
        assert!((parse_note_name("F#3").unwrap() - 185.0).abs() < 0.01);
        assert!((parse_note_name("Bb2").unwrap() - 116.54).abs() < 0.01);
        assert!((parse_note_name("c5").unwrap() - 523.25).abs() < 0.01);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_note_name("").is_err());
        assert!(parse_note_name("H4").is_err());
        assert!(parse_note_name("C").is_err());
        assert!(parse_note_name("C#x").is_err());
    }
}
