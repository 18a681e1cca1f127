//! Guide-tone synthesis: renders a timed target sequence to mono samples.

use crate::types::TargetNote;
use std::f64::consts::PI;

const TONE_AMPLITUDE: f64 = 0.5;
const SUSTAIN_LEVEL: f64 = 0.8;
/// Output peak after normalization.
const PEAK: f32 = 0.9;

/// Attack/decay/sustain/release envelope split 5 / 10 / 70 / 15 % of the note.
pub fn adsr_envelope(n: usize) -> Vec<f64> {
    let attack = n * 5 / 100;
    let decay = n * 10 / 100;
    let release = n * 15 / 100;
    let sustain = n - attack - decay - release;

    let ramp = |len: usize, from: f64, to: f64| -> Vec<f64> {
        (0..len)
            .map(|i| from + (to - from) * i as f64 / len.max(1) as f64)
            .collect()
    };

    let mut env = Vec::with_capacity(n);
    env.extend(ramp(attack, 0.0, 1.0));
    env.extend(ramp(decay, 1.0, SUSTAIN_LEVEL));
    env.extend(std::iter::repeat(SUSTAIN_LEVEL).take(sustain));
    env.extend(ramp(release, SUSTAIN_LEVEL, 0.0));
    env
}

/// One enveloped sine tone.
pub fn tone(freq_hz: f64, duration_secs: f64, sample_rate: u32) -> Vec<f32> {
    let n = (duration_secs.max(0.0) * sample_rate as f64) as usize;
    let env = adsr_envelope(n);
    env.iter()
        .enumerate()
        .map(|(i, e)| {
            let t = i as f64 / sample_rate as f64;
            (TONE_AMPLITUDE * e * (2.0 * PI * freq_hz * t).sin()) as f32
        })
        .collect()
}

/// Render `notes` at their start times; silence elsewhere.
pub fn render_notes(notes: &[TargetNote], sample_rate: u32) -> Vec<f32> {
    render_notes_detuned(notes, sample_rate, 0.0)
}

/// Same as [`render_notes`] with every note shifted by `detune_cents`.
pub fn render_notes_detuned(notes: &[TargetNote], sample_rate: u32, detune_cents: f64) -> Vec<f32> {
    let end = notes.iter().map(TargetNote::end_time).fold(0.0, f64::max);
    let mut out = vec![0.0f32; (end * sample_rate as f64).ceil() as usize];
    let ratio = 2.0f64.powf(detune_cents / 1200.0);

    for note in notes {
        let start = (note.start_time.max(0.0) * sample_rate as f64) as usize;
        let samples = tone(note.frequency as f64 * ratio, note.duration, sample_rate);
        for (i, s) in samples.into_iter().enumerate() {
            if let Some(slot) = out.get_mut(start + i) {
                *slot += s;
            }
        }
    }

    normalize(&mut out);
    out
}

fn normalize(samples: &mut [f32]) {
    let peak = samples.iter().fold(0.0f32, |m, s| m.max(s.abs()));
    if peak > 0.0 {
        let gain = PEAK / peak;
        for s in samples.iter_mut() {
            *s *= gain;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::detect_pitch_yin;
    use crate::pattern::expand_intervals;

    #[test]
    fn test_envelope_shape() {
        let env = adsr_envelope(1000);
        assert_eq!(env.len(), 1000);
        assert_eq!(env[0], 0.0);
        assert!((env[50] - 1.0).abs() < 1e-9);
        assert!((env[500] - SUSTAIN_LEVEL).abs() < 1e-9);
        assert!(env[999] < 0.01);
    }

    #[test]
    fn test_render_length_and_peak() {
        let notes = expand_intervals(261.63, &[0, 4, 7], 0.8, 0.05);
        let audio = render_notes(&notes, 8000);
        let expected = (notes[2].end_time() * 8000.0).ceil() as usize;
        assert_eq!(audio.len(), expected);
        let peak = audio.iter().fold(0.0f32, |m, s| m.max(s.abs()));
        assert!((peak - PEAK).abs() < 1e-4);
        // The gap between the first two notes is silent
        let gap_index = (0.82 * 8000.0) as usize;
        assert_eq!(audio[gap_index], 0.0);
    }

    #[test]
    fn test_rendered_pitch_is_detectable() {
        let notes = expand_intervals(440.0, &[0], 0.5, 0.0);
        let audio = render_notes_detuned(&notes, 44100, 0.0);
        let mid = &audio[8000..8000 + 2048];
        let f = detect_pitch_yin(mid, 44100, 0.01, 50.0, 2000.0).unwrap();
        assert!((f - 440.0).abs() < 3.0, "f={f}");
    }

    #[test]
    fn test_empty_pattern_renders_nothing() {
        assert!(render_notes(&[], 44100).is_empty());
    }
}
