//! Shared DSP primitives: RMS, YIN fundamental estimation, and test signal generators.

/// Absolute threshold on the cumulative-mean-normalized difference. The first
/// dip below this is taken as the period.
const YIN_THRESHOLD: f32 = 0.1;

/// Root mean square of an audio buffer.
pub fn compute_rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f32 = samples.iter().map(|s| s * s).sum();
    (sum / samples.len() as f32).sqrt()
}

/// YIN pitch estimate over `signal`, or None for silence, noise, or a
/// fundamental outside `[min_hz, max_hz]`.
///
/// The lag search is limited to the periods allowed by the frequency range,
/// and to half the frame so every lag sees a full integration window.
pub fn detect_pitch_yin(
    signal: &[f32],
    sample_rate: u32,
    amplitude_threshold: f32,
    min_hz: f32,
    max_hz: f32,
) -> Option<f32> {
    let half = signal.len() / 2;
    if half < 4 || sample_rate == 0 || min_hz <= 0.0 || max_hz <= min_hz {
        return None;
    }

    // Noise gate
    if compute_rms(signal) < amplitude_threshold {
        return None;
    }

    let sr = sample_rate as f32;
    let tau_min = ((sr / max_hz).floor() as usize).max(2);
    let tau_max = ((sr / min_hz).ceil() as usize).min(half - 1);
    if tau_min + 1 >= tau_max {
        return None;
    }

    // Difference function
    let mut diff = vec![0.0f32; tau_max + 2];
    for (tau, d) in diff.iter_mut().enumerate().skip(1) {
        let mut acc = 0.0;
        for i in 0..half {
            let delta = signal[i] - signal[i + tau];
            acc += delta * delta;
        }
        *d = acc;
    }

    // Cumulative mean normalized difference
    let mut cmnd = vec![1.0f32; diff.len()];
    let mut running_sum = 0.0;
    for tau in 1..diff.len() {
        running_sum += diff[tau];
        cmnd[tau] = if running_sum > 0.0 {
            diff[tau] * tau as f32 / running_sum
        } else {
            1.0
        };
    }

    // First dip under the threshold, then slide down to its local minimum
    let mut tau = tau_min;
    let period = loop {
        if tau > tau_max {
            return None;
        }
        if cmnd[tau] < YIN_THRESHOLD {
            while tau < tau_max && cmnd[tau + 1] < cmnd[tau] {
                tau += 1;
            }
            break tau;
        }
        tau += 1;
    };

    // Parabolic interpolation around the minimum
    let y1 = cmnd[period - 1];
    let y2 = cmnd[period];
    let y3 = cmnd[period + 1];
    let denom = y1 - 2.0 * y2 + y3;
    let refined = if denom.abs() > f32::EPSILON {
        period as f32 + (y1 - y3) / (2.0 * denom)
    } else {
        period as f32
    };

    let frequency = sr / refined;
    if frequency.is_finite() && frequency >= min_hz && frequency <= max_hz {
        Some(frequency)
    } else {
        None
    }
}

/// Test signal generators for unit tests.
#[cfg(test)]
pub mod test_helpers {
    use std::f64::consts::PI;

    /// Generate a mono sine wave.
    pub fn sine_wave(freq_hz: f64, amp: f64, sr: u32, ms: u32) -> Vec<f32> {
        let n = (sr as u64 * ms as u64 / 1000) as usize;
        (0..n)
            .map(|i| (amp * (2.0 * PI * freq_hz * i as f64 / sr as f64).sin()) as f32)
            .collect()
    }

    /// Deterministic white-ish noise (LCG), so tests don't need an RNG crate.
    pub fn noise(amp: f32, n: usize) -> Vec<f32> {
        let mut state: u32 = 0x1234_5678;
        (0..n)
            .map(|_| {
                state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
                amp * ((state >> 8) as f32 / (1u32 << 24) as f32 * 2.0 - 1.0)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::test_helpers::{noise, sine_wave};
    use super::*;

    fn detect(samples: &[f32], sr: u32) -> Option<f32> {
        detect_pitch_yin(&samples[..2048], sr, 0.01, 50.0, 2000.0)
    }

    #[test]
    fn test_rms() {
        assert_eq!(compute_rms(&[]), 0.0);
        let s = sine_wave(440.0, 1.0, 48000, 100);
        assert!((compute_rms(&s) - std::f32::consts::FRAC_1_SQRT_2).abs() < 0.01);
    }

    #[test]
    fn test_yin_detects_vocal_range() {
        for hz in [110.0, 261.63, 440.0, 880.0] {
            let s = sine_wave(hz, 0.5, 44100, 100);
            let f = detect(&s, 44100).unwrap_or_else(|| panic!("no pitch for {hz}"));
            let err_cents = 1200.0 * (f as f64 / hz).log2();
            assert!(err_cents.abs() < 5.0, "{hz} Hz detected as {f}");
        }
    }

    #[test]
    fn test_yin_silence_is_none() {
        let s = vec![0.0f32; 2048];
        assert_eq!(detect(&s, 44100), None);
    }

    #[test]
    fn test_yin_noise_is_none() {
        let s = noise(0.5, 2048);
        assert_eq!(detect(&s, 44100), None);
    }

    #[test]
    fn test_yin_rejects_out_of_range() {
        // 40 Hz is below the 50 Hz floor
        let s = sine_wave(40.0, 0.5, 44100, 100);
        assert_eq!(detect(&s, 44100), None);
    }

    #[test]
    fn test_yin_short_frame_is_none() {
        assert_eq!(detect_pitch_yin(&[0.1, 0.2, 0.3], 44100, 0.0, 50.0, 2000.0), None);
    }
}
