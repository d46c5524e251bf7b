//! Audio QC: peak and RMS over a configured window, plus the silence gate.

use crate::audio::mix::AudioPolicy;
use crate::qc::report::QcAudioReport;

/// Measure peak magnitude and RMS over the first `window_secs` of `samples`
/// (stereo interleaved at `sample_rate`), then apply the silence policy.
pub fn check_audio(
    samples: &[f32],
    sample_rate: u32,
    window_secs: f64,
    policy: AudioPolicy,
    silence_peak: f64,
) -> QcAudioReport {
    let window_len = ((window_secs * sample_rate as f64) as usize * 2).min(samples.len());
    let window = &samples[..window_len];

    let mut peak = 0.0f64;
    let mut acc = 0.0f64;
    for s in window {
        let v = *s as f64;
        peak = peak.max(v.abs());
        acc += v * v;
    }
    let rms = if window.is_empty() {
        0.0
    } else {
        (acc / window.len() as f64).sqrt()
    };

    let mut failures = Vec::new();
    if policy == AudioPolicy::Required && peak < silence_peak {
        failures.push(format!(
            "audio is required but peak {peak:.6} is below the silence floor {silence_peak}"
        ));
    }

    QcAudioReport {
        peak,
        rms,
        window_secs,
        failures,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tone(secs: f64, rate: u32, amp: f32) -> Vec<f32> {
        let frames = (secs * rate as f64) as usize;
        (0..frames)
            .flat_map(|i| {
                let v = (std::f64::consts::TAU * 1000.0 * i as f64 / rate as f64).sin() as f32 * amp;
                [v, v]
            })
            .collect()
    }

    #[test]
    fn tone_measures_expected_peak_and_rms() {
        let report = check_audio(&tone(1.0, 48_000, 0.5), 48_000, 0.5, AudioPolicy::Required, 0.001);
        assert!(report.passed(), "{:?}", report.failures);
        assert!((report.peak - 0.5).abs() < 0.01);
        // Sine RMS is amp / sqrt(2).
        assert!((report.rms - 0.3535).abs() < 0.01);
    }

    #[test]
    fn required_silence_fails() {
        let silent = vec![0.0f32; 96_000];
        let report = check_audio(&silent, 48_000, 0.5, AudioPolicy::Required, 0.001);
        assert!(!report.passed());
        assert!(report.failures[0].contains("silence floor"));
    }

    #[test]
    fn auto_silence_passes() {
        let silent = vec![0.0f32; 96_000];
        let report = check_audio(&silent, 48_000, 0.5, AudioPolicy::Auto, 0.001);
        assert!(report.passed());
        assert_eq!(report.peak, 0.0);
    }
}
