//! Content QC: deterministic pixel statistics over sampled frames.
//!
//! Measurement is pure (frames in, numbers out); the orchestrator decides
//! where the frames come from (re-rendered hermetically or decoded from the
//! finished file).

use crate::engine::PixelBuffer;
use crate::qc::report::{ContentSample, ContentThresholds, QcContentReport};

const SIGNATURE_GRID: u32 = 16;

/// Measure one frame's display-referred statistics under `thresholds`.
pub fn measure_frame(
    label: impl Into<String>,
    time_secs: f64,
    frame: &PixelBuffer,
    thresholds: &ContentThresholds,
) -> ContentSample {
    let mut mean = [0.0f64; 3];
    let mut luma_acc = 0.0f64;
    let mut low = 0u64;
    let mut high = 0u64;
    let mut histogram = [0u64; 256];

    let pixels = (frame.width as u64 * frame.height as u64).max(1);
    for px in frame.data.chunks_exact(4) {
        let r = px[0] as f64 / 255.0;
        let g = px[1] as f64 / 255.0;
        let b = px[2] as f64 / 255.0;
        mean[0] += r;
        mean[1] += g;
        mean[2] += b;
        let luma = 0.2126 * r + 0.7152 * g + 0.0722 * b;
        luma_acc += luma;
        if luma < thresholds.low_luma {
            low += 1;
        }
        if luma > thresholds.high_luma {
            high += 1;
        }
        histogram[((luma * 255.0).round() as usize).min(255)] += 1;
    }
    for c in &mut mean {
        *c /= pixels as f64;
    }
    let mean_luma = luma_acc / pixels as f64;
    let channel_delta = mean
        .iter()
        .map(|c| (c - mean_luma).abs())
        .fold(0.0f64, f64::max);
    let histogram_peak_bin = histogram
        .iter()
        .enumerate()
        .max_by_key(|(_, count)| **count)
        .map(|(bin, _)| bin as u32)
        .unwrap_or(0);

    let mut sample = ContentSample {
        label: label.into(),
        time_secs,
        mean_rgb: mean,
        mean_luma,
        channel_delta,
        low_luma_fraction: low as f64 / pixels as f64,
        high_luma_fraction: high as f64 / pixels as f64,
        histogram_peak_bin,
        near_black: false,
    };
    sample.near_black = is_near_black(&sample, thresholds);
    sample
}

/// Downsampled luma signature used by the temporal-variety check.
pub fn luma_signature(frame: &PixelBuffer) -> Vec<f64> {
    let grid = SIGNATURE_GRID;
    let mut sig = Vec::with_capacity((grid * grid) as usize);
    if frame.width == 0 || frame.height == 0 {
        return sig;
    }
    for gy in 0..grid {
        for gx in 0..grid {
            let x0 = gx * frame.width / grid;
            let x1 = ((gx + 1) * frame.width / grid).clamp(x0 + 1, frame.width);
            let y0 = gy * frame.height / grid;
            let y1 = ((gy + 1) * frame.height / grid).clamp(y0 + 1, frame.height);
            let mut acc = 0.0f64;
            for y in y0..y1 {
                for x in x0..x1 {
                    let px = frame.pixel(x, y);
                    acc += (0.2126 * px[0] as f64 + 0.7152 * px[1] as f64 + 0.0722 * px[2] as f64)
                        / 255.0;
                }
            }
            sig.push(acc / ((x1 - x0) as f64 * (y1 - y0) as f64));
        }
    }
    sig
}

/// Mean absolute difference between consecutive signatures.
pub fn temporal_variety_mad(signatures: &[Vec<f64>]) -> f64 {
    if signatures.len() < 2 {
        return 0.0;
    }
    let mut acc = 0.0f64;
    let mut n = 0u64;
    for pair in signatures.windows(2) {
        for (a, b) in pair[0].iter().zip(pair[1].iter()) {
            acc += (a - b).abs();
            n += 1;
        }
    }
    if n == 0 { 0.0 } else { acc / n as f64 }
}

/// Whether a sample reads as near-black under `thresholds`.
pub fn is_near_black(sample: &ContentSample, thresholds: &ContentThresholds) -> bool {
    sample.mean_luma < thresholds.near_black_mean_luma
        && sample.low_luma_fraction > thresholds.near_black_low_fraction
}

/// Apply the color-stats policy across all samples and the variety check.
pub fn check_content(
    samples: Vec<ContentSample>,
    signatures: &[Vec<f64>],
    thresholds: &ContentThresholds,
) -> QcContentReport {
    let mut failures = Vec::new();
    for sample in &samples {
        let [lo, hi] = thresholds.mean_luma_bounds;
        if sample.mean_luma < lo || sample.mean_luma > hi {
            failures.push(format!(
                "sample '{}': mean luma {:.4} outside [{lo}, {hi}]",
                sample.label, sample.mean_luma
            ));
        }
        if sample.near_black {
            failures.push(format!(
                "sample '{}': near-black (mean luma {:.4}, low-luma fraction {:.4})",
                sample.label, sample.mean_luma, sample.low_luma_fraction
            ));
        }
        if sample.channel_delta > thresholds.max_channel_delta {
            failures.push(format!(
                "sample '{}': channel delta {:.4} exceeds {}",
                sample.label, sample.channel_delta, thresholds.max_channel_delta
            ));
        }
        if sample.low_luma_fraction > thresholds.max_extreme_fraction {
            failures.push(format!(
                "sample '{}': low-luma fraction {:.4} exceeds {}",
                sample.label, sample.low_luma_fraction, thresholds.max_extreme_fraction
            ));
        }
        if sample.high_luma_fraction > thresholds.max_extreme_fraction {
            failures.push(format!(
                "sample '{}': high-luma fraction {:.4} exceeds {}",
                sample.label, sample.high_luma_fraction, thresholds.max_extreme_fraction
            ));
        }
    }

    let temporal_variety_mad = temporal_variety_mad(signatures);
    if signatures.len() >= 2 && temporal_variety_mad < thresholds.min_temporal_variety {
        failures.push(format!(
            "temporal variety {:.5} below {}",
            temporal_variety_mad, thresholds.min_temporal_variety
        ));
    }

    QcContentReport {
        samples,
        temporal_variety_mad,
        failures,
    }
}
