//! Container QC: nominal frame rate, duration, resolution, sample count, and
//! color metadata tags.

use crate::foundation::core::Fps;
use crate::foundation::error::{MetavisError, MvResult};
use crate::qc::report::{QcContainerReport, QcMetadataReport};
use std::path::Path;
use std::process::Command;

/// Facts probed from a finished container.
#[derive(Clone, Debug)]
pub struct ContainerFacts {
    /// Nominal (average) frame rate.
    pub nominal_fps: f64,
    /// Duration in seconds.
    pub duration_secs: f64,
    /// Video width.
    pub width: u32,
    /// Video height.
    pub height: u32,
    /// Frames in the video track.
    pub sample_count: u64,
    /// Color primaries tag, if present.
    pub color_primaries: Option<String>,
    /// Color transfer tag, if present.
    pub color_transfer: Option<String>,
    /// Color matrix tag, if present.
    pub color_space: Option<String>,
}

/// Expectations the container is checked against.
#[derive(Clone, Copy, Debug)]
pub struct ContainerExpectations {
    /// Export frame rate.
    pub fps: Fps,
    /// Export duration in seconds.
    pub duration_secs: f64,
    /// Allowed duration deviation in seconds.
    pub duration_tolerance_secs: f64,
    /// Export width.
    pub width: u32,
    /// Export height.
    pub height: u32,
    /// Frames the export produced.
    pub expected_samples: u64,
}

/// Minimum fraction of expected frames the track must contain.
pub const MIN_SAMPLE_FRACTION: f64 = 0.8;

/// Probe container facts via `ffprobe`.
pub fn probe_container(path: &Path) -> MvResult<ContainerFacts> {
    #[derive(serde::Deserialize)]
    struct Stream {
        codec_type: Option<String>,
        width: Option<u32>,
        height: Option<u32>,
        avg_frame_rate: Option<String>,
        nb_frames: Option<String>,
        color_primaries: Option<String>,
        color_transfer: Option<String>,
        color_space: Option<String>,
    }
    #[derive(serde::Deserialize)]
    struct Format {
        duration: Option<String>,
    }
    #[derive(serde::Deserialize)]
    struct Out {
        #[serde(default)]
        streams: Vec<Stream>,
        format: Option<Format>,
    }

    let out = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-print_format",
            "json",
            "-show_streams",
            "-show_format",
        ])
        .arg(path)
        .output()
        .map_err(|e| MetavisError::io(format!("failed to run ffprobe: {e}")))?;
    if !out.status.success() {
        return Err(MetavisError::io(format!(
            "ffprobe failed for '{}': {}",
            path.display(),
            String::from_utf8_lossy(&out.stderr).trim()
        )));
    }
    let parsed: Out = serde_json::from_slice(&out.stdout)
        .map_err(|e| MetavisError::io(format!("ffprobe json parse failed: {e}")))?;

    let video = parsed
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .ok_or_else(|| MetavisError::io("finished container has no video stream"))?;

    let nominal_fps = video
        .avg_frame_rate
        .as_deref()
        .map(parse_rate)
        .unwrap_or(0.0);
    let duration_secs = parsed
        .format
        .and_then(|f| f.duration)
        .and_then(|d| d.parse::<f64>().ok())
        .unwrap_or(0.0);
    let sample_count = match video.nb_frames.as_deref().and_then(|n| n.parse::<u64>().ok()) {
        Some(n) => n,
        // Some muxers omit nb_frames; estimate from duration.
        None => (duration_secs * nominal_fps).round() as u64,
    };

    Ok(ContainerFacts {
        nominal_fps,
        duration_secs,
        width: video.width.unwrap_or(0),
        height: video.height.unwrap_or(0),
        sample_count,
        color_primaries: video.color_primaries.clone(),
        color_transfer: video.color_transfer.clone(),
        color_space: video.color_space.clone(),
    })
}

fn parse_rate(rate: &str) -> f64 {
    match rate.split_once('/') {
        Some((n, d)) => {
            let n: f64 = n.parse().unwrap_or(0.0);
            let d: f64 = d.parse().unwrap_or(0.0);
            if d > 0.0 { n / d } else { 0.0 }
        }
        None => rate.parse().unwrap_or(0.0),
    }
}

/// Check probed facts against expectations.
pub fn check_container(facts: &ContainerFacts, expect: &ContainerExpectations) -> QcContainerReport {
    let mut failures = Vec::new();

    let want_fps = expect.fps.as_f64();
    if (facts.nominal_fps - want_fps).abs() > 0.05 {
        failures.push(format!(
            "nominal fps {:.3} differs from requested {:.3}",
            facts.nominal_fps, want_fps
        ));
    }
    if (facts.duration_secs - expect.duration_secs).abs() > expect.duration_tolerance_secs {
        failures.push(format!(
            "duration {:.3}s outside {:.3}s +/- {:.3}s",
            facts.duration_secs, expect.duration_secs, expect.duration_tolerance_secs
        ));
    }
    if facts.width != expect.width || facts.height != expect.height {
        failures.push(format!(
            "track resolution {}x{} differs from requested {}x{}",
            facts.width, facts.height, expect.width, expect.height
        ));
    }
    let min_samples = (expect.expected_samples as f64 * MIN_SAMPLE_FRACTION).floor() as u64;
    if facts.sample_count < min_samples {
        failures.push(format!(
            "sample count {} below minimum {} (0.8 x {})",
            facts.sample_count, min_samples, expect.expected_samples
        ));
    }

    QcContainerReport {
        nominal_fps: facts.nominal_fps,
        duration_secs: facts.duration_secs,
        width: facts.width,
        height: facts.height,
        sample_count: facts.sample_count,
        expected_samples: expect.expected_samples,
        failures,
    }
}

/// Check color metadata tags for Rec.709 SDR.
pub fn check_metadata(facts: &ContainerFacts) -> QcMetadataReport {
    let mut failures = Vec::new();
    let primaries = facts.color_primaries.clone().unwrap_or_default();
    let transfer = facts.color_transfer.clone().unwrap_or_default();
    let matrix = facts.color_space.clone().unwrap_or_default();
    if primaries != "bt709" {
        failures.push(format!("color primaries '{primaries}' is not bt709"));
    }
    if transfer != "bt709" {
        failures.push(format!("color transfer '{transfer}' is not bt709"));
    }
    if matrix != "bt709" {
        failures.push(format!("color matrix '{matrix}' is not bt709"));
    }
    QcMetadataReport {
        primaries,
        transfer,
        matrix,
        failures,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn facts() -> ContainerFacts {
        ContainerFacts {
            nominal_fps: 24.0,
            duration_secs: 13.0,
            width: 3840,
            height: 2160,
            sample_count: 312,
            color_primaries: Some("bt709".into()),
            color_transfer: Some("bt709".into()),
            color_space: Some("bt709".into()),
        }
    }

    fn expectations() -> ContainerExpectations {
        ContainerExpectations {
            fps: Fps::FILM,
            duration_secs: 13.0,
            duration_tolerance_secs: 0.5,
            width: 3840,
            height: 2160,
            expected_samples: 312,
        }
    }

    #[test]
    fn matching_container_passes() {
        let report = check_container(&facts(), &expectations());
        assert!(report.passed(), "{:?}", report.failures);
    }

    #[test]
    fn short_sample_count_fails() {
        let mut f = facts();
        f.sample_count = 200; // < 0.8 * 312 = 249
        let report = check_container(&f, &expectations());
        assert!(!report.passed());
        assert!(report.failures[0].contains("sample count"));
    }

    #[test]
    fn duration_outside_tolerance_fails() {
        let mut f = facts();
        f.duration_secs = 14.0;
        let report = check_container(&f, &expectations());
        assert!(report.failures.iter().any(|x| x.contains("duration")));
    }

    #[test]
    fn wrong_resolution_fails() {
        let mut f = facts();
        f.height = 1080;
        let report = check_container(&f, &expectations());
        assert!(report.failures.iter().any(|x| x.contains("resolution")));
    }

    #[test]
    fn rec709_tags_pass_metadata() {
        let report = check_metadata(&facts());
        assert!(report.passed(), "{:?}", report.failures);
    }

    #[test]
    fn missing_tags_fail_metadata() {
        let mut f = facts();
        f.color_transfer = None;
        let report = check_metadata(&f);
        assert!(!report.passed());
        assert!(report.failures[0].contains("transfer"));
    }
}
