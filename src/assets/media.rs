//! File-backed media adapters.
//!
//! Decoding shells out to the system `ffprobe`/`ffmpeg`, which keeps the
//! decoder surface identical across platforms. Missing tools surface as typed
//! asset errors; there is no silent fallback.

use crate::foundation::core::{TICKS_PER_SECOND, Tick};
use crate::foundation::error::{MetavisError, MvResult};
use crate::foundation::math::{mean, std_dev};
use std::path::{Path, PathBuf};
use std::process::Command;

/// Internal audio mixing sample rate used across decode/mix/encode.
pub const MIX_SAMPLE_RATE: u32 = 48_000;

/// Number of presentation-timestamp deltas sampled for VFR analysis.
const VFR_SAMPLE_DELTAS: usize = 64;

/// Deltas closer than this are treated as the same value when counting
/// distinct frame periods (0.1 ms grid).
const VFR_DISTINCT_GRID_SECS: f64 = 0.000_1;

/// Basic metadata about a source video file.
#[derive(Clone, Debug)]
pub struct VideoSourceInfo {
    /// Absolute source path used for probing/decoding.
    pub source_path: PathBuf,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Average frame rate reported by the container.
    pub avg_fps: f64,
    /// Whether the container carries at least one audio stream.
    pub has_audio: bool,
    /// Variable-frame-rate analysis of the sampled timestamps.
    pub timing: TimingAnalysis,
}

/// VFR-likeliness statistics over sampled PTS deltas.
#[derive(Clone, Copy, Debug, Default, serde::Serialize, serde::Deserialize)]
pub struct TimingAnalysis {
    /// Number of deltas sampled.
    pub sampled: usize,
    /// Mean frame period in seconds.
    pub mean_delta_secs: f64,
    /// Standard deviation of the frame period in seconds.
    pub std_dev_secs: f64,
    /// Distinct frame periods observed (0.1 ms grid).
    pub distinct_delta_count: usize,
}

impl TimingAnalysis {
    /// VFR-likely when three or more distinct periods show up, or the period
    /// jitter exceeds 2 ms.
    pub fn is_vfr_likely(&self) -> bool {
        self.distinct_delta_count >= 3 || self.std_dev_secs > 0.002
    }

    /// Seek tolerance for nearest-frame mapping: `min(1/fps, 2 ms)`.
    pub fn seek_epsilon_secs(&self) -> f64 {
        if self.mean_delta_secs > 0.0 {
            self.mean_delta_secs.min(0.002)
        } else {
            0.002
        }
    }

    /// Compute the analysis from raw presentation timestamps (seconds).
    pub fn from_pts(pts_secs: &[f64]) -> TimingAnalysis {
        let deltas: Vec<f64> = pts_secs
            .windows(2)
            .take(VFR_SAMPLE_DELTAS)
            .map(|w| w[1] - w[0])
            .filter(|d| *d > 0.0)
            .collect();
        let mut grid: Vec<i64> = deltas
            .iter()
            .map(|d| (d / VFR_DISTINCT_GRID_SECS).round() as i64)
            .collect();
        grid.sort_unstable();
        grid.dedup();
        TimingAnalysis {
            sampled: deltas.len(),
            mean_delta_secs: mean(&deltas),
            std_dev_secs: std_dev(&deltas),
            distinct_delta_count: grid.len(),
        }
    }
}

fn run_tool(tool: &str, cmd: &mut Command) -> MvResult<Vec<u8>> {
    let out = cmd.output().map_err(|e| {
        MetavisError::asset(format!("failed to run {tool} (is it on PATH?): {e}"))
    })?;
    if !out.status.success() {
        return Err(MetavisError::asset(format!(
            "{tool} failed: {}",
            String::from_utf8_lossy(&out.stderr).trim()
        )));
    }
    Ok(out.stdout)
}

#[derive(serde::Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    avg_frame_rate: Option<String>,
}

#[derive(serde::Deserialize)]
struct ProbeOut {
    #[serde(default)]
    streams: Vec<ProbeStream>,
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

/// Probe source video metadata and sample timestamps for VFR analysis.
pub fn probe_video(source_path: &Path) -> MvResult<VideoSourceInfo> {
    let stdout = run_tool(
        "ffprobe",
        Command::new("ffprobe")
            .args([
                "-v",
                "error",
                "-print_format",
                "json",
                "-show_streams",
            ])
            .arg(source_path),
    )?;

    let parsed: ProbeOut = serde_json::from_slice(&stdout)
        .map_err(|e| MetavisError::asset(format!("ffprobe json parse failed: {e}")))?;
    let video = parsed
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .ok_or_else(|| {
            MetavisError::asset(format!("no video stream in '{}'", source_path.display()))
        })?;
    let width = video
        .width
        .ok_or_else(|| MetavisError::asset("missing video width from ffprobe"))?;
    let height = video
        .height
        .ok_or_else(|| MetavisError::asset("missing video height from ffprobe"))?;
    let avg_fps = video.avg_frame_rate.as_deref().map(parse_rate).unwrap_or(0.0);
    let has_audio = parsed
        .streams
        .iter()
        .any(|s| s.codec_type.as_deref() == Some("audio"));

    let timing = TimingAnalysis::from_pts(&sample_pts(source_path)?);

    Ok(VideoSourceInfo {
        source_path: source_path.to_path_buf(),
        width,
        height,
        avg_fps,
        has_audio,
        timing,
    })
}

fn sample_pts(source_path: &Path) -> MvResult<Vec<f64>> {
    #[derive(serde::Deserialize)]
    struct FrameEntry {
        pts_time: Option<String>,
        best_effort_timestamp_time: Option<String>,
    }
    #[derive(serde::Deserialize)]
    struct FramesOut {
        #[serde(default)]
        frames: Vec<FrameEntry>,
    }

    let stdout = run_tool(
        "ffprobe",
        Command::new("ffprobe")
            .args([
                "-v",
                "error",
                "-select_streams",
                "v:0",
                "-show_entries",
                "frame=pts_time,best_effort_timestamp_time",
                "-read_intervals",
                "%+#65",
                "-print_format",
                "json",
            ])
            .arg(source_path),
    )?;

    let parsed: FramesOut = serde_json::from_slice(&stdout)
        .map_err(|e| MetavisError::asset(format!("ffprobe frames parse failed: {e}")))?;
    let mut pts: Vec<f64> = parsed
        .frames
        .iter()
        .filter_map(|f| {
            f.pts_time
                .as_deref()
                .or(f.best_effort_timestamp_time.as_deref())
                .and_then(|s| s.parse::<f64>().ok())
        })
        .collect();
    pts.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    Ok(pts)
}

/// Decode one RGBA8 frame nearest to `source` ticks.
///
/// For VFR-likely sources the request is snapped to the nearest sampled frame
/// boundary within the analysis epsilon so edits land on real frames instead
/// of dropping out at representation boundaries.
pub fn decode_video_frame_rgba8(info: &VideoSourceInfo, source: Tick) -> MvResult<Vec<u8>> {
    let mut t = source.0.max(0) as f64 / TICKS_PER_SECOND as f64;
    if info.timing.is_vfr_likely() && info.timing.mean_delta_secs > 0.0 {
        let period = info.timing.mean_delta_secs;
        let nearest = (t / period).round() * period;
        if (nearest - t).abs() <= info.timing.seek_epsilon_secs() {
            t = nearest.max(0.0);
        }
    }

    let stdout = run_tool(
        "ffmpeg",
        Command::new("ffmpeg")
            .args(["-v", "error", "-ss", &format!("{t:.9}")])
            .arg("-i")
            .arg(&info.source_path)
            .args([
                "-frames:v",
                "1",
                "-f",
                "rawvideo",
                "-pix_fmt",
                "rgba",
                "pipe:1",
            ]),
    )?;

    let expected = info.width as usize * info.height as usize * 4;
    if expected == 0 || stdout.len() < expected {
        return Err(MetavisError::asset(format!(
            "decoded frame has {} bytes, expected {expected} for '{}'",
            stdout.len(),
            info.source_path.display()
        )));
    }
    Ok(stdout[..expected].to_vec())
}

/// Decoded interleaved floating-point PCM.
#[derive(Clone, Debug)]
pub struct AudioPcm {
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Channel count.
    pub channels: u16,
    /// Interleaved `f32` PCM samples.
    pub interleaved_f32: Vec<f32>,
}

impl AudioPcm {
    /// Approximate heap footprint for cache accounting.
    pub fn byte_len(&self) -> usize {
        self.interleaved_f32.len() * 4
    }
}

/// Decode the audio track of `path` to stereo interleaved f32 at `sample_rate`.
///
/// Sources without an audio stream decode to empty PCM rather than erroring.
pub fn decode_audio_f32_stereo(path: &Path, sample_rate: u32) -> MvResult<AudioPcm> {
    let out = Command::new("ffmpeg")
        .args(["-v", "error", "-i"])
        .arg(path)
        .args([
            "-vn",
            "-f",
            "f32le",
            "-acodec",
            "pcm_f32le",
            "-ac",
            "2",
            "-ar",
            &sample_rate.to_string(),
            "pipe:1",
        ])
        .output()
        .map_err(|e| MetavisError::asset(format!("failed to run ffmpeg for audio decode: {e}")))?;

    if !out.status.success() {
        let msg = String::from_utf8_lossy(&out.stderr);
        if msg.contains("matches no streams")
            || msg.contains("Output file #0 does not contain any stream")
        {
            return Ok(AudioPcm {
                sample_rate,
                channels: 2,
                interleaved_f32: Vec::new(),
            });
        }
        return Err(MetavisError::asset(format!(
            "ffmpeg audio decode failed for '{}': {}",
            path.display(),
            msg.trim()
        )));
    }

    if !out.stdout.len().is_multiple_of(4) {
        return Err(MetavisError::asset(
            "decoded audio byte length is not aligned to f32 samples",
        ));
    }
    let pcm = out
        .stdout
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect();
    Ok(AudioPcm {
        sample_rate,
        channels: 2,
        interleaved_f32: pcm,
    })
}

// Decode paths shell out to ffprobe/ffmpeg; they are exercised by ignored
// integration tests that require the tools on PATH. The analysis math is unit
// tested here.
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cfr_timestamps_are_not_vfr_likely() {
        let pts: Vec<f64> = (0..40).map(|i| i as f64 / 24.0).collect();
        let a = TimingAnalysis::from_pts(&pts);
        assert_eq!(a.distinct_delta_count, 1);
        assert!(a.std_dev_secs < 0.000_5);
        assert!(!a.is_vfr_likely());
    }

    #[test]
    fn three_distinct_periods_flag_vfr() {
        let mut pts = vec![0.0f64];
        let periods = [1.0 / 24.0, 1.0 / 30.0, 1.0 / 60.0];
        for i in 0..30 {
            let last = *pts.last().unwrap();
            pts.push(last + periods[i % 3]);
        }
        let a = TimingAnalysis::from_pts(&pts);
        assert!(a.distinct_delta_count >= 3);
        assert!(a.is_vfr_likely());
    }

    #[test]
    fn jittery_periods_flag_vfr_by_stddev() {
        let mut pts = vec![0.0f64];
        for i in 0..30 {
            let jitter = if i % 2 == 0 { 0.005 } else { -0.005 };
            let last = *pts.last().unwrap();
            pts.push(last + 1.0 / 24.0 + jitter);
        }
        let a = TimingAnalysis::from_pts(&pts);
        assert!(a.std_dev_secs > 0.002);
        assert!(a.is_vfr_likely());
    }

    #[test]
    fn seek_epsilon_is_bounded_by_two_ms() {
        let a = TimingAnalysis {
            sampled: 10,
            mean_delta_secs: 1.0 / 24.0,
            std_dev_secs: 0.0,
            distinct_delta_count: 1,
        };
        assert!((a.seek_epsilon_secs() - 0.002).abs() < 1e-9);
        let b = TimingAnalysis {
            mean_delta_secs: 0.001,
            ..a
        };
        assert!((b.seek_epsilon_secs() - 0.001).abs() < 1e-9);
    }

    #[test]
    fn parse_rate_handles_rational_and_plain() {
        assert!((parse_rate("30000/1001") - 29.97).abs() < 0.01);
        assert!((parse_rate("24") - 24.0).abs() < 1e-9);
        assert_eq!(parse_rate("0/0"), 0.0);
    }
}
