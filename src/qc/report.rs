//! Quality-control report and policy types embedded in the manifest.

use std::collections::BTreeMap;

/// Thresholds for content checks.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentThresholds {
    /// Luma below which a pixel counts as "low".
    pub low_luma: f64,
    /// Luma above which a pixel counts as "high".
    pub high_luma: f64,
    /// Mean luma below this flags a near-black frame...
    pub near_black_mean_luma: f64,
    /// ...when the low-luma fraction also exceeds this.
    pub near_black_low_fraction: f64,
    /// Allowed mean-luma range per labeled sample.
    pub mean_luma_bounds: [f64; 2],
    /// Maximum allowed per-channel delta from the mean.
    pub max_channel_delta: f64,
    /// Maximum allowed low/high-luma fraction per sample.
    pub max_extreme_fraction: f64,
    /// Minimum mean-absolute-difference across sampled luma signatures.
    pub min_temporal_variety: f64,
}

impl Default for ContentThresholds {
    fn default() -> Self {
        Self {
            low_luma: 0.05,
            high_luma: 0.95,
            near_black_mean_luma: 0.05,
            near_black_low_fraction: 0.90,
            mean_luma_bounds: [0.02, 0.98],
            max_channel_delta: 0.8,
            max_extreme_fraction: 0.995,
            min_temporal_variety: 0.01,
        }
    }
}

/// Which checks abort a publish versus being recorded only.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QcPolicy {
    /// Enforce container facts (fps, duration, resolution, sample count).
    pub enforce_container: bool,
    /// Enforce content statistics.
    pub enforce_content: bool,
    /// Enforce color metadata tags.
    pub enforce_metadata: bool,
    /// Enforce sidecar presence/decodability.
    pub enforce_sidecars: bool,
    /// Enforce the audio silence check.
    pub enforce_audio: bool,
    /// Content thresholds.
    pub content: ContentThresholds,
    /// Audio peak below this counts as silence.
    pub silence_peak: f64,
}

impl Default for QcPolicy {
    fn default() -> Self {
        Self {
            enforce_container: true,
            enforce_content: true,
            enforce_metadata: true,
            enforce_sidecars: true,
            enforce_audio: true,
            content: ContentThresholds::default(),
            silence_peak: 0.001,
        }
    }
}

/// Container-level facts and verdict.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QcContainerReport {
    /// Nominal frame rate found in the container.
    pub nominal_fps: f64,
    /// Container duration in seconds.
    pub duration_secs: f64,
    /// Video track width.
    pub width: u32,
    /// Video track height.
    pub height: u32,
    /// Frames found in the video track.
    pub sample_count: u64,
    /// Frames the export should have produced.
    pub expected_samples: u64,
    /// Failures, empty when the container passed.
    pub failures: Vec<String>,
}

impl QcContainerReport {
    /// Whether every container check passed.
    pub fn passed(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Measured statistics for one sampled frame.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentSample {
    /// Sample label (usually the sampled time).
    pub label: String,
    /// Sample time in seconds.
    pub time_secs: f64,
    /// Mean RGB in display-referred `[0,1]`.
    pub mean_rgb: [f64; 3],
    /// Mean Rec.709 luma.
    pub mean_luma: f64,
    /// Largest per-channel delta from the mean.
    pub channel_delta: f64,
    /// Fraction of pixels under the low-luma threshold.
    pub low_luma_fraction: f64,
    /// Fraction of pixels over the high-luma threshold.
    pub high_luma_fraction: f64,
    /// Peak bin of the 256-bin luma histogram.
    pub histogram_peak_bin: u32,
    /// Near-black verdict: mean luma and low-luma fraction both past their
    /// thresholds.
    pub near_black: bool,
}

/// Content verdict across all sampled frames.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QcContentReport {
    /// Per-sample measurements.
    pub samples: Vec<ContentSample>,
    /// Mean absolute difference of downsampled luma signatures across
    /// consecutive samples.
    pub temporal_variety_mad: f64,
    /// Failures, empty when content passed.
    pub failures: Vec<String>,
}

impl QcContentReport {
    /// Whether every content check passed.
    pub fn passed(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Container color-tag verdict.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QcMetadataReport {
    /// Primaries tag found.
    pub primaries: String,
    /// Transfer tag found.
    pub transfer: String,
    /// Matrix tag found.
    pub matrix: String,
    /// Failures, empty when the tags are Rec.709 SDR.
    pub failures: Vec<String>,
}

impl QcMetadataReport {
    /// Whether the tags are as expected.
    pub fn passed(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Per-sidecar verdict.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SidecarCheck {
    /// Sidecar file name.
    pub name: String,
    /// File exists.
    pub present: bool,
    /// File is non-empty.
    pub non_empty: bool,
    /// File decodes in its declared format.
    pub decodable: bool,
}

/// Sidecar verdict across the bundle.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QcSidecarReport {
    /// Per-file checks.
    pub checks: Vec<SidecarCheck>,
    /// Failures, empty when all requested sidecars are sound.
    pub failures: Vec<String>,
}

impl QcSidecarReport {
    /// Whether every sidecar check passed.
    pub fn passed(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Audio measurements and verdict.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QcAudioReport {
    /// Peak magnitude over the analyzed window.
    pub peak: f64,
    /// RMS over the analyzed window.
    pub rms: f64,
    /// Analyzed window length in seconds.
    pub window_secs: f64,
    /// Failures, empty when audio passed.
    pub failures: Vec<String>,
}

impl QcAudioReport {
    /// Whether the audio checks passed.
    pub fn passed(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Top-level QC verdict embedded in the manifest.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QcReport {
    /// Container verdict.
    pub container: QcContainerReport,
    /// Audio verdict, absent when no track was emitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio: Option<QcAudioReport>,
    /// Whether every enforced check passed.
    pub passed: bool,
}

/// Collect failure measurements into the structured error payload.
pub(crate) fn measurements(pairs: &[(&str, f64)]) -> BTreeMap<String, f64> {
    pairs.iter().map(|(k, v)| ((*k).to_owned(), *v)).collect()
}
