//! The versioned deliverable manifest (`deliverable.json`).
//!
//! Schema versions increase monotonically; readers must accept older
//! documents with the optional QC and sidecar fields missing.

use crate::audio::mix::AudioPolicy;
use crate::deliver::QualityProfile;
use crate::deliver::governance::GovernanceRecord;
use crate::encode::sink::Codec;
use crate::foundation::core::Fps;
use crate::foundation::error::{MetavisError, MvResult};
use crate::qc::report::{
    QcContentReport, QcMetadataReport, QcPolicy, QcReport, QcSidecarReport,
};
use crate::qc::sidecar::SidecarKind;
use crate::timeline::model::TimelineSummary;

/// Current manifest schema version.
pub const MANIFEST_SCHEMA_VERSION: u32 = 3;

/// One sidecar entry in the manifest.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SidecarRecord {
    /// Sidecar kind.
    pub kind: SidecarKind,
    /// Bundle-relative file name.
    pub file: String,
    /// Whether the file was produced. Optional sidecars with no source are
    /// recorded with `written: false`.
    pub written: bool,
    /// Whether the publish required this sidecar.
    pub required: bool,
}

/// Record written alongside the movie inside the bundle.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliverableManifest {
    /// Manifest schema version; see [`MANIFEST_SCHEMA_VERSION`].
    pub schema_version: u32,
    /// ISO-8601 creation timestamp.
    pub created_at: String,
    /// Bundle name.
    pub deliverable: String,
    /// Structural timeline facts.
    pub timeline_summary: TimelineSummary,
    /// Quality profile the export used.
    pub quality: QualityProfile,
    /// Export frame rate.
    pub fps: Fps,
    /// Target codec.
    pub codec: Codec,
    /// Audio emission policy.
    pub audio_policy: AudioPolicy,
    /// Governance facts.
    pub governance: GovernanceRecord,
    /// QC enforcement policy.
    pub qc_policy: QcPolicy,
    /// Container + audio QC verdict.
    pub qc_report: QcReport,
    /// Content QC verdict; absent in older schemas.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qc_content_report: Option<QcContentReport>,
    /// Metadata QC verdict; absent in older schemas.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qc_metadata_report: Option<QcMetadataReport>,
    /// Sidecar QC verdict; absent in older schemas.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qc_sidecar_report: Option<QcSidecarReport>,
    /// Sidecar inventory; absent in older schemas.
    #[serde(default)]
    pub sidecars: Vec<SidecarRecord>,
}

impl DeliverableManifest {
    /// Serialize with stable key ordering (struct declaration order).
    pub fn to_json(&self) -> MvResult<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| MetavisError::io(format!("manifest serialization failed: {e}")))
    }

    /// Parse a manifest, accepting older schema versions with missing
    /// optional fields.
    pub fn from_json(json: &str) -> MvResult<Self> {
        let manifest: DeliverableManifest = serde_json::from_str(json)
            .map_err(|e| MetavisError::io(format!("manifest parse failed: {e}")))?;
        if manifest.schema_version > MANIFEST_SCHEMA_VERSION {
            return Err(MetavisError::io(format!(
                "manifest schema {} is newer than supported {}",
                manifest.schema_version, MANIFEST_SCHEMA_VERSION
            )));
        }
        Ok(manifest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::qc::report::QcContainerReport;

    fn manifest() -> DeliverableManifest {
        DeliverableManifest {
            schema_version: MANIFEST_SCHEMA_VERSION,
            created_at: "2026-08-01T12:00:00Z".into(),
            deliverable: "demo".into(),
            timeline_summary: TimelineSummary {
                track_count: 2,
                clip_count: 4,
                duration_ticks: 780_000,
            },
            quality: QualityProfile::preview(),
            fps: Fps::FILM,
            codec: Codec::H264,
            audio_policy: AudioPolicy::Auto,
            governance: GovernanceRecord {
                plan: "studio".into(),
                max_resolution_height: 2160,
                watermarked: false,
            },
            qc_policy: QcPolicy::default(),
            qc_report: QcReport {
                container: QcContainerReport {
                    nominal_fps: 24.0,
                    duration_secs: 13.0,
                    width: 1280,
                    height: 720,
                    sample_count: 312,
                    expected_samples: 312,
                    failures: Vec::new(),
                },
                audio: None,
                passed: true,
            },
            qc_content_report: None,
            qc_metadata_report: None,
            qc_sidecar_report: None,
            sidecars: Vec::new(),
        }
    }

    #[test]
    fn round_trips_through_json() {
        let m = manifest();
        let json = m.to_json().unwrap();
        let back = DeliverableManifest::from_json(&json).unwrap();
        assert_eq!(back.schema_version, MANIFEST_SCHEMA_VERSION);
        assert_eq!(back.deliverable, "demo");
        assert_eq!(back.timeline_summary, m.timeline_summary);
    }

    #[test]
    fn keys_are_camel_case_in_declaration_order() {
        let json = manifest().to_json().unwrap();
        let schema_pos = json.find("schemaVersion").unwrap();
        let created_pos = json.find("createdAt").unwrap();
        let qc_pos = json.find("qcReport").unwrap();
        assert!(schema_pos < created_pos && created_pos < qc_pos);
    }

    #[test]
    fn older_schema_with_missing_optional_fields_parses() {
        let mut m = manifest();
        m.schema_version = 1;
        let mut json = m.to_json().unwrap();
        // Older writers never emitted the sidecar inventory.
        json = json.replace(",\n  \"sidecars\": []", "");
        assert!(!json.contains("sidecars"));
        let back = DeliverableManifest::from_json(&json).unwrap();
        assert_eq!(back.schema_version, 1);
        assert!(back.sidecars.is_empty());
        assert!(back.qc_content_report.is_none());
    }

    #[test]
    fn newer_schema_is_rejected() {
        let mut m = manifest();
        m.schema_version = MANIFEST_SCHEMA_VERSION + 1;
        let json = m.to_json().unwrap();
        assert!(DeliverableManifest::from_json(&json).is_err());
    }
}
