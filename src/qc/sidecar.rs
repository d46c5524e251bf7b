//! Sidecar QC: every requested sidecar must be present, non-empty, and
//! decodable in its declared format.

use crate::foundation::fs::FileSystemAdapter;
use crate::qc::report::{QcSidecarReport, SidecarCheck};
use crate::sidecar::captions;
use std::path::Path;

/// Kinds of sidecar files a bundle can carry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SidecarKind {
    /// WebVTT captions.
    CaptionsVtt,
    /// SubRip captions.
    CaptionsSrt,
    /// Word-level transcript JSON.
    TranscriptWordsJson,
    /// Single-frame JPEG thumbnail.
    ThumbnailJpeg,
    /// Grid contact sheet JPEG.
    ContactSheetJpeg,
}

impl SidecarKind {
    /// Bundle-relative file name for this kind.
    pub fn file_name(self) -> &'static str {
        match self {
            SidecarKind::CaptionsVtt => "captions.vtt",
            SidecarKind::CaptionsSrt => "captions.srt",
            SidecarKind::TranscriptWordsJson => "transcript_words.json",
            SidecarKind::ThumbnailJpeg => "thumbnail.jpg",
            SidecarKind::ContactSheetJpeg => "contact_sheet.jpg",
        }
    }
}

/// Check the requested sidecars inside `bundle_dir`.
pub fn check_sidecars(
    fs: &dyn FileSystemAdapter,
    bundle_dir: &Path,
    kinds: &[SidecarKind],
) -> QcSidecarReport {
    let mut checks = Vec::new();
    let mut failures = Vec::new();

    for kind in kinds {
        let name = kind.file_name();
        let path = bundle_dir.join(name);
        let present = fs.exists(&path);
        let bytes = if present { fs.read(&path).ok() } else { None };
        let non_empty = bytes.as_ref().is_some_and(|b| !b.is_empty());
        let decodable = bytes
            .as_ref()
            .is_some_and(|b| decodes(*kind, b));

        if !present {
            failures.push(format!("sidecar '{name}' is missing"));
        } else if !non_empty {
            failures.push(format!("sidecar '{name}' is empty"));
        } else if !decodable {
            failures.push(format!("sidecar '{name}' does not decode"));
        }

        checks.push(SidecarCheck {
            name: name.to_owned(),
            present,
            non_empty,
            decodable,
        });
    }

    QcSidecarReport { checks, failures }
}

fn decodes(kind: SidecarKind, bytes: &[u8]) -> bool {
    match kind {
        SidecarKind::CaptionsVtt => std::str::from_utf8(bytes)
            .is_ok_and(|s| captions::parse_vtt(s).is_ok_and(|c| !c.is_empty())),
        SidecarKind::CaptionsSrt => std::str::from_utf8(bytes)
            .is_ok_and(|s| captions::parse_srt(s).is_ok_and(|c| !c.is_empty())),
        SidecarKind::TranscriptWordsJson => {
            serde_json::from_slice::<crate::sidecar::transcript::Transcript>(bytes).is_ok()
        }
        SidecarKind::ThumbnailJpeg | SidecarKind::ContactSheetJpeg => {
            bytes.starts_with(&[0xff, 0xd8, 0xff])
        }
    }
}
