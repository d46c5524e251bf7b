//! Full publish tests against the real container writer.
//!
//! These shell out to `ffmpeg`/`ffprobe` and are ignored by default; run with
//! `cargo test -- --ignored` on a machine with the tools installed.

use metavis::deliver::manifest::DeliverableManifest;
use metavis::qc::report::QcPolicy;
use metavis::qc::sidecar::SidecarKind;
use metavis::{
    AssetReference, AudioPolicy, CancelToken, Clip, ClipId, Codec, DeliverableSpec, Easing, Fps,
    Orchestrator, QualityProfile, SidecarRequest, Tick, Timeline, Track, TrackKind, Transition,
    TransitionKind, UserPlan,
};

fn demo_timeline() -> Timeline {
    let mut bars = Clip {
        id: ClipId(1),
        name: "bars".into(),
        asset: AssetReference::ligm("bars", "video/smpte_bars"),
        start: Tick::ZERO,
        duration: Tick::from_secs(3),
        offset: Tick::ZERO,
        transition_in: None,
        transition_out: None,
        effects: Vec::new(),
    };
    bars.transition_out = Some(Transition {
        kind: TransitionKind::Crossfade,
        duration: Tick::from_millis(500),
        easing: Easing::Linear,
    });
    let mut plate = Clip {
        id: ClipId(2),
        name: "plate".into(),
        asset: AssetReference::ligm("plate", "video/zone_plate"),
        start: Tick::from_millis(2500),
        duration: Tick::from_millis(2500),
        offset: Tick::ZERO,
        transition_in: None,
        transition_out: None,
        effects: Vec::new(),
    };
    plate.transition_in = Some(Transition {
        kind: TransitionKind::Crossfade,
        duration: Tick::from_millis(500),
        easing: Easing::Linear,
    });
    let tone = Clip {
        id: ClipId(3),
        name: "tone".into(),
        asset: AssetReference::ligm("tone", "audio/sine?freq=1000"),
        start: Tick::ZERO,
        duration: Tick::from_secs(5),
        offset: Tick::ZERO,
        transition_in: None,
        transition_out: None,
        effects: Vec::new(),
    };
    Timeline {
        tracks: vec![
            Track {
                name: "v1".into(),
                kind: TrackKind::Video,
                clips: vec![bars, plate],
            },
            Track {
                name: "a1".into(),
                kind: TrackKind::Audio,
                clips: vec![tone],
            },
        ],
        duration: Tick::from_secs(5),
    }
}

fn spec(dest: std::path::PathBuf) -> DeliverableSpec {
    DeliverableSpec {
        name: "bundle-test".into(),
        timeline: demo_timeline(),
        quality: QualityProfile {
            resolution_height: 180,
            ..QualityProfile::draft()
        },
        fps: Fps::FILM,
        codec: Codec::H264,
        audio_policy: AudioPolicy::Required,
        sidecars: vec![
            SidecarRequest::optional(SidecarKind::ThumbnailJpeg),
            SidecarRequest::optional(SidecarKind::ContactSheetJpeg),
        ],
        destination: dest,
        plan: UserPlan::unrestricted("studio"),
        qc_policy: QcPolicy::default(),
    }
}

#[test]
#[ignore = "requires ffmpeg/ffprobe on PATH"]
fn publish_writes_an_atomic_bundle_with_manifest_and_qc() {
    let root = tempfile::tempdir().unwrap();
    let dest = root.path().join("bundle");

    let orch = Orchestrator::new();
    let published = orch.publish(&spec(dest.clone()), &CancelToken::new()).unwrap();

    assert_eq!(published.bundle_dir, dest);
    assert!(dest.join("video.mp4").exists());
    assert!(dest.join("deliverable.json").exists());
    assert!(dest.join("thumbnail.jpg").exists());
    assert!(dest.join("contact_sheet.jpg").exists());

    let manifest =
        DeliverableManifest::from_json(&std::fs::read_to_string(dest.join("deliverable.json")).unwrap())
            .unwrap();
    assert!(manifest.qc_report.passed);
    assert!(manifest.qc_report.container.passed());
    assert!(manifest.qc_metadata_report.unwrap().passed());
    let audio = manifest.qc_report.audio.expect("audio report");
    assert!(audio.peak >= 0.01);

    // No stray staging directories survive a successful publish.
    let staging_left = std::fs::read_dir(root.path())
        .unwrap()
        .filter_map(Result::ok)
        .any(|e| e.file_name().to_string_lossy().starts_with(".metavis-staging"));
    assert!(!staging_left);
}

#[test]
#[ignore = "requires ffmpeg/ffprobe on PATH"]
fn publishing_twice_matches_structurally() {
    let root = tempfile::tempdir().unwrap();
    let orch = Orchestrator::new();

    let a = orch
        .publish(&spec(root.path().join("a")), &CancelToken::new())
        .unwrap();
    let b = orch
        .publish(&spec(root.path().join("b")), &CancelToken::new())
        .unwrap();

    let ca = &a.manifest.qc_report.container;
    let cb = &b.manifest.qc_report.container;
    assert_eq!(ca.width, cb.width);
    assert_eq!(ca.height, cb.height);
    assert_eq!(ca.sample_count, cb.sample_count);
    assert!((ca.duration_secs - cb.duration_secs).abs() < 0.05);

    let la = std::fs::metadata(a.bundle_dir.join("video.mp4")).unwrap().len() as i64;
    let lb = std::fs::metadata(b.bundle_dir.join("video.mp4")).unwrap().len() as i64;
    // Encoder output should match closely run-to-run for identical input.
    assert!((la - lb).abs() <= la / 100 + 4096, "{la} vs {lb}");
}

#[test]
#[ignore = "requires ffmpeg/ffprobe on PATH"]
fn required_audio_on_silent_timeline_fails_qc() {
    let root = tempfile::tempdir().unwrap();
    let mut s = spec(root.path().join("silent"));
    // Drop the audio track; Required still emits a silent track and QC
    // rejects the publish.
    s.timeline.tracks.retain(|t| t.kind == TrackKind::Video);
    let err = orch_publish_err(&s);
    assert!(matches!(err, metavis::MetavisError::Qc(_)), "{err}");
    assert!(!root.path().join("silent").exists());
}

fn orch_publish_err(s: &DeliverableSpec) -> metavis::MetavisError {
    Orchestrator::new()
        .publish(s, &CancelToken::new())
        .err()
        .expect("publish should fail")
}
