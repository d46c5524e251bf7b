//! Deliverable orchestrator.
//!
//! Sequential pipeline with two producers feeding one writer: the audio mix
//! is produced once up front, then a frame producer streams rendered frames
//! through a bounded queue into the container writer. On success the staging
//! directory is renamed into place; any failure (including QC enforcement)
//! drops staging without touching the destination.

use crate::assets::reader::{CacheLimits, SharedClipReader};
use crate::assets::reference::ResolvedAsset;
use crate::audio::mix::{self, AudioPolicy};
use crate::color::space::ColorTags;
use crate::compile::compiler::{CompileOptions, compile_frame_at, preflight};
use crate::deliver::governance::{GovernanceRecord, UserPlan, check_governance};
use crate::deliver::manifest::{DeliverableManifest, MANIFEST_SCHEMA_VERSION, SidecarRecord};
use crate::deliver::QualityProfile;
use crate::encode::ffmpeg::{FfmpegSink, FfmpegSinkOpts, ensure_parent_dir};
use crate::encode::sink::{AudioInputConfig, Codec, FrameSink, SinkConfig};
use crate::engine::{Engine, EngineCounters, EngineOpts, PixelBuffer};
use crate::foundation::cancel::CancelToken;
use crate::foundation::clock::{Clock, MonotonicClock};
use crate::foundation::core::{Fps, FrameIndex, Tick};
use crate::foundation::error::{MetavisError, MvResult, QcFailure};
use crate::foundation::fs::{FileSystemAdapter, OsFileSystem};
use crate::qc::audio::check_audio;
use crate::qc::container::{
    ContainerExpectations, check_container, check_metadata, probe_container,
};
use crate::qc::content::{check_content, luma_signature, measure_frame};
use crate::qc::report::{
    QcAudioReport, QcContentReport, QcReport, measurements,
};
use crate::qc::sidecar::{SidecarKind, check_sidecars};
use crate::sidecar::captions::{Cue, parse_auto, write_captions, CaptionFormat};
use crate::sidecar::thumbnail::{contact_sheet_jpeg, downscale, thumbnail_jpeg};
use crate::sidecar::transcript::{to_json as transcript_to_json, transcript_from_cues};
use crate::timeline::model::Timeline;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::mpsc;

/// Writer lag (frames) at which the frame producer blocks.
const WRITER_QUEUE_DEPTH: usize = 3;

/// Content-QC sample positions as fractions of the export duration.
const SAMPLE_FRACTIONS: [f64; 5] = [0.1, 0.3, 0.5, 0.7, 0.9];

/// One sidecar the publish should produce.
#[derive(Clone, Debug)]
pub struct SidecarRequest {
    /// Which sidecar.
    pub kind: SidecarKind,
    /// Whether a missing sidecar fails the publish.
    pub required: bool,
    /// Explicit candidate source file (caption kinds).
    pub source: Option<PathBuf>,
    /// Inline cues (caption and transcript kinds); discovery runs when empty.
    pub inline_cues: Vec<Cue>,
}

impl SidecarRequest {
    /// Optional sidecar of `kind` with no explicit source.
    pub fn optional(kind: SidecarKind) -> Self {
        Self {
            kind,
            required: false,
            source: None,
            inline_cues: Vec::new(),
        }
    }
}

/// Everything the orchestrator needs to publish one deliverable.
#[derive(Clone, Debug)]
pub struct DeliverableSpec {
    /// Bundle name (also the manifest `deliverable` field).
    pub name: String,
    /// The edit to render.
    pub timeline: Timeline,
    /// Output quality.
    pub quality: QualityProfile,
    /// Output frame rate.
    pub fps: Fps,
    /// Target codec.
    pub codec: Codec,
    /// Audio emission policy.
    pub audio_policy: AudioPolicy,
    /// Requested sidecars.
    pub sidecars: Vec<SidecarRequest>,
    /// Final bundle directory; created atomically.
    pub destination: PathBuf,
    /// Entitlement plan.
    pub plan: UserPlan,
    /// QC enforcement policy.
    pub qc_policy: crate::qc::report::QcPolicy,
}

/// Result of the frame/audio export stage.
#[derive(Debug)]
pub struct ExportOutcome {
    /// Frames pushed to the sink.
    pub frames_total: u64,
    /// Captured sample frames (frame index, pixels) for content QC and
    /// thumbnails.
    pub captured: Vec<(FrameIndex, PixelBuffer)>,
    /// Content QC verdict over the captured samples.
    pub content_report: QcContentReport,
    /// Audio QC verdict; `None` when no track was emitted.
    pub audio_report: Option<QcAudioReport>,
    /// Whether an audio track was emitted.
    pub audio_emitted: bool,
    /// Engine diagnostics; `readbacks` must be zero.
    pub engine_counters: EngineCounters,
}

/// A successfully published bundle.
#[derive(Debug)]
pub struct PublishedDeliverable {
    /// Final bundle directory.
    pub bundle_dir: PathBuf,
    /// The manifest as written.
    pub manifest: DeliverableManifest,
}

/// Publish pipeline entry point.
pub struct Orchestrator {
    fs: Arc<dyn FileSystemAdapter>,
    clock: Arc<dyn Clock>,
    reader: SharedClipReader,
    engine_opts: EngineOpts,
}

impl Default for Orchestrator {
    fn default() -> Self {
        Self::new()
    }
}

impl Orchestrator {
    /// Orchestrator over the real filesystem and clock.
    pub fn new() -> Self {
        Self::with_parts(
            Arc::new(OsFileSystem),
            Arc::new(MonotonicClock::new()),
            SharedClipReader::new(CacheLimits::default()),
        )
    }

    /// Orchestrator with injected seams (tests).
    pub fn with_parts(
        fs: Arc<dyn FileSystemAdapter>,
        clock: Arc<dyn Clock>,
        reader: SharedClipReader,
    ) -> Self {
        Self {
            fs,
            clock,
            reader,
            engine_opts: EngineOpts::default(),
        }
    }

    /// Render the timeline into `sink` and run the hermetic QC passes
    /// (content, audio). Container and sidecar QC run in [`publish`], against
    /// the finished bundle.
    ///
    /// [`publish`]: Orchestrator::publish
    pub fn export(
        &self,
        spec: &DeliverableSpec,
        sink: &mut dyn FrameSink,
        cancel: &CancelToken,
    ) -> MvResult<ExportOutcome> {
        spec.quality.validate()?;
        preflight(&spec.timeline)?;
        let governance = check_governance(&spec.plan, &spec.quality, "publish")?;

        let width = spec.quality.width();
        let height = spec.quality.even_height();
        let frames_total = spec.fps.frames_covering(spec.timeline.duration).max(1);

        // Audio producer: mix once, outside the frame loop.
        let mix_rate = crate::assets::media::MIX_SAMPLE_RATE;
        let mixed = match spec.audio_policy {
            AudioPolicy::Forbidden => None,
            AudioPolicy::Required => {
                Some(mix::mix_timeline(&spec.timeline, &self.reader, mix_rate)?)
            }
            AudioPolicy::Auto => {
                let mixed = mix::mix_timeline(&spec.timeline, &self.reader, mix_rate)?;
                mix::has_signal(&mixed).then_some(mixed)
            }
        };

        let mut audio_tmp = None;
        let audio_cfg = match &mixed {
            None => None,
            Some(samples) => {
                let tmp = tempfile::Builder::new()
                    .prefix("metavis_mix_")
                    .suffix(".f32le")
                    .tempfile()
                    .map_err(|e| MetavisError::io(format!("audio staging failed: {e}")))?;
                let path = tmp.path().to_path_buf();
                mix::write_f32le(samples, &path)?;
                audio_tmp = Some(tmp);
                Some(AudioInputConfig {
                    path,
                    sample_rate: mix_rate,
                    channels: 2,
                })
            }
        };

        let compile_opts = CompileOptions {
            width,
            height,
            bit_depth: spec.quality.color_depth,
            watermark: governance.watermark.clone(),
        };
        let cfg = SinkConfig {
            width,
            height,
            fps: spec.fps,
            codec: spec.codec,
            color_depth: spec.quality.color_depth,
            color: ColorTags::REC709_SDR,
            audio: audio_cfg,
        };

        let sample_frames = sample_frame_set(frames_total);
        let mut captured: Vec<(FrameIndex, PixelBuffer)> = Vec::new();
        let mut engine = Engine::new(self.reader.clone(), self.clock.clone(), self.engine_opts.clone())?;

        let (frame_tx, frame_rx) = mpsc::sync_channel::<(FrameIndex, PixelBuffer)>(WRITER_QUEUE_DEPTH);
        let (free_tx, free_rx) = mpsc::sync_channel::<PixelBuffer>(WRITER_QUEUE_DEPTH + 2);
        for _ in 0..WRITER_QUEUE_DEPTH + 2 {
            free_tx
                .send(PixelBuffer::new(width, height))
                .expect("preloading the free-buffer queue cannot fail");
        }

        let writer_res = std::thread::scope(|scope| -> MvResult<()> {
            let sink_ref: &mut dyn FrameSink = sink;
            let writer = scope.spawn(move || -> MvResult<u64> {
                sink_ref.begin(cfg)?;
                let mut written = 0u64;
                while let Ok((idx, frame)) = frame_rx.recv() {
                    sink_ref.push_frame(idx, &frame)?;
                    written += 1;
                    // Recycle; the producer may already be gone.
                    let _ = free_tx.send(frame);
                }
                sink_ref.end()?;
                Ok(written)
            });

            let produce_res = (|| -> MvResult<()> {
                for i in 0..frames_total {
                    cancel.checkpoint()?;
                    let idx = FrameIndex(i);
                    let req = compile_frame_at(&spec.timeline, idx, spec.fps, &compile_opts)?;
                    let mut buf = free_rx.recv().map_err(|_| {
                        MetavisError::io("container writer stopped accepting frames")
                    })?;
                    engine.render(&req, &mut buf, cancel)?;
                    if sample_frames.contains(&i) {
                        captured.push((idx, buf.clone()));
                    }
                    frame_tx.send((idx, buf)).map_err(|_| {
                        MetavisError::io("container writer stopped accepting frames")
                    })?;
                }
                Ok(())
            })();

            drop(frame_tx);
            let writer_out = writer
                .join()
                .map_err(|_| MetavisError::io("container writer thread panicked"))?;

            match (produce_res, writer_out) {
                (Ok(()), Ok(written)) => {
                    if written != frames_total {
                        return Err(MetavisError::io(format!(
                            "writer consumed {written} of {frames_total} frames"
                        )));
                    }
                    Ok(())
                }
                // A producer I/O error usually means the writer died first;
                // surface the root cause.
                (Err(p), Err(w)) => {
                    if matches!(p, MetavisError::Io(_)) {
                        Err(w)
                    } else {
                        Err(p)
                    }
                }
                (Err(p), Ok(_)) => Err(p),
                (Ok(()), Err(w)) => Err(w),
            }
        });
        drop(audio_tmp);
        writer_res?;

        // Content QC over the captured samples.
        let frame_secs = spec.fps.frame_duration_secs();
        let samples: Vec<_> = captured
            .iter()
            .map(|(idx, frame)| {
                let secs = idx.0 as f64 * frame_secs;
                measure_frame(format!("{secs:.3}s"), secs, frame, &spec.qc_policy.content)
            })
            .collect();
        let signatures: Vec<_> = captured.iter().map(|(_, f)| luma_signature(f)).collect();
        let content_report = check_content(samples, &signatures, &spec.qc_policy.content);

        let audio_report = mixed.as_ref().map(|samples| {
            check_audio(
                samples,
                mix_rate,
                0.5,
                spec.audio_policy,
                spec.qc_policy.silence_peak,
            )
        });
        // `Required` with an empty mix still emits a (silent) track; QC then
        // rejects it. `Forbidden`/silent-`Auto` emit nothing to check.
        let audio_report = match (spec.audio_policy, audio_report) {
            (AudioPolicy::Required, None) => Some(check_audio(
                &[],
                mix_rate,
                0.5,
                AudioPolicy::Required,
                spec.qc_policy.silence_peak,
            )),
            (_, r) => r,
        };

        Ok(ExportOutcome {
            frames_total,
            captured,
            content_report,
            audio_report,
            audio_emitted: mixed.is_some(),
            engine_counters: engine.counters(),
        })
    }

    /// Full publish: export into staging, write sidecars and the manifest,
    /// run QC, and atomically rename the bundle into place.
    pub fn publish(
        &self,
        spec: &DeliverableSpec,
        cancel: &CancelToken,
    ) -> MvResult<PublishedDeliverable> {
        if spec.destination.exists() {
            return Err(MetavisError::io(format!(
                "destination '{}' already exists",
                spec.destination.display()
            )));
        }
        ensure_parent_dir(&spec.destination)?;
        let parent = spec
            .destination
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let staging = tempfile::Builder::new()
            .prefix(".metavis-staging-")
            .tempdir_in(parent)
            .map_err(|e| MetavisError::io(format!("staging directory failed: {e}")))?;

        let video_path = staging.path().join("video.mp4");
        let mut sink = FfmpegSink::new(FfmpegSinkOpts::new(&video_path));
        let outcome = self.export(spec, &mut sink, cancel)?;

        let sidecar_records = self.write_sidecars(staging.path(), spec, &outcome)?;
        let requested_kinds: Vec<SidecarKind> = sidecar_records
            .iter()
            .filter(|r| r.written)
            .map(|r| r.kind)
            .collect();

        // QC against the finished file.
        let facts = probe_container(&video_path)?;
        let container_report = check_container(
            &facts,
            &ContainerExpectations {
                fps: spec.fps,
                duration_secs: spec.timeline.duration.as_secs_f64(),
                duration_tolerance_secs: 0.5,
                width: spec.quality.width(),
                height: spec.quality.even_height(),
                expected_samples: outcome.frames_total,
            },
        );
        let metadata_report = check_metadata(&facts);
        let sidecar_report = check_sidecars(self.fs.as_ref(), staging.path(), &requested_kinds);

        // Enforcement gates.
        if outcome.engine_counters.readbacks > 0 {
            return Err(MetavisError::Qc(QcFailure {
                check: "engine.readback".into(),
                reason: "hot-path readback counter is non-zero".into(),
                measurements: measurements(&[(
                    "readbacks",
                    outcome.engine_counters.readbacks as f64,
                )]),
            }));
        }
        let policy = &spec.qc_policy;
        enforce(policy.enforce_container, "container", &container_report.failures)?;
        enforce(policy.enforce_content, "content", &outcome.content_report.failures)?;
        enforce(policy.enforce_metadata, "metadata", &metadata_report.failures)?;
        enforce(policy.enforce_sidecars, "sidecar", &sidecar_report.failures)?;
        if let Some(audio) = &outcome.audio_report {
            enforce(policy.enforce_audio, "audio", &audio.failures)?;
        }

        let passed = container_report.passed()
            && outcome.content_report.passed()
            && metadata_report.passed()
            && sidecar_report.passed()
            && outcome.audio_report.as_ref().is_none_or(|a| a.passed());

        let manifest = DeliverableManifest {
            schema_version: MANIFEST_SCHEMA_VERSION,
            created_at: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
            deliverable: spec.name.clone(),
            timeline_summary: spec.timeline.summary(),
            quality: spec.quality.clone(),
            fps: spec.fps,
            codec: spec.codec,
            audio_policy: spec.audio_policy,
            governance: GovernanceRecord {
                plan: spec.plan.name.clone(),
                max_resolution_height: spec.plan.max_resolution_height,
                watermarked: spec.plan.requires_watermark,
            },
            qc_policy: spec.qc_policy.clone(),
            qc_report: QcReport {
                container: container_report,
                audio: outcome.audio_report.clone(),
                passed,
            },
            qc_content_report: Some(outcome.content_report.clone()),
            qc_metadata_report: Some(metadata_report),
            qc_sidecar_report: Some(sidecar_report),
            sidecars: sidecar_records,
        };

        // The manifest is written last within staging.
        self.fs.write(
            &staging.path().join("deliverable.json"),
            manifest.to_json()?.as_bytes(),
        )?;

        std::fs::rename(staging.path(), &spec.destination).map_err(|e| {
            MetavisError::io(format!(
                "atomic publish to '{}' failed: {e}",
                spec.destination.display()
            ))
        })?;
        let _ = staging.keep();

        tracing::info!(bundle = %spec.destination.display(), "published deliverable");
        Ok(PublishedDeliverable {
            bundle_dir: spec.destination.clone(),
            manifest,
        })
    }

    /// Write requested sidecars into the staging bundle.
    pub(crate) fn write_sidecars(
        &self,
        staging: &Path,
        spec: &DeliverableSpec,
        outcome: &ExportOutcome,
    ) -> MvResult<Vec<SidecarRecord>> {
        let mut records = Vec::new();
        for request in &spec.sidecars {
            let file = request.kind.file_name();
            let path = staging.join(file);
            let written = match request.kind {
                SidecarKind::CaptionsVtt | SidecarKind::CaptionsSrt => {
                    match self.resolve_cues(spec, request)? {
                        Some((cues, _)) => {
                            let format = if request.kind == SidecarKind::CaptionsVtt {
                                CaptionFormat::Vtt
                            } else {
                                CaptionFormat::Srt
                            };
                            self.fs
                                .write(&path, write_captions(&cues, format).as_bytes())?;
                            true
                        }
                        None => false,
                    }
                }
                SidecarKind::TranscriptWordsJson => match self.resolve_cues(spec, request)? {
                    Some((cues, timeline_offset)) => {
                        let transcript = transcript_from_cues(&cues, timeline_offset)?;
                        self.fs
                            .write(&path, transcript_to_json(&transcript)?.as_bytes())?;
                        true
                    }
                    None => false,
                },
                SidecarKind::ThumbnailJpeg => match mid_frame(&outcome.captured) {
                    Some(frame) => {
                        let thumb = scaled_for_thumbnail(frame);
                        self.fs.write(&path, &thumbnail_jpeg(&thumb)?)?;
                        true
                    }
                    None => false,
                },
                SidecarKind::ContactSheetJpeg => {
                    if outcome.captured.is_empty() {
                        false
                    } else {
                        let cells: Vec<PixelBuffer> = outcome
                            .captured
                            .iter()
                            .map(|(_, f)| scaled_for_thumbnail(f))
                            .collect();
                        self.fs.write(&path, &contact_sheet_jpeg(&cells, 3)?)?;
                        true
                    }
                }
            };

            if !written && request.required {
                return Err(MetavisError::Qc(QcFailure {
                    check: "sidecar.required".into(),
                    reason: format!("required sidecar '{file}' could not be produced"),
                    measurements: Default::default(),
                }));
            }
            records.push(SidecarRecord {
                kind: request.kind,
                file: file.to_owned(),
                written,
                required: request.required,
            });
        }
        Ok(records)
    }

    /// Resolve caption cues: inline first, then the explicit source file,
    /// then sibling-file discovery next to the timeline's file assets.
    fn resolve_cues(
        &self,
        spec: &DeliverableSpec,
        request: &SidecarRequest,
    ) -> MvResult<Option<(Vec<Cue>, Tick)>> {
        if !request.inline_cues.is_empty() {
            return Ok(Some((request.inline_cues.clone(), Tick::ZERO)));
        }
        if let Some(source) = &request.source {
            let bytes = self.fs.read(source)?;
            let text = String::from_utf8_lossy(&bytes);
            return Ok(Some((parse_auto(&text)?, Tick::ZERO)));
        }

        for track in &spec.timeline.tracks {
            for clip in track.sorted_clips() {
                let ResolvedAsset::File { path } = clip.asset.resolve()? else {
                    continue;
                };
                let Some(stem) = path.file_stem().map(|s| s.to_owned()) else {
                    continue;
                };
                let dir = path.parent().unwrap_or_else(|| Path::new("."));
                for ext in ["captions.vtt", "captions.srt"] {
                    let mut name = stem.clone();
                    name.push(".");
                    name.push(ext);
                    let candidate = dir.join(&name);
                    if self.fs.exists(&candidate) {
                        let bytes = self.fs.read(&candidate)?;
                        let text = String::from_utf8_lossy(&bytes);
                        let cues = parse_auto(&text)?;
                        let offset = clip.start - clip.offset;
                        return Ok(Some((cues, offset)));
                    }
                }
            }
        }
        Ok(None)
    }
}

fn enforce(enabled: bool, check: &str, failures: &[String]) -> MvResult<()> {
    if enabled && !failures.is_empty() {
        return Err(MetavisError::Qc(QcFailure {
            check: format!("qc.{check}"),
            reason: failures.join("; "),
            measurements: Default::default(),
        }));
    }
    Ok(())
}

fn sample_frame_set(frames_total: u64) -> Vec<u64> {
    let mut set: Vec<u64> = SAMPLE_FRACTIONS
        .iter()
        .map(|f| ((frames_total.saturating_sub(1)) as f64 * f).round() as u64)
        .collect();
    set.sort_unstable();
    set.dedup();
    set
}

fn mid_frame(captured: &[(FrameIndex, PixelBuffer)]) -> Option<&PixelBuffer> {
    if captured.is_empty() {
        return None;
    }
    Some(&captured[captured.len() / 2].1)
}

fn scaled_for_thumbnail(frame: &PixelBuffer) -> PixelBuffer {
    const MAX_HEIGHT: u32 = 360;
    if frame.height <= MAX_HEIGHT {
        return frame.clone();
    }
    let height = MAX_HEIGHT;
    let width = ((frame.width as u64 * height as u64 / frame.height as u64) as u32).max(2) & !1;
    downscale(frame, width, height)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::reference::AssetReference;
    use crate::foundation::fs::MemoryFileSystem;
    use crate::qc::report::QcPolicy;
    use crate::sidecar::captions::write_vtt;
    use crate::sidecar::transcript::Transcript;
    use crate::timeline::model::{Clip, ClipId, Track, TrackKind};

    fn file_clip_timeline(path: &str, start_ms: i64, offset_ms: i64) -> Timeline {
        Timeline {
            tracks: vec![Track {
                name: "v1".into(),
                kind: TrackKind::Video,
                clips: vec![Clip {
                    id: ClipId(1),
                    name: "main".into(),
                    asset: AssetReference::file("main", path),
                    start: Tick::from_millis(start_ms),
                    duration: Tick::from_secs(5),
                    offset: Tick::from_millis(offset_ms),
                    transition_in: None,
                    transition_out: None,
                    effects: Vec::new(),
                }],
            }],
            duration: Tick::from_secs(10),
        }
    }

    fn spec_with(fs_timeline: Timeline, sidecars: Vec<SidecarRequest>) -> DeliverableSpec {
        DeliverableSpec {
            name: "demo".into(),
            timeline: fs_timeline,
            quality: QualityProfile::draft(),
            fps: Fps::FILM,
            codec: Codec::H264,
            audio_policy: AudioPolicy::Auto,
            sidecars,
            destination: PathBuf::from("/out/demo"),
            plan: UserPlan::unrestricted("studio"),
            qc_policy: QcPolicy::default(),
        }
    }

    fn empty_outcome() -> ExportOutcome {
        ExportOutcome {
            frames_total: 0,
            captured: Vec::new(),
            content_report: check_content(Vec::new(), &[], &QcPolicy::default().content),
            audio_report: None,
            audio_emitted: false,
            engine_counters: EngineCounters::default(),
        }
    }

    fn orchestrator_with_fs(fs: Arc<MemoryFileSystem>) -> Orchestrator {
        Orchestrator::with_parts(
            fs,
            Arc::new(MonotonicClock::new()),
            SharedClipReader::new(CacheLimits::default()),
        )
    }

    #[test]
    fn transcript_discovers_sibling_captions_and_converts_to_ticks() {
        let fs = Arc::new(MemoryFileSystem::new());
        let vtt = write_vtt(&[crate::sidecar::captions::Cue {
            start_ms: 2_000,
            end_ms: 3_000,
            text: "hello world".into(),
            speaker: Some("Ada".into()),
        }]);
        fs.seed("/media/foo.captions.vtt", vtt);

        let orch = orchestrator_with_fs(fs.clone());
        let spec = spec_with(
            file_clip_timeline("/media/foo.mov", 0, 0),
            vec![SidecarRequest {
                kind: SidecarKind::TranscriptWordsJson,
                required: true,
                source: None,
                inline_cues: Vec::new(),
            }],
        );

        let records = orch
            .write_sidecars(Path::new("/staging"), &spec, &empty_outcome())
            .unwrap();
        assert!(records[0].written);

        let bytes = fs.read(Path::new("/staging/transcript_words.json")).unwrap();
        let transcript: Transcript = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(transcript.tick_scale, 60_000);
        assert_eq!(transcript.words.len(), 2);
        // Cue start 2s -> 120000 ticks in both timeline and source times.
        assert_eq!(transcript.words[0].timeline_start_ticks, 120_000);
        assert_eq!(transcript.words[0].source_start_ticks, 120_000);
        assert_eq!(transcript.words[0].speaker.as_deref(), Some("Ada"));
    }

    #[test]
    fn caption_conversion_writes_requested_format() {
        let fs = Arc::new(MemoryFileSystem::new());
        fs.seed(
            "/media/foo.captions.srt",
            "1\n00:00:01,000 --> 00:00:02,000\n[Bo] hi\n\n",
        );
        let orch = orchestrator_with_fs(fs.clone());
        let spec = spec_with(
            file_clip_timeline("/media/foo.mov", 0, 0),
            vec![SidecarRequest {
                kind: SidecarKind::CaptionsVtt,
                required: true,
                source: None,
                inline_cues: Vec::new(),
            }],
        );
        orch.write_sidecars(Path::new("/staging"), &spec, &empty_outcome())
            .unwrap();
        let vtt = fs.read(Path::new("/staging/captions.vtt")).unwrap();
        let text = String::from_utf8(vtt).unwrap();
        assert!(text.starts_with("WEBVTT"));
        assert!(text.contains("<v Bo>hi"));
    }

    #[test]
    fn missing_required_sidecar_fails_the_publish() {
        let fs = Arc::new(MemoryFileSystem::new());
        let orch = orchestrator_with_fs(fs);
        let spec = spec_with(
            file_clip_timeline("/media/foo.mov", 0, 0),
            vec![SidecarRequest {
                kind: SidecarKind::CaptionsVtt,
                required: true,
                source: None,
                inline_cues: Vec::new(),
            }],
        );
        let err = orch
            .write_sidecars(Path::new("/staging"), &spec, &empty_outcome())
            .unwrap_err();
        assert!(matches!(err, MetavisError::Qc(_)));
    }

    #[test]
    fn missing_optional_sidecar_is_recorded_not_fatal() {
        let fs = Arc::new(MemoryFileSystem::new());
        let orch = orchestrator_with_fs(fs);
        let spec = spec_with(
            file_clip_timeline("/media/foo.mov", 0, 0),
            vec![SidecarRequest::optional(SidecarKind::CaptionsSrt)],
        );
        let records = orch
            .write_sidecars(Path::new("/staging"), &spec, &empty_outcome())
            .unwrap();
        assert!(!records[0].written);
        assert!(!records[0].required);
    }

    #[test]
    fn sample_set_is_sorted_and_bounded() {
        let set = sample_frame_set(312);
        assert_eq!(set.len(), 5);
        assert!(set.windows(2).all(|w| w[0] < w[1]));
        assert!(*set.last().unwrap() < 312);

        let tiny = sample_frame_set(1);
        assert_eq!(tiny, vec![0]);
    }

    #[test]
    fn thumbnail_scaling_preserves_aspect() {
        let frame = PixelBuffer::new(1920, 1080);
        let scaled = scaled_for_thumbnail(&frame);
        assert_eq!(scaled.height, 360);
        assert_eq!(scaled.width, 640);
    }
}
