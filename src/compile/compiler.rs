//! Timeline compiler: lowers `(Timeline, t)` into a per-frame render DAG.
//!
//! The compiler is pure and deterministic. It never reads frame data; clip
//! selection, z-order, transition pairing, and easing are all functions of the
//! model and the requested tick, so identical inputs produce byte-identical
//! graphs on every platform.

use crate::assets::procedural;
use crate::assets::reference::ResolvedAsset;
use crate::color::space::ColorSpace;
use crate::color::transform::{FalseColorMap, idt};
use crate::foundation::core::{FrameIndex, Fps, Tick};
use crate::foundation::error::{MetavisError, MvResult};
use crate::graph::node::{NodeId, NodeKind, NodeValue, ProceduralSpec, RenderGraph, WatermarkSpec};
use crate::timeline::model::{Clip, FeatureApplication, Timeline, Transition, TransitionKind};

/// Output of one compile: everything the engine needs to render frame `time`.
#[derive(Clone, Debug)]
pub struct RenderRequest {
    /// The per-frame DAG with a single `Odt` sink.
    pub graph: RenderGraph,
    /// Output width in pixels.
    pub width: u32,
    /// Output height in pixels.
    pub height: u32,
    /// Timeline tick this request renders.
    pub time: Tick,
}

/// Compiler configuration for one deliverable.
#[derive(Clone, Debug)]
pub struct CompileOptions {
    /// Output width in pixels.
    pub width: u32,
    /// Output height in pixels.
    pub height: u32,
    /// ODT quantization depth in bits.
    pub bit_depth: u32,
    /// Watermark required by governance, if any.
    pub watermark: Option<WatermarkSpec>,
}

/// Phase of a clip relative to `t`, per the boundary state machine.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ClipPhase {
    /// `t` precedes the clip.
    Before,
    /// Inside the transition-in window; payload is un-eased progress.
    FadingIn(f32),
    /// Fully visible.
    Active,
    /// Inside the transition-out window; payload is un-eased progress.
    FadingOut(f32),
    /// `t` is at or past the clip end.
    After,
}

/// Classify a clip at `t`.
pub fn clip_phase(clip: &Clip, t: Tick) -> ClipPhase {
    if t < clip.start {
        return ClipPhase::Before;
    }
    if t >= clip.end() {
        return ClipPhase::After;
    }
    if let Some(tin) = &clip.transition_in {
        let fade_end = clip.start + tin.duration;
        if t < fade_end {
            return ClipPhase::FadingIn(window_progress(clip.start, tin.duration, t));
        }
    }
    if let Some(tout) = &clip.transition_out {
        let fade_start = clip.end() - tout.duration;
        if t >= fade_start {
            return ClipPhase::FadingOut(window_progress(fade_start, tout.duration, t));
        }
    }
    ClipPhase::Active
}

fn window_progress(start: Tick, duration: Tick, t: Tick) -> f32 {
    ((t - start).0 as f32 / duration.0.max(1) as f32).clamp(0.0, 1.0)
}

/// Validate everything the compiler relies on, without compiling a frame.
///
/// Covers model validation, feature-id resolution against the static catalog,
/// retime factor bounds, and transition well-formedness.
pub fn preflight(timeline: &Timeline) -> MvResult<()> {
    timeline.validate()?;
    for track in &timeline.tracks {
        for clip in &track.clips {
            clip.asset
                .resolve()
                .map_err(|e| MetavisError::compile_clip(e.to_string(), &clip.name))?;
            for app in &clip.effects {
                match resolve_feature(app, clip)? {
                    ResolvedFeature::Retime { factor } if factor <= 0.0 => {
                        return Err(MetavisError::compile_clip(
                            format!("retime factor must be positive, got {factor}"),
                            &clip.name,
                        ));
                    }
                    _ => {}
                }
            }
        }
    }
    Ok(())
}

/// Compile the frame at `t`.
pub fn compile_frame(
    timeline: &Timeline,
    t: Tick,
    opts: &CompileOptions,
) -> MvResult<RenderRequest> {
    let mut graph = RenderGraph::new();

    let mut stacked: Option<NodeId> = None;
    for track in timeline.video_tracks() {
        let Some(track_out) = compile_track(&mut graph, track.sorted_clips(), t)? else {
            continue;
        };
        stacked = Some(match stacked {
            None => track_out,
            Some(under) => graph.add(
                format!("stack.{}", track.name),
                NodeKind::Composite {
                    blend: crate::graph::node::BlendMode::Over,
                },
                &[under, track_out],
            ),
        });
    }

    let mut out = match stacked {
        Some(id) => id,
        None => graph.add("empty", NodeKind::BlackFill, &[]),
    };

    if let Some(spec) = &opts.watermark {
        out = graph.add(
            "watermark",
            NodeKind::Watermark { spec: spec.clone() },
            &[out],
        );
    }

    graph.add(
        "sink",
        NodeKind::Odt {
            bit_depth: opts.bit_depth,
        },
        &[out],
    );
    graph.validate()?;

    Ok(RenderRequest {
        graph,
        width: opts.width,
        height: opts.height,
        time: t,
    })
}

/// Compile the frame for `frame` at `fps`.
pub fn compile_frame_at(
    timeline: &Timeline,
    frame: FrameIndex,
    fps: Fps,
    opts: &CompileOptions,
) -> MvResult<RenderRequest> {
    compile_frame(timeline, fps.frame_tick(frame), opts)
}

fn compile_track(
    graph: &mut RenderGraph,
    sorted: Vec<&Clip>,
    t: Tick,
) -> MvResult<Option<NodeId>> {
    // Deterministic selection: active extent contains t.
    let selected: Vec<&Clip> = sorted.into_iter().filter(|c| c.contains(t)).collect();
    if selected.is_empty() {
        return Ok(None);
    }

    let mut out: Option<NodeId> = None;
    let mut i = 0usize;
    while i < selected.len() {
        let element = if i + 1 < selected.len()
            && let Some((node, consumed)) =
                try_pair_transition(graph, selected[i], selected[i + 1], t)?
        {
            i += consumed;
            node
        } else {
            let clip = selected[i];
            i += 1;
            compile_solo(graph, clip, t)?
        };

        out = Some(match out {
            None => element,
            Some(under) => graph.add(
                "overlap",
                NodeKind::Composite {
                    blend: crate::graph::node::BlendMode::Over,
                },
                &[under, element],
            ),
        });
    }
    Ok(out)
}

/// Pair `a`'s transition-out with `b`'s transition-in when `t` is inside the
/// shared window. Returns the combined node and how many clips it consumed.
fn try_pair_transition(
    graph: &mut RenderGraph,
    a: &Clip,
    b: &Clip,
    t: Tick,
) -> MvResult<Option<(NodeId, usize)>> {
    let (Some(out_tr), Some(in_tr)) = (&a.transition_out, &b.transition_in) else {
        return Ok(None);
    };
    if out_tr.kind != in_tr.kind {
        return Err(MetavisError::compile_clip(
            format!(
                "transition kinds disagree with '{}' across the shared edit",
                a.name
            ),
            &b.name,
        ));
    }
    let window_start = b.start;
    let window_end = b.start + in_tr.duration;
    if t < window_start || t >= window_end {
        return Ok(None);
    }

    let progress = in_tr
        .easing
        .apply(window_progress(window_start, in_tr.duration, t));
    let a_node = compile_clip_chain(graph, a, t)?;
    let b_node = compile_clip_chain(graph, b, t)?;
    let node = add_transition_node(graph, in_tr, a_node, b_node, progress, &b.name)?;
    Ok(Some((node, 2)))
}

fn add_transition_node(
    graph: &mut RenderGraph,
    tr: &Transition,
    a: NodeId,
    b: NodeId,
    progress: f32,
    clip_name: &str,
) -> MvResult<NodeId> {
    let kind = match &tr.kind {
        TransitionKind::Cut => {
            return Err(MetavisError::compile_clip(
                "cut transitions cannot explain an overlap",
                clip_name,
            ));
        }
        TransitionKind::Crossfade => NodeKind::Crossfade { progress },
        TransitionKind::DipToColor { color } => NodeKind::Dip {
            // The dip color is authored display-referred; blending happens in
            // working space.
            color: idt(*color, ColorSpace::Rec709Display),
            progress,
        },
        TransitionKind::Wipe { direction } => NodeKind::Wipe {
            direction: *direction,
            progress,
        },
    };
    Ok(graph.add(format!("transition.{clip_name}"), kind, &[a, b]))
}

/// A clip with no transition partner at `t`: emit opaque, or fade against
/// black per the state machine.
fn compile_solo(graph: &mut RenderGraph, clip: &Clip, t: Tick) -> MvResult<NodeId> {
    let chain = compile_clip_chain(graph, clip, t)?;
    let opacity = match clip_phase(clip, t) {
        ClipPhase::Active => return Ok(chain),
        ClipPhase::FadingIn(raw) => clip
            .transition_in
            .as_ref()
            .map(|tr| tr.easing.apply(raw))
            .unwrap_or(1.0),
        ClipPhase::FadingOut(raw) => clip
            .transition_out
            .as_ref()
            .map(|tr| 1.0 - tr.easing.apply(raw))
            .unwrap_or(1.0),
        // Selection guarantees the clip is inside its extent.
        ClipPhase::Before | ClipPhase::After => 1.0,
    };
    let black = graph.add(format!("{}.under", clip.name), NodeKind::BlackFill, &[]);
    Ok(graph.add(
        format!("{}.fade", clip.name),
        NodeKind::Crossfade { progress: opacity },
        &[black, chain],
    ))
}

/// `Source -> Idt -> effect_0 -> ... -> effect_n` for one clip at `t`.
fn compile_clip_chain(graph: &mut RenderGraph, clip: &Clip, t: Tick) -> MvResult<NodeId> {
    // Source time; retime scales the clip-relative offset.
    let mut retime_factor: Option<f32> = None;
    let mut video_effects: Vec<NodeKind> = Vec::new();
    for app in &clip.effects {
        match resolve_feature(app, clip)? {
            ResolvedFeature::Video(kind) => video_effects.push(kind),
            ResolvedFeature::Retime { factor } => retime_factor = Some(factor),
            // Audio features are applied by the mixer, not the frame graph.
            ResolvedFeature::AudioGain { .. } => {}
        }
    }

    let local = t - clip.start;
    let source = match retime_factor {
        Some(f) => Tick((local.0 as f64 * f as f64).round() as i64) + clip.offset,
        None => local + clip.offset,
    };

    let source_kind = match clip
        .asset
        .resolve()
        .map_err(|e| MetavisError::compile_clip(e.to_string(), &clip.name))?
    {
        ResolvedAsset::Ligm { kind, query } => {
            if !procedural::is_video_kind(&kind) {
                return Err(MetavisError::compile_clip(
                    format!("ligm kind '{kind}' is not a video source"),
                    &clip.name,
                ));
            }
            NodeKind::SourceProcedural {
                spec: ProceduralSpec { kind, query },
                asset_id: clip.asset.id.clone(),
                source,
            }
        }
        ResolvedAsset::File { .. } => NodeKind::SourceTexture {
            asset: clip.asset.clone(),
            source,
        },
    };

    let mut node = graph.add(clip.name.clone(), source_kind, &[]);
    node = graph.add(
        format!("{}.idt", clip.name),
        NodeKind::Idt {
            from: ColorSpace::Rec709Display,
        },
        &[node],
    );
    if let Some(factor) = retime_factor {
        node = graph.add(
            format!("{}.retime", clip.name),
            NodeKind::Retime { factor },
            &[node],
        );
    }
    for (i, kind) in video_effects.into_iter().enumerate() {
        node = graph.add(format!("{}.fx{i}", clip.name), kind, &[node]);
    }
    Ok(node)
}

// --- Feature catalog -------------------------------------------------------

/// A feature application resolved against the static catalog.
pub enum ResolvedFeature {
    /// Inserts a node into the clip's video chain.
    Video(NodeKind),
    /// Scales the clip's source-time mapping.
    Retime {
        /// Playback rate factor.
        factor: f32,
    },
    /// Applied by the audio mixer.
    AudioGain {
        /// Linear gain.
        gain: f32,
    },
}

/// Resolve a feature id; unknown ids fail preflight naming the clip.
pub fn resolve_feature(app: &FeatureApplication, clip: &Clip) -> MvResult<ResolvedFeature> {
    match app.id.as_str() {
        "mv.colorGrade" => Ok(ResolvedFeature::Video(NodeKind::ColorCdl {
            slope: param_triple(app, "slope", 1.0)?,
            offset: param_triple(app, "offset", 0.0)?,
            power: param_triple(app, "power", 1.0)?,
            saturation: param_f32(app, "saturation", 1.0)?,
        })),
        "mv.retime" => Ok(ResolvedFeature::Retime {
            factor: param_f32(app, "factor", 1.0)?,
        }),
        "com.metavis.fx.tonemap.aces" => Ok(ResolvedFeature::Video(NodeKind::ToneMapAces {
            exposure: param_f32(app, "exposure", 1.0)?,
        })),
        "com.metavis.fx.false_color.turbo" => Ok(ResolvedFeature::Video(NodeKind::FalseColor {
            map: FalseColorMap::Turbo,
            exposure: param_f32(app, "exposure", 1.0)?,
            gamma: param_f32(app, "gamma", 1.0)?,
        })),
        "audio.dialogCleanwater.v1" => Ok(ResolvedFeature::AudioGain {
            gain: param_f32(app, "gain", 1.0)?,
        }),
        other => Err(MetavisError::compile_clip(
            format!("unknown feature id '{other}'"),
            &clip.name,
        )),
    }
}

/// Linear gain the mixer applies for this clip's audio features.
pub fn resolve_audio_gain(clip: &Clip) -> MvResult<f32> {
    let mut gain = 1.0f32;
    for app in &clip.effects {
        if let ResolvedFeature::AudioGain { gain: g } = resolve_feature(app, clip)? {
            gain *= g;
        }
    }
    Ok(gain)
}

fn param_f32(app: &FeatureApplication, key: &str, default: f32) -> MvResult<f32> {
    match app.parameters.get(key) {
        None => Ok(default),
        Some(NodeValue::Float(v)) => Ok(*v as f32),
        Some(NodeValue::Int(v)) => Ok(*v as f32),
        Some(other) => Err(MetavisError::compile(format!(
            "feature '{}' parameter '{key}' must be numeric, got {other:?}",
            app.id
        ))),
    }
}

fn param_triple(app: &FeatureApplication, key: &str, default: f32) -> MvResult<[f32; 3]> {
    match app.parameters.get(key) {
        None => Ok([default; 3]),
        Some(NodeValue::Float(v)) => Ok([*v as f32; 3]),
        Some(NodeValue::Floats(vs)) if vs.len() == 3 => {
            Ok([vs[0] as f32, vs[1] as f32, vs[2] as f32])
        }
        Some(other) => Err(MetavisError::compile(format!(
            "feature '{}' parameter '{key}' must be a float or 3-float list, got {other:?}",
            app.id
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::reference::AssetReference;
    use crate::timeline::model::{ClipId, Easing, Track, TrackKind};
    use std::collections::BTreeMap;

    fn clip(id: u64, name: &str, start_ms: i64, dur_ms: i64, kind: &str) -> Clip {
        Clip {
            id: ClipId(id),
            name: name.to_owned(),
            asset: AssetReference::ligm(name, kind),
            start: Tick::from_millis(start_ms),
            duration: Tick::from_millis(dur_ms),
            offset: Tick::ZERO,
            transition_in: None,
            transition_out: None,
            effects: Vec::new(),
        }
    }

    fn crossfade(ms: i64) -> Transition {
        Transition {
            kind: TransitionKind::Crossfade,
            duration: Tick::from_millis(ms),
            easing: Easing::Linear,
        }
    }

    fn video_track(clips: Vec<Clip>) -> Track {
        Track {
            name: "v1".into(),
            kind: TrackKind::Video,
            clips,
        }
    }

    fn opts() -> CompileOptions {
        CompileOptions {
            width: 64,
            height: 36,
            bit_depth: 8,
            watermark: None,
        }
    }

    fn three_clip_crossfade_timeline() -> Timeline {
        let mut a = clip(1, "bars", 0, 5000, "video/smpte_bars");
        a.transition_out = Some(crossfade(1000));
        let mut b = clip(2, "chart", 4000, 5000, "video/macbeth");
        b.transition_in = Some(crossfade(1000));
        b.transition_out = Some(crossfade(1000));
        let mut c = clip(3, "plate", 8000, 5000, "video/zone_plate");
        c.transition_in = Some(crossfade(1000));
        Timeline {
            tracks: vec![video_track(vec![a, b, c])],
            duration: Tick::from_secs(13),
        }
    }

    #[test]
    fn active_frame_compiles_source_idt_odt() {
        let t = three_clip_crossfade_timeline();
        let req = compile_frame(&t, Tick::from_secs(2), &opts()).unwrap();
        let labels: Vec<&str> = req.graph.nodes().iter().map(|n| n.kind.label()).collect();
        assert_eq!(labels, vec!["source_procedural", "idt", "odt"]);
    }

    #[test]
    fn transition_window_pairs_adjacent_clips() {
        let t = three_clip_crossfade_timeline();
        let req = compile_frame(&t, Tick::from_millis(4500), &opts()).unwrap();
        let labels: Vec<&str> = req.graph.nodes().iter().map(|n| n.kind.label()).collect();
        assert!(labels.contains(&"crossfade"), "{labels:?}");
        // Both sources present, one sink.
        assert_eq!(labels.iter().filter(|l| **l == "source_procedural").count(), 2);
        assert_eq!(labels.iter().filter(|l| **l == "odt").count(), 1);
        // Midpoint progress.
        let fade = req
            .graph
            .nodes()
            .iter()
            .find(|n| n.kind.label() == "crossfade")
            .unwrap();
        match fade.kind {
            NodeKind::Crossfade { progress } => assert!((progress - 0.5).abs() < 1e-6),
            _ => unreachable!(),
        }
    }

    #[test]
    fn compile_is_deterministic() {
        let t = three_clip_crossfade_timeline();
        let a = compile_frame(&t, Tick::from_millis(4321), &opts()).unwrap();
        let b = compile_frame(&t, Tick::from_millis(4321), &opts()).unwrap();
        assert_eq!(a.graph.dump(), b.graph.dump());
    }

    #[test]
    fn empty_timeline_compiles_to_black() {
        let t = Timeline {
            tracks: vec![video_track(vec![clip(1, "late", 5000, 1000, "video/smpte_bars")])],
            duration: Tick::from_secs(10),
        };
        let req = compile_frame(&t, Tick::from_secs(1), &opts()).unwrap();
        let labels: Vec<&str> = req.graph.nodes().iter().map(|n| n.kind.label()).collect();
        assert_eq!(labels, vec!["black_fill", "odt"]);
    }

    #[test]
    fn dip_midpoint_resolves_to_dip_node() {
        let mut a = clip(1, "a", 0, 2000, "video/smpte_bars");
        a.transition_out = Some(Transition {
            kind: TransitionKind::DipToColor { color: [0.0; 3] },
            duration: Tick::from_millis(1000),
            easing: Easing::Linear,
        });
        let mut b = clip(2, "b", 1000, 2000, "video/macbeth");
        b.transition_in = a.transition_out.clone();
        let t = Timeline {
            tracks: vec![video_track(vec![a, b])],
            duration: Tick::from_secs(3),
        };
        let req = compile_frame(&t, Tick::from_millis(1500), &opts()).unwrap();
        let dip = req
            .graph
            .nodes()
            .iter()
            .find(|n| n.kind.label() == "dip")
            .expect("dip node");
        match &dip.kind {
            NodeKind::Dip { progress, .. } => assert!((progress - 0.5).abs() < 1e-6),
            _ => unreachable!(),
        }
    }

    #[test]
    fn unknown_feature_fails_preflight_naming_the_clip() {
        let mut c = clip(1, "graded", 0, 1000, "video/smpte_bars");
        c.effects.push(FeatureApplication {
            id: "mv.nope".into(),
            parameters: BTreeMap::new(),
        });
        let t = Timeline {
            tracks: vec![video_track(vec![c])],
            duration: Tick::from_secs(1),
        };
        let err = preflight(&t).unwrap_err();
        assert!(err.to_string().contains("unknown feature id"), "{err}");
        assert!(err.to_string().contains("graded"));
    }

    #[test]
    fn negative_retime_fails_preflight() {
        let mut c = clip(1, "rev", 0, 1000, "video/smpte_bars");
        let mut params = BTreeMap::new();
        params.insert("factor".to_owned(), NodeValue::Float(-2.0));
        c.effects.push(FeatureApplication {
            id: "mv.retime".into(),
            parameters: params,
        });
        let t = Timeline {
            tracks: vec![video_track(vec![c])],
            duration: Tick::from_secs(1),
        };
        let err = preflight(&t).unwrap_err();
        assert!(err.to_string().contains("retime factor must be positive"), "{err}");
    }

    #[test]
    fn retime_scales_source_time_and_emits_marker_node() {
        let mut c = clip(1, "fast", 0, 2000, "video/zone_plate");
        let mut params = BTreeMap::new();
        params.insert("factor".to_owned(), NodeValue::Float(2.0));
        c.effects.push(FeatureApplication {
            id: "mv.retime".into(),
            parameters: params,
        });
        c.offset = Tick::from_millis(100);
        let t = Timeline {
            tracks: vec![video_track(vec![c])],
            duration: Tick::from_secs(2),
        };
        let req = compile_frame(&t, Tick::from_millis(500), &opts()).unwrap();
        let src = &req.graph.nodes()[0];
        match &src.kind {
            NodeKind::SourceProcedural { source, .. } => {
                // 500ms * 2 + 100ms offset.
                assert_eq!(*source, Tick::from_millis(1100));
            }
            _ => unreachable!(),
        }
        assert!(req.graph.nodes().iter().any(|n| n.kind.label() == "retime"));
    }

    #[test]
    fn fading_solo_clip_blends_against_black() {
        let mut c = clip(1, "intro", 0, 2000, "video/smpte_bars");
        c.transition_in = Some(crossfade(1000));
        let t = Timeline {
            tracks: vec![video_track(vec![c])],
            duration: Tick::from_secs(2),
        };
        let req = compile_frame(&t, Tick::from_millis(250), &opts()).unwrap();
        let labels: Vec<&str> = req.graph.nodes().iter().map(|n| n.kind.label()).collect();
        assert!(labels.contains(&"black_fill"));
        let fade = req
            .graph
            .nodes()
            .iter()
            .find(|n| n.kind.label() == "crossfade")
            .unwrap();
        match fade.kind {
            NodeKind::Crossfade { progress } => assert!((progress - 0.25).abs() < 1e-6),
            _ => unreachable!(),
        }
    }
}
