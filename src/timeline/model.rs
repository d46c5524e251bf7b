//! Edit model: clips on kinded tracks, transitions, feature applications.
//!
//! The model is immutable during a compile pass. `validate()` surfaces
//! structural problems as compile errors naming the offending clip; the
//! publish path treats them as fatal.

use crate::assets::reference::AssetReference;
use crate::foundation::core::Tick;
use crate::foundation::error::{MetavisError, MvResult};
use crate::graph::node::{NodeValue, WipeDirection};
use std::collections::BTreeMap;

/// Stable clip identifier; part of the deterministic z-order key.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash,
    serde::Serialize, serde::Deserialize,
)]
pub struct ClipId(pub u64);

/// Easing curve for transition progress.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Easing {
    /// Identity.
    #[default]
    Linear,
    /// Quadratic ease-in.
    EaseIn,
    /// Quadratic ease-out.
    EaseOut,
    /// Quadratic ease-in-out.
    EaseInOut,
}

impl Easing {
    /// Apply the curve to `t`, clamped to `[0,1]`.
    pub fn apply(self, t: f32) -> f32 {
        let t = t.clamp(0.0, 1.0);
        match self {
            Easing::Linear => t,
            Easing::EaseIn => t * t,
            Easing::EaseOut => 1.0 - (1.0 - t) * (1.0 - t),
            Easing::EaseInOut => {
                if t < 0.5 {
                    2.0 * t * t
                } else {
                    1.0 - ((-2.0 * t + 2.0).powi(2) / 2.0)
                }
            }
        }
    }
}

/// Transition kinds.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionKind {
    /// Hard cut; no blend window.
    Cut,
    /// Linear opacity blend.
    Crossfade,
    /// Two-phase dip through `color` (display-referred Rec.709).
    DipToColor {
        /// Dip color.
        color: [f32; 3],
    },
    /// Directional geometric partition.
    Wipe {
        /// Travel direction.
        direction: WipeDirection,
    },
}

/// A transition edge on a clip boundary.
///
/// The outgoing clip owns `transition_out`, the incoming clip owns
/// `transition_in`; durations must match on a shared edit.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Transition {
    /// Kind of blend.
    pub kind: TransitionKind,
    /// Blend window length.
    pub duration: Tick,
    /// Progress shaping.
    #[serde(default)]
    pub easing: Easing,
}

/// A feature applied to a clip, resolved against the static catalog at
/// compile time.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct FeatureApplication {
    /// Fully-qualified feature identifier, e.g. `mv.colorGrade`.
    pub id: String,
    /// Feature parameters.
    #[serde(default)]
    pub parameters: BTreeMap<String, NodeValue>,
}

/// Unit edit on a track.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct Clip {
    /// Stable identifier.
    pub id: ClipId,
    /// Human-readable name for diagnostics.
    pub name: String,
    /// What this clip plays.
    pub asset: AssetReference,
    /// Timeline start.
    pub start: Tick,
    /// Timeline duration.
    pub duration: Tick,
    /// Source start offset.
    #[serde(default)]
    pub offset: Tick,
    /// Transition into this clip.
    #[serde(default)]
    pub transition_in: Option<Transition>,
    /// Transition out of this clip.
    #[serde(default)]
    pub transition_out: Option<Transition>,
    /// Applied features, in order.
    #[serde(default)]
    pub effects: Vec<FeatureApplication>,
}

impl Clip {
    /// Exclusive timeline end.
    pub fn end(&self) -> Tick {
        self.start + self.duration
    }

    /// Whether `[start, end)` contains `t`.
    pub fn contains(&self, t: Tick) -> bool {
        self.start <= t && t < self.end()
    }
}

/// Track payload kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackKind {
    /// Picture.
    Video,
    /// Sound.
    Audio,
    /// Non-rendered data (captions, markers).
    Data,
}

/// Named, kinded, ordered sequence of clips.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct Track {
    /// Track name.
    pub name: String,
    /// Payload kind.
    pub kind: TrackKind,
    /// Clips; sorted by `(start, id)` for compilation.
    pub clips: Vec<Clip>,
}

impl Track {
    /// Clips sorted by the deterministic z-order key `(start, id)`.
    pub fn sorted_clips(&self) -> Vec<&Clip> {
        let mut clips: Vec<&Clip> = self.clips.iter().collect();
        clips.sort_by_key(|c| (c.start, c.id));
        clips
    }
}

/// The whole edit; immutable for rendering.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct Timeline {
    /// Tracks in declaration (stacking) order.
    pub tracks: Vec<Track>,
    /// Total duration; at least the last video clip end.
    pub duration: Tick,
}

impl Timeline {
    /// Validate structural invariants.
    ///
    /// Non-fatal at compile time, fatal at publish when enforced.
    pub fn validate(&self) -> MvResult<()> {
        if self.duration <= Tick::ZERO {
            return Err(MetavisError::compile("timeline duration must be positive"));
        }

        for track in &self.tracks {
            let clips = track.sorted_clips();
            for clip in &clips {
                if clip.duration <= Tick::ZERO {
                    return Err(MetavisError::compile_clip(
                        "clip duration must be positive",
                        &clip.name,
                    ));
                }
                if clip.start < Tick::ZERO || clip.offset < Tick::ZERO {
                    return Err(MetavisError::compile_clip(
                        "clip times must be non-negative",
                        &clip.name,
                    ));
                }
                for tr in [&clip.transition_in, &clip.transition_out].into_iter().flatten() {
                    if tr.duration <= Tick::ZERO {
                        return Err(MetavisError::compile_clip(
                            "transition duration must be positive",
                            &clip.name,
                        ));
                    }
                    if tr.duration > clip.duration {
                        return Err(MetavisError::compile_clip(
                            "transition duration exceeds clip duration",
                            &clip.name,
                        ));
                    }
                }
            }

            for pair in clips.windows(2) {
                let (a, b) = (pair[0], pair[1]);
                if b.start < a.end() {
                    // Overlap is legal only when both sides explain it with a
                    // matching-duration transition pair.
                    let (Some(out), Some(inn)) = (&a.transition_out, &b.transition_in) else {
                        return Err(MetavisError::compile_clip(
                            format!(
                                "clip overlaps '{}' without a transition pair",
                                a.name
                            ),
                            &b.name,
                        ));
                    };
                    if out.duration != inn.duration {
                        return Err(MetavisError::compile_clip(
                            format!(
                                "transition durations disagree with '{}' ({} vs {} ticks)",
                                a.name, out.duration.0, inn.duration.0
                            ),
                            &b.name,
                        ));
                    }
                    let overlap = a.end() - b.start;
                    if overlap > out.duration {
                        return Err(MetavisError::compile_clip(
                            format!(
                                "overlap with '{}' ({} ticks) exceeds the transition window ({} ticks)",
                                a.name, overlap.0, out.duration.0
                            ),
                            &b.name,
                        ));
                    }
                }
            }

            if track.kind == TrackKind::Video
                && let Some(last_end) = clips.iter().map(|c| c.end()).max()
                && last_end > self.duration
            {
                return Err(MetavisError::compile(format!(
                    "track '{}' ends at {} ticks, past the timeline duration {}",
                    track.name, last_end.0, self.duration.0
                )));
            }
        }
        Ok(())
    }

    /// Video tracks in declaration order.
    pub fn video_tracks(&self) -> impl Iterator<Item = &Track> {
        self.tracks.iter().filter(|t| t.kind == TrackKind::Video)
    }

    /// Audio tracks in declaration order.
    pub fn audio_tracks(&self) -> impl Iterator<Item = &Track> {
        self.tracks.iter().filter(|t| t.kind == TrackKind::Audio)
    }

    /// Compact structural summary for the deliverable manifest.
    pub fn summary(&self) -> TimelineSummary {
        TimelineSummary {
            track_count: self.tracks.len(),
            clip_count: self.tracks.iter().map(|t| t.clips.len()).sum(),
            duration_ticks: self.duration.0,
        }
    }
}

/// Structural timeline facts recorded in the manifest.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineSummary {
    /// Number of tracks.
    pub track_count: usize,
    /// Total clip count.
    pub clip_count: usize,
    /// Timeline duration in ticks.
    pub duration_ticks: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn clip(id: u64, name: &str, start_ms: i64, dur_ms: i64) -> Clip {
        Clip {
            id: ClipId(id),
            name: name.to_owned(),
            asset: AssetReference::ligm(name, "video/smpte_bars"),
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

    fn timeline(tracks: Vec<Track>, dur_ms: i64) -> Timeline {
        Timeline {
            tracks,
            duration: Tick::from_millis(dur_ms),
        }
    }

    #[test]
    fn sorted_clips_orders_by_start_then_id() {
        let track = Track {
            name: "v1".into(),
            kind: TrackKind::Video,
            clips: vec![clip(2, "b", 1000, 1000), clip(1, "a", 1000, 1000), clip(3, "c", 0, 500)],
        };
        let order: Vec<u64> = track.sorted_clips().iter().map(|c| c.id.0).collect();
        assert_eq!(order, vec![3, 1, 2]);
    }

    #[test]
    fn unexplained_overlap_is_rejected() {
        let t = timeline(
            vec![Track {
                name: "v1".into(),
                kind: TrackKind::Video,
                clips: vec![clip(1, "a", 0, 2000), clip(2, "b", 1500, 2000)],
            }],
            4000,
        );
        let err = t.validate().unwrap_err();
        assert!(err.to_string().contains("without a transition pair"), "{err}");
        assert!(err.to_string().contains("clip 'b'"));
    }

    #[test]
    fn explained_overlap_with_matching_durations_passes() {
        let mut a = clip(1, "a", 0, 2000);
        a.transition_out = Some(crossfade(500));
        let mut b = clip(2, "b", 1500, 2000);
        b.transition_in = Some(crossfade(500));
        let t = timeline(
            vec![Track {
                name: "v1".into(),
                kind: TrackKind::Video,
                clips: vec![a, b],
            }],
            4000,
        );
        t.validate().unwrap();
    }

    #[test]
    fn mismatched_transition_durations_are_rejected() {
        let mut a = clip(1, "a", 0, 2000);
        a.transition_out = Some(crossfade(500));
        let mut b = clip(2, "b", 1500, 2000);
        b.transition_in = Some(crossfade(400));
        let t = timeline(
            vec![Track {
                name: "v1".into(),
                kind: TrackKind::Video,
                clips: vec![a, b],
            }],
            4000,
        );
        let err = t.validate().unwrap_err();
        assert!(err.to_string().contains("durations disagree"), "{err}");
    }

    #[test]
    fn video_past_duration_is_rejected() {
        let t = timeline(
            vec![Track {
                name: "v1".into(),
                kind: TrackKind::Video,
                clips: vec![clip(1, "a", 0, 5000)],
            }],
            4000,
        );
        let err = t.validate().unwrap_err();
        assert!(err.to_string().contains("past the timeline duration"), "{err}");
    }

    #[test]
    fn easing_endpoints_are_fixed() {
        for e in [Easing::Linear, Easing::EaseIn, Easing::EaseOut, Easing::EaseInOut] {
            assert_eq!(e.apply(0.0), 0.0);
            assert_eq!(e.apply(1.0), 1.0);
        }
        assert!(Easing::EaseIn.apply(0.5) < 0.5);
        assert!(Easing::EaseOut.apply(0.5) > 0.5);
    }
}
