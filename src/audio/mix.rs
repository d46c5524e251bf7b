//! Audio mixing.
//!
//! The mixer produces stereo interleaved f32 for a tick window: the sum of
//! all active audio clips with linear crossfades at transition edges,
//! resampled to the output rate. Mixing happens outside the per-frame render
//! loop and is handed to the container writer as one PCM input.

use crate::assets::procedural;
use crate::assets::reference::ResolvedAsset;
use crate::compile::compiler::resolve_audio_gain;
use crate::foundation::core::{TICKS_PER_SECOND, Tick};
use crate::foundation::error::{MetavisError, MvResult};
use crate::assets::reader::SharedClipReader;
use crate::timeline::model::{Clip, Timeline};
use std::path::Path;

/// Whether and when a deliverable carries an audio track.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioPolicy {
    /// Never emit an audio track.
    Forbidden,
    /// Always emit one; QC rejects the deliverable if it is silent.
    Required,
    /// Emit a track only when at least one clip contributes signal.
    Auto,
}

/// Convert a tick to the nearest output sample (half-sample epsilon on
/// boundary inclusion).
pub fn tick_to_sample(t: Tick, sample_rate: u32) -> u64 {
    procedural::tick_to_sample(t, sample_rate)
}

/// Signed integer ceiling division (`i128::div_ceil` is not yet stable).
fn div_ceil_i128(a: i128, b: i128) -> i128 {
    let d = a / b;
    let r = a % b;
    if (r > 0 && b > 0) || (r < 0 && b < 0) {
        d + 1
    } else {
        d
    }
}

/// Mix all audio tracks over `[t0, t1)` into stereo interleaved f32.
pub fn mix_window(
    timeline: &Timeline,
    reader: &SharedClipReader,
    t0: Tick,
    t1: Tick,
    sample_rate: u32,
) -> MvResult<Vec<f32>> {
    let s0 = tick_to_sample(t0, sample_rate);
    let s1 = tick_to_sample(t1, sample_rate);
    let frames = s1.saturating_sub(s0) as usize;
    let mut out = vec![0.0f32; frames * 2];

    for track in timeline.audio_tracks() {
        for clip in track.sorted_clips() {
            mix_clip(&mut out, reader, clip, s0, s1, sample_rate)?;
        }
    }

    for s in &mut out {
        *s = s.clamp(-1.0, 1.0);
    }
    Ok(out)
}

/// Mix the whole timeline in one-second windows.
///
/// Windowing is an implementation detail: generators and decode sources are
/// functions of the absolute sample index, so concatenated windows are
/// identical to one big mix.
pub fn mix_timeline(
    timeline: &Timeline,
    reader: &SharedClipReader,
    sample_rate: u32,
) -> MvResult<Vec<f32>> {
    let mut out = Vec::new();
    let mut t = Tick::ZERO;
    let window = Tick::from_secs(1);
    while t < timeline.duration {
        let end = (t + window).min(timeline.duration);
        out.extend(mix_window(timeline, reader, t, end, sample_rate)?);
        t = end;
    }
    Ok(out)
}

fn mix_clip(
    out: &mut [f32],
    reader: &SharedClipReader,
    clip: &Clip,
    s0: u64,
    s1: u64,
    sample_rate: u32,
) -> MvResult<()> {
    let clip_s0 = tick_to_sample(clip.start, sample_rate);
    let clip_s1 = tick_to_sample(clip.end(), sample_rate);
    let lo = clip_s0.max(s0);
    let hi = clip_s1.min(s1);
    if lo >= hi {
        return Ok(());
    }

    let gain = resolve_audio_gain(clip)?;
    let offset_samples = tick_to_sample(clip.offset, sample_rate);

    // Source samples for the contributing range.
    let src_lo = lo - clip_s0 + offset_samples;
    let src_hi = hi - clip_s0 + offset_samples;
    let source: SourceSamples = match clip.asset.resolve()? {
        ResolvedAsset::Ligm { kind, query } => {
            if !procedural::is_audio_kind(&kind) {
                return Err(MetavisError::asset(format!(
                    "ligm kind '{kind}' is not an audio source (clip '{}')",
                    clip.name
                )));
            }
            // Widen by a couple of samples so tick/sample rounding can never
            // clip the window edges.
            let t_lo = Tick(
                (src_lo.saturating_sub(2) as i128 * TICKS_PER_SECOND as i128
                    / sample_rate as i128) as i64,
            );
            let t_hi = Tick(
                div_ceil_i128(
                    (src_hi + 2) as i128 * TICKS_PER_SECOND as i128,
                    sample_rate as i128,
                ) as i64,
            );
            let samples =
                procedural::audio_samples(&kind, &query, clip.asset.seed(), t_lo, t_hi, sample_rate)?;
            SourceSamples::Owned {
                samples,
                first: tick_to_sample(t_lo, sample_rate),
            }
        }
        ResolvedAsset::File { .. } => SourceSamples::Shared(reader.fetch_audio(&clip.asset)?),
    };

    let fade_in = clip
        .transition_in
        .as_ref()
        .map(|tr| tick_to_sample(tr.duration, sample_rate))
        .unwrap_or(0);
    let fade_out = clip
        .transition_out
        .as_ref()
        .map(|tr| tick_to_sample(tr.duration, sample_rate))
        .unwrap_or(0);
    let clip_len = clip_s1 - clip_s0;

    for n in lo..hi {
        let rel = n - clip_s0;
        let src_idx = rel + offset_samples;
        let Some((l, r)) = source.stereo(src_idx) else {
            break;
        };

        // Linear crossfade gains at transition edges.
        let mut g = gain;
        if fade_in > 0 && rel < fade_in {
            g *= rel as f32 / fade_in as f32;
        }
        if fade_out > 0 && clip_len - rel <= fade_out {
            g *= (clip_len - rel) as f32 / fade_out as f32;
        }

        let i = (n - s0) as usize * 2;
        out[i] += l * g;
        out[i + 1] += r * g;
    }
    Ok(())
}

enum SourceSamples {
    /// Window generated on demand; `first` is the absolute source sample of
    /// index 0.
    Owned { samples: Vec<f32>, first: u64 },
    /// Whole decoded track shared from the reader cache.
    Shared(std::sync::Arc<crate::assets::media::AudioPcm>),
}

impl SourceSamples {
    fn stereo(&self, src_idx: u64) -> Option<(f32, f32)> {
        match self {
            SourceSamples::Owned { samples, first } => {
                let rel = src_idx.checked_sub(*first)? as usize;
                let i = rel * 2;
                if i + 1 < samples.len() {
                    Some((samples[i], samples[i + 1]))
                } else {
                    None
                }
            }
            SourceSamples::Shared(pcm) => {
                let ch = pcm.channels.max(1) as usize;
                let i = src_idx as usize * ch;
                if i + ch - 1 < pcm.interleaved_f32.len() {
                    let l = pcm.interleaved_f32[i];
                    let r = if ch > 1 { pcm.interleaved_f32[i + 1] } else { l };
                    Some((l, r))
                } else {
                    None
                }
            }
        }
    }
}

/// Whether any sample exceeds the silence floor.
pub fn has_signal(samples: &[f32]) -> bool {
    samples.iter().any(|s| s.abs() > 1e-6)
}

/// Write interleaved f32 PCM as raw little-endian `.f32le`.
pub fn write_f32le(samples: &[f32], out_path: &Path) -> MvResult<()> {
    if let Some(parent) = out_path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .map_err(|e| MetavisError::io(format!("mkdir '{}': {e}", parent.display())))?;
    }
    let mut bytes = Vec::with_capacity(samples.len() * 4);
    for s in samples {
        bytes.extend_from_slice(&s.to_le_bytes());
    }
    std::fs::write(out_path, bytes)
        .map_err(|e| MetavisError::io(format!("write '{}': {e}", out_path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::reader::{CacheLimits, SharedClipReader};
    use crate::assets::reference::AssetReference;
    use crate::timeline::model::{ClipId, Easing, Track, TrackKind, Transition, TransitionKind};

    fn sine_clip(id: u64, start_ms: i64, dur_ms: i64, freq: u32) -> Clip {
        Clip {
            id: ClipId(id),
            name: format!("tone{id}"),
            asset: AssetReference::ligm(format!("tone{id}"), format!("audio/sine?freq={freq}")),
            start: Tick::from_millis(start_ms),
            duration: Tick::from_millis(dur_ms),
            offset: Tick::ZERO,
            transition_in: None,
            transition_out: None,
            effects: Vec::new(),
        }
    }

    fn timeline(clips: Vec<Clip>, dur_ms: i64) -> Timeline {
        Timeline {
            tracks: vec![Track {
                name: "a1".into(),
                kind: TrackKind::Audio,
                clips,
            }],
            duration: Tick::from_millis(dur_ms),
        }
    }

    fn reader() -> SharedClipReader {
        SharedClipReader::new(CacheLimits::default())
    }

    #[test]
    fn sine_clip_contributes_signal_inside_its_extent() {
        let t = timeline(vec![sine_clip(1, 500, 1000, 1000)], 2000);
        let mix = mix_window(&t, &reader(), Tick::ZERO, Tick::from_secs(2), 48_000).unwrap();
        let first_window = &mix[..2 * 12_000]; // 0..250ms
        let mid_window = &mix[2 * 48_000..2 * 60_000]; // 1.0..1.25s
        assert!(!has_signal(first_window));
        assert!(has_signal(mid_window));
    }

    #[test]
    fn windowed_mix_equals_whole_mix() {
        let t = timeline(vec![sine_clip(1, 0, 1500, 440)], 1500);
        let r = reader();
        let whole = mix_window(&t, &r, Tick::ZERO, Tick::from_millis(1500), 48_000).unwrap();
        let windowed = mix_timeline(&t, &r, 48_000).unwrap();
        assert_eq!(whole.len(), windowed.len());
        assert_eq!(whole, windowed);
    }

    #[test]
    fn crossfade_edges_ramp_linearly() {
        let mut c = sine_clip(1, 0, 1000, 1000);
        c.transition_in = Some(Transition {
            kind: TransitionKind::Crossfade,
            duration: Tick::from_millis(500),
            easing: Easing::Linear,
        });
        let t = timeline(vec![c], 1000);
        let mix = mix_window(&t, &reader(), Tick::ZERO, Tick::from_secs(1), 48_000).unwrap();
        // Peak over the first 50ms is tiny relative to the post-fade peak.
        let early: f32 = mix[..2 * 2400].iter().map(|v| v.abs()).fold(0.0, f32::max);
        let late: f32 = mix[2 * 30_000..2 * 36_000]
            .iter()
            .map(|v| v.abs())
            .fold(0.0, f32::max);
        assert!(early < late * 0.3, "early {early} late {late}");
    }

    #[test]
    fn offset_shifts_the_source_window() {
        let mut marked = Clip {
            id: ClipId(1),
            name: "marker".into(),
            asset: AssetReference::ligm("marker", "audio/marker?at=1.0"),
            start: Tick::ZERO,
            duration: Tick::from_secs(2),
            offset: Tick::ZERO,
            transition_in: None,
            transition_out: None,
            effects: Vec::new(),
        };
        let t = timeline(vec![marked.clone()], 2000);
        let r = reader();
        let plain = mix_window(&t, &r, Tick::ZERO, Tick::from_secs(2), 48_000).unwrap();
        let peak_at = first_peak(&plain);
        assert!((peak_at - 1.0).abs() < 0.01, "peak at {peak_at}");

        marked.offset = Tick::from_millis(250);
        let t2 = timeline(vec![marked], 2000);
        let shifted = mix_window(&t2, &r, Tick::ZERO, Tick::from_secs(2), 48_000).unwrap();
        let peak_at = first_peak(&shifted);
        assert!((peak_at - 0.75).abs() < 0.01, "peak at {peak_at}");
    }

    fn first_peak(mix: &[f32]) -> f64 {
        for (i, chunk) in mix.chunks_exact(2).enumerate() {
            if chunk[0].abs() > 0.05 {
                return i as f64 / 48_000.0;
            }
        }
        f64::INFINITY
    }

    #[test]
    fn mix_is_clamped() {
        // Four coincident full-scale impulses sum past 1.0 and are clamped.
        let clips: Vec<Clip> = (1..=4)
            .map(|i| Clip {
                id: ClipId(i),
                name: format!("imp{i}"),
                asset: AssetReference::ligm(format!("imp{i}"), "audio/impulse?interval=0.5"),
                start: Tick::ZERO,
                duration: Tick::from_secs(1),
                offset: Tick::ZERO,
                transition_in: None,
                transition_out: None,
                effects: Vec::new(),
            })
            .collect();
        let t = timeline(clips, 1000);
        let mix = mix_window(&t, &reader(), Tick::ZERO, Tick::from_secs(1), 48_000).unwrap();
        assert!(mix.iter().all(|s| (-1.0..=1.0).contains(s)));
        assert!(mix.iter().any(|s| *s == 1.0));
    }
}
