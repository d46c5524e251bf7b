use crate::compile::compiler::RenderRequest;
use crate::color::space::ColorSpace;
use crate::color::transform::FalseColorMap;
use crate::graph::node::{BlendMode, NodeKind, RenderGraph, WipeDirection};
use xxhash_rust::xxh3::Xxh3;

const XXH3_SEED: u64 = 0x6d76_5f67_7261_7068;

/// Stable fingerprint of a compiled frame request.
///
/// Byte-identical graphs hash identically across runs and platforms; this is
/// the checkable form of the compiler determinism invariant and feeds the
/// duplicate-frame elision cache.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FrameFingerprint {
    /// High 64 bits.
    pub hi: u64,
    /// Low 64 bits.
    pub lo: u64,
}

/// Fingerprint a full request (graph + output geometry + tick).
///
/// Two requests with equal fingerprints render identical pixels, which also
/// makes this the key for duplicate-frame elision caches.
pub fn fingerprint_request(req: &RenderRequest) -> FrameFingerprint {
    let mut h = StableHasher::new();
    h.write_u32(req.width);
    h.write_u32(req.height);
    h.write_u64(req.time.0 as u64);
    write_graph(&mut h, &req.graph);
    h.finish()
}

struct StableHasher {
    inner: Xxh3,
}

impl StableHasher {
    fn new() -> Self {
        Self {
            inner: Xxh3::with_seed(XXH3_SEED),
        }
    }

    fn write_bytes(&mut self, b: &[u8]) {
        self.inner.update(b);
    }

    fn write_u8(&mut self, v: u8) {
        self.write_bytes(&[v]);
    }

    fn write_u32(&mut self, v: u32) {
        self.write_bytes(&v.to_le_bytes());
    }

    fn write_u64(&mut self, v: u64) {
        self.write_bytes(&v.to_le_bytes());
    }

    fn write_f32(&mut self, v: f32) {
        self.write_u32(v.to_bits());
    }

    fn write_str(&mut self, s: &str) {
        self.write_u32(s.len() as u32);
        self.write_bytes(s.as_bytes());
    }

    fn finish(self) -> FrameFingerprint {
        let v = self.inner.digest128();
        FrameFingerprint {
            hi: (v >> 64) as u64,
            lo: v as u64,
        }
    }
}

fn write_graph(h: &mut StableHasher, g: &RenderGraph) {
    h.write_u32(g.len() as u32);
    for node in g.nodes() {
        h.write_u32(node.inputs.len() as u32);
        for input in &node.inputs {
            h.write_u32(input.0);
        }
        write_kind(h, &node.kind);
    }
}

fn write_color_space(h: &mut StableHasher, c: ColorSpace) {
    h.write_u8(match c {
        ColorSpace::Rec709Display => 0,
        ColorSpace::Rec709Linear => 1,
        ColorSpace::AcesCg => 2,
    });
}

fn write_wipe_dir(h: &mut StableHasher, d: WipeDirection) {
    h.write_u8(match d {
        WipeDirection::LeftToRight => 0,
        WipeDirection::RightToLeft => 1,
        WipeDirection::TopToBottom => 2,
        WipeDirection::BottomToTop => 3,
    });
}

fn write_kind(h: &mut StableHasher, k: &NodeKind) {
    match k {
        NodeKind::SourceTexture { asset, source } => {
            h.write_u8(0);
            h.write_str(&asset.id);
            h.write_str(&asset.uri);
            h.write_u64(source.0 as u64);
        }
        NodeKind::SourceProcedural {
            spec,
            asset_id,
            source,
        } => {
            h.write_u8(1);
            h.write_str(&spec.kind);
            h.write_u32(spec.query.len() as u32);
            for (k, v) in &spec.query {
                h.write_str(k);
                h.write_str(v);
            }
            h.write_str(asset_id);
            h.write_u64(source.0 as u64);
        }
        NodeKind::BlackFill => h.write_u8(2),
        NodeKind::Idt { from } => {
            h.write_u8(3);
            write_color_space(h, *from);
        }
        NodeKind::Odt { bit_depth } => {
            h.write_u8(4);
            h.write_u32(*bit_depth);
        }
        NodeKind::ColorCdl {
            slope,
            offset,
            power,
            saturation,
        } => {
            h.write_u8(5);
            for v in slope.iter().chain(offset).chain(power) {
                h.write_f32(*v);
            }
            h.write_f32(*saturation);
        }
        NodeKind::ToneMapAces { exposure } => {
            h.write_u8(6);
            h.write_f32(*exposure);
        }
        NodeKind::Lut3d { size, data } => {
            h.write_u8(7);
            h.write_u8(*size);
            for rgb in data.iter() {
                for v in rgb {
                    h.write_f32(*v);
                }
            }
        }
        NodeKind::FalseColor {
            map,
            exposure,
            gamma,
        } => {
            h.write_u8(8);
            h.write_u8(match map {
                FalseColorMap::Turbo => 0,
                FalseColorMap::Gray => 1,
            });
            h.write_f32(*exposure);
            h.write_f32(*gamma);
        }
        NodeKind::Composite { blend } => {
            h.write_u8(9);
            h.write_u8(match blend {
                BlendMode::Over => 0,
                BlendMode::Add => 1,
            });
        }
        NodeKind::Crossfade { progress } => {
            h.write_u8(10);
            h.write_f32(*progress);
        }
        NodeKind::Dip { color, progress } => {
            h.write_u8(11);
            for v in color {
                h.write_f32(*v);
            }
            h.write_f32(*progress);
        }
        NodeKind::Wipe {
            direction,
            progress,
        } => {
            h.write_u8(12);
            write_wipe_dir(h, *direction);
            h.write_f32(*progress);
        }
        NodeKind::Retime { factor } => {
            h.write_u8(13);
            h.write_f32(*factor);
        }
        NodeKind::Watermark { spec } => {
            h.write_u8(14);
            h.write_str(&spec.tag);
            h.write_f32(spec.opacity);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile::compiler::{CompileOptions, compile_frame};
    use crate::assets::reference::AssetReference;
    use crate::foundation::core::Tick;
    use crate::timeline::model::{Clip, ClipId, Timeline, Track, TrackKind};

    fn simple_timeline() -> Timeline {
        Timeline {
            tracks: vec![Track {
                name: "v1".into(),
                kind: TrackKind::Video,
                clips: vec![Clip {
                    id: ClipId(1),
                    name: "bars".into(),
                    asset: AssetReference::ligm("bars", "video/smpte_bars"),
                    start: Tick::ZERO,
                    duration: Tick::from_secs(5),
                    offset: Tick::ZERO,
                    transition_in: None,
                    transition_out: None,
                    effects: Vec::new(),
                }],
            }],
            duration: Tick::from_secs(5),
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

    #[test]
    fn same_inputs_hash_identically() {
        let t = simple_timeline();
        let a = compile_frame(&t, Tick::from_secs(1), &opts()).unwrap();
        let b = compile_frame(&t, Tick::from_secs(1), &opts()).unwrap();
        assert_eq!(fingerprint_request(&a), fingerprint_request(&b));
    }

    #[test]
    fn different_ticks_change_the_request_hash() {
        let t = simple_timeline();
        let a = compile_frame(&t, Tick::from_secs(1), &opts()).unwrap();
        let b = compile_frame(&t, Tick::from_secs(2), &opts()).unwrap();
        assert_ne!(fingerprint_request(&a), fingerprint_request(&b));
    }

    #[test]
    fn output_geometry_changes_the_hash() {
        let t = simple_timeline();
        let a = compile_frame(&t, Tick::from_secs(1), &opts()).unwrap();
        let wide = CompileOptions {
            width: 128,
            ..opts()
        };
        let b = compile_frame(&t, Tick::from_secs(1), &wide).unwrap();
        assert_ne!(fingerprint_request(&a), fingerprint_request(&b));
    }
}
