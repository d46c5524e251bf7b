//! The process-wide kernel library.
//!
//! Kernels are the execution side of the closed node catalog. The library is
//! initialized once from the packaged kernel table; a table that fails to
//! cover the catalog is a fatal, typed engine fault with no fallback path.
//!
//! Every kernel calls the CPU reference transforms in [`crate::color`], which
//! is what keeps the device and the reference bit-exact on shared fixtures.

use crate::assets::reader::{FrameData, SharedClipReader, SourceFrame};
use crate::color::space::ColorSpace;
use crate::color::transform::{
    cdl, false_color, idt, lut3d_sample, luma, odt, sanitize, tonemap_aces,
};
use crate::engine::pool::{Surface, TexturePool};
use crate::engine::PixelBuffer;
use crate::foundation::cancel::CancelToken;
use crate::foundation::error::{EngineFault, MetavisError, MvResult};
use crate::foundation::math::quantize_unorm;
use crate::graph::node::{BlendMode, NodeKind, RenderNode, WipeDirection};
use rayon::prelude::*;
use std::collections::BTreeSet;
use std::sync::OnceLock;

/// The packaged kernel table, embedded at build time.
const KERNEL_MANIFEST: &str = include_str!("kernels.manifest");

/// Rows below this size are not worth fanning out to the rayon pool.
const PARALLEL_ROW_THRESHOLD: usize = 64;

/// Process-wide, read-only kernel table.
pub struct KernelLibrary {
    ids: BTreeSet<&'static str>,
}

static LIBRARY: OnceLock<Result<KernelLibrary, String>> = OnceLock::new();

/// One-shot library initialization.
///
/// Fails with [`EngineFault::KernelLibrary`] when the packaged table does not
/// cover the full node catalog; there is no silent source-compilation
/// fallback.
pub fn kernel_library() -> MvResult<&'static KernelLibrary> {
    let init = LIBRARY.get_or_init(|| {
        let ids: BTreeSet<&'static str> = KERNEL_MANIFEST
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty() && !l.starts_with('#'))
            .collect();
        for label in NodeKind::LABELS {
            if !ids.contains(label) {
                return Err(format!("packaged kernel table is missing '{label}'"));
            }
        }
        Ok(KernelLibrary { ids })
    });
    match init {
        Ok(lib) => Ok(lib),
        Err(msg) => Err(MetavisError::Engine(EngineFault::KernelLibrary(
            msg.clone(),
        ))),
    }
}

/// Per-dispatch context shared by all kernels of a frame.
pub(crate) struct KernelCtx<'a> {
    pub(crate) reader: &'a SharedClipReader,
    pub(crate) width: u32,
    pub(crate) height: u32,
    pub(crate) cancel: &'a CancelToken,
}

impl KernelLibrary {
    fn ensure(&self, label: &str) -> MvResult<()> {
        if self.ids.contains(label) {
            Ok(())
        } else {
            Err(MetavisError::Engine(EngineFault::Dispatch(format!(
                "no kernel for '{label}'"
            ))))
        }
    }

    /// Execute a non-sink node into a pooled surface.
    pub(crate) fn run(
        &self,
        node: &RenderNode,
        inputs: &[&Surface],
        pool: &mut TexturePool,
        ctx: &KernelCtx<'_>,
    ) -> MvResult<Surface> {
        self.ensure(node.kind.label())?;
        ctx.cancel.checkpoint()?;

        let mut out = pool.borrow(ctx.width, ctx.height);
        match &node.kind {
            NodeKind::SourceTexture { asset, source } => {
                let frame = ctx.reader.fetch(asset, *source, ctx.width, ctx.height)?;
                upload(&frame, &mut out);
            }
            NodeKind::SourceProcedural {
                spec, asset_id, source,
            } => {
                let asset = crate::assets::reference::AssetReference {
                    id: asset_id.clone(),
                    uri: format!("ligm://{}{}", spec.kind, encode_query(&spec.query)),
                };
                let frame = ctx.reader.fetch(&asset, *source, ctx.width, ctx.height)?;
                upload(&frame, &mut out);
            }
            NodeKind::BlackFill => {
                out.color = ColorSpace::AcesCg;
                for px in out.data.chunks_exact_mut(4) {
                    px[3] = 1.0;
                }
            }
            NodeKind::Idt { from: _ } => {
                // Converts from the tagged source space; the declared `from` is
                // the compiler's expectation and is folded into fingerprints.
                let src = one_input(node, inputs)?;
                let tagged = src.color;
                out.color = ColorSpace::AcesCg;
                map_rgba(src, &mut out, move |px| {
                    let px = sanitize(px);
                    let rgb = idt([px[0], px[1], px[2]], tagged);
                    [rgb[0], rgb[1], rgb[2], px[3]]
                });
            }
            NodeKind::Odt { .. } => {
                return Err(MetavisError::Engine(EngineFault::Dispatch(
                    "odt is the sink and renders through run_odt".to_owned(),
                )));
            }
            NodeKind::ColorCdl {
                slope, offset, power, saturation,
            } => {
                let (slope, offset, power, saturation) = (*slope, *offset, *power, *saturation);
                let src = one_input(node, inputs)?;
                map_rgba(src, &mut out, move |px| {
                    let rgb = cdl([px[0], px[1], px[2]], slope, offset, power, saturation);
                    [rgb[0], rgb[1], rgb[2], px[3]]
                });
            }
            NodeKind::ToneMapAces { exposure } => {
                let exposure = *exposure;
                let src = one_input(node, inputs)?;
                map_rgba(src, &mut out, move |px| {
                    let rgb = tonemap_aces([px[0], px[1], px[2]], exposure);
                    [rgb[0], rgb[1], rgb[2], px[3]]
                });
            }
            NodeKind::Lut3d { size, data } => {
                let size = *size as usize;
                let data = data.clone();
                let src = one_input(node, inputs)?;
                map_rgba(src, &mut out, move |px| {
                    let rgb = lut3d_sample([px[0], px[1], px[2]], size, &data);
                    [rgb[0], rgb[1], rgb[2], px[3]]
                });
            }
            NodeKind::FalseColor { map, exposure, gamma } => {
                let (map, exposure, gamma) = (*map, *exposure, *gamma);
                let src = one_input(node, inputs)?;
                map_rgba(src, &mut out, move |px| {
                    let rgb = false_color(luma([px[0], px[1], px[2]]), map, exposure, gamma);
                    [rgb[0], rgb[1], rgb[2], px[3]]
                });
            }
            NodeKind::Composite { blend } => {
                let blend = *blend;
                let (under, over) = two_inputs(node, inputs)?;
                zip_rgba(under, over, &mut out, move |a, b| {
                    let a = sanitize(a);
                    let b = sanitize(b);
                    match blend {
                        BlendMode::Over => {
                            let k = 1.0 - b[3];
                            [
                                b[0] + a[0] * k,
                                b[1] + a[1] * k,
                                b[2] + a[2] * k,
                                b[3] + a[3] * k,
                            ]
                        }
                        BlendMode::Add => [a[0] + b[0], a[1] + b[1], a[2] + b[2], (a[3] + b[3]).min(1.0)],
                    }
                });
            }
            NodeKind::Crossfade { progress } => {
                let p = progress.clamp(0.0, 1.0);
                let (a, b) = two_inputs(node, inputs)?;
                zip_rgba(a, b, &mut out, move |a, b| {
                    let a = sanitize(a);
                    let b = sanitize(b);
                    [
                        a[0] + (b[0] - a[0]) * p,
                        a[1] + (b[1] - a[1]) * p,
                        a[2] + (b[2] - a[2]) * p,
                        a[3] + (b[3] - a[3]) * p,
                    ]
                });
            }
            NodeKind::Dip { color, progress } => {
                let p = progress.clamp(0.0, 1.0);
                let c = [color[0], color[1], color[2], 1.0f32];
                let (a, b) = two_inputs(node, inputs)?;
                zip_rgba(a, b, &mut out, move |a, b| {
                    let a = sanitize(a);
                    let b = sanitize(b);
                    if p < 0.5 {
                        let k = p * 2.0;
                        [
                            a[0] + (c[0] - a[0]) * k,
                            a[1] + (c[1] - a[1]) * k,
                            a[2] + (c[2] - a[2]) * k,
                            a[3] + (c[3] - a[3]) * k,
                        ]
                    } else {
                        let k = p * 2.0 - 1.0;
                        [
                            c[0] + (b[0] - c[0]) * k,
                            c[1] + (b[1] - c[1]) * k,
                            c[2] + (b[2] - c[2]) * k,
                            c[3] + (b[3] - c[3]) * k,
                        ]
                    }
                });
            }
            NodeKind::Wipe { direction, progress } => {
                let p = progress.clamp(0.0, 1.0);
                let (dir, w, h) = (*direction, ctx.width, ctx.height);
                let (a, b) = two_inputs(node, inputs)?;
                zip_rgba_xy(a, b, &mut out, move |a, b, x, y| {
                    let entered = match dir {
                        WipeDirection::LeftToRight => (x as f32 + 0.5) < p * w as f32,
                        WipeDirection::RightToLeft => (x as f32 + 0.5) > (1.0 - p) * w as f32,
                        WipeDirection::TopToBottom => (y as f32 + 0.5) < p * h as f32,
                        WipeDirection::BottomToTop => (y as f32 + 0.5) > (1.0 - p) * h as f32,
                    };
                    if entered { sanitize(b) } else { sanitize(a) }
                });
            }
            NodeKind::Retime { .. } => {
                let src = one_input(node, inputs)?;
                out.color = src.color;
                out.data.copy_from_slice(&src.data);
            }
            NodeKind::Watermark { spec } => {
                let opacity = spec.opacity.clamp(0.0, 1.0);
                let (w, h) = (ctx.width, ctx.height);
                let stripe = (w / 16).max(8);
                let src = one_input(node, inputs)?;
                // Stripe overlay plus a solid corner block carrying the tag.
                let tag_w = (w / 6).max(8);
                let tag_h = (h / 24).max(4);
                zip_xy(src, &mut out, move |px, x, y| {
                    let striped = ((x + y) / stripe) % 2 == 0;
                    let in_tag = x >= w - tag_w && y >= h - tag_h;
                    let k = if in_tag {
                        opacity
                    } else if striped {
                        opacity * 0.25
                    } else {
                        0.0
                    };
                    [
                        px[0] + (1.0 - px[0]) * k,
                        px[1] + (1.0 - px[1]) * k,
                        px[2] + (1.0 - px[2]) * k,
                        px[3].max(k),
                    ]
                });
            }
        }
        Ok(out)
    }

    /// Execute the `Odt` sink: quantize into the caller-owned pixel buffer.
    ///
    /// This is the only host-visible write of the frame; it goes straight to
    /// the destination buffer, so the hot path performs no readback.
    pub(crate) fn run_odt(
        &self,
        input: &Surface,
        bit_depth: u32,
        out: &mut PixelBuffer,
    ) -> MvResult<()> {
        self.ensure("odt")?;
        if out.width != input.width || out.height != input.height {
            return Err(MetavisError::Engine(EngineFault::Dispatch(format!(
                "destination buffer is {}x{}, sink produced {}x{}",
                out.width, out.height, input.width, input.height
            ))));
        }
        let bits = bit_depth.clamp(1, 8);
        par_rows_u8(&mut out.data, out.width as usize, |row, y| {
            for (x, px) in row.chunks_exact_mut(4).enumerate() {
                let v = sanitize(input.pixel(x as u32, y as u32));
                let display = odt([v[0], v[1], v[2]]);
                px[0] = quantize_unorm(display[0], bits);
                px[1] = quantize_unorm(display[1], bits);
                px[2] = quantize_unorm(display[2], bits);
                px[3] = 255;
            }
        });
        Ok(())
    }
}

fn encode_query(query: &std::collections::BTreeMap<String, String>) -> String {
    if query.is_empty() {
        return String::new();
    }
    let pairs: Vec<String> = query.iter().map(|(k, v)| format!("{k}={v}")).collect();
    format!("?{}", pairs.join("&"))
}

fn one_input<'a>(node: &RenderNode, inputs: &[&'a Surface]) -> MvResult<&'a Surface> {
    inputs.first().copied().ok_or_else(|| {
        MetavisError::Engine(EngineFault::Dispatch(format!(
            "node '{}' is missing its input surface",
            node.name
        )))
    })
}

fn two_inputs<'a>(node: &RenderNode, inputs: &[&'a Surface]) -> MvResult<(&'a Surface, &'a Surface)> {
    match inputs {
        [a, b, ..] => Ok((a, b)),
        _ => Err(MetavisError::Engine(EngineFault::Dispatch(format!(
            "node '{}' is missing input surfaces",
            node.name
        )))),
    }
}

/// Bilinear-sample a source frame (any size, u8 or f32) into `out`.
fn upload(frame: &SourceFrame, out: &mut Surface) {
    out.color = frame.color;
    let (sw, sh) = (frame.width as usize, frame.height as usize);
    let (dw, dh) = (out.width as usize, out.height as usize);
    if sw == 0 || sh == 0 {
        return;
    }

    let fetch = |x: usize, y: usize| -> [f32; 4] {
        let i = (y * sw + x) * 4;
        match &frame.data {
            FrameData::F32(d) => [d[i], d[i + 1], d[i + 2], d[i + 3]],
            FrameData::U8(d) => [
                d[i] as f32 / 255.0,
                d[i + 1] as f32 / 255.0,
                d[i + 2] as f32 / 255.0,
                d[i + 3] as f32 / 255.0,
            ],
        }
    };

    par_rows_f32(&mut out.data, dw, |row, y| {
        let v = ((y as f32 + 0.5) / dh as f32) * sh as f32 - 0.5;
        let y0 = v.floor().clamp(0.0, (sh - 1) as f32) as usize;
        let y1 = (y0 + 1).min(sh - 1);
        let fy = (v - y0 as f32).clamp(0.0, 1.0);
        for (x, px) in row.chunks_exact_mut(4).enumerate() {
            let u = ((x as f32 + 0.5) / dw as f32) * sw as f32 - 0.5;
            let x0 = u.floor().clamp(0.0, (sw - 1) as f32) as usize;
            let x1 = (x0 + 1).min(sw - 1);
            let fx = (u - x0 as f32).clamp(0.0, 1.0);
            let p00 = fetch(x0, y0);
            let p10 = fetch(x1, y0);
            let p01 = fetch(x0, y1);
            let p11 = fetch(x1, y1);
            for c in 0..4 {
                let top = p00[c] + (p10[c] - p00[c]) * fx;
                let bot = p01[c] + (p11[c] - p01[c]) * fx;
                px[c] = top + (bot - top) * fy;
            }
        }
    });
}

fn map_rgba(src: &Surface, out: &mut Surface, f: impl Fn([f32; 4]) -> [f32; 4] + Sync) {
    let w = out.width as usize;
    par_rows_f32(&mut out.data, w, |row, y| {
        for (x, px) in row.chunks_exact_mut(4).enumerate() {
            let v = f(src.pixel(x as u32, y as u32));
            px.copy_from_slice(&v);
        }
    });
}

fn zip_rgba(
    a: &Surface,
    b: &Surface,
    out: &mut Surface,
    f: impl Fn([f32; 4], [f32; 4]) -> [f32; 4] + Sync,
) {
    zip_rgba_xy(a, b, out, move |a, b, _, _| f(a, b));
}

fn zip_rgba_xy(
    a: &Surface,
    b: &Surface,
    out: &mut Surface,
    f: impl Fn([f32; 4], [f32; 4], u32, u32) -> [f32; 4] + Sync,
) {
    let w = out.width as usize;
    par_rows_f32(&mut out.data, w, |row, y| {
        for (x, px) in row.chunks_exact_mut(4).enumerate() {
            let v = f(
                a.pixel(x as u32, y as u32),
                b.pixel(x as u32, y as u32),
                x as u32,
                y as u32,
            );
            px.copy_from_slice(&v);
        }
    });
}

fn zip_xy(src: &Surface, out: &mut Surface, f: impl Fn([f32; 4], u32, u32) -> [f32; 4] + Sync) {
    let w = out.width as usize;
    par_rows_f32(&mut out.data, w, |row, y| {
        for (x, px) in row.chunks_exact_mut(4).enumerate() {
            let v = f(src.pixel(x as u32, y as u32), x as u32, y as u32);
            px.copy_from_slice(&v);
        }
    });
}

fn par_rows_f32(data: &mut [f32], width: usize, f: impl Fn(&mut [f32], usize) + Sync) {
    let row_len = width * 4;
    if row_len == 0 {
        return;
    }
    if data.len() / row_len < PARALLEL_ROW_THRESHOLD {
        for (y, row) in data.chunks_mut(row_len).enumerate() {
            f(row, y);
        }
    } else {
        data.par_chunks_mut(row_len)
            .enumerate()
            .for_each(|(y, row)| f(row, y));
    }
}

fn par_rows_u8(data: &mut [u8], width: usize, f: impl Fn(&mut [u8], usize) + Sync) {
    let row_len = width * 4;
    if row_len == 0 {
        return;
    }
    if data.len() / row_len < PARALLEL_ROW_THRESHOLD {
        for (y, row) in data.chunks_mut(row_len).enumerate() {
            f(row, y);
        }
    } else {
        data.par_chunks_mut(row_len)
            .enumerate()
            .for_each(|(y, row)| f(row, y));
    }
}
