//! Procedural LIGM sources.
//!
//! Video generators fill display-referred Rec.709 RGBA float planes; audio
//! generators produce interleaved stereo samples at the mix rate. Everything
//! here is a pure function of the asset seed, parameters, and requested time,
//! which is what keeps procedural timelines byte-reproducible.

use crate::assets::reference::query_f64;
use crate::color::space::ColorSpace;
use crate::foundation::core::{TICKS_PER_SECOND, Tick};
use crate::foundation::error::{MetavisError, MvResult};
use crate::foundation::math::SplitMix64;
use std::collections::BTreeMap;

/// A generated video frame in `color` space, RGBA interleaved f32.
#[derive(Debug)]
pub(crate) struct GeneratedFrame {
    pub(crate) width: u32,
    pub(crate) height: u32,
    pub(crate) rgba: Vec<f32>,
    pub(crate) color: ColorSpace,
}

/// Whether `kind` names a video generator.
pub(crate) fn is_video_kind(kind: &str) -> bool {
    matches!(
        kind,
        "video/smpte_bars"
            | "video/macbeth"
            | "video/zone_plate"
            | "video/frame_counter"
            | "video/solid"
    )
}

/// Whether `kind` names an audio generator.
pub(crate) fn is_audio_kind(kind: &str) -> bool {
    matches!(
        kind,
        "audio/sine"
            | "audio/white_noise"
            | "audio/pink_noise"
            | "audio/sweep"
            | "audio/impulse"
            | "audio/marker"
    )
}

/// Synthesize a video frame for `kind` at source time `t`.
pub(crate) fn video_frame(
    kind: &str,
    query: &BTreeMap<String, String>,
    t: Tick,
    width: u32,
    height: u32,
) -> MvResult<GeneratedFrame> {
    let mut rgba = vec![0.0f32; width as usize * height as usize * 4];
    let secs = t.0 as f64 / TICKS_PER_SECOND as f64;
    match kind {
        "video/smpte_bars" => smpte_bars(&mut rgba, width, height),
        "video/macbeth" => macbeth(&mut rgba, width, height),
        "video/zone_plate" => {
            let speed = query_f64(query, "speed", 1.0)?;
            zone_plate(&mut rgba, width, height, secs * speed);
        }
        "video/frame_counter" => {
            let fps = query_f64(query, "fps", 24.0)?;
            frame_counter(&mut rgba, width, height, (secs * fps).floor() as u64);
        }
        "video/solid" => {
            let rgb = parse_hex_rgb(query.get("rgb").map(String::as_str).unwrap_or("000000"))?;
            fill(&mut rgba, rgb);
        }
        other => {
            return Err(MetavisError::asset(format!(
                "unknown procedural video kind '{other}'"
            )));
        }
    }
    Ok(GeneratedFrame {
        width,
        height,
        rgba,
        color: ColorSpace::Rec709Display,
    })
}

fn set_px(rgba: &mut [f32], width: u32, x: u32, y: u32, c: [f32; 3]) {
    let i = (y as usize * width as usize + x as usize) * 4;
    rgba[i] = c[0];
    rgba[i + 1] = c[1];
    rgba[i + 2] = c[2];
    rgba[i + 3] = 1.0;
}

fn fill(rgba: &mut [f32], c: [f32; 3]) {
    for px in rgba.chunks_exact_mut(4) {
        px[0] = c[0];
        px[1] = c[1];
        px[2] = c[2];
        px[3] = 1.0;
    }
}

const BARS_75: [[f32; 3]; 7] = [
    [0.75, 0.75, 0.75],
    [0.75, 0.75, 0.0],
    [0.0, 0.75, 0.75],
    [0.0, 0.75, 0.0],
    [0.75, 0.0, 0.75],
    [0.75, 0.0, 0.0],
    [0.0, 0.0, 0.75],
];

fn smpte_bars(rgba: &mut [f32], width: u32, height: u32) {
    let bars_h = height * 2 / 3;
    for y in 0..height {
        for x in 0..width {
            let c = if y < bars_h {
                BARS_75[(x as usize * 7 / width as usize).min(6)]
            } else if x < width / 2 {
                // Luma ramp strip.
                let t = x as f32 / (width / 2).max(1) as f32;
                [t, t, t]
            } else {
                [0.0, 0.0, 0.0]
            };
            set_px(rgba, width, x, y, c);
        }
    }
}

// Classic 24-patch chart, sRGB 8-bit values.
const MACBETH_SRGB: [[u8; 3]; 24] = [
    [115, 82, 68],
    [194, 150, 130],
    [98, 122, 157],
    [87, 108, 67],
    [133, 128, 177],
    [103, 189, 170],
    [214, 126, 44],
    [80, 91, 166],
    [193, 90, 99],
    [94, 60, 108],
    [157, 188, 64],
    [224, 163, 46],
    [56, 61, 150],
    [70, 148, 73],
    [175, 54, 60],
    [231, 199, 31],
    [187, 86, 149],
    [8, 133, 161],
    [243, 243, 242],
    [200, 200, 200],
    [160, 160, 160],
    [122, 122, 121],
    [85, 85, 85],
    [52, 52, 52],
];

fn macbeth(rgba: &mut [f32], width: u32, height: u32) {
    let cols = 6u32;
    let rows = 4u32;
    let cell_w = width / cols;
    let cell_h = height / rows;
    let grout = (cell_w.min(cell_h) / 12).max(1);
    for y in 0..height {
        for x in 0..width {
            let cx = (x / cell_w.max(1)).min(cols - 1);
            let cy = (y / cell_h.max(1)).min(rows - 1);
            let in_grout = x % cell_w.max(1) < grout || y % cell_h.max(1) < grout;
            let c = if in_grout {
                [0.08, 0.08, 0.08]
            } else {
                let p = MACBETH_SRGB[(cy * cols + cx) as usize];
                [
                    p[0] as f32 / 255.0,
                    p[1] as f32 / 255.0,
                    p[2] as f32 / 255.0,
                ]
            };
            set_px(rgba, width, x, y, c);
        }
    }
}

fn zone_plate(rgba: &mut [f32], width: u32, height: u32, phase_secs: f64) {
    let cx = width as f64 / 2.0;
    let cy = height as f64 / 2.0;
    let max_r2 = cx * cx + cy * cy;
    let cycles = 32.0;
    let phase = phase_secs * std::f64::consts::TAU;
    for y in 0..height {
        for x in 0..width {
            let dx = x as f64 - cx;
            let dy = y as f64 - cy;
            let r2 = (dx * dx + dy * dy) / max_r2;
            let v = 0.5 + 0.5 * (r2 * cycles * std::f64::consts::PI + phase).cos();
            let v = v as f32;
            set_px(rgba, width, x, y, [v, v, v]);
        }
    }
}

// 3x5 digit glyphs, one bit per cell, row-major from the top.
const DIGITS_3X5: [[u8; 5]; 10] = [
    [0b111, 0b101, 0b101, 0b101, 0b111],
    [0b010, 0b110, 0b010, 0b010, 0b111],
    [0b111, 0b001, 0b111, 0b100, 0b111],
    [0b111, 0b001, 0b111, 0b001, 0b111],
    [0b101, 0b101, 0b111, 0b001, 0b001],
    [0b111, 0b100, 0b111, 0b001, 0b111],
    [0b111, 0b100, 0b111, 0b101, 0b111],
    [0b111, 0b001, 0b010, 0b010, 0b010],
    [0b111, 0b101, 0b111, 0b101, 0b111],
    [0b111, 0b101, 0b111, 0b001, 0b111],
];

fn frame_counter(rgba: &mut [f32], width: u32, height: u32, frame: u64) {
    fill(rgba, [0.1, 0.1, 0.1]);
    let digits: Vec<u8> = frame
        .to_string()
        .bytes()
        .map(|b| b - b'0')
        .collect();
    let scale = (height / 8).max(1);
    let glyph_w = 4 * scale;
    let total_w = glyph_w * digits.len() as u32;
    let x0 = width.saturating_sub(total_w) / 2;
    let y0 = height.saturating_sub(5 * scale) / 2;
    for (di, d) in digits.iter().enumerate() {
        let glyph = DIGITS_3X5[*d as usize];
        for (row, bits) in glyph.iter().enumerate() {
            for col in 0..3u32 {
                if bits & (0b100 >> col) == 0 {
                    continue;
                }
                for sy in 0..scale {
                    for sx in 0..scale {
                        let x = x0 + di as u32 * glyph_w + col * scale + sx;
                        let y = y0 + row as u32 * scale + sy;
                        if x < width && y < height {
                            set_px(rgba, width, x, y, [0.95, 0.95, 0.95]);
                        }
                    }
                }
            }
        }
    }
}

fn parse_hex_rgb(hex: &str) -> MvResult<[f32; 3]> {
    let hex = hex.trim_start_matches('#');
    if hex.len() != 6 || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(MetavisError::asset(format!(
            "solid rgb must be 6 hex digits, got '{hex}'"
        )));
    }
    let v = u32::from_str_radix(hex, 16).expect("validated hex");
    Ok([
        ((v >> 16) & 0xff) as f32 / 255.0,
        ((v >> 8) & 0xff) as f32 / 255.0,
        (v & 0xff) as f32 / 255.0,
    ])
}

/// Synthesize stereo interleaved samples for the window `[t0, t1)`.
///
/// Sample `n` of a generator depends only on `(seed, absolute sample index)`,
/// so any windowing of the same range concatenates to identical output.
pub(crate) fn audio_samples(
    kind: &str,
    query: &BTreeMap<String, String>,
    seed: u64,
    t0: Tick,
    t1: Tick,
    sample_rate: u32,
) -> MvResult<Vec<f32>> {
    let s0 = tick_to_sample(t0, sample_rate);
    let s1 = tick_to_sample(t1, sample_rate);
    let frames = s1.saturating_sub(s0) as usize;
    let mut out = vec![0.0f32; frames * 2];
    let rate = sample_rate as f64;

    match kind {
        "audio/sine" => {
            let freq = query_f64(query, "freq", 440.0)?;
            for i in 0..frames {
                let t = (s0 + i as u64) as f64 / rate;
                let v = (std::f64::consts::TAU * freq * t).sin() as f32 * 0.5;
                out[i * 2] = v;
                out[i * 2 + 1] = v;
            }
        }
        "audio/white_noise" => {
            for i in 0..frames {
                let v = hash_noise(seed, s0 + i as u64) * 0.5;
                out[i * 2] = v;
                out[i * 2 + 1] = v;
            }
        }
        "audio/pink_noise" => {
            // Voss-style octave sum over hashed noise; windowable because each
            // octave depends only on the decimated absolute index.
            const OCTAVES: u32 = 8;
            for i in 0..frames {
                let n = s0 + i as u64;
                let mut acc = 0.0f32;
                for k in 0..OCTAVES {
                    acc += hash_noise(seed.wrapping_add(k as u64 + 1), n >> k);
                }
                let v = acc / OCTAVES as f32 * 0.5;
                out[i * 2] = v;
                out[i * 2 + 1] = v;
            }
        }
        "audio/sweep" => {
            let start = query_f64(query, "start", 20.0)?;
            let end = query_f64(query, "end", 20_000.0)?;
            let dur = query_f64(query, "duration", 10.0)?.max(1e-6);
            for i in 0..frames {
                let t = (s0 + i as u64) as f64 / rate;
                let k = (end - start) / dur;
                let phase = std::f64::consts::TAU * (start * t + 0.5 * k * t * t);
                let v = phase.sin() as f32 * 0.5;
                out[i * 2] = v;
                out[i * 2 + 1] = v;
            }
        }
        "audio/impulse" => {
            let interval = query_f64(query, "interval", 1.0)?.max(1e-3);
            let step = (interval * rate).round() as u64;
            for i in 0..frames {
                let n = s0 + i as u64;
                if step > 0 && n.is_multiple_of(step) {
                    out[i * 2] = 1.0;
                    out[i * 2 + 1] = 1.0;
                }
            }
        }
        "audio/marker" => {
            // 20 ms 1 kHz burst at `at` seconds; used for timing sync checks.
            let at = query_f64(query, "at", 0.0)?;
            let start = (at * rate).round() as u64;
            let len = (rate * 0.020).round() as u64;
            for i in 0..frames {
                let n = s0 + i as u64;
                if n >= start && n < start + len {
                    let t = (n - start) as f64 / rate;
                    let v = (std::f64::consts::TAU * 1000.0 * t).sin() as f32 * 0.8;
                    out[i * 2] = v;
                    out[i * 2 + 1] = v;
                }
            }
        }
        other => {
            return Err(MetavisError::asset(format!(
                "unknown procedural audio kind '{other}'"
            )));
        }
    }
    Ok(out)
}

fn hash_noise(seed: u64, n: u64) -> f32 {
    SplitMix64::new(seed ^ n.wrapping_mul(0x9e37_79b9_7f4a_7c15)).next_bipolar_f32()
}

pub(crate) fn tick_to_sample(t: Tick, sample_rate: u32) -> u64 {
    let num = t.0.max(0) as u128 * sample_rate as u128;
    let den = TICKS_PER_SECOND as u128;
    // Half-sample rounding keeps boundaries stable across representations.
    ((num + den / 2) / den) as u64
}
