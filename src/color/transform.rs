//! CPU reference color transforms.
//!
//! These functions are the single numerical source of truth: the engine
//! kernels call them directly, so the reference and the device agree
//! bit-exactly on every fixture by construction.

use crate::color::space::{ACESCG_TO_BT709, BT709_TO_ACESCG, ColorSpace, REC709_LUMA};

/// Multiply a 3x3 matrix with an RGB triple.
#[inline]
pub(crate) fn mat3_mul(m: &[[f32; 3]; 3], v: [f32; 3]) -> [f32; 3] {
    [
        m[0][0] * v[0] + m[0][1] * v[1] + m[0][2] * v[2],
        m[1][0] * v[0] + m[1][1] * v[1] + m[1][2] * v[2],
        m[2][0] * v[0] + m[2][1] * v[1] + m[2][2] * v[2],
    ]
}

/// Display transfer decode (sRGB-style curve) into linear light.
#[inline]
pub fn transfer_decode(v: f32) -> f32 {
    if v <= 0.04045 {
        v / 12.92
    } else {
        ((v + 0.055) / 1.055).powf(2.4)
    }
}

/// Display transfer encode from linear light.
#[inline]
pub fn transfer_encode(v: f32) -> f32 {
    if v <= 0.003_130_8 {
        v * 12.92
    } else {
        1.055 * v.powf(1.0 / 2.4) - 0.055
    }
}

/// Input device transform: convert one RGB sample from `from` into working
/// ACEScg linear.
#[inline]
pub fn idt(rgb: [f32; 3], from: ColorSpace) -> [f32; 3] {
    match from {
        ColorSpace::AcesCg => rgb,
        ColorSpace::Rec709Linear => mat3_mul(&BT709_TO_ACESCG, rgb),
        ColorSpace::Rec709Display => {
            let lin = [
                transfer_decode(rgb[0]),
                transfer_decode(rgb[1]),
                transfer_decode(rgb[2]),
            ];
            mat3_mul(&BT709_TO_ACESCG, lin)
        }
    }
}

/// Output device transform: working ACEScg to display-referred Rec.709 in
/// `[0,1]`, before quantization.
#[inline]
pub fn odt(rgb: [f32; 3]) -> [f32; 3] {
    let lin = mat3_mul(&ACESCG_TO_BT709, rgb);
    [
        transfer_encode(lin[0].clamp(0.0, 1.0)),
        transfer_encode(lin[1].clamp(0.0, 1.0)),
        transfer_encode(lin[2].clamp(0.0, 1.0)),
    ]
}

/// ACES filmic tone map (Narkowicz fit) with a linear exposure multiplier.
#[inline]
pub fn tonemap_aces(rgb: [f32; 3], exposure: f32) -> [f32; 3] {
    fn fit(x: f32) -> f32 {
        let a = 2.51;
        let b = 0.03;
        let c = 2.43;
        let d = 0.59;
        let e = 0.14;
        ((x * (a * x + b)) / (x * (c * x + d) + e)).clamp(0.0, 1.0)
    }
    [
        fit(rgb[0] * exposure),
        fit(rgb[1] * exposure),
        fit(rgb[2] * exposure),
    ]
}

/// ASC CDL in the working space: `(v * slope + offset) ^ power`, then a
/// saturation lerp around Rec.709 luma.
#[inline]
pub fn cdl(rgb: [f32; 3], slope: [f32; 3], offset: [f32; 3], power: [f32; 3], saturation: f32) -> [f32; 3] {
    let mut out = [0.0f32; 3];
    for i in 0..3 {
        let v = (rgb[i] * slope[i] + offset[i]).max(0.0);
        out[i] = v.powf(power[i]);
    }
    let luma = out[0] * REC709_LUMA[0] + out[1] * REC709_LUMA[1] + out[2] * REC709_LUMA[2];
    for c in &mut out {
        *c = luma + (*c - luma) * saturation;
    }
    out
}

/// Rec.709-weighted luma of a linear RGB sample.
#[inline]
pub fn luma(rgb: [f32; 3]) -> f32 {
    rgb[0] * REC709_LUMA[0] + rgb[1] * REC709_LUMA[1] + rgb[2] * REC709_LUMA[2]
}

/// Scalar-to-RGB false color maps.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum FalseColorMap {
    /// Google turbo rainbow map.
    Turbo,
    /// Plain grayscale.
    Gray,
}

/// Map a scalar through a false-color ramp after exposure/gamma shaping.
#[inline]
pub fn false_color(value: f32, map: FalseColorMap, exposure: f32, gamma: f32) -> [f32; 3] {
    let g = if gamma > 0.0 { gamma } else { 1.0 };
    let t = (value * exposure).clamp(0.0, 1.0).powf(1.0 / g);
    match map {
        FalseColorMap::Gray => [t, t, t],
        FalseColorMap::Turbo => turbo(t),
    }
}

// Polynomial fit of the turbo colormap.
fn turbo(t: f32) -> [f32; 3] {
    let r = 0.13572138
        + t * (4.61539260 + t * (-42.66032258 + t * (132.13108234 + t * (-152.94239396 + t * 59.28637943))));
    let g = 0.09140261
        + t * (2.19418839 + t * (4.84296658 + t * (-14.18503333 + t * (4.27729857 + t * 2.82956604))));
    let b = 0.10667330
        + t * (12.64194608 + t * (-60.58204836 + t * (110.36276771 + t * (-89.90310912 + t * 27.34824973))));
    [r.clamp(0.0, 1.0), g.clamp(0.0, 1.0), b.clamp(0.0, 1.0)]
}

/// Trilinear sample of a cubic 3D LUT with `size^3` RGB entries laid out with
/// red fastest.
pub fn lut3d_sample(rgb: [f32; 3], size: usize, data: &[[f32; 3]]) -> [f32; 3] {
    debug_assert_eq!(data.len(), size * size * size);
    if size < 2 {
        return rgb;
    }
    let n = (size - 1) as f32;
    let pos = [
        rgb[0].clamp(0.0, 1.0) * n,
        rgb[1].clamp(0.0, 1.0) * n,
        rgb[2].clamp(0.0, 1.0) * n,
    ];
    let i0 = pos.map(|p| (p.floor() as usize).min(size - 2));
    let f = [
        pos[0] - i0[0] as f32,
        pos[1] - i0[1] as f32,
        pos[2] - i0[2] as f32,
    ];

    let at = |r: usize, g: usize, b: usize| data[b * size * size + g * size + r];
    let mut out = [0.0f32; 3];
    for c in 0..3 {
        let c000 = at(i0[0], i0[1], i0[2])[c];
        let c100 = at(i0[0] + 1, i0[1], i0[2])[c];
        let c010 = at(i0[0], i0[1] + 1, i0[2])[c];
        let c110 = at(i0[0] + 1, i0[1] + 1, i0[2])[c];
        let c001 = at(i0[0], i0[1], i0[2] + 1)[c];
        let c101 = at(i0[0] + 1, i0[1], i0[2] + 1)[c];
        let c011 = at(i0[0], i0[1] + 1, i0[2] + 1)[c];
        let c111 = at(i0[0] + 1, i0[1] + 1, i0[2] + 1)[c];

        let c00 = c000 + (c100 - c000) * f[0];
        let c10 = c010 + (c110 - c010) * f[0];
        let c01 = c001 + (c101 - c001) * f[0];
        let c11 = c011 + (c111 - c011) * f[0];
        let c0 = c00 + (c10 - c00) * f[1];
        let c1 = c01 + (c11 - c01) * f[1];
        out[c] = c0 + (c1 - c0) * f[2];
    }
    out
}

/// Replace NaN/Inf components with 0 ahead of blending.
#[inline]
pub fn sanitize(rgb: [f32; 4]) -> [f32; 4] {
    rgb.map(|v| if v.is_finite() { v } else { 0.0 })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transfer_round_trips() {
        for i in 0..=255u32 {
            let v = i as f32 / 255.0;
            let rt = transfer_encode(transfer_decode(v));
            assert!((rt - v).abs() < 1e-5, "{v} -> {rt}");
        }
    }

    #[test]
    fn idt_then_odt_round_trips_display_values() {
        for v in [[0.0f32, 0.0, 0.0], [1.0, 1.0, 1.0], [0.75, 0.75, 0.75], [0.9, 0.1, 0.2]] {
            let working = idt(v, ColorSpace::Rec709Display);
            let back = odt(working);
            for (a, b) in v.iter().zip(back.iter()) {
                assert!((a - b).abs() < 2e-3, "{v:?} -> {back:?}");
            }
        }
    }

    #[test]
    fn tonemap_is_monotonic_and_bounded() {
        let mut prev = -1.0f32;
        for i in 0..=100 {
            let x = i as f32 / 10.0;
            let y = tonemap_aces([x, x, x], 1.0)[0];
            assert!((0.0..=1.0).contains(&y));
            assert!(y >= prev);
            prev = y;
        }
    }

    #[test]
    fn identity_cdl_is_identity() {
        let v = [0.3f32, 0.5, 0.7];
        let out = cdl(v, [1.0; 3], [0.0; 3], [1.0; 3], 1.0);
        for (a, b) in v.iter().zip(out.iter()) {
            assert!((a - b).abs() < 1e-6);
        }
    }

    #[test]
    fn zero_saturation_cdl_is_gray() {
        let out = cdl([0.9, 0.1, 0.3], [1.0; 3], [0.0; 3], [1.0; 3], 0.0);
        assert!((out[0] - out[1]).abs() < 1e-6);
        assert!((out[1] - out[2]).abs() < 1e-6);
    }

    #[test]
    fn identity_lut_is_identity() {
        let size = 4;
        let mut data = Vec::with_capacity(size * size * size);
        for b in 0..size {
            for g in 0..size {
                for r in 0..size {
                    let n = (size - 1) as f32;
                    data.push([r as f32 / n, g as f32 / n, b as f32 / n]);
                }
            }
        }
        let v = [0.21f32, 0.67, 0.95];
        let out = lut3d_sample(v, size, &data);
        for (a, b) in v.iter().zip(out.iter()) {
            assert!((a - b).abs() < 1e-5);
        }
    }

    #[test]
    fn turbo_endpoints_are_blue_and_red() {
        let lo = false_color(0.0, FalseColorMap::Turbo, 1.0, 1.0);
        let hi = false_color(1.0, FalseColorMap::Turbo, 1.0, 1.0);
        assert!(lo[2] > lo[0], "low end should lean blue: {lo:?}");
        assert!(hi[0] > hi[2], "high end should lean red: {hi:?}");
    }

    #[test]
    fn sanitize_zeroes_non_finite() {
        let out = sanitize([f32::NAN, f32::INFINITY, -f32::INFINITY, 0.5]);
        assert_eq!(out, [0.0, 0.0, 0.0, 0.5]);
    }
}
