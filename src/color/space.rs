/// Color spaces the engine understands at its boundaries.
///
/// All intermediate compositing happens in linear ACEScg; these tags describe
/// what a source delivers or what the sink expects.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ColorSpace {
    /// Display-referred Rec.709 with the sRGB-style transfer applied.
    Rec709Display,
    /// Scene-linear with Rec.709 primaries.
    Rec709Linear,
    /// Scene-linear ACEScg (AP1 primaries), the working space.
    AcesCg,
}

/// Container-level color tags written alongside the video stream.
///
/// SDR only; PQ/HLG tagging is out of scope.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ColorTags {
    /// Color primaries tag.
    pub primaries: Primaries,
    /// Transfer function tag.
    pub transfer: Transfer,
    /// Matrix coefficients tag.
    pub matrix: Matrix,
}

impl ColorTags {
    /// The only tag set this writer emits.
    pub const REC709_SDR: ColorTags = ColorTags {
        primaries: Primaries::Bt709,
        transfer: Transfer::Bt709,
        matrix: Matrix::Bt709,
    };
}

/// Color primaries tag values.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Primaries {
    /// ITU-R BT.709.
    Bt709,
}

/// Transfer function tag values.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Transfer {
    /// ITU-R BT.709.
    Bt709,
}

/// Matrix coefficient tag values.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Matrix {
    /// ITU-R BT.709.
    Bt709,
}

/// Rec.709 luma weights used for luminance statistics.
pub const REC709_LUMA: [f32; 3] = [0.2126, 0.7152, 0.0722];

/// Linear Rec.709 to ACEScg (AP1, D60 white via Bradford adaptation).
pub(crate) const BT709_TO_ACESCG: [[f32; 3]; 3] = [
    [0.613_097_4, 0.339_523_15, 0.047_386_45],
    [0.070_193_72, 0.916_353_9, 0.013_452_398],
    [0.020_615_593, 0.109_569_77, 0.869_814_63],
];

/// ACEScg back to linear Rec.709.
pub(crate) const ACESCG_TO_BT709: [[f32; 3]; 3] = [
    [1.704_858_7, -0.621_716_04, -0.083_299_37],
    [-0.130_076_82, 1.140_735_8, -0.010_658_95],
    [-0.023_964_073, -0.128_975_51, 1.526_939_6],
];

#[cfg(test)]
mod tests {
    use super::*;

    fn mul(m: &[[f32; 3]; 3], v: [f32; 3]) -> [f32; 3] {
        [
            m[0][0] * v[0] + m[0][1] * v[1] + m[0][2] * v[2],
            m[1][0] * v[0] + m[1][1] * v[1] + m[1][2] * v[2],
            m[2][0] * v[0] + m[2][1] * v[1] + m[2][2] * v[2],
        ]
    }

    #[test]
    fn matrices_are_inverses() {
        let v = [0.25f32, 0.5, 0.75];
        let rt = mul(&ACESCG_TO_BT709, mul(&BT709_TO_ACESCG, v));
        for (a, b) in v.iter().zip(rt.iter()) {
            assert!((a - b).abs() < 1e-4, "{a} vs {b}");
        }
    }

    #[test]
    fn white_maps_to_white() {
        let w = mul(&BT709_TO_ACESCG, [1.0, 1.0, 1.0]);
        for c in w {
            assert!((c - 1.0).abs() < 2e-3);
        }
    }
}
