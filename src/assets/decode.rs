//! Still-image decoders.
//!
//! PNG/JPEG/EXR go through the `image` crate; FITS is decoded natively. The
//! format is sniffed from magic bytes, never from the file extension.

use crate::color::space::ColorSpace;
use crate::foundation::error::{MetavisError, MvResult};
use std::sync::Arc;

/// A decoded still in `color` space, RGBA interleaved f32.
#[derive(Clone, Debug)]
pub struct DecodedStill {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// RGBA interleaved samples.
    pub rgba: Arc<Vec<f32>>,
    /// Color space the samples are expressed in.
    pub color: ColorSpace,
}

impl DecodedStill {
    /// Approximate heap footprint, used by the still cache byte budget.
    pub fn byte_len(&self) -> usize {
        self.rgba.len() * 4
    }
}

/// Sniffed still formats.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StillFormat {
    /// PNG.
    Png,
    /// JPEG.
    Jpeg,
    /// OpenEXR.
    Exr,
    /// FITS.
    Fits,
}

/// Sniff a still format from leading bytes; `None` for video containers and
/// anything else.
pub fn sniff_still(bytes: &[u8]) -> Option<StillFormat> {
    if bytes.starts_with(&[0x89, b'P', b'N', b'G']) {
        return Some(StillFormat::Png);
    }
    if bytes.starts_with(&[0xff, 0xd8, 0xff]) {
        return Some(StillFormat::Jpeg);
    }
    if bytes.starts_with(&[0x76, 0x2f, 0x31, 0x01]) {
        return Some(StillFormat::Exr);
    }
    if bytes.starts_with(b"SIMPLE  =") {
        return Some(StillFormat::Fits);
    }
    None
}

/// Decode a still from bytes, dispatching on the sniffed format.
pub fn decode_still(bytes: &[u8]) -> MvResult<DecodedStill> {
    match sniff_still(bytes) {
        Some(StillFormat::Png) | Some(StillFormat::Jpeg) => decode_display_referred(bytes),
        Some(StillFormat::Exr) => decode_exr(bytes),
        Some(StillFormat::Fits) => decode_fits(bytes),
        None => Err(MetavisError::asset(
            "unrecognized still format (not PNG/JPEG/EXR/FITS)",
        )),
    }
}

fn decode_display_referred(bytes: &[u8]) -> MvResult<DecodedStill> {
    let img = image::load_from_memory(bytes)
        .map_err(|e| MetavisError::asset(format!("still decode failed: {e}")))?;
    let rgba8 = img.to_rgba8();
    let (width, height) = rgba8.dimensions();
    let rgba = rgba8.as_raw().iter().map(|&b| b as f32 / 255.0).collect();
    Ok(DecodedStill {
        width,
        height,
        rgba: Arc::new(rgba),
        color: ColorSpace::Rec709Display,
    })
}

fn decode_exr(bytes: &[u8]) -> MvResult<DecodedStill> {
    let img = image::load_from_memory(bytes)
        .map_err(|e| MetavisError::asset(format!("exr decode failed: {e}")))?;
    let rgba32 = img.to_rgba32f();
    let (width, height) = rgba32.dimensions();
    Ok(DecodedStill {
        width,
        height,
        rgba: Arc::new(rgba32.into_raw()),
        // EXR is scene-linear; primaries are taken as Rec.709 absent chromaticity
        // metadata.
        color: ColorSpace::Rec709Linear,
    })
}

const FITS_RECORD: usize = 2880;
const FITS_CARD: usize = 80;

/// Minimal native FITS reader: single 2-axis image HDU, BITPIX 8/16/-32.
fn decode_fits(bytes: &[u8]) -> MvResult<DecodedStill> {
    let mut bitpix: Option<i64> = None;
    let mut naxis: Option<i64> = None;
    let mut naxis1: Option<i64> = None;
    let mut naxis2: Option<i64> = None;
    let mut data_start = None;

    'records: for (ri, record) in bytes.chunks(FITS_RECORD).enumerate() {
        if record.len() < FITS_RECORD {
            break;
        }
        for card in record.chunks(FITS_CARD) {
            let text = std::str::from_utf8(card)
                .map_err(|_| MetavisError::asset("fits header is not ascii"))?;
            let key = text[..8.min(text.len())].trim_end();
            match key {
                "END" => {
                    data_start = Some((ri + 1) * FITS_RECORD);
                    break 'records;
                }
                "BITPIX" => bitpix = fits_card_int(text),
                "NAXIS" => naxis = fits_card_int(text),
                "NAXIS1" => naxis1 = fits_card_int(text),
                "NAXIS2" => naxis2 = fits_card_int(text),
                _ => {}
            }
        }
    }

    let data_start =
        data_start.ok_or_else(|| MetavisError::asset("fits header has no END card"))?;
    let bitpix = bitpix.ok_or_else(|| MetavisError::asset("fits header missing BITPIX"))?;
    if naxis != Some(2) {
        return Err(MetavisError::asset(format!(
            "fits NAXIS must be 2 for image data, got {naxis:?}"
        )));
    }
    let width = naxis1.filter(|v| *v > 0).ok_or_else(|| MetavisError::asset("bad NAXIS1"))? as usize;
    let height = naxis2.filter(|v| *v > 0).ok_or_else(|| MetavisError::asset("bad NAXIS2"))? as usize;

    let count = width * height;
    let data = &bytes[data_start.min(bytes.len())..];
    let mut gray = Vec::with_capacity(count);
    match bitpix {
        8 => {
            if data.len() < count {
                return Err(MetavisError::asset("fits data truncated"));
            }
            gray.extend(data[..count].iter().map(|&b| b as f32 / 255.0));
        }
        16 => {
            if data.len() < count * 2 {
                return Err(MetavisError::asset("fits data truncated"));
            }
            for ch in data[..count * 2].chunks_exact(2) {
                let v = i16::from_be_bytes([ch[0], ch[1]]);
                gray.push((v as f32 - i16::MIN as f32) / 65_535.0);
            }
        }
        -32 => {
            if data.len() < count * 4 {
                return Err(MetavisError::asset("fits data truncated"));
            }
            for ch in data[..count * 4].chunks_exact(4) {
                gray.push(f32::from_be_bytes([ch[0], ch[1], ch[2], ch[3]]));
            }
        }
        other => {
            return Err(MetavisError::asset(format!(
                "unsupported fits BITPIX {other}"
            )));
        }
    }

    // FITS stores rows bottom-up.
    let mut rgba = vec![0.0f32; count * 4];
    for y in 0..height {
        let src_row = height - 1 - y;
        for x in 0..width {
            let v = gray[src_row * width + x];
            let i = (y * width + x) * 4;
            rgba[i] = v;
            rgba[i + 1] = v;
            rgba[i + 2] = v;
            rgba[i + 3] = 1.0;
        }
    }

    Ok(DecodedStill {
        width: width as u32,
        height: height as u32,
        rgba: Arc::new(rgba),
        color: ColorSpace::Rec709Linear,
    })
}

fn fits_card_int(card: &str) -> Option<i64> {
    let value = card.get(10..)?;
    let value = value.split('/').next()?.trim();
    value.parse::<i64>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fits_card(key: &str, value: &str) -> Vec<u8> {
        let mut c = format!("{key:<8}= {value}");
        c.push_str(&" ".repeat(FITS_CARD - c.len()));
        c.into_bytes()
    }

    fn tiny_fits() -> Vec<u8> {
        let mut header = Vec::new();
        header.extend(fits_card("SIMPLE", "T"));
        header.extend(fits_card("BITPIX", "8"));
        header.extend(fits_card("NAXIS", "2"));
        header.extend(fits_card("NAXIS1", "2"));
        header.extend(fits_card("NAXIS2", "2"));
        let mut end = b"END".to_vec();
        end.extend(std::iter::repeat_n(b' ', FITS_CARD - 3));
        header.extend(end);
        header.resize(FITS_RECORD, b' ');
        // Bottom row 0,255 / top row 128,64 in FITS order.
        let mut data = vec![0u8, 255, 128, 64];
        data.resize(FITS_RECORD, 0);
        header.extend(data);
        header
    }

    #[test]
    fn sniffs_known_magics() {
        assert_eq!(sniff_still(&[0x89, b'P', b'N', b'G', 0, 0]), Some(StillFormat::Png));
        assert_eq!(sniff_still(&[0xff, 0xd8, 0xff, 0xe0]), Some(StillFormat::Jpeg));
        assert_eq!(sniff_still(&[0x76, 0x2f, 0x31, 0x01]), Some(StillFormat::Exr));
        assert_eq!(sniff_still(b"SIMPLE  =        T"), Some(StillFormat::Fits));
        assert_eq!(sniff_still(b"ftypmp42"), None);
    }

    #[test]
    fn fits_decodes_and_flips_rows() {
        let f = decode_still(&tiny_fits()).unwrap();
        assert_eq!((f.width, f.height), (2, 2));
        assert_eq!(f.color, ColorSpace::Rec709Linear);
        // Top-left of the output is the FITS top row (second stored row).
        assert!((f.rgba[0] - 128.0 / 255.0).abs() < 1e-3);
        // Bottom-right is 255.
        let i = (1 * 2 + 1) * 4;
        assert!((f.rgba[i] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn png_round_trip_decodes_display_referred() {
        let mut png = Vec::new();
        let img = image::RgbaImage::from_pixel(3, 2, image::Rgba([255, 0, 0, 255]));
        image::DynamicImage::ImageRgba8(img)
            .write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
            .unwrap();
        let f = decode_still(&png).unwrap();
        assert_eq!((f.width, f.height), (3, 2));
        assert_eq!(f.color, ColorSpace::Rec709Display);
        assert!((f.rgba[0] - 1.0).abs() < 1e-6);
        assert!(f.rgba[1] < 1e-6);
    }
}
