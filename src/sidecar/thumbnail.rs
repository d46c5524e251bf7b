//! Thumbnail and contact-sheet JPEG sidecars.

use crate::engine::PixelBuffer;
use crate::foundation::error::{MetavisError, MvResult};
use image::ImageEncoder;
use image::codecs::jpeg::JpegEncoder;

const JPEG_QUALITY: u8 = 85;

/// Encode one rendered frame as a JPEG thumbnail.
pub fn thumbnail_jpeg(frame: &PixelBuffer) -> MvResult<Vec<u8>> {
    encode_jpeg(&rgb_bytes(frame), frame.width, frame.height)
}

/// Compose a row-major grid of frames into one contact-sheet JPEG.
///
/// Every cell is the same size as the first frame; frames are expected to
/// share dimensions (they come from one export).
pub fn contact_sheet_jpeg(frames: &[PixelBuffer], columns: u32) -> MvResult<Vec<u8>> {
    let Some(first) = frames.first() else {
        return Err(MetavisError::io("contact sheet needs at least one frame"));
    };
    let columns = columns.max(1);
    let rows = (frames.len() as u32).div_ceil(columns);
    let (cw, ch) = (first.width, first.height);
    let (w, h) = (cw * columns, ch * rows);

    let mut rgb = vec![0u8; (w * h * 3) as usize];
    for (i, frame) in frames.iter().enumerate() {
        if frame.width != cw || frame.height != ch {
            return Err(MetavisError::io(
                "contact sheet frames must share dimensions",
            ));
        }
        let gx = (i as u32 % columns) * cw;
        let gy = (i as u32 / columns) * ch;
        for y in 0..ch {
            for x in 0..cw {
                let px = frame.pixel(x, y);
                let o = (((gy + y) * w + gx + x) * 3) as usize;
                rgb[o] = px[0];
                rgb[o + 1] = px[1];
                rgb[o + 2] = px[2];
            }
        }
    }
    encode_jpeg(&rgb, w, h)
}

/// Box-average downscale of a frame, for thumbnail-sized outputs.
pub fn downscale(frame: &PixelBuffer, width: u32, height: u32) -> PixelBuffer {
    let mut out = PixelBuffer::new(width, height);
    if width == 0 || height == 0 || frame.width == 0 || frame.height == 0 {
        return out;
    }
    for y in 0..height {
        let sy0 = (y as u64 * frame.height as u64 / height as u64) as u32;
        let sy1 = (((y + 1) as u64 * frame.height as u64).div_ceil(height as u64) as u32)
            .clamp(sy0 + 1, frame.height);
        for x in 0..width {
            let sx0 = (x as u64 * frame.width as u64 / width as u64) as u32;
            let sx1 = (((x + 1) as u64 * frame.width as u64).div_ceil(width as u64) as u32)
                .clamp(sx0 + 1, frame.width);
            let mut acc = [0u64; 4];
            for sy in sy0..sy1 {
                for sx in sx0..sx1 {
                    let px = frame.pixel(sx, sy);
                    for c in 0..4 {
                        acc[c] += px[c] as u64;
                    }
                }
            }
            let count = ((sx1 - sx0) * (sy1 - sy0)) as u64;
            let o = ((y * width + x) * 4) as usize;
            for c in 0..4 {
                out.data[o + c] = (acc[c] / count) as u8;
            }
        }
    }
    out
}

fn rgb_bytes(frame: &PixelBuffer) -> Vec<u8> {
    frame
        .data
        .chunks_exact(4)
        .flat_map(|px| [px[0], px[1], px[2]])
        .collect()
}

fn encode_jpeg(rgb: &[u8], width: u32, height: u32) -> MvResult<Vec<u8>> {
    let mut out = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut out, JPEG_QUALITY);
    encoder
        .write_image(rgb, width, height, image::ExtendedColorType::Rgb8)
        .map_err(|e| MetavisError::io(format!("jpeg encode failed: {e}")))?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(w: u32, h: u32, rgba: [u8; 4]) -> PixelBuffer {
        let mut b = PixelBuffer::new(w, h);
        for px in b.data.chunks_exact_mut(4) {
            px.copy_from_slice(&rgba);
        }
        b
    }

    #[test]
    fn thumbnail_is_a_decodable_jpeg() {
        let jpeg = thumbnail_jpeg(&solid(32, 18, [200, 40, 40, 255])).unwrap();
        assert_eq!(&jpeg[..3], &[0xff, 0xd8, 0xff]);
        let decoded = image::load_from_memory(&jpeg).unwrap();
        assert_eq!(decoded.width(), 32);
        assert_eq!(decoded.height(), 18);
    }

    #[test]
    fn contact_sheet_lays_out_a_grid() {
        let frames = vec![
            solid(16, 9, [255, 0, 0, 255]),
            solid(16, 9, [0, 255, 0, 255]),
            solid(16, 9, [0, 0, 255, 255]),
        ];
        let jpeg = contact_sheet_jpeg(&frames, 2).unwrap();
        let decoded = image::load_from_memory(&jpeg).unwrap();
        assert_eq!(decoded.width(), 32);
        assert_eq!(decoded.height(), 18);
    }

    #[test]
    fn downscale_averages_regions() {
        let mut b = PixelBuffer::new(4, 2);
        // Left half black, right half white.
        for y in 0..2 {
            for x in 0..4 {
                let v = if x < 2 { 0 } else { 255 };
                let o = ((y * 4 + x) * 4) as usize;
                b.data[o..o + 4].copy_from_slice(&[v, v, v, 255]);
            }
        }
        let small = downscale(&b, 2, 1);
        assert!(small.pixel(0, 0)[0] < 8);
        assert!(small.pixel(1, 0)[0] > 247);
    }
}
