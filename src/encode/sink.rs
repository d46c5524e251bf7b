use crate::color::space::ColorTags;
use crate::engine::PixelBuffer;
use crate::foundation::core::{Fps, FrameIndex};
use crate::foundation::error::MvResult;
use std::path::PathBuf;

/// Target video codecs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Codec {
    /// H.264 / AVC.
    H264,
    /// H.265 / HEVC.
    Hevc,
}

/// Configuration provided to a [`FrameSink`] at the start of an export.
#[derive(Debug, Clone)]
pub struct SinkConfig {
    /// Output width in pixels.
    pub width: u32,
    /// Output height in pixels.
    pub height: u32,
    /// Output frames-per-second.
    pub fps: Fps,
    /// Target codec.
    pub codec: Codec,
    /// Color depth in bits (8 or 10).
    pub color_depth: u32,
    /// Container color tags; always Rec.709 SDR in this writer.
    pub color: ColorTags,
    /// Optional raw PCM audio input.
    pub audio: Option<AudioInputConfig>,
}

/// Raw PCM audio input configuration.
#[derive(Debug, Clone)]
pub struct AudioInputConfig {
    /// Path to interleaved `f32le` PCM data.
    pub path: PathBuf,
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Channel count.
    pub channels: u16,
}

/// Sink contract for consuming rendered frames in timeline order.
///
/// `push_frame` is called in strictly increasing [`FrameIndex`] order within
/// the export range.
pub trait FrameSink: Send {
    /// Called once before any frames are pushed.
    fn begin(&mut self, cfg: SinkConfig) -> MvResult<()>;
    /// Push one frame in strictly increasing timeline order.
    fn push_frame(&mut self, idx: FrameIndex, frame: &PixelBuffer) -> MvResult<()>;
    /// Called once after the last frame is pushed.
    fn end(&mut self) -> MvResult<()>;
}

/// In-memory sink for tests and debugging.
#[derive(Debug, Default)]
pub struct InMemorySink {
    cfg: Option<SinkConfig>,
    frames: Vec<(FrameIndex, PixelBuffer)>,
}

impl InMemorySink {
    /// Create a new in-memory sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// The configuration captured in `begin`, if any.
    pub fn config(&self) -> Option<&SinkConfig> {
        self.cfg.as_ref()
    }

    /// Captured frames in timeline order.
    pub fn frames(&self) -> &[(FrameIndex, PixelBuffer)] {
        &self.frames
    }
}

impl FrameSink for InMemorySink {
    fn begin(&mut self, cfg: SinkConfig) -> MvResult<()> {
        self.cfg = Some(cfg);
        self.frames.clear();
        Ok(())
    }

    fn push_frame(&mut self, idx: FrameIndex, frame: &PixelBuffer) -> MvResult<()> {
        self.frames.push((idx, frame.clone()));
        Ok(())
    }

    fn end(&mut self) -> MvResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_memory_sink_captures_frames_in_order() {
        let mut sink = InMemorySink::new();
        sink.begin(SinkConfig {
            width: 4,
            height: 4,
            fps: Fps::FILM,
            codec: Codec::H264,
            color_depth: 8,
            color: ColorTags::REC709_SDR,
            audio: None,
        })
        .unwrap();
        sink.push_frame(FrameIndex(0), &PixelBuffer::new(4, 4)).unwrap();
        sink.push_frame(FrameIndex(1), &PixelBuffer::new(4, 4)).unwrap();
        sink.end().unwrap();
        assert_eq!(sink.frames().len(), 2);
        assert_eq!(sink.frames()[1].0, FrameIndex(1));
    }
}
