//! Frame sinks and the ffmpeg container writer.

/// The ffmpeg-backed container writer.
pub mod ffmpeg;
/// Sink contract and in-memory sink.
pub mod sink;
