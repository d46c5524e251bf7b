//! Asset resolution and decoding: URIs, procedural generators, still and
//! media decoders, and the cached clip reader.

/// Still-image decoders (PNG/JPEG/EXR via `image`, native FITS).
pub mod decode;
/// ffprobe/ffmpeg media adapters and VFR analysis.
pub mod media;
pub(crate) mod procedural;
/// Clip reader and its bounded caches.
pub mod reader;
/// Asset references and URI parsing.
pub mod reference;
