//! Sidecar writers: captions, transcripts, thumbnails.

/// SRT/WebVTT parsing and conversion.
pub mod captions;
/// Thumbnail and contact-sheet JPEGs.
pub mod thumbnail;
/// Word-level transcript JSON.
pub mod transcript;
