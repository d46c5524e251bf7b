//! Color management: space tags and the CPU reference transforms shared with
//! the engine kernels.

/// Color spaces, tags, and matrices.
pub mod space;
/// Reference transforms (IDT/ODT, tone map, CDL, LUT, false color).
pub mod transform;
