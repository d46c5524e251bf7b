//! Timeline compilation into per-frame render requests.

/// The compiler and feature catalog.
pub mod compiler;
/// Stable request fingerprints.
pub mod fingerprint;
