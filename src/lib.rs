//! Metavis is a deterministic, color-managed video rendering engine.
//!
//! It lowers a non-linear edit description (a [`Timeline`]) into per-frame
//! render DAGs, executes them over pooled surfaces, multiplexes an
//! edit-accurate audio mix, and commits a verified deliverable bundle
//! atomically. Given the same inputs and policy it reproduces the same output
//! bytes; it is not an interactive editor.
//!
//! The publish flow:
//!
//! - Describe the edit as a [`Timeline`] and pick a [`QualityProfile`]
//! - Build a [`DeliverableSpec`] with codec, audio policy, sidecars, and the
//!   governance [`UserPlan`]
//! - Call [`Orchestrator::publish`]; QC gates run before the bundle is
//!   renamed into place
//!
//! [`Timeline`]: crate::timeline::model::Timeline
//! [`QualityProfile`]: crate::deliver::QualityProfile
//! [`DeliverableSpec`]: crate::deliver::DeliverableSpec
//! [`UserPlan`]: crate::deliver::UserPlan
//! [`Orchestrator::publish`]: crate::deliver::Orchestrator::publish
#![forbid(unsafe_code)]
#![deny(missing_docs)]

/// Asset resolution, decoding, and the clip reader.
pub mod assets;
/// Audio mixing.
pub mod audio;
/// Color management.
pub mod color;
/// Timeline compilation.
pub mod compile;
/// Deliverable assembly and publish.
pub mod deliver;
/// Frame sinks and container writing.
pub mod encode;
/// Frame execution.
pub mod engine;
/// Shared foundations.
pub mod foundation;
/// Render DAG model.
pub mod graph;
/// Quality control.
pub mod qc;
/// Sidecar writers.
pub mod sidecar;
/// The edit model.
pub mod timeline;

pub use crate::assets::reader::{CacheLimits, SharedClipReader, TrimPolicy};
pub use crate::assets::reference::AssetReference;
pub use crate::audio::mix::AudioPolicy;
pub use crate::compile::compiler::{CompileOptions, RenderRequest, compile_frame, preflight};
pub use crate::deliver::{
    DeliverableSpec, Orchestrator, PublishedDeliverable, QualityProfile, SidecarRequest, UserPlan,
};
pub use crate::encode::sink::{Codec, FrameSink, InMemorySink, SinkConfig};
pub use crate::engine::{Engine, EngineCounters, EngineOpts, PixelBuffer};
pub use crate::foundation::cancel::CancelToken;
pub use crate::foundation::core::{Fps, FrameIndex, TICKS_PER_SECOND, Tick, Time};
pub use crate::foundation::error::{ErrorCategory, GovernanceDenial, MetavisError, MvResult};
pub use crate::timeline::model::{
    Clip, ClipId, Easing, FeatureApplication, Timeline, Track, TrackKind, Transition,
    TransitionKind,
};
