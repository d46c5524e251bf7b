use std::collections::BTreeMap;

/// Crate-wide result alias.
pub type MvResult<T> = Result<T, MetavisError>;

/// Coarse category used by tooling to derive exit statuses.
///
/// The mapping from category to integer is owned by the caller, not this
/// crate.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Preflight validation or compilation failure.
    Preflight,
    /// Governance policy denial.
    Governance,
    /// Quality-control rejection.
    Qc,
    /// Engine (kernel library, dispatch, timeout) failure.
    Engine,
    /// Source or destination I/O failure.
    Io,
    /// Cooperative cancellation.
    Cancelled,
}

/// Fatal engine faults.
#[derive(thiserror::Error, Debug)]
pub enum EngineFault {
    /// The packaged kernel library failed one-shot initialization.
    #[error("kernel library unusable: {0}")]
    KernelLibrary(String),
    /// A kernel dispatch failed after the single allowed retry.
    #[error("dispatch failed: {0}")]
    Dispatch(String),
    /// The per-frame hard timeout elapsed, including the retry.
    #[error("frame at {time_ticks} ticks exceeded the {limit_secs}s render timeout")]
    FrameTimeout {
        /// Timeline tick of the frame that timed out.
        time_ticks: i64,
        /// Configured timeout in seconds.
        limit_secs: u64,
    },
}

/// Structured governance denials.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum GovernanceDenial {
    /// Requested output resolution exceeds the plan cap.
    #[error("resolution {requested} exceeds plan maximum {max_allowed}")]
    ResolutionNotAllowed {
        /// Requested output height in pixels.
        requested: u32,
        /// Maximum height the plan allows.
        max_allowed: u32,
    },
    /// The plan forbids this operation outright.
    #[error("plan '{plan}' forbids operation '{operation}'")]
    OperationForbidden {
        /// Plan name.
        plan: String,
        /// Denied operation.
        operation: String,
    },
}

/// A failed quality-control check with its measurements.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct QcFailure {
    /// Which validator rejected the deliverable.
    pub check: String,
    /// Human-readable reason.
    pub reason: String,
    /// Offending measurements, keyed by a stable name.
    pub measurements: BTreeMap<String, f64>,
}

impl std::fmt::Display for QcFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.check, self.reason)?;
        for (k, v) in &self.measurements {
            write!(f, " [{k}={v}]")?;
        }
        Ok(())
    }
}

/// Engine-wide error taxonomy. All failures are returned as values; there is
/// no exception-style control flow anywhere in the crate.
#[derive(thiserror::Error, Debug)]
pub enum MetavisError {
    /// Unresolvable URI, unsupported scheme, or decoder failure.
    #[error("asset error: {0}")]
    Asset(String),

    /// Unknown feature id, malformed transition, or invalid graph.
    #[error("compile error: {reason}{}", clip_suffix(.clip))]
    Compile {
        /// What went wrong.
        reason: String,
        /// Offending clip, when attributable.
        clip: Option<String>,
    },

    /// Fatal engine fault.
    #[error("engine error: {0}")]
    Engine(EngineFault),

    /// Governance policy denial.
    #[error("governance denied: {0}")]
    Governance(GovernanceDenial),

    /// Quality-control rejection.
    #[error("qc failed: {0}")]
    Qc(QcFailure),

    /// Read/write failure on source or destination.
    #[error("io error: {0}")]
    Io(String),

    /// User- or timeout-initiated abort.
    #[error("cancelled")]
    Cancelled,

    /// Foreign error passthrough.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl MetavisError {
    /// Asset error from a message.
    pub fn asset(msg: impl Into<String>) -> Self {
        Self::Asset(msg.into())
    }

    /// Compile error with no attributable clip.
    pub fn compile(msg: impl Into<String>) -> Self {
        Self::Compile {
            reason: msg.into(),
            clip: None,
        }
    }

    /// Compile error naming the offending clip.
    pub fn compile_clip(msg: impl Into<String>, clip: impl Into<String>) -> Self {
        Self::Compile {
            reason: msg.into(),
            clip: Some(clip.into()),
        }
    }

    /// I/O error from a message.
    pub fn io(msg: impl Into<String>) -> Self {
        Self::Io(msg.into())
    }

    /// Category for exit-status mapping.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Asset(_) | Self::Compile { .. } => ErrorCategory::Preflight,
            Self::Engine(_) => ErrorCategory::Engine,
            Self::Governance(_) => ErrorCategory::Governance,
            Self::Qc(_) => ErrorCategory::Qc,
            Self::Io(_) => ErrorCategory::Io,
            Self::Cancelled => ErrorCategory::Cancelled,
            Self::Other(_) => ErrorCategory::Engine,
        }
    }
}

fn clip_suffix(clip: &Option<String>) -> String {
    match clip {
        Some(c) => format!(" (clip '{c}')"),
        None => String::new(),
    }
}

impl From<std::io::Error> for MetavisError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}
