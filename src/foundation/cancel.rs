use crate::foundation::error::{MetavisError, MvResult};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Cooperative cancellation token shared between the orchestrator and its
/// producers.
///
/// Checkpoints are the start of each frame, the start of each kernel
/// dispatch, and decoder block boundaries.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    /// Fresh, un-cancelled token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Checkpoint: error out if cancellation was requested.
    pub fn checkpoint(&self) -> MvResult<()> {
        if self.is_cancelled() {
            Err(MetavisError::Cancelled)
        } else {
            Ok(())
        }
    }
}
