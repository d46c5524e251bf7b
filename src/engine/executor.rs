//! DAG executor.
//!
//! Single-owner engine: topologically sorts the request graph, dispatches each
//! node to the process-wide kernel library over pooled surfaces, and writes
//! the sink directly into the caller-owned [`PixelBuffer`]. The hot path never
//! copies pixels back to the host; a diagnostic counter records any readback
//! and must stay zero for a passing export.

use crate::assets::reader::SharedClipReader;
use crate::compile::compiler::RenderRequest;
use crate::engine::PixelBuffer;
use crate::engine::kernels::{KernelCtx, KernelLibrary, kernel_library};
use crate::engine::pool::{Surface, TexturePool, TexturePoolOpts};
use crate::foundation::cancel::CancelToken;
use crate::foundation::clock::Clock;
use crate::foundation::error::{EngineFault, MetavisError, MvResult};
use crate::graph::node::NodeKind;
use std::sync::Arc;
use std::time::Duration;

/// Engine configuration.
#[derive(Clone, Debug)]
pub struct EngineOpts {
    /// Per-frame hard timeout; one retry, then the job fails.
    pub frame_timeout: Duration,
    pub(crate) pool: TexturePoolOpts,
}

impl Default for EngineOpts {
    fn default() -> Self {
        Self {
            frame_timeout: Duration::from_secs(10),
            pool: TexturePoolOpts::default(),
        }
    }
}

/// Diagnostic counters; `readbacks` must remain zero across a passing export.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EngineCounters {
    /// Frames rendered to completion.
    pub frames_rendered: u64,
    /// Dispatch retries taken (cleared pool).
    pub retries: u64,
    /// Hot-path host readbacks. Zero on every passing export.
    pub readbacks: u64,
}

/// Single-owner frame executor.
pub struct Engine {
    reader: SharedClipReader,
    clock: Arc<dyn Clock>,
    kernels: &'static KernelLibrary,
    pool: TexturePool,
    opts: EngineOpts,
    counters: EngineCounters,
}

impl Engine {
    /// Construct an engine; fails fatally when the kernel library is
    /// unusable.
    pub fn new(
        reader: SharedClipReader,
        clock: Arc<dyn Clock>,
        opts: EngineOpts,
    ) -> MvResult<Self> {
        let kernels = kernel_library()?;
        Ok(Self {
            reader,
            clock,
            kernels,
            pool: TexturePool::new(opts.pool),
            opts,
            counters: EngineCounters::default(),
        })
    }

    /// Current diagnostic counters.
    pub fn counters(&self) -> EngineCounters {
        self.counters
    }

    /// Render `req` into `out`.
    ///
    /// A failed dispatch or an elapsed frame timeout retries exactly once at
    /// the same frame with a cleared pool; a second failure fails the job.
    pub fn render(
        &mut self,
        req: &RenderRequest,
        out: &mut PixelBuffer,
        cancel: &CancelToken,
    ) -> MvResult<()> {
        cancel.checkpoint()?;
        match self.attempt(req, out, cancel) {
            Ok(()) => {
                self.counters.frames_rendered += 1;
                Ok(())
            }
            Err(e) if is_retryable(&e) => {
                tracing::warn!(time_ticks = req.time.0, error = %e, "render retry with cleared pool");
                self.pool.clear();
                self.counters.retries += 1;
                self.attempt(req, out, cancel).map(|()| {
                    self.counters.frames_rendered += 1;
                })
            }
            Err(e) => Err(e),
        }
    }

    fn attempt(
        &mut self,
        req: &RenderRequest,
        out: &mut PixelBuffer,
        cancel: &CancelToken,
    ) -> MvResult<()> {
        let order = req.graph.validate()?;
        let nodes = req.graph.nodes();
        let started = self.clock.monotonic();

        // Remaining-consumer counts drive surface release back to the pool.
        let mut remaining: Vec<usize> = vec![0; nodes.len()];
        for node in nodes {
            for input in &node.inputs {
                remaining[input.0 as usize] += 1;
            }
        }

        let ctx = KernelCtx {
            reader: &self.reader,
            width: req.width,
            height: req.height,
            cancel,
        };

        let mut surfaces: Vec<Option<Surface>> = (0..nodes.len()).map(|_| None).collect();
        let mut sink_done = false;
        for id in order {
            cancel.checkpoint()?;
            if self.clock.monotonic() - started >= self.opts.frame_timeout {
                return Err(MetavisError::Engine(EngineFault::FrameTimeout {
                    time_ticks: req.time.0,
                    limit_secs: self.opts.frame_timeout.as_secs(),
                }));
            }

            let node = &nodes[id.0 as usize];
            if let NodeKind::Odt { bit_depth } = node.kind {
                let input_id = node.inputs[0];
                let input = surfaces[input_id.0 as usize].as_ref().ok_or_else(|| {
                    MetavisError::Engine(EngineFault::Dispatch(format!(
                        "sink input for '{}' was not rendered",
                        node.name
                    )))
                })?;
                self.kernels.run_odt(input, bit_depth, out)?;
                sink_done = true;
            } else {
                let inputs: Vec<&Surface> = node
                    .inputs
                    .iter()
                    .map(|i| {
                        surfaces[i.0 as usize].as_ref().ok_or_else(|| {
                            MetavisError::Engine(EngineFault::Dispatch(format!(
                                "input surface for '{}' was not rendered",
                                node.name
                            )))
                        })
                    })
                    .collect::<MvResult<_>>()?;
                let rendered = self.kernels.run(node, &inputs, &mut self.pool, &ctx)?;
                surfaces[id.0 as usize] = Some(rendered);
            }

            for input in &node.inputs {
                let i = input.0 as usize;
                remaining[i] -= 1;
                if remaining[i] == 0
                    && let Some(s) = surfaces[i].take()
                {
                    self.pool.release(s);
                }
            }
        }

        if !sink_done {
            return Err(MetavisError::Engine(EngineFault::Dispatch(
                "graph executed without reaching its sink".to_owned(),
            )));
        }
        Ok(())
    }

    /// Copy a rendered intermediate back to the host for diagnostics.
    ///
    /// Never called on the export hot path; every call increments the
    /// readback counter that QC asserts to be zero.
    pub fn readback_for_diagnostics(&mut self, surface_pixels: &[f32]) -> Vec<f32> {
        self.counters.readbacks += 1;
        surface_pixels.to_vec()
    }
}

fn is_retryable(e: &MetavisError) -> bool {
    matches!(
        e,
        MetavisError::Engine(EngineFault::Dispatch(_))
            | MetavisError::Engine(EngineFault::FrameTimeout { .. })
    )
}
