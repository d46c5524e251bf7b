//! Pooled intermediate surfaces for DAG execution.
//!
//! The pool is keyed by `(width, height, format)` and bounded both by a global
//! byte budget and a per-bucket surface cap, so steady-state rendering does no
//! per-frame allocation.

use crate::color::space::ColorSpace;
use std::collections::HashMap;

/// Working-space pixel surface: RGBA interleaved f32.
#[derive(Clone, Debug)]
pub(crate) struct Surface {
    pub(crate) width: u32,
    pub(crate) height: u32,
    /// Space the samples are expressed in; kernels downstream of `Idt` expect
    /// [`ColorSpace::AcesCg`].
    pub(crate) color: ColorSpace,
    pub(crate) data: Vec<f32>,
}

impl Surface {
    pub(crate) fn pixel(&self, x: u32, y: u32) -> [f32; 4] {
        let i = (y as usize * self.width as usize + x as usize) * 4;
        [self.data[i], self.data[i + 1], self.data[i + 2], self.data[i + 3]]
    }
}

/// Intermediate surface formats; the working format is the only one today,
/// kept as a key component so the pool survives format growth.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) enum SurfaceFormat {
    RgbaF32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
struct SurfaceKey {
    w: u32,
    h: u32,
    format: SurfaceFormat,
}

impl SurfaceKey {
    fn byte_len(self) -> usize {
        let px = (self.w as usize).saturating_mul(self.h as usize);
        match self.format {
            SurfaceFormat::RgbaF32 => px.saturating_mul(16),
        }
    }
}

/// Pool configuration.
#[derive(Debug, Clone, Copy)]
pub(crate) struct TexturePoolOpts {
    pub(crate) max_pool_bytes: usize,
    pub(crate) max_surfaces_per_bucket: usize,
}

impl Default for TexturePoolOpts {
    fn default() -> Self {
        Self {
            max_pool_bytes: 512 * 1024 * 1024,
            max_surfaces_per_bucket: 8,
        }
    }
}

/// Allocation statistics, used by engine diagnostics.
#[derive(Debug, Default, Clone)]
pub(crate) struct TexturePoolStats {
    pub(crate) retained_surfaces: usize,
    pub(crate) retained_bytes: usize,
    pub(crate) alloc_surfaces: u64,
    pub(crate) dropped_on_release: u64,
}

/// Bounded pooled allocator for working surfaces.
pub(crate) struct TexturePool {
    opts: TexturePoolOpts,
    stats: TexturePoolStats,
    buckets: HashMap<SurfaceKey, Vec<Vec<f32>>>,
}

impl TexturePool {
    pub(crate) fn new(opts: TexturePoolOpts) -> Self {
        Self {
            opts,
            stats: TexturePoolStats::default(),
            buckets: HashMap::new(),
        }
    }

    pub(crate) fn stats(&self) -> TexturePoolStats {
        self.stats.clone()
    }

    /// Borrow a zeroed surface of the requested size.
    pub(crate) fn borrow(&mut self, width: u32, height: u32) -> Surface {
        let key = SurfaceKey {
            w: width,
            h: height,
            format: SurfaceFormat::RgbaF32,
        };
        let len = width as usize * height as usize * 4;
        let data = match self.buckets.get_mut(&key).and_then(|b| b.pop()) {
            Some(mut data) => {
                self.stats.retained_surfaces = self.stats.retained_surfaces.saturating_sub(1);
                self.stats.retained_bytes =
                    self.stats.retained_bytes.saturating_sub(key.byte_len());
                data.fill(0.0);
                data
            }
            None => {
                self.stats.alloc_surfaces += 1;
                vec![0.0f32; len]
            }
        };
        Surface {
            width,
            height,
            color: ColorSpace::AcesCg,
            data,
        }
    }

    /// Return a surface to its bucket; dropped when over budget.
    pub(crate) fn release(&mut self, surface: Surface) {
        let key = SurfaceKey {
            w: surface.width,
            h: surface.height,
            format: SurfaceFormat::RgbaF32,
        };
        let bytes = key.byte_len();
        if self.opts.max_surfaces_per_bucket == 0
            || self.stats.retained_bytes.saturating_add(bytes) > self.opts.max_pool_bytes
        {
            self.stats.dropped_on_release += 1;
            return;
        }
        let bucket = self.buckets.entry(key).or_default();
        if bucket.len() >= self.opts.max_surfaces_per_bucket {
            self.stats.dropped_on_release += 1;
            return;
        }
        bucket.push(surface.data);
        self.stats.retained_surfaces += 1;
        self.stats.retained_bytes += bytes;
    }

    /// Drop every retained surface.
    pub(crate) fn clear(&mut self) {
        self.buckets.clear();
        self.stats.retained_surfaces = 0;
        self.stats.retained_bytes = 0;
    }
}
