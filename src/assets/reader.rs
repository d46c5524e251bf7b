//! Clip reader: resolves asset references to frames and PCM under bounded
//! memory.
//!
//! The reader is a single-owner state machine behind one lock; callers go
//! through [`SharedClipReader`], which is also the pressure-broadcast
//! subscriber for all three cache tiers.

use crate::assets::decode::{DecodedStill, decode_still, sniff_still};
use crate::assets::media::{
    AudioPcm, MIX_SAMPLE_RATE, VideoSourceInfo, decode_audio_f32_stereo,
    decode_video_frame_rgba8, probe_video,
};
use crate::assets::procedural;
use crate::assets::reference::{AssetReference, ResolvedAsset};
use crate::color::space::ColorSpace;
use crate::foundation::core::Tick;
use crate::foundation::error::{MetavisError, MvResult};
use crate::foundation::pressure::{self, PressureLevel, PressureSubscriber};
use std::collections::HashMap;
use std::hash::Hash;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Cache bounds for the three reader tiers.
#[derive(Clone, Copy, Debug)]
pub struct CacheLimits {
    /// Maximum decoded video/procedural frames retained.
    pub frame_entries: usize,
    /// Byte budget for decoded stills.
    pub still_bytes: usize,
    /// Maximum open decoder states retained.
    pub decoder_entries: usize,
    /// Byte budget for decoded audio PCM.
    pub audio_bytes: usize,
}

impl Default for CacheLimits {
    fn default() -> Self {
        Self {
            frame_entries: 24,
            still_bytes: 256 * 1024 * 1024,
            decoder_entries: 8,
            audio_bytes: 512 * 1024 * 1024,
        }
    }
}

/// How far to shed on an explicit trim.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrimPolicy {
    /// Enforce the configured bounds.
    ToBounds,
    /// Drop everything (zero-to-minimum).
    ToMinimum,
}

/// Pixel payload of a fetched source frame.
#[derive(Clone, Debug)]
pub enum FrameData {
    /// 8-bit RGBA, display-referred decode output.
    U8(Arc<Vec<u8>>),
    /// Float RGBA (stills, EXR, procedurals).
    F32(Arc<Vec<f32>>),
}

/// A frame produced by the reader, ready for kernel upload.
#[derive(Clone, Debug)]
pub struct SourceFrame {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Color space the payload is expressed in.
    pub color: ColorSpace,
    /// Pixel payload.
    pub data: FrameData,
}

#[derive(Clone, PartialEq, Eq, Hash)]
struct FrameKey {
    asset: String,
    source: Tick,
    width: u32,
    height: u32,
}

struct LruEntry<V> {
    value: V,
    bytes: usize,
    stamp: u64,
}

struct Lru<K: Eq + Hash + Clone, V> {
    map: HashMap<K, LruEntry<V>>,
    bytes: usize,
    tick: u64,
}

impl<K: Eq + Hash + Clone, V> Lru<K, V> {
    fn new() -> Self {
        Self {
            map: HashMap::new(),
            bytes: 0,
            tick: 0,
        }
    }

    fn get(&mut self, k: &K) -> Option<&V> {
        self.tick += 1;
        let tick = self.tick;
        self.map.get_mut(k).map(|e| {
            e.stamp = tick;
            &e.value
        })
    }

    fn insert(&mut self, k: K, v: V, bytes: usize) {
        self.tick += 1;
        if let Some(old) = self.map.insert(
            k,
            LruEntry {
                value: v,
                bytes,
                stamp: self.tick,
            },
        ) {
            self.bytes -= old.bytes;
        }
        self.bytes += bytes;
    }

    fn evict_entries_to(&mut self, max_entries: usize) {
        while self.map.len() > max_entries {
            self.evict_oldest();
        }
    }

    fn evict_bytes_to(&mut self, max_bytes: usize) {
        while self.bytes > max_bytes && !self.map.is_empty() {
            self.evict_oldest();
        }
    }

    fn evict_oldest(&mut self) {
        if let Some(k) = self
            .map
            .iter()
            .min_by_key(|(_, e)| e.stamp)
            .map(|(k, _)| k.clone())
        {
            if let Some(e) = self.map.remove(&k) {
                self.bytes -= e.bytes;
            }
        }
    }

    fn clear(&mut self) {
        self.map.clear();
        self.bytes = 0;
    }

    fn len(&self) -> usize {
        self.map.len()
    }
}

/// Single-owner reader state. Use through [`SharedClipReader`].
pub struct ClipReader {
    limits: CacheLimits,
    frames: Lru<FrameKey, SourceFrame>,
    stills: Lru<String, Arc<DecodedStill>>,
    decoders: Lru<String, Arc<VideoSourceInfo>>,
    audio: Lru<String, Arc<AudioPcm>>,
}

impl ClipReader {
    /// New reader with the given bounds.
    pub fn new(limits: CacheLimits) -> Self {
        Self {
            limits,
            frames: Lru::new(),
            stills: Lru::new(),
            decoders: Lru::new(),
            audio: Lru::new(),
        }
    }

    /// Fetch a frame for `(asset, source, width, height)`.
    pub fn fetch(
        &mut self,
        asset: &AssetReference,
        source: Tick,
        width: u32,
        height: u32,
    ) -> MvResult<SourceFrame> {
        let key = FrameKey {
            asset: asset.id.clone(),
            source,
            width,
            height,
        };
        if let Some(f) = self.frames.get(&key) {
            return Ok(f.clone());
        }

        let frame = match asset.resolve()? {
            ResolvedAsset::Ligm { kind, query } => {
                if !procedural::is_video_kind(&kind) {
                    return Err(MetavisError::asset(format!(
                        "ligm kind '{kind}' does not produce video frames"
                    )));
                }
                let g = procedural::video_frame(&kind, &query, source, width, height)?;
                SourceFrame {
                    width: g.width,
                    height: g.height,
                    color: g.color,
                    data: FrameData::F32(Arc::new(g.rgba)),
                }
            }
            ResolvedAsset::File { path } => self.fetch_file(asset, &path, source)?,
        };

        self.frames.insert(key, frame.clone(), 0);
        self.frames.evict_entries_to(self.limits.frame_entries);
        Ok(frame)
    }

    fn fetch_file(
        &mut self,
        asset: &AssetReference,
        path: &Path,
        source: Tick,
    ) -> MvResult<SourceFrame> {
        // Stills are keyed per asset; the source time is irrelevant.
        if let Some(still) = self.stills.get(&asset.id) {
            let still = still.clone();
            return Ok(still_frame(&still));
        }

        let head = read_head(path, 64)?;
        if sniff_still(&head).is_some() {
            let bytes = std::fs::read(path)
                .map_err(|e| MetavisError::asset(format!("read '{}': {e}", path.display())))?;
            let still = Arc::new(decode_still(&bytes)?);
            let frame = still_frame(&still);
            let bytes_len = still.byte_len();
            self.stills.insert(asset.id.clone(), still, bytes_len);
            self.stills.evict_bytes_to(self.limits.still_bytes);
            return Ok(frame);
        }

        let info = match self.decoders.get(&asset.id) {
            Some(info) => info.clone(),
            None => {
                let info = Arc::new(probe_video(path)?);
                self.decoders.insert(asset.id.clone(), info.clone(), 0);
                self.decoders.evict_entries_to(self.limits.decoder_entries);
                info
            }
        };
        let rgba8 = decode_video_frame_rgba8(&info, source)?;
        Ok(SourceFrame {
            width: info.width,
            height: info.height,
            color: ColorSpace::Rec709Display,
            data: FrameData::U8(Arc::new(rgba8)),
        })
    }

    /// Fetch (and cache) the full audio track of an asset at the mix rate.
    pub fn fetch_audio(&mut self, asset: &AssetReference) -> MvResult<Arc<AudioPcm>> {
        if let Some(pcm) = self.audio.get(&asset.id) {
            return Ok(pcm.clone());
        }
        let pcm = match asset.resolve()? {
            ResolvedAsset::File { path } => {
                Arc::new(decode_audio_f32_stereo(&path, MIX_SAMPLE_RATE)?)
            }
            ResolvedAsset::Ligm { .. } => {
                return Err(MetavisError::asset(
                    "procedural audio is synthesized per window, not cached whole",
                ));
            }
        };
        let bytes = pcm.byte_len();
        self.audio.insert(asset.id.clone(), pcm.clone(), bytes);
        self.audio.evict_bytes_to(self.limits.audio_bytes);
        Ok(pcm)
    }

    /// Shed cache memory.
    pub fn trim(&mut self, policy: TrimPolicy) {
        tracing::debug!(?policy, entries = self.cached_entries(), "trimming reader caches");
        match policy {
            TrimPolicy::ToBounds => {
                self.frames.evict_entries_to(self.limits.frame_entries);
                self.stills.evict_bytes_to(self.limits.still_bytes);
                self.decoders.evict_entries_to(self.limits.decoder_entries);
                self.audio.evict_bytes_to(self.limits.audio_bytes);
            }
            TrimPolicy::ToMinimum => self.clear(),
        }
    }

    /// Drop all cached state.
    pub fn clear(&mut self) {
        self.frames.clear();
        self.stills.clear();
        self.decoders.clear();
        self.audio.clear();
    }

    /// Total entries across all tiers (diagnostics and tests).
    pub fn cached_entries(&self) -> usize {
        self.frames.len() + self.stills.len() + self.decoders.len() + self.audio.len()
    }
}

fn still_frame(still: &Arc<DecodedStill>) -> SourceFrame {
    SourceFrame {
        width: still.width,
        height: still.height,
        color: still.color,
        data: FrameData::F32(still.rgba.clone()),
    }
}

fn read_head(path: &Path, n: usize) -> MvResult<Vec<u8>> {
    use std::io::Read;
    let mut f = std::fs::File::open(path)
        .map_err(|e| MetavisError::asset(format!("open '{}': {e}", path.display())))?;
    let mut buf = vec![0u8; n];
    let read = f
        .read(&mut buf)
        .map_err(|e| MetavisError::asset(format!("read '{}': {e}", path.display())))?;
    buf.truncate(read);
    Ok(buf)
}

struct ReaderCell(Mutex<ClipReader>);

impl PressureSubscriber for ReaderCell {
    fn on_pressure(&self, level: PressureLevel) {
        let mut r = self.0.lock().expect("clip reader poisoned");
        match level {
            PressureLevel::Warning => r.trim(TrimPolicy::ToBounds),
            PressureLevel::Critical => r.trim(TrimPolicy::ToMinimum),
        }
    }
}

/// Cloneable handle to the reader's single mailbox.
#[derive(Clone)]
pub struct SharedClipReader {
    inner: Arc<ReaderCell>,
}

impl SharedClipReader {
    /// Create a reader and register it for memory-pressure broadcasts.
    pub fn new(limits: CacheLimits) -> Self {
        let inner = Arc::new(ReaderCell(Mutex::new(ClipReader::new(limits))));
        let sub: Arc<dyn PressureSubscriber> = inner.clone();
        pressure::subscribe(&sub);
        Self { inner }
    }

    /// Fetch a frame; see [`ClipReader::fetch`].
    pub fn fetch(
        &self,
        asset: &AssetReference,
        source: Tick,
        width: u32,
        height: u32,
    ) -> MvResult<SourceFrame> {
        self.lock().fetch(asset, source, width, height)
    }

    /// Fetch cached file audio; see [`ClipReader::fetch_audio`].
    pub fn fetch_audio(&self, asset: &AssetReference) -> MvResult<Arc<AudioPcm>> {
        self.lock().fetch_audio(asset)
    }

    /// Explicit trim entry point.
    pub fn trim(&self, policy: TrimPolicy) {
        self.lock().trim(policy);
    }

    /// Drop all cached state.
    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Total cached entries across tiers.
    pub fn cached_entries(&self) -> usize {
        self.lock().cached_entries()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ClipReader> {
        self.inner.0.lock().expect("clip reader poisoned")
    }
}
