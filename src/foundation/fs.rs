use crate::foundation::error::{MetavisError, MvResult};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Filesystem seam for sidecar discovery and manifest writes.
///
/// The container writer talks to the real filesystem through ffmpeg and is
/// not covered by this adapter; everything else the deliverable layer reads
/// or writes goes through here so publish logic is unit-testable in memory.
pub trait FileSystemAdapter: Send + Sync {
    /// Read an entire file.
    fn read(&self, path: &Path) -> MvResult<Vec<u8>>;
    /// Create or replace a file with `bytes`.
    fn write(&self, path: &Path, bytes: &[u8]) -> MvResult<()>;
    /// Whether `path` exists.
    fn exists(&self, path: &Path) -> bool;
}

/// Adapter over the real filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsFileSystem;

impl FileSystemAdapter for OsFileSystem {
    fn read(&self, path: &Path) -> MvResult<Vec<u8>> {
        std::fs::read(path)
            .map_err(|e| MetavisError::io(format!("read '{}': {e}", path.display())))
    }

    fn write(&self, path: &Path, bytes: &[u8]) -> MvResult<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)
                .map_err(|e| MetavisError::io(format!("mkdir '{}': {e}", parent.display())))?;
        }
        std::fs::write(path, bytes)
            .map_err(|e| MetavisError::io(format!("write '{}': {e}", path.display())))
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }
}

/// In-memory adapter for unit tests.
#[derive(Debug, Default)]
pub struct MemoryFileSystem {
    files: Mutex<BTreeMap<PathBuf, Vec<u8>>>,
}

impl MemoryFileSystem {
    /// Empty in-memory filesystem.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a file before the code under test runs.
    pub fn seed(&self, path: impl Into<PathBuf>, bytes: impl Into<Vec<u8>>) {
        self.files
            .lock()
            .expect("memory fs poisoned")
            .insert(path.into(), bytes.into());
    }

    /// Paths currently present, sorted.
    pub fn paths(&self) -> Vec<PathBuf> {
        self.files
            .lock()
            .expect("memory fs poisoned")
            .keys()
            .cloned()
            .collect()
    }
}

impl FileSystemAdapter for MemoryFileSystem {
    fn read(&self, path: &Path) -> MvResult<Vec<u8>> {
        self.files
            .lock()
            .expect("memory fs poisoned")
            .get(path)
            .cloned()
            .ok_or_else(|| MetavisError::io(format!("read '{}': not found", path.display())))
    }

    fn write(&self, path: &Path, bytes: &[u8]) -> MvResult<()> {
        self.files
            .lock()
            .expect("memory fs poisoned")
            .insert(path.to_path_buf(), bytes.to_vec());
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        self.files
            .lock()
            .expect("memory fs poisoned")
            .contains_key(path)
    }
}
