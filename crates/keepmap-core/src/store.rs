// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Storage port for the bytes behind a persistent map.
//!
//! [`BackingStore`] is implemented by the filesystem adapter in `keepmap-fs`
//! and by [`MemoryStore`] here, which keeps "files" in a shared in-memory table
//! and counts reads and writes for instrumentation.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{Error, Result};

/// Raw byte storage bound to at most one path at a time.
///
/// Rebinding happens only through [`bind`](BackingStore::bind); nothing in
/// keepmap rebinds implicitly.
pub trait BackingStore {
    /// Currently bound path.
    fn path(&self) -> Option<&Path>;

    /// Bind to `path`, releasing any previous binding. Returns whether the
    /// binding changed; binding the current path again is a no-op returning
    /// `false`. Stores that normalize paths compare the normalized form.
    fn bind(&mut self, path: PathBuf) -> Result<bool>;

    /// Prepare the bound path; creates missing parent directories when
    /// `create_dirs` is set. Fails with [`Error::NotFound`] when unbound and
    /// [`Error::Path`] when preparation fails.
    fn ensure_path(&mut self, create_dirs: bool) -> Result<()>;

    /// Read the whole file. An existing empty file yields an empty vector;
    /// a missing file or missing binding is [`Error::NotFound`].
    fn read_all(&mut self) -> Result<Vec<u8>>;

    /// Replace the whole file with `bytes`.
    fn write_all(&mut self, bytes: &[u8]) -> Result<()>;
}

#[derive(Debug, Default)]
struct MemoryFiles {
    files: BTreeMap<PathBuf, Vec<u8>>,
    reads: usize,
    writes: usize,
    read_only: bool,
}

/// In-memory [`BackingStore`].
///
/// Clones share the same file table and counters but have their own binding,
/// so a clone kept by a test sees everything written through the map, and a
/// second map opened on a clone behaves like a process restart.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    path: Option<PathBuf>,
    files: Arc<Mutex<MemoryFiles>>,
}

impl MemoryStore {
    /// Create an unbound store with no files.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store bound to `path`.
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            files: Arc::default(),
        }
    }

    /// Builder-style: put `bytes` at the bound path (or at `path` if unbound).
    pub fn with_contents(self, bytes: impl Into<Vec<u8>>) -> Self {
        let key = self.path.clone().unwrap_or_default();
        self.files.lock().files.insert(key, bytes.into());
        self
    }

    /// Contents of the file at the bound path, if it exists.
    pub fn contents(&self) -> Option<Vec<u8>> {
        let path = self.path.as_ref()?;
        self.files.lock().files.get(path).cloned()
    }

    /// Contents of the file at `path`, if it exists.
    pub fn contents_at(&self, path: &Path) -> Option<Vec<u8>> {
        self.files.lock().files.get(path).cloned()
    }

    /// Number of successful `write_all` calls across all clones.
    pub fn writes(&self) -> usize {
        self.files.lock().writes
    }

    /// Number of successful `read_all` calls across all clones.
    pub fn reads(&self) -> usize {
        self.files.lock().reads
    }

    /// Make every subsequent write fail with a permission error.
    pub fn set_read_only(&self, read_only: bool) {
        self.files.lock().read_only = read_only;
    }

    fn bound(&self) -> Result<&PathBuf> {
        self.path.as_ref().ok_or(Error::NotFound { path: None })
    }
}

impl BackingStore for MemoryStore {
    fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn bind(&mut self, path: PathBuf) -> Result<bool> {
        if self.path.as_ref() == Some(&path) {
            return Ok(false);
        }
        self.path = Some(path);
        Ok(true)
    }

    fn ensure_path(&mut self, _create_dirs: bool) -> Result<()> {
        self.bound().map(|_| ())
    }

    fn read_all(&mut self) -> Result<Vec<u8>> {
        let path = self.bound()?;
        let mut files = self.files.lock();
        let bytes = files.files.get(path).cloned().ok_or_else(|| Error::NotFound {
            path: Some(path.clone()),
        })?;
        files.reads += 1;
        Ok(bytes)
    }

    fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        let path = self.bound()?;
        let mut files = self.files.lock();
        if files.read_only {
            return Err(Error::Io {
                path: path.clone(),
                source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only store"),
            });
        }
        files.files.insert(path.clone(), bytes.to_vec());
        files.writes += 1;
        Ok(())
    }
}
