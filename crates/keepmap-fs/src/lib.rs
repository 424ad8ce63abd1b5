// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Filesystem-backed `BackingStore` for keepmap.
//!
//! [`FileStore`] keeps one handle open on the bound file, created lazily on
//! the first read or save and released on rebind or drop. Missing parent
//! directories are created owner-only (`0o700` on Unix).

use std::fs::{DirBuilder, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Component, Path, PathBuf};

use directories::BaseDirs;
use keepmap_core::{BackingStore, Error, PersistentMap, Policy, Result};
use tempfile::NamedTempFile;
use tracing::debug;

/// How [`FileStore::write_all`](BackingStore::write_all) replaces the file.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum WriteMode {
    /// Truncate and rewrite through the open handle.
    #[default]
    Overwrite,
    /// Write a sibling temp file, then rename it over the target. Readers never
    /// observe a half-written file.
    AtomicRename,
}

/// A single file on disk.
#[derive(Debug, Default)]
pub struct FileStore {
    path: Option<PathBuf>,
    expand_home: bool,
    mode: WriteMode,
    handle: Option<File>,
}

impl FileStore {
    /// Create an unbound store with `~` expansion on and in-place writes.
    pub fn new() -> Self {
        Self {
            expand_home: true,
            ..Self::default()
        }
    }

    /// Create a store bound to `path`.
    pub fn at(path: impl Into<PathBuf>) -> Result<Self> {
        let mut store = Self::new();
        store.bind(path.into())?;
        Ok(store)
    }

    /// Toggle `~` expansion for paths bound afterwards.
    pub fn with_expand_home(mut self, on: bool) -> Self {
        self.expand_home = on;
        self
    }

    /// Select the write strategy.
    pub fn with_write_mode(mut self, mode: WriteMode) -> Self {
        self.mode = mode;
        self
    }

    /// Current write strategy.
    pub fn write_mode(&self) -> WriteMode {
        self.mode
    }

    /// Returns `true` while a file handle is held.
    pub fn is_open(&self) -> bool {
        self.handle.is_some()
    }

    fn bound(&self) -> Result<&Path> {
        self.path.as_deref().ok_or(Error::NotFound { path: None })
    }

    /// Open (or reuse) the handle. With `create`, a missing file is created.
    fn handle(&mut self, create: bool) -> Result<&mut File> {
        if self.handle.is_none() {
            let path = self.bound()?.to_path_buf();
            let file = open_file(&path, create).map_err(|err| io_error(&path, err))?;
            debug!(path = %path.display(), "opened backing file");
            self.handle = Some(file);
        }
        self.handle.as_mut().ok_or(Error::NotFound { path: None })
    }

    fn replace(&mut self, path: &Path, bytes: &[u8]) -> io::Result<()> {
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(bytes)?;
        tmp.as_file().sync_all()?;
        // The old handle points at the replaced inode.
        self.handle = None;
        let file = tmp.persist(path).map_err(|err| err.error)?;
        self.handle = Some(file);
        Ok(())
    }
}

impl BackingStore for FileStore {
    fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn bind(&mut self, path: PathBuf) -> Result<bool> {
        let path = if self.expand_home {
            expand_home(&path)?
        } else {
            path
        };
        if self.path.as_deref() == Some(path.as_path()) {
            return Ok(false);
        }
        self.handle = None;
        self.path = Some(path);
        Ok(true)
    }

    fn ensure_path(&mut self, create_dirs: bool) -> Result<()> {
        let path = self.bound()?.to_path_buf();
        let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) else {
            return Ok(());
        };
        if parent.is_dir() {
            return Ok(());
        }
        if !create_dirs {
            return Err(Error::Path {
                path: parent.to_path_buf(),
                source: io::Error::new(io::ErrorKind::NotFound, "parent directory does not exist"),
            });
        }
        create_private_dirs(parent).map_err(|source| Error::Path {
            path: parent.to_path_buf(),
            source,
        })?;
        debug!(dir = %parent.display(), "created parent directories");
        Ok(())
    }

    fn read_all(&mut self) -> Result<Vec<u8>> {
        let path = self.bound()?.to_path_buf();
        let file = self.handle(false)?;
        let mut bytes = Vec::new();
        file.seek(SeekFrom::Start(0))
            .and_then(|_| file.read_to_end(&mut bytes))
            .map_err(|err| io_error(&path, err))?;
        Ok(bytes)
    }

    fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        let path = self.bound()?.to_path_buf();
        let written = match self.mode {
            WriteMode::Overwrite => rewrite(self.handle(true)?, bytes),
            WriteMode::AtomicRename => self.replace(&path, bytes),
        };
        written.map_err(|source| Error::Io { path, source })
    }
}

fn open_file(path: &Path, create: bool) -> io::Result<File> {
    match OpenOptions::new().read(true).write(true).create(create).open(path) {
        // Read-only files can still be loaded.
        Err(err) if !create && err.kind() == io::ErrorKind::PermissionDenied => {
            File::open(path)
        }
        other => other,
    }
}

fn rewrite(file: &mut File, bytes: &[u8]) -> io::Result<()> {
    file.set_len(0)?;
    file.seek(SeekFrom::Start(0))?;
    file.write_all(bytes)?;
    file.flush()
}

fn io_error(path: &Path, err: io::Error) -> Error {
    if err.kind() == io::ErrorKind::NotFound {
        Error::NotFound {
            path: Some(path.to_path_buf()),
        }
    } else {
        Error::Io {
            path: path.to_path_buf(),
            source: err,
        }
    }
}

#[cfg(unix)]
fn create_private_dirs(dir: &Path) -> io::Result<()> {
    use std::os::unix::fs::DirBuilderExt;
    DirBuilder::new().recursive(true).mode(0o700).create(dir)
}

#[cfg(not(unix))]
fn create_private_dirs(dir: &Path) -> io::Result<()> {
    DirBuilder::new().recursive(true).create(dir)
}

/// Replace a leading `~` component with the current user's home directory.
///
/// Other paths are returned unchanged; `~user` forms are not expanded.
pub fn expand_home(path: &Path) -> Result<PathBuf> {
    let mut components = path.components();
    match components.next() {
        Some(Component::Normal(first)) if first == "~" => {
            let base = BaseDirs::new().ok_or_else(|| Error::Path {
                path: path.to_path_buf(),
                source: io::Error::new(io::ErrorKind::NotFound, "could not resolve home directory"),
            })?;
            Ok(base.home_dir().join(components.as_path()))
        }
        _ => Ok(path.to_path_buf()),
    }
}

/// Open a map on `path` with the default policy.
pub fn open(path: impl Into<PathBuf>) -> Result<PersistentMap<FileStore>> {
    open_with(path, Policy::default())
}

/// Open a map on `path` with `policy`, honoring its `expand_home` switch.
pub fn open_with(path: impl Into<PathBuf>, policy: Policy) -> Result<PersistentMap<FileStore>> {
    let mut store = FileStore::new().with_expand_home(policy.expand_home);
    store.bind(path.into())?;
    PersistentMap::open(store, policy)
}
