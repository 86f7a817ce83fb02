//! Filesystem views that plugins scan.
//!
//! All paths handed to a [`FileSystem`] are slash-separated and relative to
//! the view's root; the root itself is the empty path. Leading `/` and `./`
//! are accepted and ignored.
//!
//! - [`DirFs`] - A directory on the local disk
//! - [`MemFs`] - An in-memory tree
//! - [`OverlayFs`] - A stack of views merged like container image layers

mod dir;
mod mem;
mod overlay;

pub use dir::DirFs;
pub use mem::MemFs;
pub use overlay::OverlayFs;

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    File,
    Dir,
    Symlink,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileMeta {
    pub kind: FileKind,
    pub size: u64,
}

impl FileMeta {
    pub fn is_dir(&self) -> bool {
        self.kind == FileKind::Dir
    }

    pub fn is_file(&self) -> bool {
        self.kind == FileKind::File
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub kind: FileKind,
}

/// Read-only access to a tree of files.
pub trait FileSystem: Send + Sync + fmt::Debug {
    /// Metadata of `path`, following symlinks.
    fn metadata(&self, path: &str) -> io::Result<FileMeta>;

    /// Metadata of `path` without following a final symlink.
    fn symlink_metadata(&self, path: &str) -> io::Result<FileMeta> {
        self.metadata(path)
    }

    /// Entries of the directory at `path`, sorted by name.
    fn read_dir(&self, path: &str) -> io::Result<Vec<DirEntry>>;

    fn read(&self, path: &str) -> io::Result<Vec<u8>>;

    fn exists(&self, path: &str) -> bool {
        self.symlink_metadata(path).is_ok()
    }
}

/// Normalizes a path to the relative slash-separated form used by [`FileSystem`].
///
/// ```
/// use invscan::fs::clean_path;
///
/// assert_eq!(clean_path("/usr/./lib/../bin/"), "usr/bin");
/// assert_eq!(clean_path("."), "");
/// ```
pub fn clean_path(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for part in path.split(['/', '\\']) {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            p => parts.push(p),
        }
    }
    parts.join("/")
}

/// Joins a directory and an entry name.
pub fn join_path(dir: &str, name: &str) -> String {
    if dir.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", dir, name)
    }
}

/// Splits a cleaned path into its parent directory and final component.
pub(crate) fn split_path(path: &str) -> (&str, &str) {
    match path.rfind('/') {
        Some(idx) => (&path[..idx], &path[idx + 1..]),
        None => ("", path),
    }
}

pub(crate) fn not_found(path: &str) -> io::Error {
    io::Error::new(io::ErrorKind::NotFound, format!("{}: no such file or directory", path))
}

pub(crate) fn not_a_dir(path: &str) -> io::Error {
    io::Error::new(io::ErrorKind::Other, format!("{}: not a directory", path))
}

/// A filesystem to scan together with the real location it was mounted from.
#[derive(Debug, Clone)]
pub struct ScanRoot {
    pub fs: Arc<dyn FileSystem>,
    /// Local path of the root; `None` for virtual filesystems such as images.
    pub path: Option<PathBuf>,
}

impl ScanRoot {
    /// A scan root backed by a local directory.
    pub fn from_dir(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let path = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
        Self {
            fs: Arc::new(DirFs::new(&path)),
            path: Some(path),
        }
    }

    /// A scan root with no backing directory.
    pub fn virtual_fs(fs: Arc<dyn FileSystem>) -> Self {
        Self { fs, path: None }
    }

    pub fn is_virtual(&self) -> bool {
        self.path.is_none()
    }

    /// Human-readable description used in logs and errors.
    pub fn display(&self) -> String {
        match &self.path {
            Some(path) => path.display().to_string(),
            None => "<virtual>".to_string(),
        }
    }
}
