//! Package extractors.
//!
//! Filesystem extractors are offered every file found while walking the
//! scan root and pick the ones they understand. Standalone extractors run
//! once per scan, e.g. to query a package manager.
//!
//! # Built-in extractors
//!
//! | Extractor | Kind | Input |
//! |-----------|------|-------|
//! | [`PackageLockJsonExtractor`] | filesystem | `package-lock.json` |
//! | [`RequirementsExtractor`] | filesystem | `requirements*.txt` |
//! | [`NpmGlobalExtractor`] | standalone | `npm list -g` |

mod gitignore;
mod npm_global;
mod packagelockjson;
mod requirements;
pub mod standalone;
pub mod walker;

pub use npm_global::NpmGlobalExtractor;
pub use packagelockjson::PackageLockJsonExtractor;
pub use requirements::RequirementsExtractor;

use async_trait::async_trait;
use std::io;
use std::path::{Path, PathBuf};

use crate::context::ScanContext;
use crate::fs::FileSystem;
use crate::model::Inventory;
use crate::plugin::Plugin;

/// What an extractor is told about a file before deciding to read it.
#[derive(Debug, Clone, Copy)]
pub struct FileApi<'a> {
    /// Path relative to the scan root.
    pub path: &'a str,
    pub size: u64,
}

impl FileApi<'_> {
    pub fn file_name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(self.path)
    }
}

/// A file handed to [`FilesystemExtractor::extract`].
#[derive(Debug, Clone, Copy)]
pub struct ScanInput<'a> {
    pub fs: &'a dyn FileSystem,
    /// Path relative to the scan root.
    pub path: &'a str,
    /// Local path of the scan root, if it has one.
    pub root: Option<&'a Path>,
    pub size: u64,
}

impl ScanInput<'_> {
    pub fn read(&self) -> io::Result<Vec<u8>> {
        self.fs.read(self.path)
    }

    pub fn read_to_string(&self) -> io::Result<String> {
        let data = self.read()?;
        String::from_utf8(data).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }
}

/// Extracts packages from individual files found during the filesystem walk.
///
/// Extractors leave `locations` and `plugins` of returned packages empty
/// unless a package spans several files; the walker fills them in.
#[async_trait]
pub trait FilesystemExtractor: Plugin {
    /// Returns true if the file should be passed to [`extract`](Self::extract).
    fn file_required(&self, file: &FileApi<'_>) -> bool;

    async fn extract(&self, ctx: &ScanContext, input: &ScanInput<'_>) -> anyhow::Result<Inventory>;
}

/// Input of a standalone extractor.
#[derive(Debug, Clone)]
pub struct StandaloneInput<'a> {
    pub fs: &'a dyn FileSystem,
    /// Absolute local path of the scan root, if it has one.
    pub root: Option<PathBuf>,
}

/// Extracts packages independently of the filesystem walk.
#[async_trait]
pub trait StandaloneExtractor: Plugin {
    async fn extract(&self, ctx: &ScanContext, input: &StandaloneInput<'_>) -> anyhow::Result<Inventory>;
}
