//! Filesystem walk that feeds files to filesystem extractors.

use regex::Regex;
use std::collections::HashSet;
use std::io;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

use super::gitignore::Gitignore;
use super::{FileApi, FilesystemExtractor, ScanInput};
use crate::config::glob_match;
use crate::context::ScanContext;
use crate::error::ScanError;
use crate::fs::{clean_path, join_path, FileKind, ScanRoot};
use crate::model::{Inventory, PluginStatus, ScanStatus};
use crate::plugin::PhaseReport;

/// Filters and limits applied while walking scan roots.
#[derive(Debug, Clone, Default)]
pub struct WalkOptions {
    /// Only extract from these files or directories. Absolute paths must lie
    /// inside the scan root; relative paths are relative to it.
    pub paths_to_extract: Vec<String>,
    /// With `paths_to_extract`, only look at files directly inside the listed directories.
    pub ignore_sub_dirs: bool,
    /// Directories to skip, given like `paths_to_extract`.
    pub dirs_to_skip: Vec<String>,
    /// Skip directories whose root-relative path matches.
    pub skip_dir_regex: Option<Regex>,
    /// Skip directories whose root-relative path matches this `*` glob.
    pub skip_dir_glob: Option<String>,
    /// Skip files larger than this many bytes.
    pub max_file_size: Option<u64>,
    /// Abort the walk after visiting this many entries.
    pub max_inodes: Option<usize>,
    /// Follow symlinks to files.
    pub read_symlinks: bool,
    /// Store absolute package locations instead of root-relative ones.
    pub store_absolute_path: bool,
    /// Treat unreadable files and directories as fatal.
    pub error_on_fs_errors: bool,
    /// Skip files and directories matched by `.gitignore` files found
    /// during the walk.
    pub use_gitignore: bool,
}

/// Walks every scan root and runs `extractors` on the files they require.
///
/// The returned report holds one status per extractor and, if the walk
/// itself failed, the fatal error. Errors of individual extractors only
/// mark that extractor's status as failed.
pub async fn run(
    ctx: &ScanContext,
    extractors: &[Arc<dyn FilesystemExtractor>],
    roots: &[ScanRoot],
    options: &WalkOptions,
) -> (Inventory, PhaseReport) {
    let mut walker = Walker {
        ctx,
        extractors,
        options,
        inventory: Inventory::default(),
        inodes: 0,
        failures: vec![None; extractors.len()],
        ran: vec![false; extractors.len()],
    };

    let mut report = PhaseReport::default();
    let mut completed = true;
    for root in roots {
        if let Err(e) = walker.walk_root(root).await {
            warn!(root = %root.display(), error = %e, "filesystem walk failed");
            report.errors.push(e);
            completed = false;
            break;
        }
    }

    for (i, extractor) in extractors.iter().enumerate() {
        // After a fatal error only extractors that actually ran get a status.
        if !completed && !walker.ran[i] {
            continue;
        }
        report.statuses.push(PluginStatus {
            name: extractor.name().to_string(),
            version: extractor.version(),
            status: match &walker.failures[i] {
                Some(reason) => ScanStatus::failed(reason.clone()),
                None => ScanStatus::succeeded(),
            },
        });
    }

    debug!(
        packages = walker.inventory.packages.len(),
        visited = walker.inodes,
        "filesystem walk finished"
    );
    (walker.inventory, report)
}

struct Walker<'a> {
    ctx: &'a ScanContext,
    extractors: &'a [Arc<dyn FilesystemExtractor>],
    options: &'a WalkOptions,
    inventory: Inventory,
    inodes: usize,
    failures: Vec<Option<String>>,
    ran: Vec<bool>,
}

impl Walker<'_> {
    async fn walk_root(&mut self, root: &ScanRoot) -> Result<(), ScanError> {
        self.ctx.check()?;

        let meta = root.fs.metadata("").map_err(|source| ScanError::Walk {
            root: root.display(),
            source,
        })?;
        if !meta.is_dir() {
            return Err(ScanError::Walk {
                root: root.display(),
                source: io::Error::new(io::ErrorKind::Other, "scan root is not a directory"),
            });
        }

        let skip: HashSet<String> = self
            .options
            .dirs_to_skip
            .iter()
            .filter_map(|p| to_relative(root, p))
            .collect();

        let starts: Vec<String> = if self.options.paths_to_extract.is_empty() {
            vec![String::new()]
        } else {
            self.options
                .paths_to_extract
                .iter()
                .filter_map(|p| {
                    let rel = to_relative(root, p);
                    if rel.is_none() {
                        warn!(path = %p, root = %root.display(), "path to extract is outside the scan root");
                    }
                    rel
                })
                .collect()
        };
        let restricted = !self.options.paths_to_extract.is_empty();

        for start in starts {
            let meta = match root.fs.metadata(&start) {
                Ok(meta) => meta,
                Err(e) => {
                    self.fs_error(&start, e)?;
                    continue;
                }
            };
            if meta.is_file() {
                self.visit_file(root, &start, meta.size).await?;
                continue;
            }

            let mut stack = vec![(start, Gitignore::default())];
            while let Some((dir, ignore)) = stack.pop() {
                let ignore = if self.options.use_gitignore {
                    ignore.enter(root.fs.as_ref(), &dir)
                } else {
                    ignore
                };
                let entries = match root.fs.read_dir(&dir) {
                    Ok(entries) => entries,
                    Err(e) => {
                        self.fs_error(&dir, e)?;
                        continue;
                    }
                };

                for entry in entries {
                    self.inodes += 1;
                    if let Some(max) = self.options.max_inodes {
                        if self.inodes > max {
                            return Err(ScanError::WalkAborted(format!(
                                "visited more than {} filesystem entries",
                                max
                            )));
                        }
                    }

                    let path = join_path(&dir, &entry.name);
                    let (kind, size) = match entry.kind {
                        FileKind::Symlink if !self.options.read_symlinks => continue,
                        _ => match root.fs.metadata(&path) {
                            Ok(meta) => (meta.kind, meta.size),
                            Err(e) => {
                                self.fs_error(&path, e)?;
                                continue;
                            }
                        },
                    };

                    if ignore.is_ignored(&path, kind == FileKind::Dir) {
                        debug!(path = %path, "skipping gitignored path");
                        continue;
                    }

                    match kind {
                        // Symlinked directories are never followed.
                        FileKind::Dir if entry.kind == FileKind::Dir => {
                            if restricted && self.options.ignore_sub_dirs {
                                continue;
                            }
                            if self.should_skip_dir(&skip, &path) {
                                debug!(dir = %path, "skipping directory");
                                continue;
                            }
                            stack.push((path, ignore.clone()));
                        }
                        FileKind::File => {
                            self.visit_file(root, &path, size).await?;
                        }
                        _ => {}
                    }
                }
            }
        }
        Ok(())
    }

    fn should_skip_dir(&self, skip: &HashSet<String>, path: &str) -> bool {
        if skip.contains(path) {
            return true;
        }
        if let Some(re) = &self.options.skip_dir_regex {
            if re.is_match(path) {
                return true;
            }
        }
        if let Some(glob) = &self.options.skip_dir_glob {
            if glob_match(glob, path) {
                return true;
            }
        }
        false
    }

    fn fs_error(&self, path: &str, err: io::Error) -> Result<(), ScanError> {
        if self.options.error_on_fs_errors {
            return Err(ScanError::WalkAborted(format!("{}: {}", path, err)));
        }
        warn!(path = %path, error = %err, "skipping unreadable path");
        Ok(())
    }

    async fn visit_file(&mut self, root: &ScanRoot, path: &str, size: u64) -> Result<(), ScanError> {
        self.ctx.check()?;

        if let Some(max) = self.options.max_file_size {
            if size > max {
                debug!(path = %path, size, "skipping file larger than the size limit");
                return Ok(());
            }
        }

        let api = FileApi { path, size };
        let input = ScanInput {
            fs: root.fs.as_ref(),
            path,
            root: root.path.as_deref(),
            size,
        };
        let location = self.location(root, path);

        let extractors = self.extractors;
        for (i, extractor) in extractors.iter().enumerate() {
            if !extractor.file_required(&api) {
                continue;
            }
            self.ran[i] = true;
            match extractor.extract(self.ctx, &input).await {
                Ok(mut inv) => {
                    for pkg in &mut inv.packages {
                        if pkg.locations.is_empty() {
                            pkg.locations.push(location.clone());
                        }
                        pkg.add_plugin(extractor.name());
                    }
                    for vuln in &mut inv.package_vulns {
                        vuln.plugins.push(extractor.name().to_string());
                    }
                    for finding in &mut inv.generic_findings {
                        finding.plugins.push(extractor.name().to_string());
                    }
                    self.inventory.append(inv);
                }
                Err(e) => {
                    warn!(extractor = extractor.name(), path = %path, error = %e, "extraction failed");
                    if self.failures[i].is_none() {
                        self.failures[i] = Some(format!("{}: {}", path, e));
                    }
                }
            }
        }
        Ok(())
    }

    fn location(&self, root: &ScanRoot, path: &str) -> String {
        match (&root.path, self.options.store_absolute_path) {
            (Some(base), true) => base.join(path).display().to_string(),
            _ => path.to_string(),
        }
    }
}

/// Converts a user-supplied path to a path relative to `root`.
fn to_relative(root: &ScanRoot, path: &str) -> Option<String> {
    let p = Path::new(path);
    if p.is_absolute() {
        if let Some(base) = &root.path {
            return p
                .strip_prefix(base)
                .ok()
                .map(|rel| clean_path(&rel.to_string_lossy()));
        }
    }
    Some(clean_path(path))
}
