//! `.gitignore` rules applied during the filesystem walk.
//!
//! Supports the common subset: comments, blank lines, `*` wildcards,
//! anchored patterns (leading `/` or an inner `/`) and directory-only
//! patterns (trailing `/`). Negations (`!pattern`) are not supported and
//! are skipped.

use std::sync::Arc;
use tracing::debug;

use crate::config::glob_match;
use crate::fs::{join_path, FileSystem};

const GITIGNORE: &str = ".gitignore";

#[derive(Debug, Clone, PartialEq, Eq)]
struct Rule {
    /// Directory holding the `.gitignore`, relative to the scan root.
    base: String,
    pattern: String,
    /// Matched against the path below `base` instead of the file name.
    anchored: bool,
    dir_only: bool,
}

impl Rule {
    fn parse(base: &str, line: &str) -> Option<Self> {
        let line = line.trim_end();
        if line.is_empty() || line.starts_with('#') {
            return None;
        }
        if line.starts_with('!') {
            debug!(pattern = %line, "skipping unsupported negated gitignore pattern");
            return None;
        }

        let dir_only = line.ends_with('/');
        let pattern = line.trim_end_matches('/');
        let anchored = pattern.contains('/');
        let pattern = pattern.trim_start_matches('/');
        if pattern.is_empty() {
            return None;
        }
        Some(Self {
            base: base.to_string(),
            pattern: pattern.to_string(),
            anchored,
            dir_only,
        })
    }

    fn matches(&self, path: &str, is_dir: bool) -> bool {
        if self.dir_only && !is_dir {
            return false;
        }
        let below = if self.base.is_empty() {
            path
        } else {
            match path.strip_prefix(&self.base).and_then(|p| p.strip_prefix('/')) {
                Some(below) => below,
                None => return false,
            }
        };
        if self.anchored {
            glob_match(&self.pattern, below)
        } else {
            let name = below.rsplit('/').next().unwrap_or(below);
            glob_match(&self.pattern, name)
        }
    }
}

/// Ignore rules in effect for one directory of the walk, including the
/// rules of every walked ancestor.
#[derive(Debug, Clone, Default)]
pub(crate) struct Gitignore {
    rules: Arc<Vec<Rule>>,
}

impl Gitignore {
    /// Rules for `dir`: these rules plus those of `dir/.gitignore`, if any.
    pub(crate) fn enter(&self, fs: &dyn FileSystem, dir: &str) -> Self {
        let content = match fs.read(&join_path(dir, GITIGNORE)) {
            Ok(content) => content,
            Err(_) => return self.clone(),
        };
        let text = String::from_utf8_lossy(&content);
        let mut rules: Vec<Rule> = self.rules.as_ref().clone();
        rules.extend(text.lines().filter_map(|line| Rule::parse(dir, line)));
        Self { rules: Arc::new(rules) }
    }

    pub(crate) fn is_ignored(&self, path: &str, is_dir: bool) -> bool {
        self.rules.iter().any(|rule| rule.matches(path, is_dir))
    }
}
