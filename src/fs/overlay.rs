use std::collections::{BTreeMap, HashSet};
use std::io;
use std::sync::Arc;

use super::{clean_path, join_path, not_found, split_path, DirEntry, FileKind, FileMeta, FileSystem};

const WHITEOUT_PREFIX: &str = ".wh.";
const OPAQUE_MARKER: &str = ".wh..wh..opq";

/// Layers stacked bottom to top; upper layers shadow lower ones.
///
/// Whiteouts follow OCI image layers. A file named `.wh.<name>` in a layer
/// hides `<name>` and everything below it in the lower layers, and a
/// `<dir>/.wh..wh..opq` marker hides the lower layers' contents of `<dir>`.
/// Neither affects entries of the layer that carries it.
#[derive(Debug, Clone, Default)]
pub struct OverlayFs {
    layers: Vec<Arc<dyn FileSystem>>,
}

impl OverlayFs {
    pub fn new(layers: Vec<Arc<dyn FileSystem>>) -> Self {
        Self { layers }
    }

    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    /// True if `layer` hides `path` in the layers below it, either by a
    /// whiteout of the path or an ancestor, or by an opaque ancestor.
    fn hides_lower(layer: &dyn FileSystem, path: &str) -> bool {
        let mut parent = String::new();
        for part in path.split('/').filter(|p| !p.is_empty()) {
            if layer.exists(&join_path(&parent, OPAQUE_MARKER))
                || layer.exists(&join_path(&parent, &format!("{}{}", WHITEOUT_PREFIX, part)))
            {
                return true;
            }
            parent = join_path(&parent, part);
        }
        !parent.is_empty() && layer.exists(&join_path(&parent, OPAQUE_MARKER))
    }

    fn lookup<T>(&self, path: &str, f: impl Fn(&dyn FileSystem, &str) -> io::Result<T>) -> io::Result<T> {
        let path = clean_path(path);
        let (_, name) = split_path(&path);
        if name.starts_with(WHITEOUT_PREFIX) {
            return Err(not_found(&path));
        }
        for layer in self.layers.iter().rev() {
            match f(layer.as_ref(), &path) {
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    if Self::hides_lower(layer.as_ref(), &path) {
                        break;
                    }
                }
                other => return other,
            }
        }
        Err(not_found(&path))
    }
}

impl FileSystem for OverlayFs {
    fn metadata(&self, path: &str) -> io::Result<FileMeta> {
        self.lookup(path, |layer, p| layer.metadata(p))
    }

    fn symlink_metadata(&self, path: &str) -> io::Result<FileMeta> {
        self.lookup(path, |layer, p| layer.symlink_metadata(p))
    }

    fn read_dir(&self, path: &str) -> io::Result<Vec<DirEntry>> {
        let path = clean_path(path);
        let mut merged: BTreeMap<String, FileKind> = BTreeMap::new();
        let mut hidden: HashSet<String> = HashSet::new();
        let mut found = false;

        for layer in self.layers.iter().rev() {
            match layer.symlink_metadata(&path) {
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    if Self::hides_lower(layer.as_ref(), &path) {
                        break;
                    }
                    continue;
                }
                Err(e) => return Err(e),
                // A file in an upper layer shadows directories below it.
                Ok(meta) if !meta.is_dir() => break,
                Ok(_) => {}
            }
            found = true;

            let entries = layer.read_dir(&path)?;
            let mut layer_hidden = Vec::new();
            for entry in entries {
                if entry.name == OPAQUE_MARKER {
                    continue;
                }
                if let Some(name) = entry.name.strip_prefix(WHITEOUT_PREFIX) {
                    layer_hidden.push(name.to_string());
                    continue;
                }
                if hidden.contains(&entry.name) {
                    continue;
                }
                merged.entry(entry.name).or_insert(entry.kind);
            }
            hidden.extend(layer_hidden);

            if Self::hides_lower(layer.as_ref(), &path) {
                break;
            }
        }

        if !found {
            return Err(not_found(&path));
        }
        Ok(merged
            .into_iter()
            .map(|(name, kind)| DirEntry { name, kind })
            .collect())
    }

    fn read(&self, path: &str) -> io::Result<Vec<u8>> {
        self.lookup(path, |layer, p| layer.read(p))
    }
}
