use std::collections::BTreeMap;
use std::io;

use super::{clean_path, join_path, not_a_dir, not_found, split_path, DirEntry, FileKind, FileMeta, FileSystem};

#[derive(Debug, Clone)]
enum Node {
    File(Vec<u8>),
    Dir,
}

static ROOT: Node = Node::Dir;

/// An in-memory [`FileSystem`]. Parent directories are created implicitly.
///
/// ```
/// use invscan::fs::{FileSystem, MemFs};
///
/// let fs = MemFs::new().with_file("usr/lib/os-release", "ID=alpine\n");
/// assert!(fs.metadata("usr/lib").unwrap().is_dir());
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemFs {
    nodes: BTreeMap<String, Node>,
}

impl MemFs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, path: &str, contents: impl Into<Vec<u8>>) -> Self {
        self.insert_file(path, contents);
        self
    }

    pub fn with_dir(mut self, path: &str) -> Self {
        self.insert_dir(path);
        self
    }

    pub fn insert_file(&mut self, path: &str, contents: impl Into<Vec<u8>>) {
        let path = clean_path(path);
        let (parent, _) = split_path(&path);
        self.insert_dir(parent);
        self.nodes.insert(path, Node::File(contents.into()));
    }

    pub fn insert_dir(&mut self, path: &str) {
        let path = clean_path(path);
        let mut current = String::new();
        for part in path.split('/').filter(|p| !p.is_empty()) {
            current = join_path(&current, part);
            self.nodes.entry(current.clone()).or_insert(Node::Dir);
        }
    }

    fn node(&self, path: &str) -> Option<&Node> {
        if path.is_empty() {
            return Some(&ROOT);
        }
        self.nodes.get(path)
    }
}

impl FileSystem for MemFs {
    fn metadata(&self, path: &str) -> io::Result<FileMeta> {
        let path = clean_path(path);
        match self.node(&path) {
            Some(Node::File(data)) => Ok(FileMeta {
                kind: FileKind::File,
                size: data.len() as u64,
            }),
            Some(Node::Dir) => Ok(FileMeta {
                kind: FileKind::Dir,
                size: 0,
            }),
            None => Err(not_found(&path)),
        }
    }

    fn read_dir(&self, path: &str) -> io::Result<Vec<DirEntry>> {
        let path = clean_path(path);
        match self.node(&path) {
            Some(Node::Dir) => {}
            Some(Node::File(_)) => return Err(not_a_dir(&path)),
            None => return Err(not_found(&path)),
        }
        let prefix = if path.is_empty() { String::new() } else { format!("{}/", path) };
        let entries = self
            .nodes
            .range(prefix.clone()..)
            .take_while(|(key, _)| key.starts_with(&prefix))
            .filter(|(key, _)| !key[prefix.len()..].contains('/'))
            .map(|(key, node)| DirEntry {
                name: key[prefix.len()..].to_string(),
                kind: match node {
                    Node::File(_) => FileKind::File,
                    Node::Dir => FileKind::Dir,
                },
            })
            .collect();
        Ok(entries)
    }

    fn read(&self, path: &str) -> io::Result<Vec<u8>> {
        let path = clean_path(path);
        match self.node(&path) {
            Some(Node::File(data)) => Ok(data.clone()),
            Some(Node::Dir) => Err(io::Error::new(io::ErrorKind::Other, format!("{}: is a directory", path))),
            None => Err(not_found(&path)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_implicit_parents() {
        let fs = MemFs::new().with_file("a/b/c.txt", "x");
        assert!(fs.metadata("a").unwrap().is_dir());
        assert!(fs.metadata("a/b").unwrap().is_dir());
        assert_eq!(fs.metadata("a/b/c.txt").unwrap().size, 1);
    }

    #[test]
    fn test_read_dir_lists_direct_children_only() {
        let fs = MemFs::new()
            .with_file("a/one.txt", "1")
            .with_file("a/sub/two.txt", "2")
            .with_file("ab.txt", "3");
        let names: Vec<String> = fs.read_dir("a").unwrap().into_iter().map(|e| e.name).collect();
        assert_eq!(names, vec!["one.txt", "sub"]);

        let root: Vec<String> = fs.read_dir("").unwrap().into_iter().map(|e| e.name).collect();
        assert_eq!(root, vec!["a", "ab.txt"]);
    }

    #[test]
    fn test_read_dir_on_file_fails() {
        let fs = MemFs::new().with_file("f", "1");
        assert!(fs.read_dir("f").is_err());
        assert_eq!(fs.read_dir("missing").unwrap_err().kind(), io::ErrorKind::NotFound);
    }
}
