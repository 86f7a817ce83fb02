use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use super::{clean_path, DirEntry, FileKind, FileMeta, FileSystem};

/// A [`FileSystem`] rooted at a local directory.
#[derive(Debug, Clone)]
pub struct DirFs {
    root: PathBuf,
}

impl DirFs {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> PathBuf {
        let cleaned = clean_path(path);
        if cleaned.is_empty() {
            self.root.clone()
        } else {
            self.root.join(cleaned)
        }
    }
}

fn to_meta(meta: &fs::Metadata) -> FileMeta {
    let file_type = meta.file_type();
    let kind = if file_type.is_symlink() {
        FileKind::Symlink
    } else if file_type.is_dir() {
        FileKind::Dir
    } else {
        FileKind::File
    };
    FileMeta {
        kind,
        size: meta.len(),
    }
}

impl FileSystem for DirFs {
    fn metadata(&self, path: &str) -> io::Result<FileMeta> {
        fs::metadata(self.resolve(path)).map(|m| to_meta(&m))
    }

    fn symlink_metadata(&self, path: &str) -> io::Result<FileMeta> {
        fs::symlink_metadata(self.resolve(path)).map(|m| to_meta(&m))
    }

    fn read_dir(&self, path: &str) -> io::Result<Vec<DirEntry>> {
        let mut entries = Vec::new();
        for entry in fs::read_dir(self.resolve(path))? {
            let entry = entry?;
            let file_type = entry.file_type()?;
            let kind = if file_type.is_symlink() {
                FileKind::Symlink
            } else if file_type.is_dir() {
                FileKind::Dir
            } else {
                FileKind::File
            };
            entries.push(DirEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                kind,
            });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    fn read(&self, path: &str) -> io::Result<Vec<u8>> {
        fs::read(self.resolve(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dir_fs_reads_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("app")).unwrap();
        fs::write(dir.path().join("app/requirements.txt"), "requests==2.31.0\n").unwrap();

        let dfs = DirFs::new(dir.path());
        assert!(dfs.metadata("").unwrap().is_dir());
        assert!(dfs.metadata("/app/requirements.txt").unwrap().is_file());
        assert_eq!(dfs.read("app/requirements.txt").unwrap(), b"requests==2.31.0\n");

        let entries = dfs.read_dir("app").unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "requirements.txt");
        assert_eq!(entries[0].kind, FileKind::File);
    }

    #[test]
    fn test_dir_fs_missing_path() {
        let dir = tempfile::tempdir().unwrap();
        let dfs = DirFs::new(dir.path());
        let err = dfs.metadata("nope").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
        assert!(!dfs.exists("nope"));
    }
}
