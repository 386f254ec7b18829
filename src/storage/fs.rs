use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use super::{DocumentPath, DocumentStore};

/// Writes documents under `{root}/{session}/[{peer}/]{file}`
#[derive(Debug, Clone)]
pub struct FsDocumentStore {
    root: PathBuf,
}

impl FsDocumentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn full_path(&self, path: &DocumentPath) -> PathBuf {
        self.root.join(path.relative())
    }
}

impl DocumentStore for FsDocumentStore {
    fn write(&self, path: &DocumentPath, content: &[u8]) -> Result<()> {
        let dir = self.root.join(path.dir());
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create {}", dir.display()))?;

        let file = dir.join(&path.file_name);
        std::fs::write(&file, content)
            .with_context(|| format!("failed to write {}", file.display()))?;
        Ok(())
    }

    fn read(&self, path: &DocumentPath) -> Result<Option<Vec<u8>>> {
        match std::fs::read(self.full_path(path)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_overwrite_not_append() {
        let dir = TempDir::new().unwrap();
        let store = FsDocumentStore::new(dir.path());
        let path = DocumentPath::new("lab", None, "a.txt");

        store.write(&path, b"hello").unwrap();
        store.write(&path, b"hello world").unwrap();

        let on_disk = std::fs::read(dir.path().join("lab").join("a.txt")).unwrap();
        assert_eq!(on_disk, b"hello world");

        store.write(&path, b"hi").unwrap();
        assert_eq!(store.read(&path).unwrap().unwrap(), b"hi");
    }

    #[test]
    fn test_peer_directories() {
        let dir = TempDir::new().unwrap();
        let store = FsDocumentStore::new(dir.path());
        let path = DocumentPath::new("lab", Some("ana".into()), "main.rs");

        store.write(&path, b"fn main() {}").unwrap();
        assert!(dir.path().join("lab/ana/main.rs").is_file());
        assert_eq!(store.read(&DocumentPath::new("lab", None, "main.rs")).unwrap(), None);
    }
}
