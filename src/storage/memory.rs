use anyhow::Result;
use dashmap::DashMap;

use super::{DocumentPath, DocumentStore};

/// Keeps documents in memory; for embedding and tests
#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    files: DashMap<DocumentPath, Vec<u8>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl DocumentStore for MemoryDocumentStore {
    fn write(&self, path: &DocumentPath, content: &[u8]) -> Result<()> {
        self.files.insert(path.clone(), content.to_vec());
        Ok(())
    }

    fn read(&self, path: &DocumentPath) -> Result<Option<Vec<u8>>> {
        Ok(self.files.get(path).map(|entry| entry.value().clone()))
    }
}
