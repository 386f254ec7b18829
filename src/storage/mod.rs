//! Persistence of received documents.
//!
//! The receiver hands every accepted snapshot to a [`DocumentStore`]. The
//! store overwrites; there is no history and no manifest.

pub mod fs;
pub mod memory;

use std::fmt;
use std::path::PathBuf;

use anyhow::Result;

pub use fs::FsDocumentStore;
pub use memory::MemoryDocumentStore;

/// Location of one shared document below a session root
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocumentPath {
    pub session: String,
    pub peer: Option<String>,
    pub file_name: String,
}

impl DocumentPath {
    pub fn new(session: impl Into<String>, peer: Option<String>, file_name: impl Into<String>) -> Self {
        Self {
            session: session.into(),
            peer,
            file_name: file_name.into(),
        }
    }

    /// `{session}/[{peer}/]` relative to a root
    pub fn dir(&self) -> PathBuf {
        let mut dir = PathBuf::from(&self.session);
        if let Some(peer) = &self.peer {
            dir.push(peer);
        }
        dir
    }

    pub fn relative(&self) -> PathBuf {
        self.dir().join(&self.file_name)
    }
}

impl fmt::Display for DocumentPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.peer {
            Some(peer) => write!(f, "{}/{}/{}", self.session, peer, self.file_name),
            None => write!(f, "{}/{}", self.session, self.file_name),
        }
    }
}

/// Filesystem collaborator the receiver writes through. Implementations
/// must create missing directories and replace existing content.
pub trait DocumentStore: Send + Sync {
    fn write(&self, path: &DocumentPath, content: &[u8]) -> Result<()>;

    fn read(&self, path: &DocumentPath) -> Result<Option<Vec<u8>>>;
}

/// True for a single, non-traversing path component
pub fn is_safe_segment(segment: &str) -> bool {
    !segment.is_empty()
        && segment != "."
        && segment != ".."
        && !segment.contains(['/', '\\', '\0'])
}
