//! Latest cursor selection per shared document.
//!
//! Written by the receiver, read by whatever refreshes the host's editor.
//! Entries are replaced whole on every accepted update and never removed
//! while the session lives.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;

use crate::sync::CursorSelection;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct RegistryKey {
    pub peer: Option<String>,
    pub file_name: String,
}

impl RegistryKey {
    pub fn new(peer: Option<String>, file_name: impl Into<String>) -> Self {
        Self {
            peer,
            file_name: file_name.into(),
        }
    }

    /// Key used when peers are not distinguished
    pub fn file(file_name: impl Into<String>) -> Self {
        Self::new(None, file_name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RegistryEntry {
    pub selection: CursorSelection,
    pub updated_at: DateTime<Utc>,
}

/// One peer's selection in a given file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PeerSelection {
    pub peer: Option<String>,
    pub selection: CursorSelection,
}

#[derive(Debug, Default)]
pub struct SessionRegistry {
    entries: DashMap<RegistryKey, RegistryEntry>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace whatever was stored for `key`
    pub fn upsert(&self, key: RegistryKey, selection: CursorSelection) {
        self.entries.insert(
            key,
            RegistryEntry {
                selection,
                updated_at: Utc::now(),
            },
        );
    }

    pub fn lookup(&self, key: &RegistryKey) -> Option<CursorSelection> {
        self.entries.get(key).map(|entry| entry.selection)
    }

    pub fn entry(&self, key: &RegistryKey) -> Option<RegistryEntry> {
        self.entries.get(key).map(|entry| *entry.value())
    }

    /// Every peer's selection in `file_name`, ordered by peer
    pub fn selections_for_file(&self, file_name: &str) -> Vec<PeerSelection> {
        let mut found: Vec<PeerSelection> = self
            .entries
            .iter()
            .filter(|entry| entry.key().file_name == file_name)
            .map(|entry| PeerSelection {
                peer: entry.key().peer.clone(),
                selection: entry.value().selection,
            })
            .collect();
        found.sort_by(|a, b| a.peer.cmp(&b.peer));
        found
    }

    /// Point-in-time copy of every entry
    pub fn snapshot(&self) -> Vec<(RegistryKey, RegistryEntry)> {
        let mut all: Vec<_> = self
            .entries
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_upsert_replaces() {
        let registry = SessionRegistry::new();
        let key = RegistryKey::file("a.txt");

        registry.upsert(key.clone(), CursorSelection::new(1, 2, 3, 4));
        registry.upsert(key.clone(), CursorSelection::caret(9, 0));

        assert_eq!(registry.lookup(&key), Some(CursorSelection::caret(9, 0)));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.lookup(&RegistryKey::file("b.txt")), None);
    }

    #[test]
    fn test_peers_tracked_separately() {
        let registry = SessionRegistry::new();
        registry.upsert(RegistryKey::new(Some("zoe".into()), "a.txt"), CursorSelection::caret(2, 0));
        registry.upsert(RegistryKey::new(Some("ana".into()), "a.txt"), CursorSelection::caret(1, 0));
        registry.upsert(RegistryKey::new(Some("ana".into()), "b.txt"), CursorSelection::caret(5, 5));

        let in_a = registry.selections_for_file("a.txt");
        assert_eq!(in_a.len(), 2);
        assert_eq!(in_a[0].peer.as_deref(), Some("ana"));
        assert_eq!(in_a[1].selection, CursorSelection::caret(2, 0));
        assert_eq!(registry.snapshot().len(), 3);
    }

    #[test]
    fn test_concurrent_readers_see_whole_entries() {
        let registry = Arc::new(SessionRegistry::new());
        let key = RegistryKey::file("a.txt");

        let writer = {
            let registry = registry.clone();
            let key = key.clone();
            std::thread::spawn(move || {
                for i in 0..1000u32 {
                    registry.upsert(key.clone(), CursorSelection::new(i, i, i, i));
                }
            })
        };

        for _ in 0..1000 {
            if let Some(sel) = registry.lookup(&key) {
                assert!(sel.start_line == sel.end_char && sel.start_char == sel.end_line);
            }
        }
        writer.join().unwrap();
        assert_eq!(registry.lookup(&key), Some(CursorSelection::new(999, 999, 999, 999)));
    }
}
