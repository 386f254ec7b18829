//! Seam to the text editor the session runs inside.
//!
//! The core never renders anything or touches open buffers itself. It asks
//! an [`EditorSurface`] for the active document and hands back the ranges
//! peers have selected.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};

use crate::registry::{PeerSelection, SessionRegistry};
use crate::sync::{file_name_of, CursorSelection};

/// The active document as the editor sees it right now
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentSnapshot {
    /// Full path as the editor reports it (any separator style)
    pub path: String,
    pub text: String,
    pub selection: CursorSelection,
}

pub trait EditorSurface: Send + Sync {
    /// `None` when no document is focused
    fn active_document(&self) -> Option<DocumentSnapshot>;

    /// Show `selections` in `file_name`. Called on every refresh tick, so
    /// implementations should replace rather than accumulate decorations.
    fn highlight(&self, file_name: &str, selections: &[PeerSelection]);
}

/// Editor stand-in backed by a file on disk. Re-reads the file on every
/// call; the selection is whatever was last set.
#[derive(Debug)]
pub struct FileEditor {
    path: PathBuf,
    selection: RwLock<CursorSelection>,
    highlights: RwLock<Vec<PeerSelection>>,
}

impl FileEditor {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            selection: RwLock::new(CursorSelection::default()),
            highlights: RwLock::new(Vec::new()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn set_selection(&self, selection: CursorSelection) {
        *self.selection.write() = selection;
    }

    /// What the last `highlight` call asked for
    pub fn highlights(&self) -> Vec<PeerSelection> {
        self.highlights.read().clone()
    }
}

impl EditorSurface for FileEditor {
    fn active_document(&self) -> Option<DocumentSnapshot> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(err) => {
                tracing::debug!(path = %self.path.display(), error = %err, "document unreadable");
                return None;
            }
        };
        Some(DocumentSnapshot {
            path: self.path.to_string_lossy().into_owned(),
            text,
            selection: *self.selection.read(),
        })
    }

    fn highlight(&self, file_name: &str, selections: &[PeerSelection]) {
        if !selections.is_empty() {
            tracing::trace!(file = file_name, count = selections.len(), "highlighting peers");
        }
        *self.highlights.write() = selections.to_vec();
    }
}

/// Host-side refresh loop: on every tick, look up peer selections for the
/// editor's active file and hand them to the editor.
pub struct OverlayRefresher {
    registry: Arc<SessionRegistry>,
    editor: Arc<dyn EditorSurface>,
    every: Duration,
}

impl OverlayRefresher {
    pub fn new(registry: Arc<SessionRegistry>, editor: Arc<dyn EditorSurface>, every: Duration) -> Self {
        Self {
            registry,
            editor,
            every,
        }
    }

    /// One refresh. Returns how many selections were shown.
    pub fn refresh(&self) -> usize {
        let Some(doc) = self.editor.active_document() else {
            return 0;
        };
        let Some(file_name) = file_name_of(&doc.path) else {
            return 0;
        };

        let selections = self.registry.selections_for_file(file_name);
        if selections.is_empty() {
            return 0;
        }
        self.editor.highlight(file_name, &selections);
        selections.len()
    }

    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(self.every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let this = Arc::new(self);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let refresher = this.clone();
                    if let Err(err) = tokio::task::spawn_blocking(move || refresher.refresh()).await {
                        tracing::warn!(error = %err, "overlay refresh failed");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        tracing::debug!("overlay refresher stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::RegistryKey;
    use tempfile::TempDir;

    #[test]
    fn test_file_editor_rereads() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("notes.md");
        std::fs::write(&path, "one").unwrap();

        let editor = FileEditor::new(&path);
        editor.set_selection(CursorSelection::new(0, 1, 0, 3));
        let doc = editor.active_document().unwrap();
        assert_eq!(doc.text, "one");
        assert_eq!(doc.selection, CursorSelection::new(0, 1, 0, 3));

        std::fs::write(&path, "two").unwrap();
        assert_eq!(editor.active_document().unwrap().text, "two");

        std::fs::remove_file(&path).unwrap();
        assert!(editor.active_document().is_none());
    }

    #[test]
    fn test_refresh_highlights_active_file_only() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.txt");
        std::fs::write(&path, "text").unwrap();

        let registry = Arc::new(SessionRegistry::new());
        let editor = Arc::new(FileEditor::new(&path));
        let refresher =
            OverlayRefresher::new(registry.clone(), editor.clone(), Duration::from_millis(10));

        assert_eq!(refresher.refresh(), 0);

        registry.upsert(RegistryKey::file("b.txt"), CursorSelection::caret(1, 1));
        assert_eq!(refresher.refresh(), 0);

        registry.upsert(RegistryKey::file("a.txt"), CursorSelection::new(0, 0, 0, 4));
        assert_eq!(refresher.refresh(), 1);
        assert_eq!(
            editor.highlights()[0].selection,
            CursorSelection::new(0, 0, 0, 4)
        );
    }
}
