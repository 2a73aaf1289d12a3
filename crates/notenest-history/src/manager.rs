/// Edit-history manager: one undo/redo history per note plus the active note.
///
/// Every operation is total. Unknown note IDs and empty stacks produce
/// no-ops, never errors. Disk snapshotting is explicit via `flush()` so the
/// state machine itself stays free of I/O.
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use anyhow::{Context, Result};

use crate::config::HistoryConfig;
use crate::history::{History, NoteId};
use crate::persistence::HistoryStore;

/// Manages undo/redo history for every note opened in a session.
///
/// Construct one per application session and hand it to whatever drives the
/// editor. Histories survive note switches; returning to a note whose stored
/// content is unchanged keeps its undo stack.
pub struct HistoryManager {
    /// Per-note histories.
    histories: HashMap<NoteId, History>,
    /// Note that undo/redo apply to.
    active: Option<NoteId>,
    /// Configuration parameters.
    config: HistoryConfig,
    /// Optional disk snapshots (None = in-memory only).
    store: Option<Arc<HistoryStore>>,
    /// Notes whose history changed since the last flush.
    dirty: HashSet<NoteId>,
    /// Notes forgotten since the last flush.
    forgotten: HashSet<NoteId>,
    /// Whether the active pointer changed since the last flush.
    active_dirty: bool,
}

impl std::fmt::Debug for HistoryManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HistoryManager")
            .field("notes", &self.histories.len())
            .field("active", &self.active)
            .field("dirty", &self.dirty.len())
            .field("persistent", &self.store.is_some())
            .finish()
    }
}

impl Default for HistoryManager {
    fn default() -> Self {
        Self::in_memory()
    }
}

impl HistoryManager {
    /// Creates an empty manager.
    ///
    /// Pass `store: None` for in-memory-only mode.
    pub fn new(config: HistoryConfig, store: Option<Arc<HistoryStore>>) -> Self {
        Self {
            histories: HashMap::new(),
            active: None,
            config,
            store,
            dirty: HashSet::new(),
            forgotten: HashSet::new(),
            active_dirty: false,
        }
    }

    /// Creates an in-memory-only manager with default config.
    pub fn in_memory() -> Self {
        Self::new(HistoryConfig::default(), None)
    }

    /// Restores histories and the active note from the store, or creates a
    /// fresh manager when there is no store or it is empty.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails to read.
    pub fn load_or_new(config: HistoryConfig, store: Option<Arc<HistoryStore>>) -> Result<Self> {
        let mut manager = Self::new(config, store);
        let Some(store) = manager.store.clone() else {
            return Ok(manager);
        };

        for (note_id, history) in store
            .read_all()
            .context("Failed to load note histories from disk")?
        {
            manager.histories.insert(note_id, history);
        }
        manager.active = store
            .load_active()
            .context("Failed to load active note")?
            .filter(|id| manager.histories.contains_key(id));

        tracing::debug!(
            notes = manager.histories.len(),
            active = ?manager.active,
            "Restored note histories"
        );
        Ok(manager)
    }

    /// Makes `note_id` active with `content` as its authoritative text.
    ///
    /// Creates the history when missing and resets it when its present
    /// snapshot differs from `content`. Loading is not an undoable edit.
    /// An identical re-load leaves the history untouched.
    pub fn load_content(&mut self, note_id: &NoteId, content: &str) {
        if self.active.as_ref() != Some(note_id) {
            self.active = Some(note_id.clone());
            self.active_dirty = true;
        }

        match self.histories.get(note_id) {
            Some(history) if history.present() == content => {}
            Some(_) => {
                tracing::debug!(note = %note_id, "Content differs from history, resetting");
                self.reset(note_id, content);
            }
            None => self.reset(note_id, content),
        }
    }

    /// Commits a local edit to `note_id`'s history.
    ///
    /// No-op when the note has no history or `content` equals its present
    /// snapshot. Otherwise the old present becomes undoable and the redo
    /// branch is discarded.
    pub fn set_content(&mut self, note_id: &NoteId, content: &str) {
        let Some(history) = self.histories.get_mut(note_id) else {
            tracing::debug!(note = %note_id, "Ignoring edit for note without history");
            return;
        };
        if history.commit(content, self.config.max_history_depth) {
            self.dirty.insert(note_id.clone());
        }
    }

    /// Undoes the last committed edit of the active note.
    pub fn undo(&mut self) {
        let Some(note_id) = self.active.clone() else {
            return;
        };
        if let Some(history) = self.histories.get_mut(&note_id) {
            if history.undo() {
                self.dirty.insert(note_id);
            }
        }
    }

    /// Redoes the most recently undone edit of the active note.
    pub fn redo(&mut self) {
        let Some(note_id) = self.active.clone() else {
            return;
        };
        if let Some(history) = self.histories.get_mut(&note_id) {
            if history.redo(self.config.max_history_depth) {
                self.dirty.insert(note_id);
            }
        }
    }

    /// Returns the active note's present snapshot, or `""` if none is active.
    pub fn current_content(&self) -> &str {
        self.active_history().map(History::present).unwrap_or("")
    }

    /// Whether the active note has anything to undo.
    pub fn can_undo(&self) -> bool {
        self.active_history().is_some_and(History::can_undo)
    }

    /// Whether the active note has anything to redo.
    pub fn can_redo(&self) -> bool {
        self.active_history().is_some_and(History::can_redo)
    }

    /// Returns the active note ID.
    pub fn active_note(&self) -> Option<&NoteId> {
        self.active.as_ref()
    }

    /// Returns the history of any note the manager knows about.
    pub fn history(&self, note_id: &NoteId) -> Option<&History> {
        self.histories.get(note_id)
    }

    /// Number of notes with a history.
    pub fn note_count(&self) -> usize {
        self.histories.len()
    }

    /// Whether in-memory state has changed since the last flush.
    pub fn is_dirty(&self) -> bool {
        !self.dirty.is_empty() || !self.forgotten.is_empty() || self.active_dirty
    }

    /// Drops a note's history, e.g. after the note was deleted.
    ///
    /// Clears the active pointer when it referred to this note.
    pub fn forget(&mut self, note_id: &NoteId) {
        if self.histories.remove(note_id).is_none() {
            return;
        }
        self.dirty.remove(note_id);
        self.forgotten.insert(note_id.clone());
        if self.active.as_ref() == Some(note_id) {
            self.active = None;
            self.active_dirty = true;
        }
    }

    /// Writes changed histories and the active pointer to disk.
    ///
    /// No-op if the manager is in-memory-only or nothing has changed.
    /// In-memory state is never rolled back on failure; the dirty set is
    /// kept so the next flush retries.
    ///
    /// # Errors
    ///
    /// Returns an error if a disk write fails.
    pub fn flush(&mut self) -> Result<()> {
        let Some(store) = &self.store else {
            return Ok(());
        };
        if !self.is_dirty() {
            return Ok(());
        }

        let changed = self
            .dirty
            .iter()
            .filter_map(|id| self.histories.get(id).map(|h| (id, h)));
        store
            .write_histories(changed)
            .context("Failed to flush note histories to disk")?;
        self.dirty.clear();

        store
            .remove_histories(self.forgotten.iter())
            .context("Failed to remove forgotten histories")?;
        self.forgotten.clear();

        if self.active_dirty {
            store
                .save_active(self.active.as_ref())
                .context("Failed to save active note")?;
            self.active_dirty = false;
        }
        Ok(())
    }

    fn active_history(&self) -> Option<&History> {
        self.active.as_ref().and_then(|id| self.histories.get(id))
    }

    fn reset(&mut self, note_id: &NoteId, content: &str) {
        self.histories.insert(note_id.clone(), History::new(content));
        self.forgotten.remove(note_id);
        self.dirty.insert(note_id.clone());
    }
}
