/// Core types: note identifiers and the snapshot-based history of one note.
use std::collections::VecDeque;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of a note, used as the history key and the persistence key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NoteId(String);

impl NoteId {
    /// Generates a fresh, globally unique note ID.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Returns the ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NoteId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for NoteId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl AsRef<str> for NoteId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Undo/redo history of a single note, stored as full-text snapshots.
///
/// `past` is ordered oldest first; `future` is ordered nearest-redo first.
/// `present` is always the most recently committed snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct History {
    past: Vec<String>,
    present: String,
    future: VecDeque<String>,
}

impl History {
    /// Creates a history with no undo or redo entries.
    pub fn new(present: impl Into<String>) -> Self {
        Self {
            past: Vec::new(),
            present: present.into(),
            future: VecDeque::new(),
        }
    }

    /// Snapshots available for undo, oldest first.
    pub fn past(&self) -> &[String] {
        &self.past
    }

    /// The current snapshot.
    pub fn present(&self) -> &str {
        &self.present
    }

    /// Snapshots available for redo, nearest first.
    pub fn future(&self) -> &VecDeque<String> {
        &self.future
    }

    pub fn can_undo(&self) -> bool {
        !self.past.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.future.is_empty()
    }

    /// Commits a new snapshot. Returns `false` (and changes nothing) when
    /// `content` equals the current snapshot.
    ///
    /// A committed edit invalidates the redo branch.
    pub(crate) fn commit(&mut self, content: &str, max_depth: usize) -> bool {
        if content == self.present {
            return false;
        }
        let previous = std::mem::replace(&mut self.present, content.to_string());
        self.past.push(previous);
        self.future.clear();
        self.enforce_depth(max_depth);
        true
    }

    /// Moves the newest `past` entry into `present`. Returns `false` when
    /// there is nothing to undo.
    pub(crate) fn undo(&mut self) -> bool {
        let Some(previous) = self.past.pop() else {
            return false;
        };
        let current = std::mem::replace(&mut self.present, previous);
        self.future.push_front(current);
        true
    }

    /// Moves the nearest `future` entry into `present`. Returns `false` when
    /// there is nothing to redo.
    pub(crate) fn redo(&mut self, max_depth: usize) -> bool {
        let Some(next) = self.future.pop_front() else {
            return false;
        };
        let current = std::mem::replace(&mut self.present, next);
        self.past.push(current);
        self.enforce_depth(max_depth);
        true
    }

    /// Drops the oldest undo snapshots beyond `max_depth`. At least one
    /// snapshot is always kept.
    fn enforce_depth(&mut self, max_depth: usize) {
        let max_depth = max_depth.max(1);
        if self.past.len() > max_depth {
            let excess = self.past.len() - max_depth;
            self.past.drain(..excess);
        }
    }
}
