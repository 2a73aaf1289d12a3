/// Interfaces the editor session consumes: durable note storage and the
/// realtime change feed.
use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use notenest_history::NoteId;

/// A stored note as returned by the persistence collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteRecord {
    pub id: NoteId,
    pub title: String,
    pub content: String,
    pub updated_at: DateTime<Utc>,
}

/// A content change reported by the realtime feed.
///
/// May originate from another client or be the round trip of this
/// client's own save.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteChange {
    pub note_id: NoteId,
    pub content: String,
}

/// Loads and saves note content by ID.
///
/// Calls are made from debounced flush points. Save failures are logged by
/// the session and never roll back in-memory history.
pub trait NotePersistence {
    /// Loads the authoritative record of a note.
    fn load(&self, note_id: &NoteId) -> Result<NoteRecord>;

    /// Writes new content for a note.
    fn save(&self, note_id: &NoteId, content: &str) -> Result<()>;
}

impl<P: NotePersistence + ?Sized> NotePersistence for Arc<P> {
    fn load(&self, note_id: &NoteId) -> Result<NoteRecord> {
        (**self).load(note_id)
    }

    fn save(&self, note_id: &NoteId, content: &str) -> Result<()> {
        (**self).save(note_id, content)
    }
}
