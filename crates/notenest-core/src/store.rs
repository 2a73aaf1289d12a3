/// Note storage backed by redb, with an in-process change feed.
///
/// Notes are stored as bincode(`NoteRecord`) keyed by note ID. Every
/// successful save is broadcast to all subscribers, including the session
/// that wrote it, which is how saves come back as echoes.
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Mutex, PoisonError};

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};

use notenest_history::NoteId;

use crate::collaborator::{NotePersistence, NoteRecord, RemoteChange};

/// Notes table: note ID → bincode-serialized NoteRecord.
const NOTES_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("notes");

/// Persistent note store.
pub struct NoteStore {
    db: Database,
    subscribers: Mutex<Vec<Sender<RemoteChange>>>,
}

impl std::fmt::Debug for NoteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NoteStore").finish()
    }
}

impl NoteStore {
    /// Returns the note database path inside `data_dir`.
    pub fn notes_path(data_dir: &Path) -> PathBuf {
        data_dir.join("notes.redb")
    }

    /// Opens or creates the note database at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create data directory: {}", parent.display()))?;
        }
        let db = Database::create(path)
            .with_context(|| format!("Failed to open note database: {}", path.display()))?;

        let write_txn = db
            .begin_write()
            .context("Failed to begin initial note write transaction")?;
        {
            let _ = write_txn
                .open_table(NOTES_TABLE)
                .context("Failed to create notes table")?;
        }
        write_txn
            .commit()
            .context("Failed to commit initial note transaction")?;

        Ok(Self {
            db,
            subscribers: Mutex::new(Vec::new()),
        })
    }

    /// Creates a note with a fresh ID.
    pub fn create(&self, title: &str, content: &str) -> Result<NoteRecord> {
        let record = NoteRecord {
            id: NoteId::generate(),
            title: title.to_string(),
            content: content.to_string(),
            updated_at: Utc::now(),
        };
        self.put(&record)?;
        tracing::info!(note = %record.id, title, "Created note");
        Ok(record)
    }

    /// Reads a note, or `None` if it does not exist.
    pub fn get(&self, note_id: &NoteId) -> Result<Option<NoteRecord>> {
        let read_txn = self
            .db
            .begin_read()
            .context("Failed to begin read transaction")?;
        let table = read_txn
            .open_table(NOTES_TABLE)
            .context("Failed to open notes table")?;

        match table.get(note_id.as_str()).context("Failed to read note")? {
            Some(guard) => {
                let record: NoteRecord =
                    bincode::deserialize(guard.value()).context("Failed to deserialize note")?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    /// Lists all notes, most recently updated first.
    pub fn list(&self) -> Result<Vec<NoteRecord>> {
        let read_txn = self
            .db
            .begin_read()
            .context("Failed to begin read transaction")?;
        let table = read_txn
            .open_table(NOTES_TABLE)
            .context("Failed to open notes table")?;

        let mut records = Vec::new();
        for entry in table.iter().context("Failed to iterate notes table")? {
            let (_, value_guard) = entry.context("Failed to read note entry")?;
            let record: NoteRecord = bincode::deserialize(value_guard.value())
                .context("Failed to deserialize note")?;
            records.push(record);
        }
        records.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(records)
    }

    /// Changes a note's title. Titles are not part of the edit history.
    pub fn rename(&self, note_id: &NoteId, title: &str) -> Result<()> {
        self.update(note_id, |record| record.title = title.to_string())
            .map(|_| ())
    }

    /// Deletes a note. Returns whether it existed.
    pub fn delete(&self, note_id: &NoteId) -> Result<bool> {
        let write_txn = self
            .db
            .begin_write()
            .context("Failed to begin write transaction")?;
        let existed = {
            let mut table = write_txn
                .open_table(NOTES_TABLE)
                .context("Failed to open notes table")?;
            let removed = table
                .remove(note_id.as_str())
                .context("Failed to remove note")?;
            removed.is_some()
        };
        write_txn.commit().context("Failed to commit deletion")?;
        Ok(existed)
    }

    /// Subscribes to content changes. Dropped receivers are pruned on the
    /// next broadcast.
    pub fn subscribe(&self) -> Receiver<RemoteChange> {
        let (tx, rx) = mpsc::channel();
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
        rx
    }

    fn broadcast(&self, change: &RemoteChange) {
        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        subscribers.retain(|tx| tx.send(change.clone()).is_ok());
    }

    fn put(&self, record: &NoteRecord) -> Result<()> {
        let bytes = bincode::serialize(record).context("Failed to serialize note")?;
        let write_txn = self
            .db
            .begin_write()
            .context("Failed to begin write transaction")?;
        {
            let mut table = write_txn
                .open_table(NOTES_TABLE)
                .context("Failed to open notes table")?;
            table
                .insert(record.id.as_str(), bytes.as_slice())
                .context("Failed to insert note")?;
        }
        write_txn.commit().context("Failed to commit note")?;
        Ok(())
    }

    /// Read-modify-write of one note in a single transaction.
    fn update<F>(&self, note_id: &NoteId, apply: F) -> Result<NoteRecord>
    where
        F: FnOnce(&mut NoteRecord),
    {
        let write_txn = self
            .db
            .begin_write()
            .context("Failed to begin write transaction")?;
        let record = {
            let mut table = write_txn
                .open_table(NOTES_TABLE)
                .context("Failed to open notes table")?;
            let existing = match table.get(note_id.as_str()).context("Failed to read note")? {
                Some(guard) => Some(
                    bincode::deserialize::<NoteRecord>(guard.value())
                        .context("Failed to deserialize note")?,
                ),
                None => None,
            };
            let mut record = existing.ok_or_else(|| anyhow!("Note not found: {note_id}"))?;
            apply(&mut record);
            record.updated_at = Utc::now();

            let bytes = bincode::serialize(&record).context("Failed to serialize note")?;
            table
                .insert(note_id.as_str(), bytes.as_slice())
                .context("Failed to update note")?;
            record
        };
        write_txn.commit().context("Failed to commit note update")?;
        Ok(record)
    }
}

impl NotePersistence for NoteStore {
    fn load(&self, note_id: &NoteId) -> Result<NoteRecord> {
        self.get(note_id)?
            .ok_or_else(|| anyhow!("Note not found: {note_id}"))
    }

    fn save(&self, note_id: &NoteId, content: &str) -> Result<()> {
        self.update(note_id, |record| record.content = content.to_string())?;
        self.broadcast(&RemoteChange {
            note_id: note_id.clone(),
            content: content.to_string(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open_test_store() -> (NoteStore, TempDir) {
        let dir = TempDir::new().expect("create temp dir");
        let store = NoteStore::open(&NoteStore::notes_path(dir.path())).expect("open store");
        (store, dir)
    }

    #[test]
    fn test_create_and_load() {
        let (store, _dir) = open_test_store();
        let record = store.create("Verbi", "andare, venire").expect("create");

        let loaded = store.load(&record.id).expect("load");
        assert_eq!(loaded, record);
    }

    #[test]
    fn test_load_missing_note_fails() {
        let (store, _dir) = open_test_store();
        let err = store.load(&NoteId::from("missing")).unwrap_err();
        assert!(err.to_string().contains("missing"));
    }

    #[test]
    fn test_save_updates_content_and_timestamp() {
        let (store, _dir) = open_test_store();
        let record = store.create("Lessico", "casa").expect("create");

        store.save(&record.id, "casa, cane").expect("save");

        let loaded = store.load(&record.id).expect("load");
        assert_eq!(loaded.content, "casa, cane");
        assert_eq!(loaded.title, "Lessico");
        assert!(loaded.updated_at >= record.updated_at);
    }

    #[test]
    fn test_save_missing_note_fails() {
        let (store, _dir) = open_test_store();
        assert!(store.save(&NoteId::from("ghost"), "boo").is_err());
    }

    #[test]
    fn test_save_broadcasts_to_subscribers() {
        let (store, _dir) = open_test_store();
        let record = store.create("n", "").expect("create");
        let rx_a = store.subscribe();
        let rx_b = store.subscribe();

        store.save(&record.id, "hello").expect("save");

        let expected = RemoteChange {
            note_id: record.id.clone(),
            content: "hello".to_string(),
        };
        assert_eq!(rx_a.try_recv().expect("a"), expected);
        assert_eq!(rx_b.try_recv().expect("b"), expected);
    }

    #[test]
    fn test_dropped_subscriber_is_pruned() {
        let (store, _dir) = open_test_store();
        let record = store.create("n", "").expect("create");
        let rx = store.subscribe();
        drop(store.subscribe());

        store.save(&record.id, "one").expect("save");

        assert_eq!(rx.try_recv().expect("recv").content, "one");
        assert_eq!(
            store
                .subscribers
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .len(),
            1
        );
    }

    #[test]
    fn test_failed_save_does_not_broadcast() {
        let (store, _dir) = open_test_store();
        let rx = store.subscribe();
        assert!(store.save(&NoteId::from("ghost"), "x").is_err());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_rename_keeps_content() {
        let (store, _dir) = open_test_store();
        let record = store.create("Old", "body").expect("create");
        store.rename(&record.id, "New").expect("rename");

        let loaded = store.load(&record.id).expect("load");
        assert_eq!(loaded.title, "New");
        assert_eq!(loaded.content, "body");
    }

    #[test]
    fn test_delete() {
        let (store, _dir) = open_test_store();
        let record = store.create("gone", "").expect("create");

        assert!(store.delete(&record.id).expect("delete"));
        assert!(!store.delete(&record.id).expect("delete again"));
        assert!(store.get(&record.id).expect("get").is_none());
    }

    #[test]
    fn test_list_orders_by_updated_desc() {
        let (store, _dir) = open_test_store();
        let first = store.create("first", "").expect("create");
        let second = store.create("second", "").expect("create");
        store.save(&first.id, "touched").expect("save");

        let titles: Vec<String> = store
            .list()
            .expect("list")
            .into_iter()
            .map(|r| r.title)
            .collect();
        assert_eq!(titles.len(), 2);
        assert_eq!(titles[0], "first");
        assert!(titles.contains(&second.title));
    }

    #[test]
    fn test_reopen_preserves_notes() {
        let dir = TempDir::new().expect("create temp dir");
        let path = NoteStore::notes_path(dir.path());
        let id = {
            let store = NoteStore::open(&path).expect("open");
            let record = store.create("kept", "persistente").expect("create");
            record.id
        };

        let store = NoteStore::open(&path).expect("reopen");
        assert_eq!(store.load(&id).expect("load").content, "persistente");
    }
}
