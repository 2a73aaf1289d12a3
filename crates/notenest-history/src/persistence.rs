/// Disk snapshot store for note histories, backed by redb.
///
/// Uses a single redb database file with two tables:
/// - `histories`: bincode-serialized `History` entries keyed by note ID
/// - `meta`: session-wide values such as the active note ID
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};

use crate::config::history_db_path;
use crate::history::{History, NoteId};

/// History table: note ID → bincode-serialized History.
const HISTORY_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("histories");

/// Metadata table: fixed key → raw string value.
const META_TABLE: TableDefinition<&str, &str> = TableDefinition::new("meta");

/// Meta key under which the active note ID is stored.
const ACTIVE_KEY: &str = "active";

/// Snapshot store for per-note histories.
///
/// Thread-safe: redb supports concurrent readers and serialized writers.
/// Shared via `Arc<HistoryStore>`.
pub struct HistoryStore {
    db: Database,
}

impl std::fmt::Debug for HistoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HistoryStore").finish()
    }
}

impl HistoryStore {
    /// Opens or creates the history database in the given directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or the database
    /// cannot be opened.
    pub fn open(data_dir: &Path) -> Result<Arc<Self>> {
        std::fs::create_dir_all(data_dir)
            .with_context(|| format!("Failed to create data directory: {}", data_dir.display()))?;

        let db_path = history_db_path(data_dir);
        let db = Database::create(&db_path)
            .with_context(|| format!("Failed to open history database: {}", db_path.display()))?;

        let write_txn = db
            .begin_write()
            .context("Failed to begin initial write transaction")?;
        {
            let _ = write_txn
                .open_table(HISTORY_TABLE)
                .context("Failed to create history table")?;
            let _ = write_txn
                .open_table(META_TABLE)
                .context("Failed to create meta table")?;
        }
        write_txn
            .commit()
            .context("Failed to commit initial transaction")?;

        Ok(Arc::new(Self { db }))
    }

    /// Writes the given histories in a single transaction (upsert).
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write transaction fails.
    pub fn write_histories<'a, I>(&self, entries: I) -> Result<usize>
    where
        I: IntoIterator<Item = (&'a NoteId, &'a History)>,
    {
        let write_txn = self
            .db
            .begin_write()
            .context("Failed to begin write transaction")?;
        let mut written = 0;
        {
            let mut table = write_txn
                .open_table(HISTORY_TABLE)
                .context("Failed to open history table")?;
            for (note_id, history) in entries {
                let bytes = bincode::serialize(history).context("Failed to serialize history")?;
                table
                    .insert(note_id.as_str(), bytes.as_slice())
                    .with_context(|| format!("Failed to insert history for {note_id}"))?;
                written += 1;
            }
        }
        write_txn
            .commit()
            .context("Failed to commit write transaction")?;
        Ok(written)
    }

    /// Writes one note's history.
    ///
    /// # Errors
    ///
    /// Returns an error if the write transaction fails.
    pub fn write_history(&self, note_id: &NoteId, history: &History) -> Result<()> {
        self.write_histories(std::iter::once((note_id, history)))
            .map(|_| ())
    }

    /// Reads one note's history, or `None` if none is stored.
    ///
    /// # Errors
    ///
    /// Returns an error if the read transaction or deserialization fails.
    pub fn read_history(&self, note_id: &NoteId) -> Result<Option<History>> {
        let read_txn = self
            .db
            .begin_read()
            .context("Failed to begin read transaction")?;
        let table = read_txn
            .open_table(HISTORY_TABLE)
            .context("Failed to open history table")?;

        match table
            .get(note_id.as_str())
            .context("Failed to read history entry")?
        {
            Some(guard) => {
                let history: History = bincode::deserialize(guard.value())
                    .context("Failed to deserialize history")?;
                Ok(Some(history))
            }
            None => Ok(None),
        }
    }

    /// Reads every stored history, ordered by note ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the read transaction or deserialization fails.
    pub fn read_all(&self) -> Result<Vec<(NoteId, History)>> {
        let read_txn = self
            .db
            .begin_read()
            .context("Failed to begin read transaction")?;
        let table = read_txn
            .open_table(HISTORY_TABLE)
            .context("Failed to open history table")?;

        let mut entries = Vec::new();
        for entry in table.iter().context("Failed to iterate history table")? {
            let (key_guard, value_guard) = entry.context("Failed to read history entry")?;
            let history: History = bincode::deserialize(value_guard.value())
                .context("Failed to deserialize history")?;
            entries.push((NoteId::from(key_guard.value()), history));
        }
        Ok(entries)
    }

    /// Removes the stored history of the given notes.
    ///
    /// # Errors
    ///
    /// Returns an error if the write transaction fails.
    pub fn remove_histories<'a, I>(&self, note_ids: I) -> Result<()>
    where
        I: IntoIterator<Item = &'a NoteId>,
    {
        let write_txn = self
            .db
            .begin_write()
            .context("Failed to begin write transaction")?;
        {
            let mut table = write_txn
                .open_table(HISTORY_TABLE)
                .context("Failed to open history table")?;
            for note_id in note_ids {
                table
                    .remove(note_id.as_str())
                    .with_context(|| format!("Failed to remove history for {note_id}"))?;
            }
        }
        write_txn.commit().context("Failed to commit removal")?;
        Ok(())
    }

    /// Removes one note's stored history.
    ///
    /// # Errors
    ///
    /// Returns an error if the write transaction fails.
    pub fn remove_history(&self, note_id: &NoteId) -> Result<()> {
        self.remove_histories(std::iter::once(note_id))
    }

    /// Saves (or clears, with `None`) the active note ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the write transaction fails.
    pub fn save_active(&self, note_id: Option<&NoteId>) -> Result<()> {
        let write_txn = self
            .db
            .begin_write()
            .context("Failed to begin write transaction")?;
        {
            let mut table = write_txn
                .open_table(META_TABLE)
                .context("Failed to open meta table")?;
            match note_id {
                Some(id) => {
                    table
                        .insert(ACTIVE_KEY, id.as_str())
                        .context("Failed to insert active note")?;
                }
                None => {
                    table
                        .remove(ACTIVE_KEY)
                        .context("Failed to clear active note")?;
                }
            }
        }
        write_txn.commit().context("Failed to commit metadata")?;
        Ok(())
    }

    /// Loads the active note ID, or `None` if none was saved.
    ///
    /// # Errors
    ///
    /// Returns an error if the read transaction fails.
    pub fn load_active(&self) -> Result<Option<NoteId>> {
        let read_txn = self
            .db
            .begin_read()
            .context("Failed to begin read transaction")?;
        let table = read_txn
            .open_table(META_TABLE)
            .context("Failed to open meta table")?;

        let active = table
            .get(ACTIVE_KEY)
            .context("Failed to read active note")?
            .map(|guard| NoteId::from(guard.value()));
        Ok(active)
    }

    /// Lists all note IDs that have a stored history.
    ///
    /// # Errors
    ///
    /// Returns an error if the read transaction fails.
    pub fn list_notes(&self) -> Result<Vec<NoteId>> {
        let read_txn = self
            .db
            .begin_read()
            .context("Failed to begin read transaction")?;
        let table = read_txn
            .open_table(HISTORY_TABLE)
            .context("Failed to open history table")?;

        let mut note_ids = Vec::new();
        for entry in table.iter().context("Failed to iterate history table")? {
            let (key_guard, _) = entry.context("Failed to read history entry")?;
            note_ids.push(NoteId::from(key_guard.value()));
        }
        Ok(note_ids)
    }
}
