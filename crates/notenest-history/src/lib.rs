/// Per-note undo/redo history for the notebook editor.
///
/// Provides a `HistoryManager` that keeps one snapshot-based `History` per
/// note, tracks which note is active, and can optionally snapshot every
/// history to an embedded key-value store (redb) so undo stacks survive
/// across application sessions.
pub mod config;
pub mod history;
pub mod manager;
pub mod persistence;

pub use config::HistoryConfig;
pub use history::{History, NoteId};
pub use manager::HistoryManager;
pub use persistence::HistoryStore;
