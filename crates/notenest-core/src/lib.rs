pub mod collaborator;
pub mod debounce;
pub mod session;
pub mod store;

pub use collaborator::{NotePersistence, NoteRecord, RemoteChange};
pub use debounce::Debouncer;
pub use notenest_history::{History, HistoryConfig, HistoryManager, HistoryStore, NoteId};
pub use session::{EditorSession, PendingEdit, RemoteOutcome, SessionTimings};
pub use store::NoteStore;
