/// Configuration for the history system.
use std::path::{Path, PathBuf};

/// Maximum number of undo snapshots kept per note.
/// Oldest snapshots are dropped when this limit is exceeded.
const DEFAULT_MAX_HISTORY_DEPTH: usize = 10_000;

/// File name of the history snapshot database inside the data directory.
pub const HISTORY_DB_FILE: &str = "history.redb";

/// Configuration for the history system.
#[derive(Debug, Clone)]
pub struct HistoryConfig {
    /// Max undo snapshots per note (the `past` stack).
    pub max_history_depth: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_history_depth: DEFAULT_MAX_HISTORY_DEPTH,
        }
    }
}

impl HistoryConfig {
    /// Creates a config with the given depth cap. A cap of zero is raised to one.
    pub fn with_max_depth(max_history_depth: usize) -> Self {
        Self {
            max_history_depth: max_history_depth.max(1),
        }
    }
}

/// Returns the path of the history database inside `data_dir`.
pub fn history_db_path(data_dir: &Path) -> PathBuf {
    data_dir.join(HISTORY_DB_FILE)
}
