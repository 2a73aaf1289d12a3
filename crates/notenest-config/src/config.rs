/// Application configuration: load, save, and sanitize.
use std::path::{Path, PathBuf};
use std::time::Duration;

use notenest_history::HistoryConfig;
use serde::{Deserialize, Serialize};

/// Environment variable that overrides the data directory.
pub const DATA_DIR_ENV: &str = "NOTENEST_DATA_DIR";

/// Top-level application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Directory holding the note and history databases. Empty = platform default.
    pub data_dir: String,
    /// Quiet period before typed text is committed as one undo step.
    pub history_commit_ms: u64,
    /// Quiet period before the displayed text is written to the note store.
    pub save_debounce_ms: u64,
    /// Whether undo stacks are snapshotted to disk between sessions.
    pub persist_history: bool,
    /// Max undo snapshots kept per note.
    pub max_history_depth: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: String::new(),
            history_commit_ms: 300,
            save_debounce_ms: 1000,
            persist_history: true,
            max_history_depth: 10_000,
        }
    }
}

impl AppConfig {
    /// Returns the config file path: exe directory + `notenest.json`.
    pub fn config_path() -> PathBuf {
        std::env::current_exe()
            .ok()
            .and_then(|p| p.parent().map(|d| d.join("notenest.json")))
            .unwrap_or_else(|| PathBuf::from("notenest.json"))
    }

    /// Loads config from `path`, creating a default file if it doesn't exist.
    /// Returns defaults on any error (missing file, parse error, etc.).
    pub fn load_or_create(path: &Path) -> Self {
        if path.exists() {
            match std::fs::read_to_string(path) {
                Ok(contents) => match serde_json::from_str::<AppConfig>(&contents) {
                    Ok(mut config) => {
                        config.sanitize();
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to parse config at {}: {e}", path.display());
                    }
                },
                Err(e) => {
                    tracing::warn!("Failed to read config at {}: {e}", path.display());
                }
            }
            // Return defaults on error (don't overwrite broken file)
            Self::default()
        } else {
            let config = Self::default();
            if let Err(e) = config.save(path) {
                tracing::warn!("Failed to create default config at {}: {e}", path.display());
            }
            config
        }
    }

    /// Saves config to `path` as pretty-printed JSON.
    pub fn save(&self, path: &Path) -> Result<(), std::io::Error> {
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(path, json)
    }

    /// Clamps values to valid ranges.
    ///
    /// The save window never undercuts the history window, so a durable
    /// save always carries text that has already been committed to history.
    pub fn sanitize(&mut self) {
        self.history_commit_ms = self.history_commit_ms.clamp(50, 5_000);
        self.save_debounce_ms = self
            .save_debounce_ms
            .clamp(self.history_commit_ms, 60_000);
        self.max_history_depth = self.max_history_depth.max(1);
    }

    /// Quiet period for the history-commit debounce.
    pub fn history_commit_window(&self) -> Duration {
        Duration::from_millis(self.history_commit_ms)
    }

    /// Quiet period for the durable-save debounce.
    pub fn save_window(&self) -> Duration {
        Duration::from_millis(self.save_debounce_ms)
    }

    /// Builds the history manager configuration.
    pub fn history_config(&self) -> HistoryConfig {
        HistoryConfig::with_max_depth(self.max_history_depth)
    }

    /// Returns the effective data directory.
    pub fn data_dir(&self) -> PathBuf {
        resolve_data_dir(&self.data_dir)
    }
}

/// Resolves the data directory path.
///
/// Resolution order:
/// 1. `NOTENEST_DATA_DIR` environment variable
/// 2. `configured`, when non-empty
/// 3. The platform data directory + `notenest`
/// 4. `.data/` directory next to the executable
pub fn resolve_data_dir(configured: &str) -> PathBuf {
    if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
        if !dir.is_empty() {
            return PathBuf::from(dir);
        }
    }
    if !configured.is_empty() {
        return PathBuf::from(configured);
    }
    if let Some(dir) = dirs::data_dir() {
        return dir.join("notenest");
    }
    let exe = std::env::current_exe().unwrap_or_else(|_| PathBuf::from("."));
    exe.parent().unwrap_or(Path::new(".")).join(".data")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert!(config.data_dir.is_empty());
        assert_eq!(config.history_commit_ms, 300);
        assert_eq!(config.save_debounce_ms, 1000);
        assert!(config.persist_history);
        assert_eq!(config.max_history_depth, 10_000);
    }

    #[test]
    fn test_default_survives_sanitize() {
        let mut config = AppConfig::default();
        config.sanitize();
        assert_eq!(config.history_commit_ms, 300);
        assert_eq!(config.save_debounce_ms, 1000);
    }

    #[test]
    fn test_sanitize_clamps_history_window() {
        let mut config = AppConfig::default();
        config.history_commit_ms = 0;
        config.sanitize();
        assert_eq!(config.history_commit_ms, 50);

        config.history_commit_ms = 99_999;
        config.sanitize();
        assert_eq!(config.history_commit_ms, 5_000);
    }

    #[test]
    fn test_sanitize_save_window_not_below_history_window() {
        let mut config = AppConfig::default();
        config.history_commit_ms = 800;
        config.save_debounce_ms = 100;
        config.sanitize();
        assert_eq!(config.save_debounce_ms, 800);
    }

    #[test]
    fn test_sanitize_clamps_save_window_maximum() {
        let mut config = AppConfig::default();
        config.save_debounce_ms = 3_600_000;
        config.sanitize();
        assert_eq!(config.save_debounce_ms, 60_000);
    }

    #[test]
    fn test_sanitize_raises_zero_depth() {
        let mut config = AppConfig::default();
        config.max_history_depth = 0;
        config.sanitize();
        assert_eq!(config.max_history_depth, 1);
    }

    #[test]
    fn test_windows_as_durations() {
        let config = AppConfig::default();
        assert_eq!(config.history_commit_window(), Duration::from_millis(300));
        assert_eq!(config.save_window(), Duration::from_secs(1));
    }

    #[test]
    fn test_history_config() {
        let mut config = AppConfig::default();
        config.max_history_depth = 42;
        assert_eq!(config.history_config().max_history_depth, 42);
    }

    #[test]
    fn test_missing_fields_get_defaults() {
        let json = r#"{"history_commit_ms": 200}"#;
        let parsed: AppConfig = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.history_commit_ms, 200);
        assert_eq!(parsed.save_debounce_ms, 1000);
        assert!(parsed.persist_history);
    }

    #[test]
    fn test_serde_round_trip() {
        let mut config = AppConfig::default();
        config.data_dir = "/var/lib/notenest".to_string();
        config.persist_history = false;
        let json = serde_json::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.data_dir, "/var/lib/notenest");
        assert!(!parsed.persist_history);
    }

    #[test]
    fn test_resolve_data_dir_order() {
        // Save and restore env var
        let original = std::env::var(DATA_DIR_ENV).ok();

        std::env::set_var(DATA_DIR_ENV, "/custom/path");
        assert_eq!(resolve_data_dir("/configured"), PathBuf::from("/custom/path"));

        std::env::remove_var(DATA_DIR_ENV);
        assert_eq!(resolve_data_dir("/configured"), PathBuf::from("/configured"));
        assert!(!resolve_data_dir("").as_os_str().is_empty());

        match original {
            Some(val) => std::env::set_var(DATA_DIR_ENV, val),
            None => std::env::remove_var(DATA_DIR_ENV),
        }
    }
}
