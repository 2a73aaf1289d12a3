use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use notenest_config::AppConfig;
use notenest_core::{
    EditorSession, HistoryManager, HistoryStore, NoteId, NoteStore, SessionTimings,
};

mod shell;

use shell::Shell;

/// Note editor shell with per-note undo history and debounced saving.
#[derive(Parser, Debug)]
#[command(name = "notenest", version, about)]
struct Cli {
    /// Config file (defaults to `notenest.json` next to the executable).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory holding the note and history databases.
    #[arg(long = "data-dir")]
    data_dir: Option<PathBuf>,

    /// Note to open on startup.
    #[arg(long)]
    note: Option<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    tracing::info!("Starting notenest");

    let config_path = cli.config.unwrap_or_else(AppConfig::config_path);
    let config = AppConfig::load_or_create(&config_path);
    let data_dir = cli.data_dir.unwrap_or_else(|| config.data_dir());
    tracing::debug!(data_dir = %data_dir.display(), "Resolved data directory");

    let store = Arc::new(NoteStore::open(&NoteStore::notes_path(&data_dir))?);
    let history_store = if config.persist_history {
        Some(HistoryStore::open(&data_dir)?)
    } else {
        None
    };
    let history = HistoryManager::load_or_new(config.history_config(), history_store)
        .context("Failed to restore note histories")?;

    let startup_note = cli
        .note
        .map(NoteId::from)
        .or_else(|| history.active_note().cloned());

    let timings = SessionTimings {
        history_commit: config.history_commit_window(),
        save: config.save_window(),
    };
    let mut session = EditorSession::new(history, Arc::clone(&store), timings);

    if let Some(note_id) = startup_note {
        if let Err(e) = session.open_note(&note_id) {
            tracing::warn!("Could not open note {note_id}: {e:#}");
        }
    }

    let stdin = io::stdin();
    Shell::new(session, store).run(stdin.lock(), io::stdout())
}
