/// Editor session: ties the history manager to debounced persistence and to
/// the realtime change feed.
///
/// Typed text goes through two independent trailing debounces. A short one
/// commits the text to the undo history, so undo steps are bursts of typing
/// rather than keystrokes. A longer one writes the text to the note store.
/// Both carry the note ID they were produced for, so a flush after a note
/// switch always lands on the original note.
use std::time::{Duration, Instant};

use anyhow::{Context, Result};

use notenest_history::{HistoryManager, NoteId};

use crate::collaborator::{NotePersistence, RemoteChange};
use crate::debounce::Debouncer;

/// Default quiet period before typed text becomes an undo step.
const DEFAULT_HISTORY_COMMIT: Duration = Duration::from_millis(300);

/// Default quiet period before the displayed text is saved.
const DEFAULT_SAVE: Duration = Duration::from_millis(1000);

/// Debounce windows used by an `EditorSession`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionTimings {
    pub history_commit: Duration,
    pub save: Duration,
}

impl Default for SessionTimings {
    fn default() -> Self {
        Self {
            history_commit: DEFAULT_HISTORY_COMMIT,
            save: DEFAULT_SAVE,
        }
    }
}

/// Text waiting in a debouncer, bound to the note it was typed into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingEdit {
    pub note_id: NoteId,
    pub content: String,
}

/// What the session did with a realtime notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteOutcome {
    /// A genuine external edit; the note's history was reset to it.
    Applied,
    /// The round trip of a local save, or identical to the displayed text.
    Echo,
    /// The change is for a note that is not open. It is reconciled the
    /// next time that note is opened.
    Inactive,
}

/// One editor bound to a history manager and a persistence collaborator.
pub struct EditorSession<P> {
    history: HistoryManager,
    persistence: P,
    /// Text currently displayed by the editor. Runs ahead of the history
    /// while a commit is pending.
    buffer: String,
    history_commit: Debouncer<PendingEdit>,
    save: Debouncer<PendingEdit>,
    /// Last content this session wrote successfully.
    last_saved: Option<PendingEdit>,
}

impl<P> std::fmt::Debug for EditorSession<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EditorSession")
            .field("history", &self.history)
            .field("buffer_len", &self.buffer.len())
            .field("pending_commit", &self.history_commit.is_pending())
            .field("pending_save", &self.save.is_pending())
            .finish()
    }
}

impl<P: NotePersistence> EditorSession<P> {
    pub fn new(history: HistoryManager, persistence: P, timings: SessionTimings) -> Self {
        let buffer = history.current_content().to_string();
        Self {
            history,
            persistence,
            buffer,
            history_commit: Debouncer::new(timings.history_commit),
            save: Debouncer::new(timings.save),
            last_saved: None,
        }
    }

    /// Switches the editor to `note_id`.
    ///
    /// Pending work for the previous note is flushed to that note first.
    /// The note's stored content is then loaded; the history is kept when it
    /// matches and reset when it doesn't.
    ///
    /// # Errors
    ///
    /// Returns an error if the note cannot be loaded. The previously active
    /// note stays active.
    pub fn open_note(&mut self, note_id: &NoteId) -> Result<()> {
        self.flush_pending();

        let record = self
            .persistence
            .load(note_id)
            .with_context(|| format!("Failed to load note {note_id}"))?;
        self.history.load_content(note_id, &record.content);
        self.buffer = record.content;

        tracing::info!(
            note = %note_id,
            title = %record.title,
            can_undo = self.history.can_undo(),
            "Opened note"
        );
        Ok(())
    }

    /// Replaces the displayed text, as the editor does on each keystroke.
    ///
    /// Restarts both debounce windows. No-op without an active note.
    pub fn edit(&mut self, content: &str, now: Instant) {
        let Some(note_id) = self.history.active_note().cloned() else {
            tracing::debug!("Ignoring edit without an active note");
            return;
        };
        if content == self.buffer {
            return;
        }
        self.buffer = content.to_string();

        let pending = PendingEdit {
            note_id,
            content: self.buffer.clone(),
        };
        self.history_commit.schedule(pending.clone(), now);
        self.save.schedule(pending, now);
    }

    /// Runs whichever debounced actions are due at `now`.
    pub fn tick(&mut self, now: Instant) {
        if let Some(pending) = self.history_commit.poll(now) {
            self.commit(pending);
        }
        if let Some(pending) = self.save.poll(now) {
            self.persist(pending);
        }
    }

    /// Undoes the last edit of the active note, including text still
    /// waiting to be committed.
    pub fn undo(&mut self, now: Instant) {
        self.commit_pending();
        if !self.history.can_undo() {
            return;
        }
        self.history.undo();
        self.sync_buffer(now);
    }

    /// Redoes the most recently undone edit of the active note.
    ///
    /// Text still waiting to be committed counts as a new edit and
    /// discards the redo branch.
    pub fn redo(&mut self, now: Instant) {
        self.commit_pending();
        if !self.history.can_redo() {
            return;
        }
        self.history.redo();
        self.sync_buffer(now);
    }

    /// Handles a realtime notification.
    ///
    /// Content identical to the displayed text, or the first notification
    /// of what this session last saved for the note, is an echo and ignored. Anything else is an
    /// external edit: pending local work for the note is dropped and its
    /// history is reset, so an external edit is never locally undoable.
    pub fn on_remote_change(&mut self, change: RemoteChange) -> RemoteOutcome {
        if self.history.active_note() != Some(&change.note_id) {
            tracing::debug!(note = %change.note_id, "Change for inactive note");
            return RemoteOutcome::Inactive;
        }
        let own_save = self.take_own_save(&change);
        if own_save || change.content == self.buffer {
            tracing::debug!(note = %change.note_id, "Ignoring echo");
            return RemoteOutcome::Echo;
        }

        self.last_saved = None;
        self.cancel_pending_for(&change.note_id);
        self.history.load_content(&change.note_id, &change.content);
        self.buffer = change.content;
        tracing::info!(note = %change.note_id, "Applied remote change");
        RemoteOutcome::Applied
    }

    /// Drops everything the session holds for a deleted note.
    pub fn forget_note(&mut self, note_id: &NoteId) {
        self.cancel_pending_for(note_id);
        let was_active = self.history.active_note() == Some(note_id);
        self.history.forget(note_id);
        if was_active {
            self.buffer.clear();
        }
        if self
            .last_saved
            .as_ref()
            .is_some_and(|saved| &saved.note_id == note_id)
        {
            self.last_saved = None;
        }
    }

    /// Flushes both debouncers and snapshots the history to disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the history snapshot cannot be written. Note
    /// saves are optimistic and only logged on failure.
    pub fn flush(&mut self) -> Result<()> {
        self.flush_pending();
        self.history.flush()
    }

    /// Flushes everything before the editor goes away.
    ///
    /// # Errors
    ///
    /// Returns an error if the history snapshot cannot be written.
    pub fn close(mut self) -> Result<HistoryManager> {
        self.flush()?;
        tracing::debug!("Closed editor session");
        Ok(self.history)
    }

    /// Text currently displayed by the editor.
    pub fn buffer(&self) -> &str {
        &self.buffer
    }

    pub fn active_note(&self) -> Option<&NoteId> {
        self.history.active_note()
    }

    /// Whether undo would change the displayed text.
    pub fn can_undo(&self) -> bool {
        self.history.can_undo() || self.has_uncommitted_text()
    }

    /// Whether redo would change the displayed text.
    pub fn can_redo(&self) -> bool {
        self.history.can_redo() && !self.has_uncommitted_text()
    }

    pub fn history(&self) -> &HistoryManager {
        &self.history
    }

    pub fn has_pending_commit(&self) -> bool {
        self.history_commit.is_pending()
    }

    pub fn has_pending_save(&self) -> bool {
        self.save.is_pending()
    }

    /// Earliest instant at which `tick` has work to do.
    pub fn next_deadline(&self) -> Option<Instant> {
        match (self.history_commit.deadline(), self.save.deadline()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    fn commit(&mut self, pending: PendingEdit) {
        self.history.set_content(&pending.note_id, &pending.content);
    }

    fn commit_pending(&mut self) {
        if let Some(pending) = self.history_commit.flush() {
            self.commit(pending);
        }
    }

    fn flush_pending(&mut self) {
        self.commit_pending();
        if let Some(pending) = self.save.flush() {
            self.persist(pending);
        }
    }

    fn persist(&mut self, pending: PendingEdit) {
        match self.persistence.save(&pending.note_id, &pending.content) {
            Ok(()) => {
                tracing::debug!(note = %pending.note_id, "Saved note");
                self.last_saved = Some(pending);
            }
            Err(e) => {
                tracing::warn!(note = %pending.note_id, "Failed to save note: {e:#}");
            }
        }
    }

    /// Shows the active note's present snapshot and schedules saving it.
    fn sync_buffer(&mut self, now: Instant) {
        self.buffer = self.history.current_content().to_string();
        if let Some(note_id) = self.history.active_note().cloned() {
            self.save.schedule(
                PendingEdit {
                    note_id,
                    content: self.buffer.clone(),
                },
                now,
            );
        }
    }

    fn cancel_pending_for(&mut self, note_id: &NoteId) {
        for debouncer in [&mut self.history_commit, &mut self.save] {
            if debouncer
                .pending()
                .is_some_and(|pending| &pending.note_id == note_id)
            {
                if let Some(dropped) = debouncer.cancel() {
                    tracing::debug!(note = %dropped.note_id, "Dropped pending edit");
                }
            }
        }
    }

    /// Consumes the last save when `change` is its notification. Each save
    /// is echoed once.
    fn take_own_save(&mut self, change: &RemoteChange) -> bool {
        let own = self
            .last_saved
            .as_ref()
            .is_some_and(|saved| saved.note_id == change.note_id && saved.content == change.content);
        if own {
            self.last_saved = None;
        }
        own
    }

    fn has_uncommitted_text(&self) -> bool {
        let active = self.history.active_note();
        self.history_commit.pending().is_some_and(|pending| {
            Some(&pending.note_id) == active
                && self
                    .history
                    .history(&pending.note_id)
                    .is_some_and(|h| h.present() != pending.content)
        })
    }
}
