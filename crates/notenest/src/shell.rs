/// Line-oriented editor shell over an `EditorSession`.
///
/// Each input line is one command. Before a command runs, due debounced
/// work is ticked and the store's change feed is drained into the session,
/// which is where the session's own saves come back as echoes.
use std::io::{BufRead, Write};
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, bail, Context, Result};
use notenest_core::{
    EditorSession, NoteId, NotePersistence, NoteStore, RemoteChange, RemoteOutcome,
};

const HELP: &str = "\
commands:
  new [title]      create a note and open it
  open <id>        open a note
  list             list notes, most recently updated first
  type <text>      replace the note text
  append <text>    append to the note text
  undo | redo      step through the note's history
  show             print the note text
  history          print the note's undo/redo stacks
  remote <text>    write the note as another client would
  rename <title>   rename the open note
  delete <id>      delete a note
  wait <ms>        let time pass for debounced saves
  flush            save everything now
  help             show this help
  quit             save and exit";

/// A parsed shell command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    New(Option<String>),
    Open(NoteId),
    List,
    Type(String),
    Append(String),
    Undo,
    Redo,
    Show,
    History,
    Remote(String),
    Rename(String),
    Delete(NoteId),
    Wait(Duration),
    Flush,
    Help,
    Quit,
}

impl Command {
    /// Parses one input line. Blank lines parse to `None`.
    pub fn parse(line: &str) -> Result<Option<Self>> {
        let line = line.trim_end_matches(['\r', '\n']);
        if line.trim().is_empty() {
            return Ok(None);
        }
        let (word, rest) = match line.trim_start().split_once(' ') {
            Some((word, rest)) => (word, rest),
            None => (line.trim(), ""),
        };
        let arg = rest.trim();

        let command = match word {
            "new" => Self::New((!arg.is_empty()).then(|| arg.to_string())),
            "open" => Self::Open(required(word, arg)?.into()),
            "list" | "ls" => Self::List,
            // Text arguments keep their inner whitespace.
            "type" => Self::Type(rest.to_string()),
            "append" => Self::Append(rest.to_string()),
            "undo" => Self::Undo,
            "redo" => Self::Redo,
            "show" => Self::Show,
            "history" => Self::History,
            "remote" => Self::Remote(rest.to_string()),
            "rename" => Self::Rename(required(word, arg)?.to_string()),
            "delete" | "rm" => Self::Delete(required(word, arg)?.into()),
            "wait" => {
                let ms: u64 = required(word, arg)?
                    .parse()
                    .with_context(|| format!("Invalid duration: {arg}"))?;
                Self::Wait(Duration::from_millis(ms))
            }
            "flush" => Self::Flush,
            "help" | "?" => Self::Help,
            "quit" | "exit" => Self::Quit,
            other => bail!("Unknown command: {other} (try `help`)"),
        };
        Ok(Some(command))
    }
}

fn required<'a>(command: &str, arg: &'a str) -> Result<&'a str> {
    if arg.is_empty() {
        Err(anyhow!("`{command}` needs an argument"))
    } else {
        Ok(arg)
    }
}

/// Shell state: the session, the store it writes to, and the store's feed.
pub struct Shell {
    session: EditorSession<Arc<NoteStore>>,
    store: Arc<NoteStore>,
    feed: Receiver<RemoteChange>,
    /// Time skipped with `wait`, added to the wall clock.
    skew: Duration,
}

impl Shell {
    pub fn new(session: EditorSession<Arc<NoteStore>>, store: Arc<NoteStore>) -> Self {
        let feed = store.subscribe();
        Self {
            session,
            store,
            feed,
            skew: Duration::ZERO,
        }
    }

    pub fn session(&self) -> &EditorSession<Arc<NoteStore>> {
        &self.session
    }

    /// Reads commands from `input` until EOF or `quit`, then flushes.
    pub fn run<R: BufRead, W: Write>(mut self, input: R, mut out: W) -> Result<()> {
        for line in input.lines() {
            let line = line.context("Failed to read command")?;
            self.pump();

            let command = match Command::parse(&line) {
                Ok(Some(command)) => command,
                Ok(None) => continue,
                Err(e) => {
                    writeln!(out, "error: {e:#}")?;
                    continue;
                }
            };
            if command == Command::Quit {
                break;
            }
            if let Err(e) = self.execute(command, &mut out) {
                writeln!(out, "error: {e:#}")?;
            }
            self.pump();
        }

        self.session.close().context("Failed to save history")?;
        Ok(())
    }

    /// Runs one command, writing its output to `out`.
    pub fn execute<W: Write>(&mut self, command: Command, out: &mut W) -> Result<()> {
        let now = self.now();
        match command {
            Command::New(title) => {
                let title = title.as_deref().unwrap_or("New Note");
                let record = self.store.create(title, "")?;
                self.session.open_note(&record.id)?;
                writeln!(out, "created {} ({})", record.id, record.title)?;
            }
            Command::Open(note_id) => {
                self.session.open_note(&note_id)?;
                writeln!(out, "{}", self.session.buffer())?;
            }
            Command::List => {
                for record in self.store.list()? {
                    let marker = if self.session.active_note() == Some(&record.id) {
                        '*'
                    } else {
                        ' '
                    };
                    writeln!(
                        out,
                        "{marker} {}  {}  {}",
                        record.id,
                        record.updated_at.format("%Y-%m-%d %H:%M:%S"),
                        record.title
                    )?;
                }
            }
            Command::Type(text) => {
                self.require_active()?;
                self.session.edit(&text, now);
            }
            Command::Append(text) => {
                self.require_active()?;
                let content = format!("{}{}", self.session.buffer(), text);
                self.session.edit(&content, now);
            }
            Command::Undo => {
                self.require_active()?;
                self.session.undo(now);
                writeln!(out, "{}", self.session.buffer())?;
            }
            Command::Redo => {
                self.require_active()?;
                self.session.redo(now);
                writeln!(out, "{}", self.session.buffer())?;
            }
            Command::Show => {
                let note = self.require_active()?;
                writeln!(
                    out,
                    "[{note}] undo:{} redo:{}",
                    self.session.can_undo(),
                    self.session.can_redo()
                )?;
                writeln!(out, "{}", self.session.buffer())?;
            }
            Command::History => {
                let note = self.require_active()?;
                if let Some(history) = self.session.history().history(&note) {
                    for entry in history.past() {
                        writeln!(out, "  past    {entry:?}")?;
                    }
                    writeln!(out, "> present {:?}", history.present())?;
                    for entry in history.future() {
                        writeln!(out, "  future  {entry:?}")?;
                    }
                }
            }
            Command::Remote(text) => {
                let note = self.require_active()?;
                self.store.save(&note, &text)?;
            }
            Command::Rename(title) => {
                let note = self.require_active()?;
                self.store.rename(&note, &title)?;
            }
            Command::Delete(note_id) => {
                if !self.store.delete(&note_id)? {
                    bail!("No such note: {note_id}");
                }
                self.session.forget_note(&note_id);
                writeln!(out, "deleted {note_id}")?;
            }
            Command::Wait(duration) => {
                self.skew += duration;
                self.pump();
            }
            Command::Flush => {
                self.session.flush()?;
            }
            Command::Help => writeln!(out, "{HELP}")?,
            Command::Quit => {}
        }
        Ok(())
    }

    fn now(&self) -> Instant {
        Instant::now() + self.skew
    }

    /// Runs due debounced work and feeds pending notifications to the session.
    fn pump(&mut self) {
        self.session.tick(self.now());
        while let Ok(change) = self.feed.try_recv() {
            let note = change.note_id.clone();
            if self.session.on_remote_change(change) == RemoteOutcome::Applied {
                tracing::info!(note = %note, "Note was changed by another client");
            }
        }
    }

    fn require_active(&self) -> Result<NoteId> {
        self.session
            .active_note()
            .cloned()
            .ok_or_else(|| anyhow!("No note is open (use `new` or `open <id>`)"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notenest_core::{HistoryManager, SessionTimings};

    fn shell(dir: &std::path::Path) -> Shell {
        let store = Arc::new(NoteStore::open(&NoteStore::notes_path(dir)).expect("open store"));
        let session = EditorSession::new(
            HistoryManager::in_memory(),
            Arc::clone(&store),
            SessionTimings::default(),
        );
        Shell::new(session, store)
    }

    fn run(shell: &mut Shell, lines: &[&str]) -> String {
        let mut out = Vec::new();
        for line in lines {
            shell.pump();
            if let Some(command) = Command::parse(line).expect("parse") {
                shell.execute(command, &mut out).expect("execute");
            }
            shell.pump();
        }
        String::from_utf8(out).expect("utf8")
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(Command::parse("").expect("parse"), None);
        assert_eq!(Command::parse("   ").expect("parse"), None);
        assert_eq!(Command::parse("undo").expect("parse"), Some(Command::Undo));
        assert_eq!(
            Command::parse("new Vocabolario").expect("parse"),
            Some(Command::New(Some("Vocabolario".to_string())))
        );
        assert_eq!(Command::parse("new").expect("parse"), Some(Command::New(None)));
        assert_eq!(
            Command::parse("open abc").expect("parse"),
            Some(Command::Open(NoteId::from("abc")))
        );
        assert_eq!(
            Command::parse("wait 1500").expect("parse"),
            Some(Command::Wait(Duration::from_millis(1500)))
        );
    }

    #[test]
    fn test_parse_keeps_text_whitespace() {
        assert_eq!(
            Command::parse("type  two  spaces ").expect("parse"),
            Some(Command::Type(" two  spaces ".to_string()))
        );
        assert_eq!(
            Command::parse("append\r\n").expect("parse"),
            Some(Command::Append(String::new()))
        );
    }

    #[test]
    fn test_parse_errors() {
        assert!(Command::parse("frobnicate").is_err());
        assert!(Command::parse("open").is_err());
        assert!(Command::parse("wait soon").is_err());
    }

    #[test]
    fn test_type_undo_redo() {
        let dir = tempfile::tempdir().expect("temp dir");
        let mut shell = shell(dir.path());

        let out = run(
            &mut shell,
            &["new Parole", "type ciao", "wait 1000", "append  mondo", "undo", "redo"],
        );

        let lines: Vec<&str> = out.lines().collect();
        assert!(lines[0].starts_with("created "));
        assert_eq!(lines[1], "ciao");
        assert_eq!(lines[2], "ciao mondo");
    }

    #[test]
    fn test_remote_edit_resets_history() {
        let dir = tempfile::tempdir().expect("temp dir");
        let mut shell = shell(dir.path());

        run(&mut shell, &["new", "type bozza", "wait 1000", "remote bozza v2"]);

        assert_eq!(shell.session().buffer(), "bozza v2");
        assert!(!shell.session().can_undo());
    }

    #[test]
    fn test_wait_triggers_save() {
        let dir = tempfile::tempdir().expect("temp dir");
        let mut shell = shell(dir.path());
        run(&mut shell, &["new", "type salvato"]);
        assert!(shell.session().has_pending_save());

        run(&mut shell, &["wait 1000"]);

        assert!(!shell.session().has_pending_save());
        let note = shell.session().active_note().cloned().expect("active");
        let stored = shell.store.get(&note).expect("get").expect("exists");
        assert_eq!(stored.content, "salvato");
        assert!(shell.session().can_undo());
    }

    #[test]
    fn test_delete_forgets_note() {
        let dir = tempfile::tempdir().expect("temp dir");
        let mut shell = shell(dir.path());
        run(&mut shell, &["new", "type via"]);
        let note = shell.session().active_note().cloned().expect("active");

        let mut out = Vec::new();
        shell
            .execute(Command::Delete(note.clone()), &mut out)
            .expect("delete");

        assert!(shell.session().active_note().is_none());
        assert!(shell.store.get(&note).expect("get").is_none());
    }

    #[test]
    fn test_failed_delete_keeps_history() {
        let dir = tempfile::tempdir().expect("temp dir");
        let mut shell = shell(dir.path());
        run(&mut shell, &["new", "type resta"]);
        let note = shell.session().active_note().cloned().expect("active");
        assert!(shell.store.delete(&note).expect("delete"));

        let mut out = Vec::new();
        assert!(shell
            .execute(Command::Delete(note.clone()), &mut out)
            .is_err());

        assert_eq!(shell.session().active_note(), Some(&note));
        assert!(shell.session().can_undo());
    }

    #[test]
    fn test_commands_need_open_note() {
        let dir = tempfile::tempdir().expect("temp dir");
        let mut shell = shell(dir.path());
        let mut out = Vec::new();
        assert!(shell
            .execute(Command::Type("x".to_string()), &mut out)
            .is_err());
        assert!(shell.execute(Command::Undo, &mut out).is_err());
    }

    #[test]
    fn test_run_until_quit_saves() {
        let dir = tempfile::tempdir().expect("temp dir");
        let shell = shell(dir.path());
        let store = Arc::clone(&shell.store);
        let input = "new Diario\ntype oggi\nquit\ntype ignored\n";

        let mut out = Vec::new();
        shell.run(input.as_bytes(), &mut out).expect("run");

        let notes = store.list().expect("list");
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].content, "oggi");
    }
}
