//! Interactive shell
//!
//! Reads one command per line and applies it to the [`App`]. Edits stay
//! pending until `sync`, or until the shell exits with `sync_on_exit` set.
//!
//! Commands take the form `<kind> <verb> [argument]`, where kind is
//! `thread`, `branch` or `note` (or `t`, `b`, `n`).

use std::io::{self, BufRead, Write};

use anyhow::{bail, Context, Result};
use tracing::{info, warn};

use ntkpr_core::{App, Config, ContextName, EntityKind, NoteStore, SyncError};

use crate::editor;
use crate::output::{Output, OutputFormat};

const HELP: &str = "\
Entities:  thread | branch | note   (short: t | b | n)

  <kind> [list]            show the current view
  <kind> add <text>        add a thread, a branch to the active thread,
                           or a note to the active branch (no text opens $EDITOR)
  <kind> select <n>        activate row n of the current view
  <kind> view <name>       switch to the default, recent or search view
                           (search shows the last query, rerun on entry)
  <kind> search <query>    filter into the search view
  <kind> delete            delete the active entity
  <kind> highlight         toggle highlight
  <kind> private           toggle private
  thread|branch rename <name>
  thread|branch summary <text>
  note show                print the active note
  note edit [text]         replace the content (no text opens $EDITOR)
  note topics <a, b>       add comma-separated topics
  note untopic <topic>     remove a topic
  note link <n>            also file the active note under branch n

  undo                     restore the last delete made since the last sync
  sync                     write pending edits
  status                   counts and pending edits
  help                     this text
  quit                     leave (syncs first when sync_on_exit is set)";

/// One parsed shell line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    List(EntityKind),
    Add(EntityKind, String),
    Select(EntityKind, usize),
    View(EntityKind, ContextName),
    Search(EntityKind, String),
    Delete(EntityKind),
    Highlight(EntityKind),
    Private(EntityKind),
    Rename(EntityKind, String),
    Summary(EntityKind, String),
    ShowNote,
    EditNote(Option<String>),
    AddTopics(String),
    RemoveTopic(String),
    LinkNote(usize),
    Undo,
    Sync,
    Status,
    Help,
    Quit,
}

/// Parse one input line. Blank lines and `#` comments yield `None`.
pub fn parse(line: &str) -> Result<Option<Command>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }

    let (head, rest) = split_word(line);
    let command = match head {
        "sync" => Command::Sync,
        "undo" => Command::Undo,
        "status" => Command::Status,
        "help" | "?" => Command::Help,
        "quit" | "exit" | "q" => Command::Quit,
        _ => {
            let Some(kind) = parse_kind(head) else {
                bail!("Unknown command '{}'. Type 'help' for a list.", head);
            };
            parse_entity_command(kind, rest)?
        }
    };
    Ok(Some(command))
}

fn parse_entity_command(kind: EntityKind, input: &str) -> Result<Command> {
    let (verb, arg) = split_word(input);
    let command = match verb {
        "" | "list" | "ls" => Command::List(kind),
        "add" | "new" => Command::Add(kind, arg.to_string()),
        "select" | "sel" => Command::Select(kind, parse_index(arg)?),
        "view" => {
            let name = arg.parse::<ContextName>().map_err(anyhow::Error::msg)?;
            Command::View(kind, name)
        }
        "search" | "find" => Command::Search(kind, arg.to_string()),
        "delete" | "rm" => Command::Delete(kind),
        "highlight" | "hl" => Command::Highlight(kind),
        "private" => Command::Private(kind),
        "rename" if kind != EntityKind::Note => Command::Rename(kind, require(arg, "a name")?),
        "summary" if kind != EntityKind::Note => Command::Summary(kind, arg.to_string()),
        "show" if kind == EntityKind::Note => Command::ShowNote,
        "edit" if kind == EntityKind::Note => {
            Command::EditNote((!arg.is_empty()).then(|| arg.to_string()))
        }
        "topics" | "topic" if kind == EntityKind::Note => {
            Command::AddTopics(require(arg, "a topic list")?)
        }
        "untopic" if kind == EntityKind::Note => Command::RemoveTopic(require(arg, "a topic")?),
        "link" if kind == EntityKind::Note => Command::LinkNote(parse_index(arg)?),
        other => bail!("'{}' is not a {} command", other, kind),
    };
    Ok(command)
}

fn parse_kind(word: &str) -> Option<EntityKind> {
    match word {
        "thread" | "threads" | "t" => Some(EntityKind::Thread),
        "branch" | "branches" | "b" => Some(EntityKind::Branch),
        "note" | "notes" | "n" => Some(EntityKind::Note),
        _ => None,
    }
}

fn parse_index(arg: &str) -> Result<usize> {
    arg.parse()
        .with_context(|| format!("Expected a row number, got '{}'", arg))
}

fn require(arg: &str, what: &str) -> Result<String> {
    if arg.is_empty() {
        bail!("Expected {}", what);
    }
    Ok(arg.to_string())
}

fn split_word(input: &str) -> (&str, &str) {
    match input.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (input, ""),
    }
}

/// Whether the shell keeps reading after a command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// Line-oriented front end over an [`App`]
pub struct Shell<'a, S: NoteStore> {
    app: &'a App<S>,
    output: &'a Output,
}

impl<'a, S: NoteStore> Shell<'a, S> {
    pub fn new(app: &'a App<S>, output: &'a Output) -> Self {
        Self { app, output }
    }

    /// Read and execute commands until `quit` or end of input
    pub fn run(&self, input: impl BufRead) -> Result<()> {
        self.prompt()?;
        for line in input.lines() {
            let line = line.context("Failed to read input")?;
            let flow = match parse(&line).and_then(|cmd| match cmd {
                Some(cmd) => self.execute(cmd),
                None => Ok(Flow::Continue),
            }) {
                Ok(flow) => flow,
                Err(e) => {
                    self.output.error(&format!("{:#}", e));
                    Flow::Continue
                }
            };
            if flow == Flow::Quit {
                break;
            }
            self.prompt()?;
        }
        Ok(())
    }

    fn prompt(&self) -> Result<()> {
        if self.output.format == OutputFormat::Human {
            let mut stdout = io::stdout();
            write!(stdout, "ntkpr> ")?;
            stdout.flush()?;
        }
        Ok(())
    }

    /// Apply one command
    pub fn execute(&self, command: Command) -> Result<Flow> {
        let app = self.app;
        match command {
            Command::List(kind) => self.list(kind),
            Command::Add(kind, text) => self.add(kind, &text)?,
            Command::Select(kind, row) => match app.select(kind, row) {
                Some(id) => self.output.success(&format!("Selected {} {}", kind, id)),
                None => bail!("No {} at row {}", kind, row),
            },
            Command::View(kind, name) => {
                if !app.switch_view(kind, name) {
                    bail!("No {0} search yet; run '{0} search <query>' first", kind);
                }
                self.list(kind);
            }
            Command::Search(kind, query) => {
                let hits = app.search(kind, &query);
                self.output.message(&format!("{} match(es)", hits));
                self.list(kind);
            }
            Command::Delete(kind) => {
                let done = match kind {
                    EntityKind::Thread => app.delete_thread()?,
                    EntityKind::Branch => app.delete_branch()?,
                    EntityKind::Note => app.delete_note()?,
                };
                self.report(done, &format!("Deleted {}", kind), kind)?;
            }
            Command::Highlight(kind) => {
                let done = match kind {
                    EntityKind::Thread => app.toggle_thread_highlight()?,
                    EntityKind::Branch => app.toggle_branch_highlight()?,
                    EntityKind::Note => app.toggle_note_highlight()?,
                };
                self.report(done, "Toggled highlight", kind)?;
            }
            Command::Private(kind) => {
                let done = match kind {
                    EntityKind::Thread => app.toggle_thread_private()?,
                    EntityKind::Branch => app.toggle_branch_private()?,
                    EntityKind::Note => app.toggle_note_private()?,
                };
                self.report(done, "Toggled private", kind)?;
            }
            Command::Rename(kind, name) => {
                let done = match kind {
                    EntityKind::Thread => app.rename_thread(&name)?,
                    EntityKind::Branch => app.rename_branch(&name)?,
                    EntityKind::Note => bail!("Notes have no name"),
                };
                self.report(done, &format!("Renamed {}", kind), kind)?;
            }
            Command::Summary(kind, summary) => {
                let done = match kind {
                    EntityKind::Thread => app.set_thread_summary(&summary)?,
                    EntityKind::Branch => app.set_branch_summary(&summary)?,
                    EntityKind::Note => bail!("Notes have no summary"),
                };
                self.report(done, "Updated summary", kind)?;
            }
            Command::ShowNote => match app.active_note() {
                Some(note) => self.output.print_note(&note),
                None => bail!("No active note"),
            },
            Command::EditNote(text) => {
                let Some(note) = app.active_note() else {
                    bail!("No active note");
                };
                let content = match text {
                    Some(text) => Some(text),
                    None => editor::edit_note(&note.content)?,
                };
                let done = match content {
                    Some(content) => app.set_note_content(&content)?,
                    None => false,
                };
                self.report(done, "Updated note", EntityKind::Note)?;
            }
            Command::AddTopics(topics) => {
                let done = app.add_note_topics(&topics)?;
                self.report(done, "Added topics", EntityKind::Note)?;
            }
            Command::RemoveTopic(topic) => {
                let done = app.remove_note_topic(&topic)?;
                self.report(done, &format!("Removed topic {}", topic), EntityKind::Note)?;
            }
            Command::LinkNote(row) => {
                let Some(branch) = app.branches().get(row).map(|b| b.name.clone()) else {
                    bail!("No branch at row {}", row);
                };
                if !app.link_note(row)? {
                    bail!("Note is already under '{}' or no note is active", branch);
                }
                self.output.success(&format!("Linked note to '{}'", branch));
            }
            Command::Undo => match app.undo_delete() {
                Some((kind, id)) => self.output.success(&format!("Restored {} {}", kind, id)),
                None => bail!("Nothing to undo since the last sync"),
            },
            Command::Sync => {
                let report = app.sync().map_err(|e| anyhow::anyhow!(describe(&e)))?;
                info!(created = report.created, deleted = report.deleted, "Synced");
                self.output.print_sync_report(&report);
            }
            Command::Status => self.output.print_status(&app.status()),
            Command::Help => {
                if self.output.format == OutputFormat::Human {
                    println!("{}", HELP);
                }
            }
            Command::Quit => return Ok(Flow::Quit),
        }
        Ok(Flow::Continue)
    }

    fn add(&self, kind: EntityKind, text: &str) -> Result<()> {
        let id = match kind {
            EntityKind::Thread => Some(self.app.add_thread(&require(text, "a name")?)?),
            EntityKind::Branch => {
                let name = require(text, "a name")?;
                match self.app.add_branch(&name)? {
                    Some(id) => Some(id),
                    None => bail!("No active thread"),
                }
            }
            EntityKind::Note => {
                let content = if text.is_empty() {
                    editor::edit_note("")?.unwrap_or_default()
                } else {
                    text.to_string()
                };
                match self.app.add_note(&content)? {
                    Some(id) => Some(id),
                    None => bail!("No active branch"),
                }
            }
        };
        if let Some(id) = id {
            self.output.created(kind.as_str(), id);
        }
        Ok(())
    }

    fn list(&self, kind: EntityKind) {
        match kind {
            EntityKind::Thread => self.output.print_view("Threads", &self.app.thread_view()),
            EntityKind::Branch => self.output.print_view("Branches", &self.app.branch_view()),
            EntityKind::Note => self.output.print_view("Notes", &self.app.note_view()),
        }
    }

    fn report(&self, done: bool, message: &str, kind: EntityKind) -> Result<()> {
        if !done {
            bail!("Nothing changed (is a {} active?)", kind);
        }
        self.output.success(message);
        Ok(())
    }
}

/// A sync error with the store's recovery hint, if it has one
fn describe(e: &SyncError) -> String {
    match e.storage_error().recovery_suggestion() {
        Some(hint) => format!("{}\n  {}", e, hint),
        None => e.to_string(),
    }
}

/// Sync pending edits if configured, then save the session
pub fn close<S: NoteStore>(app: &App<S>, config: &Config, output: &Output) -> Result<()> {
    if config.sync_on_exit && app.pending_edits() > 0 {
        match app.sync() {
            Ok(report) => output.print_sync_report(&report),
            Err(e) => {
                warn!(error = %e, "Sync on exit failed");
                output.error(&format!("Sync on exit failed: {}", describe(&e)));
            }
        }
    }
    app.save_session(&config.state_path())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ntkpr_core::SqliteStore;

    fn app() -> App<SqliteStore> {
        App::new(SqliteStore::open_in_memory().unwrap(), 20).unwrap()
    }

    fn quiet() -> Output {
        Output::new(OutputFormat::Quiet)
    }

    #[test]
    fn test_parse_blank_and_comment() {
        assert_eq!(parse("").unwrap(), None);
        assert_eq!(parse("   # note to self").unwrap(), None);
    }

    #[test]
    fn test_parse_entity_commands() {
        assert_eq!(
            parse("thread add  Reading list ").unwrap(),
            Some(Command::Add(EntityKind::Thread, "Reading list".to_string()))
        );
        assert_eq!(
            parse("b select 2").unwrap(),
            Some(Command::Select(EntityKind::Branch, 2))
        );
        assert_eq!(parse("notes").unwrap(), Some(Command::List(EntityKind::Note)));
        assert_eq!(
            parse("note view Recent").unwrap(),
            Some(Command::View(EntityKind::Note, ContextName::Recent))
        );
        assert_eq!(parse("note edit").unwrap(), Some(Command::EditNote(None)));
        assert_eq!(
            parse("n topics rust, books").unwrap(),
            Some(Command::AddTopics("rust, books".to_string()))
        );
        assert_eq!(parse("quit").unwrap(), Some(Command::Quit));
        assert_eq!(parse("undo").unwrap(), Some(Command::Undo));
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse("frobnicate").is_err());
        assert!(parse("thread select x").is_err());
        assert!(parse("thread rename").is_err());
        assert!(parse("note rename x").is_err());
        assert!(parse("thread link 1").is_err());
        assert!(parse("note view sideways").is_err());
    }

    #[test]
    fn test_run_stages_until_sync() {
        let app = app();
        let output = quiet();
        let shell = Shell::new(&app, &output);

        let script = "\
thread add Reading
thread select 0
branch add Books
note add Dune
note topics scifi, Classics
";
        shell.run(script.as_bytes()).unwrap();

        assert_eq!(app.status().notes, 1);
        assert!(app.pending_edits() > 0);
        assert_eq!(app.active_note().unwrap().topics, vec!["scifi", "classics"]);

        shell.run("sync\n".as_bytes()).unwrap();
        assert_eq!(app.pending_edits(), 0);
        assert!(app.active_note().unwrap().id.is_persisted());
    }

    #[test]
    fn test_errors_do_not_stop_the_shell() {
        let app = app();
        let output = quiet();
        let shell = Shell::new(&app, &output);

        shell
            .run("branch add Orphan\nthread select 5\nthread add Kept\n".as_bytes())
            .unwrap();
        assert_eq!(app.status().threads, 1);
        assert_eq!(app.status().branches, 0);
    }

    #[test]
    fn test_quit_stops_reading() {
        let app = app();
        let output = quiet();
        let shell = Shell::new(&app, &output);

        shell
            .run("thread add One\nquit\nthread add Two\n".as_bytes())
            .unwrap();
        assert_eq!(app.status().threads, 1);
    }

    #[test]
    fn test_link_note_to_second_branch() {
        let app = app();
        let output = quiet();
        let shell = Shell::new(&app, &output);

        let script = "\
thread add Reading
thread select 0
branch add Books
branch add Favorites
branch select 0
note add Dune
note link 1
sync
";
        shell.run(script.as_bytes()).unwrap();

        let branches = app.branches();
        assert_eq!(branches.len(), 2);
        assert_eq!(branches[0].notes, branches[1].notes);
        assert_eq!(app.status().notes, 1);
    }

    #[test]
    fn test_edits_apply_to_newest_note() {
        let app = app();
        let output = quiet();
        let shell = Shell::new(&app, &output);

        let script = "\
thread add Reading
thread select 0
branch add Books
note add first
note add second
note topics work
note edit second, revised
";
        shell.run(script.as_bytes()).unwrap();

        let notes = app.note_view().items;
        assert_eq!(notes.len(), 2);
        assert_eq!(notes[0].content, "first");
        assert!(notes[0].topics.is_empty());
        assert_eq!(notes[1].content, "second, revised");
        assert_eq!(notes[1].topics, vec!["work"]);
    }

    #[test]
    fn test_undo_restores_deleted_note() {
        let app = app();
        let output = quiet();
        let shell = Shell::new(&app, &output);

        let script = "\
thread add Reading
thread select 0
branch add Books
note add keep me
sync
note delete
undo
";
        shell.run(script.as_bytes()).unwrap();
        assert_eq!(app.active_note().unwrap().content, "keep me");
        assert!(shell.execute(Command::Undo).is_err());

        shell.run("sync\n".as_bytes()).unwrap();
        assert_eq!(app.status().notes, 1);
    }

    #[test]
    fn test_search_view_needs_a_query() {
        let app = app();
        let output = quiet();
        let shell = Shell::new(&app, &output);
        shell.run("thread add Reading\n".as_bytes()).unwrap();

        let err = shell
            .execute(Command::View(EntityKind::Thread, ContextName::Search))
            .unwrap_err();
        assert!(err.to_string().contains("thread search"));
        assert_eq!(app.thread_view().name, ContextName::Default);

        shell
            .run("thread search read\nthread view default\nthread add Reading more\nthread view search\n".as_bytes())
            .unwrap();
        let view = app.thread_view();
        assert_eq!(view.name, ContextName::Search);
        assert_eq!(view.items.len(), 2);
    }

    #[test]
    fn test_close_syncs_and_saves_session() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = Config {
            data_dir: dir.path().to_path_buf(),
            ..Config::default()
        };
        let app = app();
        let output = quiet();
        Shell::new(&app, &output)
            .run("thread add Reading\n".as_bytes())
            .unwrap();

        close(&app, &config, &output).unwrap();
        assert_eq!(app.pending_edits(), 0);
        assert!(config.state_path().exists());
    }
}
