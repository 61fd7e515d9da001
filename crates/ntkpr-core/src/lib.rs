//! ntkpr core library
//!
//! Staged editing of a Thread → Branch → Note hierarchy with lazy sync to
//! SQLite.
//!
//! # Architecture
//!
//! - **Data manager**: owns the in-memory graph and the active thread,
//!   branch and note
//! - **Context managers**: Default / Recent / Search views per entity kind,
//!   each with its own cursor
//! - **Edit log**: pending mutations, merged per entity
//! - **Reconciler**: writes the edit log to the store on demand and reloads
//!
//! Nothing is written to the store until [`App::sync`] is called.
//!
//! # Quick Start
//!
//! ```text
//! let config = Config::load()?;
//! let app = App::open(&config)?;
//!
//! let thread = app.add_thread("Reading")?;
//! app.focus(EntityKind::Thread, thread);
//! app.add_branch("Books")?;
//!
//! app.sync()?;
//! ```
//!
//! # Modules
//!
//! - `app`: mutex-guarded facade (main entry point)
//! - `models`: threads, branches, notes and identifiers
//! - `graph`: entity arena
//! - `data`: active lists and cursors
//! - `context`: named views
//! - `edit_log`: pending-mutation log
//! - `sync`: reconciliation with the store
//! - `storage`: SQLite store
//! - `trash`: undo for deletes made since the last sync
//! - `archive`: note export and data directory backup
//! - `state`: session state between runs
//! - `config`: application configuration

pub mod app;
pub mod archive;
pub mod config;
pub mod context;
pub mod data;
pub mod edit_log;
pub mod graph;
pub mod models;
pub mod state;
pub mod storage;
pub mod sync;
pub mod trash;

pub use app::{App, Status, View};
pub use config::Config;
pub use context::{ContextCursors, ContextManager, ContextName};
pub use data::{CursorHints, DataManager};
pub use edit_log::{EditAction, EditError, EditLog, EditType};
pub use graph::{EntitySource, Graph};
pub use models::{Branch, Entity, EntityId, EntityKind, Note, Thread};
pub use state::SessionState;
pub use storage::{NoteStore, SqliteStore, StorageError};
pub use sync::{SyncError, SyncReport, Written};
pub use trash::Target;
