//! Storage layer
//!
//! The store is the durable side of the lazy sync: nothing is written until
//! the reconciler runs. [`NoteStore`] is the narrow contract the reconciler
//! composes its writes from; [`SqliteStore`] is the only implementation.
//!
//! ## Tables
//!
//! - `threads`, `branches`, `notes` - entity rows with a `deleted_at` tombstone
//! - `topics` - normalized topic text
//! - `note_topics` - note-to-topic junction, ordered
//! - `branch_notes` - branch-to-note junction, ordered

pub mod error;
pub mod schema;
pub mod sqlite;

pub use error::{StorageError, StorageResult};
pub use schema::{init_schema, needs_init, SCHEMA_VERSION};
pub use sqlite::SqliteStore;

use crate::graph::Graph;
use crate::models::{Branch, EntityKind, Note, Thread};

/// Operations the reconciler needs from a persistent store
///
/// Identifiers passed in and returned are store identifiers. Writes of a
/// single entity are atomic; the reconciler decides what to do when one
/// fails.
pub trait NoteStore {
    /// Load every live thread with its branches and notes
    fn load_graph(&self) -> StorageResult<Graph>;

    /// Highest identifier ever issued for `kind`, tombstones included
    fn max_id(&self, kind: EntityKind) -> StorageResult<u64>;

    /// Insert a thread row, returning the assigned identifier
    fn insert_thread(&mut self, thread: &Thread) -> StorageResult<u64>;
    fn update_thread(&mut self, id: u64, thread: &Thread) -> StorageResult<()>;

    /// Insert a branch row under `thread_id`, returning the assigned identifier
    fn insert_branch(&mut self, thread_id: u64, branch: &Branch) -> StorageResult<u64>;
    fn update_branch(&mut self, id: u64, thread_id: u64, branch: &Branch) -> StorageResult<()>;

    /// Insert a note row, returning the assigned identifier
    fn insert_note(&mut self, note: &Note) -> StorageResult<u64>;
    fn update_note(&mut self, id: u64, note: &Note) -> StorageResult<()>;

    /// Identifier of a topic, inserting it if it does not exist yet.
    /// `topic` must already be normalized.
    fn resolve_topic(&mut self, topic: &str) -> StorageResult<u64>;

    /// Replace a note's topic set, preserving the given order
    fn replace_note_topics(&mut self, note_id: u64, topic_ids: &[u64]) -> StorageResult<()>;

    /// Replace a branch's note list, preserving the given order
    fn replace_branch_notes(&mut self, branch_id: u64, note_ids: &[u64]) -> StorageResult<()>;

    /// Tombstone an entity row
    fn soft_delete(&mut self, kind: EntityKind, id: u64) -> StorageResult<()>;
}
