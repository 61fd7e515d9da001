//! Lazy sync between the in-memory graph and the store
//!
//! Edits accumulate in the [`EditLog`](crate::edit_log::EditLog) until the
//! user syncs. A sync then:
//!
//! 1. Writes creates (threads, branches, notes), updates and tombstones
//! 2. Re-associates branch notes and note topics
//! 3. Reloads the whole graph from the store
//! 4. Reseeds the provisional identifier counters
//!
//! Individual writes are best effort. A failed reload leaves the in-memory
//! state and the edit log exactly as they were.

mod counters;
mod reconciler;

pub use counters::ProvisionalIds;
pub use reconciler::{reconcile, SyncError, SyncFailure, SyncOutcome, SyncReport, Written};
