//! Applies the edit log to a store and reloads the graph
//!
//! Write order:
//!
//! 1. create threads, create branches, update threads
//! 2. create notes, update notes (topics resolved first)
//! 3. update branches, then re-associate notes of every written branch
//! 4. tombstone notes, branches, threads
//!
//! Creates translate provisional parent references through the identifiers
//! the store just assigned; a child whose parent failed is skipped.
//!
//! A sync that fails after writing hands back the rows it inserted
//! ([`SyncError::written`]). Passing them to the next attempt turns those
//! creates into updates, so a retry never inserts the same entity twice.

use std::collections::HashMap;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::edit_log::{EditLog, EditType};
use crate::graph::Graph;
use crate::models::{normalize_topic, Branch, EntityId, EntityKind, Note, Thread};
use crate::storage::{NoteStore, StorageError};
use crate::sync::ProvisionalIds;

/// Provisional identifier to the row a previous attempt already inserted
pub type Written = HashMap<(EntityKind, EntityId), u64>;

/// A sync that could not produce a consistent graph
#[derive(Error, Debug)]
pub enum SyncError {
    /// The store could not be reloaded after writing
    #[error("sync failed, {pending} pending edits retained: {source}")]
    Reload {
        pending: usize,
        written: Written,
        #[source]
        source: StorageError,
    },

    /// Maximum identifiers could not be read to reseed the counters
    #[error("sync failed, {pending} pending edits retained: cannot reseed identifiers: {source}")]
    Counters {
        pending: usize,
        written: Written,
        #[source]
        source: StorageError,
    },
}

impl SyncError {
    /// Number of edits still waiting in the log
    pub fn pending(&self) -> usize {
        match self {
            SyncError::Reload { pending, .. } | SyncError::Counters { pending, .. } => *pending,
        }
    }

    /// Rows inserted before the failure, keyed by provisional identifier
    pub fn written(&self) -> &Written {
        match self {
            SyncError::Reload { written, .. } | SyncError::Counters { written, .. } => written,
        }
    }

    /// The store error that stopped the sync
    pub fn storage_error(&self) -> &StorageError {
        match self {
            SyncError::Reload { source, .. } | SyncError::Counters { source, .. } => source,
        }
    }
}

/// A pending edit the store did not accept
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncFailure {
    pub kind: EntityKind,
    pub id: EntityId,
    pub action: EditType,
    pub reason: String,
}

/// What a sync did
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
    /// Edits whose target was no longer in the graph
    pub skipped: usize,
    pub failures: Vec<SyncFailure>,
    /// Provisional identifier to the identifier the store assigned
    #[serde(skip)]
    pub remap: HashMap<(EntityKind, EntityId), EntityId>,
}

impl SyncReport {
    /// Identifier of an entity after the sync
    pub fn resolve(&self, kind: EntityKind, id: EntityId) -> EntityId {
        self.remap.get(&(kind, id)).copied().unwrap_or(id)
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Result of a successful sync; the caller swaps it in and clears the log
#[derive(Debug, Clone)]
pub struct SyncOutcome {
    pub graph: Graph,
    pub ids: ProvisionalIds,
    pub report: SyncReport,
}

/// Write every pending edit of `log` to `store` and reload the graph.
///
/// `graph` and `log` are only read. On error the caller keeps both as they
/// are, so nothing is lost and the next sync retries with
/// [`SyncError::written`] as `written`. A first attempt passes an empty map.
pub fn reconcile<S: NoteStore + ?Sized>(
    store: &mut S,
    graph: &Graph,
    log: &EditLog,
    written: &Written,
) -> Result<SyncOutcome, SyncError> {
    let pending = log.pending();
    let mut plan = Plan::default();
    for (kind, id, ty) in &pending {
        match ty {
            EditType::Create => plan.creates.push(*kind, *id),
            EditType::Update => plan.updates.push(*kind, *id),
            EditType::Delete => plan.deletes.push(*kind, *id),
            // Created then deleted, but an earlier attempt already inserted it
            EditType::None if written.contains_key(&(*kind, *id)) => {
                plan.deletes.push(*kind, *id)
            }
            EditType::None => {}
        }
    }
    debug!(
        creates = plan.creates.len(),
        updates = plan.updates.len(),
        deletes = plan.deletes.len(),
        "Starting sync"
    );

    let mut pass = Pass {
        store,
        graph,
        remap: written.clone(),
        associate: Vec::new(),
        report: SyncReport::default(),
    };

    for id in &plan.creates.threads {
        let result = pass.create_thread(*id);
        pass.settle(EntityKind::Thread, *id, EditType::Create, result);
    }
    for id in &plan.creates.branches {
        let result = pass.create_branch(*id);
        pass.settle(EntityKind::Branch, *id, EditType::Create, result);
    }
    for id in &plan.updates.threads {
        let result = pass.update_thread(*id);
        pass.settle(EntityKind::Thread, *id, EditType::Update, result);
    }
    for id in &plan.creates.notes {
        let result = pass.create_note(*id);
        pass.settle(EntityKind::Note, *id, EditType::Create, result);
    }
    for id in &plan.updates.notes {
        let result = pass.update_note(*id);
        pass.settle(EntityKind::Note, *id, EditType::Update, result);
    }
    for id in &plan.updates.branches {
        let result = pass.update_branch(*id);
        pass.settle(EntityKind::Branch, *id, EditType::Update, result);
    }
    for id in std::mem::take(&mut pass.associate) {
        if let Err(Skip::Failed(reason)) = pass.associate_notes(id) {
            warn!(branch = %id, %reason, "Failed to attach notes to branch");
            pass.report.failures.push(SyncFailure {
                kind: EntityKind::Branch,
                id,
                action: EditType::Update,
                reason,
            });
        }
    }
    for (kind, ids) in [
        (EntityKind::Note, &plan.deletes.notes),
        (EntityKind::Branch, &plan.deletes.branches),
        (EntityKind::Thread, &plan.deletes.threads),
    ] {
        for id in ids {
            let result = pass.delete(kind, *id);
            pass.settle(kind, *id, EditType::Delete, result);
        }
    }

    let Pass {
        store,
        remap,
        mut report,
        ..
    } = pass;

    let pending = pending.len();
    let graph = match store.load_graph() {
        Ok(graph) => graph,
        Err(source) => {
            error!(error = %source, pending, "Reload after sync failed");
            return Err(SyncError::Reload {
                pending,
                written: remap,
                source,
            });
        }
    };
    let ids = match ProvisionalIds::from_store(&*store) {
        Ok(ids) => ids,
        Err(source) => {
            error!(error = %source, pending, "Reading maximum identifiers failed");
            return Err(SyncError::Counters {
                pending,
                written: remap,
                source,
            });
        }
    };
    report.remap = remap
        .into_iter()
        .map(|(key, stored)| (key, EntityId::Persisted(stored)))
        .collect();

    info!(
        created = report.created,
        updated = report.updated,
        deleted = report.deleted,
        failed = report.failures.len(),
        "Sync complete"
    );
    Ok(SyncOutcome { graph, ids, report })
}

// ==================== Planning ====================

#[derive(Debug, Default)]
struct Bucket {
    threads: Vec<EntityId>,
    branches: Vec<EntityId>,
    notes: Vec<EntityId>,
}

impl Bucket {
    fn push(&mut self, kind: EntityKind, id: EntityId) {
        match kind {
            EntityKind::Thread => self.threads.push(id),
            EntityKind::Branch => self.branches.push(id),
            EntityKind::Note => self.notes.push(id),
        }
    }

    fn len(&self) -> usize {
        self.threads.len() + self.branches.len() + self.notes.len()
    }
}

#[derive(Debug, Default)]
struct Plan {
    creates: Bucket,
    updates: Bucket,
    deletes: Bucket,
}

// ==================== Writing ====================

/// Why a single edit was not applied
enum Skip {
    /// Target is no longer in the graph
    Stale,
    Failed(String),
}

impl From<StorageError> for Skip {
    fn from(err: StorageError) -> Self {
        Skip::Failed(err.to_string())
    }
}

struct Pass<'a, S: ?Sized> {
    store: &'a mut S,
    graph: &'a Graph,
    /// Provisional identifier to store identifier, seeded from earlier
    /// attempts and filled as rows are inserted
    remap: HashMap<(EntityKind, EntityId), u64>,
    /// Branches whose note list must be rewritten after all note writes
    associate: Vec<EntityId>,
    report: SyncReport,
}

impl<S: NoteStore + ?Sized> Pass<'_, S> {
    fn resolve(&self, kind: EntityKind, id: EntityId) -> Option<u64> {
        match id {
            EntityId::Persisted(v) => Some(v),
            EntityId::Provisional(_) => self.remap.get(&(kind, id)).copied(),
        }
    }

    fn require(&self, kind: EntityKind, id: EntityId) -> Result<u64, Skip> {
        self.resolve(kind, id)
            .ok_or_else(|| StorageError::Unpersisted { kind, id }.into())
    }

    fn settle(&mut self, kind: EntityKind, id: EntityId, action: EditType, result: Result<(), Skip>) {
        match result {
            Ok(()) => match action {
                EditType::Create => self.report.created += 1,
                EditType::Update => self.report.updated += 1,
                EditType::Delete => self.report.deleted += 1,
                EditType::None => {}
            },
            Err(Skip::Stale) => {
                debug!(%kind, %id, ?action, "Skipping edit for entity no longer in memory");
                self.report.skipped += 1;
            }
            Err(Skip::Failed(reason)) => {
                warn!(%kind, %id, ?action, %reason, "Edit not applied");
                self.report.failures.push(SyncFailure {
                    kind,
                    id,
                    action,
                    reason,
                });
            }
        }
    }

    /// Row an earlier attempt inserted for this create
    fn inserted(&self, kind: EntityKind, id: EntityId) -> Option<u64> {
        let stored = self.remap.get(&(kind, id)).copied();
        if let Some(stored) = stored {
            debug!(%kind, %id, stored, "Row already inserted, updating instead");
        }
        stored
    }

    fn create_thread(&mut self, id: EntityId) -> Result<(), Skip> {
        if self.inserted(EntityKind::Thread, id).is_some() {
            return self.update_thread(id);
        }
        let graph = self.graph;
        let thread = graph.thread(id).ok_or(Skip::Stale)?;
        let stored = self.store.insert_thread(&sanitize_thread(thread))?;
        self.remap.insert((EntityKind::Thread, id), stored);
        Ok(())
    }

    fn update_thread(&mut self, id: EntityId) -> Result<(), Skip> {
        let graph = self.graph;
        let thread = graph.thread(id).ok_or(Skip::Stale)?;
        let stored = self.require(EntityKind::Thread, id)?;
        self.store.update_thread(stored, &sanitize_thread(thread))?;
        Ok(())
    }

    fn create_branch(&mut self, id: EntityId) -> Result<(), Skip> {
        if self.inserted(EntityKind::Branch, id).is_some() {
            return self.update_branch(id);
        }
        let graph = self.graph;
        let branch = graph.branch(id).ok_or(Skip::Stale)?;
        let thread_id = self.require(EntityKind::Thread, branch.thread_id)?;
        let stored = self
            .store
            .insert_branch(thread_id, &sanitize_branch(branch))?;
        self.remap.insert((EntityKind::Branch, id), stored);
        self.associate.push(id);
        Ok(())
    }

    fn update_branch(&mut self, id: EntityId) -> Result<(), Skip> {
        let graph = self.graph;
        let branch = graph.branch(id).ok_or(Skip::Stale)?;
        let stored = self.require(EntityKind::Branch, id)?;
        let thread_id = self.require(EntityKind::Thread, branch.thread_id)?;
        self.store
            .update_branch(stored, thread_id, &sanitize_branch(branch))?;
        self.associate.push(id);
        Ok(())
    }

    fn create_note(&mut self, id: EntityId) -> Result<(), Skip> {
        if self.inserted(EntityKind::Note, id).is_some() {
            return self.update_note(id);
        }
        let graph = self.graph;
        let note = graph.note(id).ok_or(Skip::Stale)?;
        let topics = self.resolve_topics(note)?;
        let stored = self.store.insert_note(&sanitize_note(note))?;
        self.remap.insert((EntityKind::Note, id), stored);
        self.store.replace_note_topics(stored, &topics)?;
        Ok(())
    }

    fn update_note(&mut self, id: EntityId) -> Result<(), Skip> {
        let graph = self.graph;
        let note = graph.note(id).ok_or(Skip::Stale)?;
        let stored = self.require(EntityKind::Note, id)?;
        let topics = self.resolve_topics(note)?;
        self.store.update_note(stored, &sanitize_note(note))?;
        self.store.replace_note_topics(stored, &topics)?;
        Ok(())
    }

    /// Store identifiers of a note's topics, inserting new ones
    fn resolve_topics(&mut self, note: &Note) -> Result<Vec<u64>, Skip> {
        let mut ids = Vec::with_capacity(note.topics.len());
        for topic in note.topics.iter().filter_map(|t| normalize_topic(t)) {
            let id = self.store.resolve_topic(&topic)?;
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
        Ok(ids)
    }

    fn associate_notes(&mut self, id: EntityId) -> Result<(), Skip> {
        let graph = self.graph;
        let branch = graph.branch(id).ok_or(Skip::Stale)?;
        let stored = self.require(EntityKind::Branch, id)?;
        let mut notes = Vec::with_capacity(branch.notes.len());
        for note in &branch.notes {
            match self.resolve(EntityKind::Note, *note) {
                Some(n) => notes.push(n),
                None => debug!(branch = %id, %note, "Note not persisted, left out of branch"),
            }
        }
        self.store.replace_branch_notes(stored, &notes)?;
        Ok(())
    }

    fn delete(&mut self, kind: EntityKind, id: EntityId) -> Result<(), Skip> {
        let stored = self.require(kind, id)?;
        match self.store.soft_delete(kind, stored) {
            // Already tombstoned, e.g. by an attempt that failed to reload
            Err(StorageError::MissingRow { .. }) => {
                debug!(%kind, %id, stored, "Row already deleted");
                Ok(())
            }
            result => result.map_err(Skip::from),
        }
    }
}

// ==================== Normalization ====================

fn sanitize_thread(thread: &Thread) -> Thread {
    let mut clean = thread.clone();
    clean.name = clean.name.trim().to_string();
    clean.summary = clean.summary.trim().to_string();
    clean
}

fn sanitize_branch(branch: &Branch) -> Branch {
    let mut clean = branch.clone();
    clean.name = clean.name.trim().to_string();
    clean.summary = clean.summary.trim().to_string();
    clean
}

fn sanitize_note(note: &Note) -> Note {
    let mut clean = note.clone();
    clean.content = clean.content.trim().to_string();
    clean
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edit_log::EditAction;
    use crate::storage::{SqliteStore, StorageResult};
    use std::io;

    /// Wraps a real store, records write calls and injects failures
    struct FlakyStore {
        inner: SqliteStore,
        calls: Vec<String>,
        fail_insert: Option<EntityKind>,
        fail_load: bool,
    }

    impl FlakyStore {
        fn new() -> Self {
            Self {
                inner: SqliteStore::open_in_memory().unwrap(),
                calls: Vec::new(),
                fail_insert: None,
                fail_load: false,
            }
        }

        fn failing_insert(&self, kind: EntityKind) -> StorageResult<()> {
            if self.fail_insert == Some(kind) {
                return Err(StorageError::Io(io::Error::new(
                    io::ErrorKind::Other,
                    "injected",
                )));
            }
            Ok(())
        }
    }

    impl NoteStore for FlakyStore {
        fn load_graph(&self) -> StorageResult<Graph> {
            if self.fail_load {
                return Err(StorageError::Io(io::Error::new(
                    io::ErrorKind::Other,
                    "database went away",
                )));
            }
            self.inner.load_graph()
        }

        fn max_id(&self, kind: EntityKind) -> StorageResult<u64> {
            self.inner.max_id(kind)
        }

        fn insert_thread(&mut self, thread: &Thread) -> StorageResult<u64> {
            self.calls.push("insert_thread".into());
            self.failing_insert(EntityKind::Thread)?;
            self.inner.insert_thread(thread)
        }

        fn update_thread(&mut self, id: u64, thread: &Thread) -> StorageResult<()> {
            self.calls.push("update_thread".into());
            self.inner.update_thread(id, thread)
        }

        fn insert_branch(&mut self, thread_id: u64, branch: &Branch) -> StorageResult<u64> {
            self.calls.push("insert_branch".into());
            self.failing_insert(EntityKind::Branch)?;
            self.inner.insert_branch(thread_id, branch)
        }

        fn update_branch(&mut self, id: u64, thread_id: u64, branch: &Branch) -> StorageResult<()> {
            self.calls.push("update_branch".into());
            self.inner.update_branch(id, thread_id, branch)
        }

        fn insert_note(&mut self, note: &Note) -> StorageResult<u64> {
            self.calls.push("insert_note".into());
            self.failing_insert(EntityKind::Note)?;
            self.inner.insert_note(note)
        }

        fn update_note(&mut self, id: u64, note: &Note) -> StorageResult<()> {
            self.calls.push("update_note".into());
            self.inner.update_note(id, note)
        }

        fn resolve_topic(&mut self, topic: &str) -> StorageResult<u64> {
            self.inner.resolve_topic(topic)
        }

        fn replace_note_topics(&mut self, note_id: u64, topic_ids: &[u64]) -> StorageResult<()> {
            self.inner.replace_note_topics(note_id, topic_ids)
        }

        fn replace_branch_notes(&mut self, branch_id: u64, note_ids: &[u64]) -> StorageResult<()> {
            self.calls.push("replace_branch_notes".into());
            self.inner.replace_branch_notes(branch_id, note_ids)
        }

        fn soft_delete(&mut self, kind: EntityKind, id: u64) -> StorageResult<()> {
            self.calls.push(format!("soft_delete {}", kind));
            self.inner.soft_delete(kind, id)
        }
    }

    fn pid(v: u64) -> EntityId {
        EntityId::Provisional(v)
    }

    /// Provisional thread 1 / branch 1 / note 1 with every create logged
    fn fresh_hierarchy(content: &str, topics: &[&str]) -> (Graph, EditLog) {
        let mut graph = Graph::new();
        let mut log = EditLog::new();
        graph.insert_thread(Thread::new(pid(1), "T1"));
        graph.insert_branch(Branch::new(pid(1), pid(1), "B1"));
        let mut note = Note::new(pid(1));
        note.set_content(content);
        for topic in topics {
            note.add_topic(topic);
        }
        graph.insert_note(pid(1), note);
        for kind in EntityKind::ALL {
            log.record(kind, pid(1), EditAction::Create).unwrap();
        }
        (graph, log)
    }

    #[test]
    fn test_created_then_deleted_touches_nothing() {
        let mut store = FlakyStore::new();
        let mut log = EditLog::new();
        log.record(EntityKind::Note, pid(4), EditAction::Create).unwrap();
        log.record(EntityKind::Note, pid(4), EditAction::Delete).unwrap();

        let outcome = reconcile(&mut store, &Graph::new(), &log, &Written::new()).unwrap();
        assert!(store.calls.is_empty());
        assert_eq!(outcome.report, SyncReport::default());
    }

    #[test]
    fn test_update_then_delete_is_single_delete() {
        let mut store = FlakyStore::new();
        let id = store
            .inner
            .insert_thread(&Thread::new(pid(1), "old"))
            .unwrap();
        let persisted = EntityId::Persisted(id);

        let mut log = EditLog::new();
        log.record(EntityKind::Thread, persisted, EditAction::Update).unwrap();
        log.record(EntityKind::Thread, persisted, EditAction::Delete).unwrap();

        let outcome = reconcile(&mut store, &Graph::new(), &log, &Written::new()).unwrap();
        assert_eq!(store.calls, vec!["soft_delete thread"]);
        assert_eq!(outcome.report.deleted, 1);
        assert_eq!(outcome.report.updated, 0);
        assert!(outcome.graph.is_empty());
    }

    #[test]
    fn test_creates_remap_and_reload() {
        let mut store = FlakyStore::new();
        let (graph, log) = fresh_hierarchy("  final draft \n", &["work", "urgent"]);

        let outcome = reconcile(&mut store, &graph, &log, &Written::new()).unwrap();
        assert_eq!(outcome.report.created, 3);
        assert!(outcome.report.is_clean());
        assert_eq!(
            store.calls,
            vec!["insert_thread", "insert_branch", "insert_note", "replace_branch_notes"]
        );

        let reloaded = &outcome.graph;
        assert_eq!(reloaded.threads.len(), 1);
        let thread = &reloaded.threads[0];
        assert!(thread.id.is_persisted());
        assert_eq!(outcome.report.resolve(EntityKind::Thread, pid(1)), thread.id);

        let branch = reloaded.branch(thread.branches[0]).unwrap();
        let note = reloaded.note(branch.notes[0]).unwrap();
        assert_eq!(note.content, "final draft");
        assert_eq!(note.topics, vec!["work", "urgent"]);
    }

    #[test]
    fn test_resaving_topics_creates_no_rows() {
        let mut store = FlakyStore::new();
        let (graph, log) = fresh_hierarchy("n", &["work", "urgent"]);
        let outcome = reconcile(&mut store, &graph, &log, &Written::new()).unwrap();

        let note_id = outcome.graph.notes.keys().next().copied().unwrap();
        let mut log = EditLog::new();
        log.record(EntityKind::Note, note_id, EditAction::Update).unwrap();
        let outcome = reconcile(&mut store, &outcome.graph, &log, &Written::new()).unwrap();
        assert_eq!(outcome.report.updated, 1);

        let topics: i64 = store
            .inner
            .connection()
            .query_row("SELECT COUNT(*) FROM topics", [], |row| row.get(0))
            .unwrap();
        assert_eq!(topics, 2);
        assert_eq!(
            outcome.graph.note(note_id).unwrap().topics,
            vec!["work", "urgent"]
        );
    }

    #[test]
    fn test_topic_case_variants_share_row() {
        let mut store = FlakyStore::new();
        let (mut graph, mut log) = fresh_hierarchy("first", &[]);
        // Bypass add_topic normalization to exercise the store side
        graph.note_mut(pid(1)).unwrap().topics = vec!["Work".to_string()];
        let mut second = Note::new(pid(2));
        second.add_topic("work");
        graph.insert_note(pid(1), second);
        log.record(EntityKind::Note, pid(2), EditAction::Create).unwrap();

        reconcile(&mut store, &graph, &log, &Written::new()).unwrap();
        let rows: Vec<String> = store
            .inner
            .connection()
            .prepare("SELECT topic FROM topics")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(rows, vec!["work"]);
    }

    #[test]
    fn test_failed_parent_skips_children() {
        let mut store = FlakyStore::new();
        store.fail_insert = Some(EntityKind::Thread);
        let (graph, log) = fresh_hierarchy("orphan", &[]);

        let outcome = reconcile(&mut store, &graph, &log, &Written::new()).unwrap();
        let failed: Vec<EntityKind> = outcome.report.failures.iter().map(|f| f.kind).collect();
        assert_eq!(failed, vec![EntityKind::Thread, EntityKind::Branch]);
        assert!(!store.calls.contains(&"insert_branch".to_string()));
        assert!(outcome.graph.is_empty());
    }

    #[test]
    fn test_reload_failure_is_fatal() {
        let mut store = FlakyStore::new();
        store.fail_load = true;
        let mut log = EditLog::new();
        log.record(EntityKind::Thread, pid(1), EditAction::Create).unwrap();
        let mut graph = Graph::new();
        graph.insert_thread(Thread::new(pid(1), "T"));

        let err = reconcile(&mut store, &graph, &log, &Written::new()).unwrap_err();
        assert!(matches!(err, SyncError::Reload { pending: 1, .. }));
        assert_eq!(err.pending(), 1);
        assert!(err.to_string().starts_with("sync failed, 1 pending edits retained"));
    }

    fn count_rows(store: &FlakyStore, table: &str) -> i64 {
        store
            .inner
            .connection()
            .query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
                row.get(0)
            })
            .unwrap()
    }

    #[test]
    fn test_retry_after_reload_failure_inserts_once() {
        let mut store = FlakyStore::new();
        store.fail_load = true;
        let (graph, log) = fresh_hierarchy("once", &["work"]);

        let err = reconcile(&mut store, &graph, &log, &Written::new()).unwrap_err();
        assert_eq!(err.written().len(), 3);
        assert!(err.written().contains_key(&(EntityKind::Note, pid(1))));

        store.fail_load = false;
        store.calls.clear();
        let outcome = reconcile(&mut store, &graph, &log, err.written()).unwrap();
        assert!(outcome.report.is_clean());
        assert_eq!(outcome.report.created, 3);
        assert!(!store.calls.iter().any(|call| call.starts_with("insert")));

        assert_eq!(count_rows(&store, "threads"), 1);
        assert_eq!(count_rows(&store, "branches"), 1);
        assert_eq!(count_rows(&store, "notes"), 1);
        let thread = &outcome.graph.threads[0];
        assert_eq!(outcome.report.resolve(EntityKind::Thread, pid(1)), thread.id);
        let branch = outcome.graph.branch(thread.branches[0]).unwrap();
        assert_eq!(branch.notes.len(), 1);
        assert_eq!(outcome.graph.note(branch.notes[0]).unwrap().content, "once");
    }

    #[test]
    fn test_retry_removes_row_deleted_after_failure() {
        let mut store = FlakyStore::new();
        store.fail_load = true;
        let (graph, mut log) = fresh_hierarchy("short lived", &[]);
        let err = reconcile(&mut store, &graph, &log, &Written::new()).unwrap_err();

        // Create then Delete merges to no edit, but the row already exists
        log.record(EntityKind::Note, pid(1), EditAction::Delete).unwrap();
        let mut graph = graph;
        graph.remove_note(pid(1), pid(1));
        store.fail_load = false;
        let outcome = reconcile(&mut store, &graph, &log, err.written()).unwrap();

        assert_eq!(outcome.report.deleted, 1);
        assert!(outcome.graph.notes.is_empty());
        assert_eq!(count_rows(&store, "notes"), 1);
    }

    #[test]
    fn test_repeated_delete_is_not_a_failure() {
        let mut store = FlakyStore::new();
        let id = store
            .inner
            .insert_thread(&Thread::new(pid(1), "gone"))
            .unwrap();
        store.inner.soft_delete(EntityKind::Thread, id).unwrap();

        let mut log = EditLog::new();
        log.record(EntityKind::Thread, EntityId::Persisted(id), EditAction::Delete)
            .unwrap();
        let outcome = reconcile(&mut store, &Graph::new(), &log, &Written::new()).unwrap();
        assert!(outcome.report.is_clean());
        assert_eq!(outcome.report.deleted, 1);
    }

    #[test]
    fn test_stale_edit_is_skipped() {
        let mut store = FlakyStore::new();
        let mut log = EditLog::new();
        log.record(EntityKind::Note, EntityId::Persisted(99), EditAction::Update)
            .unwrap();

        let outcome = reconcile(&mut store, &Graph::new(), &log, &Written::new()).unwrap();
        assert_eq!(outcome.report.skipped, 1);
        assert!(store.calls.is_empty());
    }

    #[test]
    fn test_counters_seeded_above_tombstones() {
        let mut store = FlakyStore::new();
        let id = store
            .inner
            .insert_thread(&Thread::new(pid(1), "gone"))
            .unwrap();
        store.inner.soft_delete(EntityKind::Thread, id).unwrap();

        let outcome = reconcile(&mut store, &Graph::new(), &EditLog::new(), &Written::new()).unwrap();
        assert_eq!(outcome.ids.peek(EntityKind::Thread), id + 1);
        assert_eq!(outcome.ids.peek(EntityKind::Note), 1);
    }

    #[test]
    fn test_new_note_in_persisted_branch_is_attached() {
        let mut store = FlakyStore::new();
        let (graph, log) = fresh_hierarchy("first", &[]);
        let outcome = reconcile(&mut store, &graph, &log, &Written::new()).unwrap();

        let mut graph = outcome.graph;
        let branch = graph.threads[0].branches[0];
        graph.insert_note(branch, Note::new(pid(50)));
        let mut log = EditLog::new();
        log.record(EntityKind::Note, pid(50), EditAction::Create).unwrap();
        log.record(EntityKind::Branch, branch, EditAction::Update).unwrap();

        let outcome = reconcile(&mut store, &graph, &log, &Written::new()).unwrap();
        assert_eq!(outcome.graph.branch(branch).unwrap().notes.len(), 2);
        assert!(outcome
            .graph
            .note(outcome.report.resolve(EntityKind::Note, pid(50)))
            .is_some());
    }
}
