//! Application facade
//!
//! [`App`] is the single entry point a front end talks to. It owns the data
//! manager, one context manager per entity kind, the edit log and the store,
//! all behind one mutex that is held for the whole of each operation.
//!
//! Every mutation goes through here and is recorded in the edit log before
//! it is applied. A mutation the log rejects is logged at error level and
//! not applied. Nothing reaches the store until [`App::sync`].
//!
//! Deletes made since the last sync can be undone, most recent first.

use anyhow::{Context, Result};
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::archive;
use crate::config::Config;
use crate::context::{ContextManager, ContextName};
use crate::data::{CursorHints, DataManager};
use crate::edit_log::{EditAction, EditError, EditLog};
use crate::graph::{EntitySource, Graph, Removed};
use crate::models::{Branch, Entity, EntityId, EntityKind, Note, Thread};
use crate::state::SessionState;
use crate::storage::{NoteStore, SqliteStore};
use crate::sync::{reconcile, ProvisionalIds, SyncError, SyncReport, Written};
use crate::trash::{Deletion, Target};

/// Snapshot of one context view
#[derive(Debug, Clone, PartialEq)]
pub struct View<E> {
    pub name: ContextName,
    pub cursor: usize,
    pub items: Vec<E>,
}

/// Counts shown by `status`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct Status {
    pub threads: usize,
    pub branches: usize,
    pub notes: usize,
    pub pending_edits: usize,
    /// Cascade edits the log rejected since the last sync
    pub dropped_edits: usize,
    /// Deletes that can still be undone
    pub undoable: usize,
}

/// Staged thread/branch/note editing over a store
pub struct App<S: NoteStore> {
    state: Mutex<AppState<S>>,
}

struct AppState<S> {
    store: S,
    data: DataManager,
    log: EditLog,
    ids: ProvisionalIds,
    views: Views,
    /// Rows a failed sync already inserted
    written: Written,
    trash: Vec<Deletion>,
    dropped: usize,
}

/// One context manager per entity kind
struct Views {
    threads: ContextManager<Thread>,
    branches: ContextManager<Branch>,
    notes: ContextManager<Note>,
}

impl App<SqliteStore> {
    /// Open the configured database and restore the last session
    pub fn open(config: &Config) -> Result<Self> {
        let store = SqliteStore::open(config)?;
        let app = Self::new(store, config.recent_limit)?;
        app.restore_session(&SessionState::load(&config.state_path()));
        Ok(app)
    }
}

impl<S: NoteStore> App<S> {
    /// Load the graph from `store` and seed provisional identifiers
    pub fn new(store: S, recent_limit: usize) -> Result<Self> {
        let graph = store.load_graph().context("Failed to load notes from store")?;
        let ids = ProvisionalIds::from_store(&store).context("Failed to read identifiers")?;

        let mut state = AppState {
            store,
            data: DataManager::new(graph),
            log: EditLog::new(),
            ids,
            views: Views {
                threads: ContextManager::new(recent_limit),
                branches: ContextManager::new(recent_limit),
                notes: ContextManager::new(recent_limit),
            },
            written: Written::new(),
            trash: Vec::new(),
            dropped: 0,
        };
        state.refresh_views();
        info!(threads = state.data.threads().len(), "Loaded notes");

        Ok(Self {
            state: Mutex::new(state),
        })
    }

    // ==================== Reading ====================

    pub fn active_thread(&self) -> Option<Thread> {
        self.state.lock().data.active_thread().cloned()
    }

    pub fn active_branch(&self) -> Option<Branch> {
        self.state.lock().data.active_branch().cloned()
    }

    pub fn active_note(&self) -> Option<Note> {
        self.state.lock().data.active_note().cloned()
    }

    pub fn thread_view(&self) -> View<Thread> {
        self.state.lock().view()
    }

    pub fn branch_view(&self) -> View<Branch> {
        self.state.lock().view()
    }

    pub fn note_view(&self) -> View<Note> {
        self.state.lock().view()
    }

    /// Branches of the active thread in canonical order
    pub fn branches(&self) -> Vec<Branch> {
        let st = self.state.lock();
        let graph = st.data.graph();
        st.data
            .active_branch_ids()
            .iter()
            .filter_map(|id| graph.branch(*id).cloned())
            .collect()
    }

    /// Number of edits waiting for the next sync
    pub fn pending_edits(&self) -> usize {
        self.state.lock().log.pending().len()
    }

    pub fn status(&self) -> Status {
        let st = self.state.lock();
        let graph = st.data.graph();
        Status {
            threads: graph.threads.len(),
            branches: graph.branches.len(),
            notes: graph.notes.len(),
            pending_edits: st.log.pending().len(),
            dropped_edits: st.dropped,
            undoable: st.trash.len(),
        }
    }

    // ==================== Navigation ====================

    /// Activate the item at `cursor` in the current view of `kind`
    pub fn select(&self, kind: EntityKind, cursor: usize) -> Option<EntityId> {
        let mut st = self.state.lock();
        let id = match kind {
            EntityKind::Thread => st.views.threads.select_item(cursor),
            EntityKind::Branch => st.views.branches.select_item(cursor),
            EntityKind::Note => st.views.notes.select_item(cursor),
        }?;
        st.activate(kind, id);
        Some(id)
    }

    /// Activate an entity by identifier
    pub fn focus(&self, kind: EntityKind, id: EntityId) -> bool {
        self.state.lock().activate(kind, id)
    }

    /// Switch the view of `kind`, restoring that view's cursor. Search is
    /// rebuilt from the last query; without one the switch is refused and
    /// false returned.
    pub fn switch_view(&self, kind: EntityKind, target: ContextName) -> bool {
        let mut st = self.state.lock();
        match kind {
            EntityKind::Thread => st.switch_view::<Thread>(target),
            EntityKind::Branch => st.switch_view::<Branch>(target),
            EntityKind::Note => st.switch_view::<Note>(target),
        }
    }

    /// Filter `kind` by `query` and show the Search view. Returns the hit count.
    pub fn search(&self, kind: EntityKind, query: &str) -> usize {
        let mut st = self.state.lock();
        match kind {
            EntityKind::Thread => st.search::<Thread>(query),
            EntityKind::Branch => st.search::<Branch>(query),
            EntityKind::Note => st.search::<Note>(query),
        }
    }

    // ==================== Threads ====================

    /// Create a thread. It is appended, not activated.
    pub fn add_thread(&self, name: &str) -> Result<EntityId, EditError> {
        let mut st = self.state.lock();
        let id = st.ids.next(EntityKind::Thread);
        st.record(EntityKind::Thread, id, EditAction::Create)?;
        st.data.add_thread(Thread::new(id, name.trim()));
        st.refresh_views();
        debug!(thread = %id, "Added thread");
        Ok(id)
    }

    pub fn rename_thread(&self, name: &str) -> Result<bool, EditError> {
        self.state.lock().update_active(|t: &mut Thread| t.set_name(name.trim()))
    }

    pub fn set_thread_summary(&self, summary: &str) -> Result<bool, EditError> {
        self.state.lock().update_active(|t: &mut Thread| t.set_summary(summary))
    }

    pub fn toggle_thread_highlight(&self) -> Result<bool, EditError> {
        self.state.lock().update_active(|t: &mut Thread| {
            t.toggle_highlight();
            true
        })
    }

    pub fn toggle_thread_private(&self) -> Result<bool, EditError> {
        self.state.lock().update_active(|t: &mut Thread| {
            t.toggle_private();
            true
        })
    }

    /// Delete the active thread with its branches and unshared notes
    pub fn delete_thread(&self) -> Result<bool, EditError> {
        let mut st = self.state.lock();
        let Some(id) = st.data.active_thread().map(|t| t.id) else {
            return Ok(false);
        };
        let deletion = Deletion::capture(st.data.graph(), &st.log, Target::Thread(id));
        st.record(EntityKind::Thread, id, EditAction::Delete)?;
        let (cursor, _, _) = st.data.cursors();
        let removed = st.data.remove_thread(cursor);
        st.record_removed(&removed, (EntityKind::Thread, id));
        st.discard(deletion, &removed);
        st.refresh_views();
        Ok(true)
    }

    // ==================== Branches ====================

    /// Create a branch in the active thread
    pub fn add_branch(&self, name: &str) -> Result<Option<EntityId>, EditError> {
        let mut st = self.state.lock();
        let Some(thread) = st.data.active_thread().map(|t| t.id) else {
            return Ok(None);
        };
        let id = st.ids.next(EntityKind::Branch);
        st.record(EntityKind::Branch, id, EditAction::Create)?;
        st.data.add_branch(Branch::new(id, thread, name.trim()));
        st.refresh_views();
        debug!(branch = %id, %thread, "Added branch");
        Ok(Some(id))
    }

    pub fn rename_branch(&self, name: &str) -> Result<bool, EditError> {
        self.state.lock().update_active(|b: &mut Branch| b.set_name(name.trim()))
    }

    pub fn set_branch_summary(&self, summary: &str) -> Result<bool, EditError> {
        self.state.lock().update_active(|b: &mut Branch| b.set_summary(summary))
    }

    pub fn toggle_branch_highlight(&self) -> Result<bool, EditError> {
        self.state.lock().update_active(|b: &mut Branch| {
            b.toggle_highlight();
            true
        })
    }

    pub fn toggle_branch_private(&self) -> Result<bool, EditError> {
        self.state.lock().update_active(|b: &mut Branch| {
            b.toggle_private();
            true
        })
    }

    /// Delete the active branch and the notes only it referenced
    pub fn delete_branch(&self) -> Result<bool, EditError> {
        let mut st = self.state.lock();
        let Some(id) = st.data.active_branch().map(|b| b.id) else {
            return Ok(false);
        };
        let deletion = Deletion::capture(st.data.graph(), &st.log, Target::Branch(id));
        st.record(EntityKind::Branch, id, EditAction::Delete)?;
        let (_, cursor, _) = st.data.cursors();
        let removed = st.data.remove_branch(cursor);
        st.record_removed(&removed, (EntityKind::Branch, id));
        st.discard(deletion, &removed);
        st.refresh_views();
        Ok(true)
    }

    // ==================== Notes ====================

    /// Create a note in the active branch and make it the active note.
    /// Empty content is allowed.
    pub fn add_note(&self, content: &str) -> Result<Option<EntityId>, EditError> {
        let mut st = self.state.lock();
        let Some(branch) = st.data.active_branch().map(|b| b.id) else {
            return Ok(None);
        };
        st.record(EntityKind::Branch, branch, EditAction::Update)?;
        let id = st.ids.next(EntityKind::Note);
        st.record(EntityKind::Note, id, EditAction::Create)?;

        let mut note = Note::new(id);
        note.content = content.to_string();
        st.data.add_note(note);
        if !st.activate(EntityKind::Note, id) {
            st.refresh_views();
        }
        debug!(note = %id, %branch, "Added note");
        Ok(Some(id))
    }

    pub fn set_note_content(&self, content: &str) -> Result<bool, EditError> {
        self.state.lock().update_active(|n: &mut Note| n.set_content(content))
    }

    /// Add comma-separated topics to the active note
    pub fn add_note_topics(&self, topics: &str) -> Result<bool, EditError> {
        self.state.lock().update_active(|n: &mut Note| n.add_topics(topics))
    }

    pub fn remove_note_topic(&self, topic: &str) -> Result<bool, EditError> {
        self.state.lock().update_active(|n: &mut Note| n.remove_topic(topic))
    }

    pub fn toggle_note_highlight(&self) -> Result<bool, EditError> {
        self.state.lock().update_active(|n: &mut Note| {
            n.toggle_highlight();
            true
        })
    }

    pub fn toggle_note_private(&self) -> Result<bool, EditError> {
        self.state.lock().update_active(|n: &mut Note| {
            n.toggle_private();
            true
        })
    }

    /// Remove the active note from the active branch. The note itself is
    /// deleted only when no other branch references it.
    pub fn delete_note(&self) -> Result<bool, EditError> {
        let mut st = self.state.lock();
        let (Some(branch), Some(note)) = (
            st.data.active_branch().map(|b| b.id),
            st.data.active_note().map(|n| n.id),
        ) else {
            return Ok(false);
        };
        let deletion = Deletion::capture(st.data.graph(), &st.log, Target::Note { branch, note });
        let shared = st.data.graph().branches_of_note(note).len() > 1;
        if !shared {
            st.record(EntityKind::Note, note, EditAction::Delete)?;
        }
        // A branch still in memory has no pending delete, so this only fails
        // if the log and the graph disagree
        if st.record(EntityKind::Branch, branch, EditAction::Update).is_err() {
            st.dropped += 1;
        }

        let (_, _, cursor) = st.data.cursors();
        let removed = st.data.remove_note(cursor);
        st.discard(deletion, &removed);
        st.refresh_views();
        Ok(true)
    }

    /// Attach the active note to branch `index` of the active thread
    pub fn link_note(&self, index: usize) -> Result<bool, EditError> {
        let mut st = self.state.lock();
        let (Some(note), Some(branch)) = (
            st.data.active_note().map(|n| n.id),
            st.data.active_branch_ids().get(index).copied(),
        ) else {
            return Ok(false);
        };
        if !st.data.link_note(note, branch) {
            return Ok(false);
        }
        if let Err(e) = st.record(EntityKind::Branch, branch, EditAction::Update) {
            if let Some(b) = st.data.graph_mut().branch_mut(branch) {
                b.detach_note(note);
            }
            st.data.reload();
            return Err(e);
        }
        st.refresh_views();
        Ok(true)
    }

    /// Bring back the most recent delete made since the last sync and make
    /// the restored entity active. Its pending edits are rewound, so an
    /// entity created and deleted before sync is created again.
    pub fn undo_delete(&self) -> Option<(EntityKind, EntityId)> {
        let mut guard = self.state.lock();
        let st = &mut *guard;
        let deletion = st.trash.pop()?;
        let target = deletion.target();
        if !deletion.restore(st.data.graph_mut(), &mut st.log) {
            return None;
        }
        st.data.reload();
        st.reveal(target);
        info!(kind = %target.kind(), id = %target.id(), "Undid delete");
        Some((target.kind(), target.id()))
    }

    // ==================== Export ====================

    /// Write every note held in memory to `path` as JSON
    pub fn export_notes(&self, path: &std::path::Path) -> Result<usize> {
        archive::export_notes(self.state.lock().data.graph(), path)
    }

    // ==================== Sync ====================

    /// Write pending edits to the store and reload.
    ///
    /// On error the in-memory graph and the pending edits are kept as they
    /// were, and rows already inserted are remembered so the next sync
    /// updates them instead of inserting them again.
    pub fn sync(&self) -> Result<SyncReport, SyncError> {
        let mut guard = self.state.lock();
        let st = &mut *guard;

        let active = (
            st.data.active_thread().map(|t| t.id),
            st.data.active_branch().map(|b| b.id),
            st.data.active_note().map(|n| n.id),
        );

        let outcome = match reconcile(&mut st.store, st.data.graph(), &st.log, &st.written) {
            Ok(outcome) => outcome,
            Err(e) => {
                st.written = e.written().clone();
                return Err(e);
            }
        };
        let report = outcome.report;
        let hints = cursor_hints(&outcome.graph, &report, active);

        st.data.refresh(outcome.graph, hints);
        st.ids = outcome.ids;
        st.log.clear();
        st.written.clear();
        st.trash.clear();
        st.dropped = 0;
        st.refresh_views();
        Ok(report)
    }

    // ==================== Session ====================

    pub fn session_state(&self) -> SessionState {
        let st = self.state.lock();
        let (thread_cursor, branch_cursor, note_cursor) = st.data.cursors();
        SessionState {
            thread_cursor,
            branch_cursor,
            note_cursor,
            note_view: st.views.notes.current(),
            note_cursors: st.views.notes.cursors(),
        }
    }

    /// Restore cursors and the note view. Out-of-range values are ignored.
    pub fn restore_session(&self, session: &SessionState) {
        let mut st = self.state.lock();
        st.data.switch_thread(session.thread_cursor);
        st.data.switch_branch(session.branch_cursor);
        st.data.switch_note(session.note_cursor);
        st.refresh_views();

        // Search results are not persisted
        let view = match session.note_view {
            ContextName::Search => ContextName::Default,
            other => other,
        };
        st.views.notes.set_cursors(session.note_cursors);
        st.switch_view::<Note>(view);
    }

    /// Save the current session to `path`
    pub fn save_session(&self, path: &std::path::Path) -> Result<()> {
        self.session_state().save(path)
    }
}

/// Positions of the previously active entities in the reloaded graph
fn cursor_hints(
    graph: &Graph,
    report: &SyncReport,
    (thread, branch, note): (Option<EntityId>, Option<EntityId>, Option<EntityId>),
) -> CursorHints {
    let thread = thread.map(|id| report.resolve(EntityKind::Thread, id));
    let branch = branch.map(|id| report.resolve(EntityKind::Branch, id));
    let note = note.map(|id| report.resolve(EntityKind::Note, id));

    let thread_pos = thread.and_then(|id| graph.threads.iter().position(|t| t.id == id));
    let branch_pos = thread
        .zip(branch)
        .and_then(|(t, b)| graph.branch_ids(t).iter().position(|id| *id == b));
    let note_pos = branch
        .zip(note)
        .and_then(|(b, n)| graph.note_ids(b).iter().position(|id| *id == n));

    CursorHints {
        thread: thread_pos,
        branch: branch_pos,
        note: note_pos,
    }
}

// ==================== Per-kind plumbing ====================

/// Access to the pieces of state that belong to one entity kind
trait Staged: Entity + Clone + Sized {
    fn active_id(data: &DataManager) -> Option<EntityId>;
    fn slot(graph: &mut Graph, id: EntityId) -> Option<&mut Self>;
    fn contexts(views: &Views) -> &ContextManager<Self>;
    fn contexts_mut(views: &mut Views) -> &mut ContextManager<Self>;
}

impl Staged for Thread {
    fn active_id(data: &DataManager) -> Option<EntityId> {
        data.active_thread().map(|t| t.id)
    }

    fn slot(graph: &mut Graph, id: EntityId) -> Option<&mut Self> {
        graph.thread_mut(id)
    }

    fn contexts(views: &Views) -> &ContextManager<Self> {
        &views.threads
    }

    fn contexts_mut(views: &mut Views) -> &mut ContextManager<Self> {
        &mut views.threads
    }
}

impl Staged for Branch {
    fn active_id(data: &DataManager) -> Option<EntityId> {
        data.active_branch().map(|b| b.id)
    }

    fn slot(graph: &mut Graph, id: EntityId) -> Option<&mut Self> {
        graph.branch_mut(id)
    }

    fn contexts(views: &Views) -> &ContextManager<Self> {
        &views.branches
    }

    fn contexts_mut(views: &mut Views) -> &mut ContextManager<Self> {
        &mut views.branches
    }
}

impl Staged for Note {
    fn active_id(data: &DataManager) -> Option<EntityId> {
        data.active_note().map(|n| n.id)
    }

    fn slot(graph: &mut Graph, id: EntityId) -> Option<&mut Self> {
        graph.note_mut(id)
    }

    fn contexts(views: &Views) -> &ContextManager<Self> {
        &views.notes
    }

    fn contexts_mut(views: &mut Views) -> &mut ContextManager<Self> {
        &mut views.notes
    }
}

impl<S> AppState<S> {
    fn record(&mut self, kind: EntityKind, id: EntityId, action: EditAction) -> Result<(), EditError> {
        self.log.record(kind, id, action).map(|_| ()).map_err(|e| {
            error!(error = %e, "Rejected edit");
            e
        })
    }

    /// Record deletes for everything a removal cascaded to. `root` was
    /// already recorded by the caller.
    fn record_removed(&mut self, removed: &Removed, root: (EntityKind, EntityId)) {
        let cascade = [
            (EntityKind::Thread, &removed.threads),
            (EntityKind::Branch, &removed.branches),
            (EntityKind::Note, &removed.notes),
        ];
        for (kind, ids) in cascade {
            for id in ids.iter().filter(|id| (kind, **id) != root) {
                // Already logged; the entity is gone from memory either way
                if self.record(kind, *id, EditAction::Delete).is_err() {
                    self.dropped += 1;
                }
            }
        }
    }

    /// Keep a captured deletion for undo, trimmed to what was removed
    fn discard(&mut self, deletion: Option<Deletion>, removed: &Removed) {
        match deletion {
            Some(mut deletion) => {
                deletion.retain(removed);
                self.trash.push(deletion);
            }
            None => warn!("Delete could not be captured for undo"),
        }
    }

    /// Activate a restored entity together with its ancestors
    fn reveal(&mut self, target: Target) {
        let graph = self.data.graph();
        let (thread, branch) = match target {
            Target::Thread(id) => (Some(id), None),
            Target::Branch(id) => (graph.branch(id).map(|b| b.thread_id), Some(id)),
            Target::Note { branch, .. } => (graph.branch(branch).map(|b| b.thread_id), Some(branch)),
        };
        if let Some(thread) = thread {
            self.activate(EntityKind::Thread, thread);
        }
        if let Some(branch) = branch {
            self.activate(EntityKind::Branch, branch);
        }
        if let Target::Note { note, .. } = target {
            self.activate(EntityKind::Note, note);
        }
        self.refresh_views();
    }

    /// Apply `edit` to a copy of the active entity; if it changed anything,
    /// record an update and commit the copy.
    fn update_active<E: Staged>(&mut self, edit: impl FnOnce(&mut E) -> bool) -> Result<bool, EditError> {
        let Some(id) = E::active_id(&self.data) else {
            return Ok(false);
        };
        let Some(mut edited) = E::slot(self.data.graph_mut(), id).map(|e| e.clone()) else {
            return Ok(false);
        };
        if !edit(&mut edited) {
            return Ok(false);
        }
        self.record(E::KIND, id, EditAction::Update)?;
        if let Some(slot) = E::slot(self.data.graph_mut(), id) {
            *slot = edited;
        }
        Ok(true)
    }

    fn view<E: Staged>(&self) -> View<E>
    where
        Graph: EntitySource<E>,
    {
        let ctx = E::contexts(&self.views);
        let graph = self.data.graph();
        View {
            name: ctx.current(),
            cursor: ctx.cursor(),
            items: ctx
                .entities()
                .iter()
                .filter_map(|id| EntitySource::<E>::lookup(graph, *id).cloned())
                .collect(),
        }
    }

    fn switch_view<E: Staged>(&mut self, target: ContextName) -> bool
    where
        Graph: EntitySource<E>,
    {
        let graph = self.data.graph();
        let ctx = E::contexts_mut(&mut self.views);
        let cursor = ctx.cursor();
        match target {
            ContextName::Recent => ctx.refresh_recent(graph),
            ContextName::Search => {
                if !ctx.rerun_search(graph) {
                    debug!(kind = %E::KIND, "No query to show");
                    return false;
                }
            }
            ContextName::Default => {}
        }
        let restored = ctx.update_context(target, cursor, graph);
        if let Some(id) = ctx.select_item(restored) {
            self.activate(E::KIND, id);
        }
        true
    }

    fn search<E: Staged>(&mut self, query: &str) -> usize
    where
        Graph: EntitySource<E>,
    {
        let graph = self.data.graph();
        let ctx = E::contexts_mut(&mut self.views);
        ctx.search(query, graph);
        let hits = ctx.len();
        if let Some(id) = ctx.select_item(0) {
            self.activate(E::KIND, id);
        }
        hits
    }

    /// Point the data manager at `id` and realign the dependent views
    fn activate(&mut self, kind: EntityKind, id: EntityId) -> bool {
        match kind {
            EntityKind::Thread => {
                let Some(pos) = self.data.thread_position(id) else {
                    return false;
                };
                if self.data.cursors().0 != pos {
                    self.data.switch_thread(pos);
                    self.views.branches.switch_context(ContextName::Default);
                    self.views.notes.switch_context(ContextName::Default);
                }
            }
            EntityKind::Branch => {
                let Some(pos) = self.data.branch_position(id) else {
                    return false;
                };
                if self.data.cursors().1 != pos {
                    self.data.switch_branch(pos);
                    self.views.notes.switch_context(ContextName::Default);
                }
            }
            EntityKind::Note => {
                let Some(pos) = self.data.note_position(id) else {
                    return false;
                };
                self.data.switch_note(pos);
            }
        }
        self.refresh_views();
        true
    }

    /// Rebuild every Default view from the data manager and keep each
    /// view's cursor on the active entity where it is visible
    fn refresh_views(&mut self) {
        let data = &self.data;
        let graph = data.graph();
        let views = &mut self.views;

        views.threads.refresh_default(data.thread_ids());
        views.branches.refresh_default(data.active_branch_ids().to_vec());
        views.notes.refresh_default(data.active_note_ids().to_vec());

        if views.threads.current() == ContextName::Recent {
            views.threads.refresh_recent(graph);
        }
        if views.branches.current() == ContextName::Recent {
            views.branches.refresh_recent(graph);
        }
        if views.notes.current() == ContextName::Recent {
            views.notes.refresh_recent(graph);
        }

        align(&mut views.threads, Thread::active_id(data));
        align(&mut views.branches, Branch::active_id(data));
        align(&mut views.notes, Note::active_id(data));
    }
}

fn align<E: Entity>(ctx: &mut ContextManager<E>, active: Option<EntityId>) {
    if let Some(pos) = active.and_then(|id| ctx.position(id)) {
        ctx.select_item(pos);
    }
}
