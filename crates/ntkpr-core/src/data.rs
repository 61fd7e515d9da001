//! Hierarchical data manager
//!
//! Owns the canonical [`Graph`] and three cursors (thread, branch, note).
//! The active branch list is the branch list of the thread under the thread
//! cursor, and the active note list is the note list of the branch under the
//! branch cursor. Every operation keeps the cursors and the derived lists
//! consistent; out-of-range indices are silently ignored.

use tracing::debug;

use crate::graph::{Graph, Removed};
use crate::models::{Branch, EntityId, Note, Thread};

/// Cursor values to restore after a reload. `None` keeps the current value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CursorHints {
    pub thread: Option<usize>,
    pub branch: Option<usize>,
    pub note: Option<usize>,
}

#[derive(Debug, Clone, Default)]
pub struct DataManager {
    graph: Graph,
    thread_cursor: usize,
    branch_cursor: usize,
    note_cursor: usize,
    branches: Vec<EntityId>,
    notes: Vec<EntityId>,
}

fn clamp(cursor: usize, len: usize) -> usize {
    if len == 0 {
        0
    } else {
        cursor.min(len - 1)
    }
}

impl DataManager {
    /// Create a manager over `graph` with every cursor at 0
    pub fn new(graph: Graph) -> Self {
        let mut dm = Self {
            graph,
            ..Default::default()
        };
        dm.reload_branches();
        dm
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// Mutable access for in-place edits of entity fields. Structural changes
    /// go through the add/remove methods so the active lists stay in step.
    pub fn graph_mut(&mut self) -> &mut Graph {
        &mut self.graph
    }

    pub fn threads(&self) -> &[Thread] {
        &self.graph.threads
    }

    pub fn thread_ids(&self) -> Vec<EntityId> {
        self.graph.threads.iter().map(|t| t.id).collect()
    }

    /// Branch identifiers of the active thread
    pub fn active_branch_ids(&self) -> &[EntityId] {
        &self.branches
    }

    /// Note identifiers of the active branch
    pub fn active_note_ids(&self) -> &[EntityId] {
        &self.notes
    }

    pub fn cursors(&self) -> (usize, usize, usize) {
        (self.thread_cursor, self.branch_cursor, self.note_cursor)
    }

    // ==================== Active entities ====================

    pub fn active_thread(&self) -> Option<&Thread> {
        self.graph.threads.get(self.thread_cursor)
    }

    pub fn active_branch(&self) -> Option<&Branch> {
        let id = self.branches.get(self.branch_cursor)?;
        self.graph.branch(*id)
    }

    pub fn active_note(&self) -> Option<&Note> {
        let id = self.notes.get(self.note_cursor)?;
        self.graph.note(*id)
    }

    pub fn thread_position(&self, id: EntityId) -> Option<usize> {
        self.graph.threads.iter().position(|t| t.id == id)
    }

    pub fn branch_position(&self, id: EntityId) -> Option<usize> {
        self.branches.iter().position(|b| *b == id)
    }

    pub fn note_position(&self, id: EntityId) -> Option<usize> {
        self.notes.iter().position(|n| *n == id)
    }

    // ==================== Switching ====================

    /// Activate thread `index`; branch and note cursors reset to 0
    pub fn switch_thread(&mut self, index: usize) {
        if index >= self.graph.threads.len() {
            return;
        }
        self.thread_cursor = index;
        self.branch_cursor = 0;
        self.note_cursor = 0;
        self.reload_branches();
    }

    /// Activate branch `index` of the active thread; note cursor resets to 0
    pub fn switch_branch(&mut self, index: usize) {
        if index >= self.branches.len() {
            return;
        }
        self.branch_cursor = index;
        self.note_cursor = 0;
        self.reload_notes();
    }

    /// Activate note `index` of the active branch
    pub fn switch_note(&mut self, index: usize) {
        if index >= self.notes.len() {
            return;
        }
        self.note_cursor = index;
    }

    // ==================== Adding ====================

    /// Append a thread without moving any cursor
    pub fn add_thread(&mut self, thread: Thread) {
        self.graph.insert_thread(thread);
        if self.graph.threads.len() == 1 {
            self.reload_branches();
        }
    }

    /// Append a branch to its owning thread without moving any cursor.
    /// Returns false if the owning thread does not exist.
    pub fn add_branch(&mut self, branch: Branch) -> bool {
        if !self.graph.insert_branch(branch) {
            return false;
        }
        self.reload_branches();
        true
    }

    /// Append a note to the active branch without moving any cursor.
    /// Returns false when there is no active branch.
    pub fn add_note(&mut self, note: Note) -> bool {
        let Some(branch) = self.branches.get(self.branch_cursor).copied() else {
            return false;
        };
        if !self.graph.insert_note(branch, note) {
            return false;
        }
        self.reload_notes();
        true
    }

    /// Attach an existing note to another branch of the same thread.
    /// Returns false if either is missing, the threads differ, or the note
    /// is already attached.
    pub fn link_note(&mut self, note: EntityId, branch: EntityId) -> bool {
        if self.graph.note(note).is_none() {
            return false;
        }
        let Some(target_thread) = self.graph.branch(branch).map(|b| b.thread_id) else {
            return false;
        };
        let same_thread = self
            .graph
            .branches_of_note(note)
            .iter()
            .filter_map(|b| self.graph.branch(*b))
            .all(|b| b.thread_id == target_thread);
        if !same_thread {
            return false;
        }
        let linked = self
            .graph
            .branch_mut(branch)
            .map(|b| b.attach_note(note))
            .unwrap_or(false);
        if linked {
            self.reload_notes();
        }
        linked
    }

    // ==================== Removing ====================

    /// Remove thread `index` together with its branches and orphaned notes
    pub fn remove_thread(&mut self, index: usize) -> Removed {
        let Some(id) = self.graph.threads.get(index).map(|t| t.id) else {
            return Removed::default();
        };
        let removed = self.graph.remove_thread(id);
        let len = self.graph.threads.len();

        if index < self.thread_cursor {
            self.thread_cursor -= 1;
            // Same thread stays active; a shared note may still have left
            self.reload_branches_keep_cursors();
        } else if index == self.thread_cursor || self.thread_cursor >= len {
            self.thread_cursor = clamp(self.thread_cursor, len);
            self.branch_cursor = 0;
            self.note_cursor = 0;
            self.reload_branches();
        }
        debug!(thread = %id, cursor = self.thread_cursor, "Removed thread");
        removed
    }

    /// Remove branch `index` of the active thread
    pub fn remove_branch(&mut self, index: usize) -> Removed {
        let Some(id) = self.branches.get(index).copied() else {
            return Removed::default();
        };
        let removed = self.graph.remove_branch(id);
        self.branches = self
            .active_thread()
            .map(|t| t.branches.clone())
            .unwrap_or_default();
        let len = self.branches.len();

        if index < self.branch_cursor {
            self.branch_cursor -= 1;
            self.reload_notes_keep_cursor();
        } else if index == self.branch_cursor || self.branch_cursor >= len {
            self.branch_cursor = clamp(self.branch_cursor, len);
            self.note_cursor = 0;
            self.reload_notes();
        }
        debug!(branch = %id, cursor = self.branch_cursor, "Removed branch");
        removed
    }

    /// Remove note `index` from the active branch. The note leaves the arena
    /// only if no other branch references it.
    pub fn remove_note(&mut self, index: usize) -> Removed {
        let (Some(branch), Some(note)) = (
            self.branches.get(self.branch_cursor).copied(),
            self.notes.get(index).copied(),
        ) else {
            return Removed::default();
        };
        let removed = self.graph.remove_note(branch, note);
        self.notes = self.graph.note_ids(branch);
        let len = self.notes.len();

        if index < self.note_cursor {
            self.note_cursor -= 1;
        } else if index == self.note_cursor || self.note_cursor >= len {
            self.note_cursor = clamp(self.note_cursor, len);
        }
        debug!(note = %note, cursor = self.note_cursor, "Removed note");
        removed
    }

    // ==================== Reload ====================

    /// Replace the whole graph and restore cursors from hints, clamping each
    pub fn refresh(&mut self, graph: Graph, hints: CursorHints) {
        self.graph = graph;
        self.thread_cursor = clamp(
            hints.thread.unwrap_or(self.thread_cursor),
            self.graph.threads.len(),
        );
        self.branch_cursor = hints.branch.unwrap_or(self.branch_cursor);
        self.note_cursor = hints.note.unwrap_or(self.note_cursor);
        self.reload_branches_keep_cursors();
    }

    /// Recompute the active lists after in-place edits, clamping cursors
    pub fn reload(&mut self) {
        self.thread_cursor = clamp(self.thread_cursor, self.graph.threads.len());
        self.reload_branches_keep_cursors();
    }

    fn reload_branches(&mut self) {
        self.branches = self
            .active_thread()
            .map(|t| t.branches.clone())
            .unwrap_or_default();
        self.reload_notes();
    }

    fn reload_notes(&mut self) {
        self.notes = self
            .branches
            .get(self.branch_cursor)
            .map(|b| self.graph.note_ids(*b))
            .unwrap_or_default();
    }

    fn reload_branches_keep_cursors(&mut self) {
        self.branches = self
            .active_thread()
            .map(|t| t.branches.clone())
            .unwrap_or_default();
        self.branch_cursor = clamp(self.branch_cursor, self.branches.len());
        self.reload_notes_keep_cursor();
    }

    fn reload_notes_keep_cursor(&mut self) {
        self.reload_notes();
        self.note_cursor = clamp(self.note_cursor, self.notes.len());
    }
}
