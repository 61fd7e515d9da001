//! Undo for deletions made since the last sync
//!
//! Before a delete, [`Deletion::capture`] copies the target, everything a
//! cascade could take with it, and the pending edit of each. Once the graph
//! has reported what it actually [`Removed`], [`Deletion::retain`] drops the
//! copies that stayed behind. [`Deletion::restore`] puts the rest back at
//! their old positions and rewinds their pending edits, so a delete that
//! is undone before sync never reaches the store.
//!
//! Deletions are undone last in, first out. A parent is therefore always
//! present when its child comes back.

use tracing::{debug, warn};

use crate::edit_log::{EditLog, EditType};
use crate::graph::{Graph, Removed};
use crate::models::{Branch, EntityId, EntityKind, Note, Thread};

/// What was deleted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Thread(EntityId),
    Branch(EntityId),
    /// A note detached from one branch
    Note { branch: EntityId, note: EntityId },
}

impl Target {
    pub fn kind(self) -> EntityKind {
        match self {
            Target::Thread(_) => EntityKind::Thread,
            Target::Branch(_) => EntityKind::Branch,
            Target::Note { .. } => EntityKind::Note,
        }
    }

    pub fn id(self) -> EntityId {
        match self {
            Target::Thread(id) | Target::Branch(id) => id,
            Target::Note { note, .. } => note,
        }
    }
}

/// One undoable delete
#[derive(Debug, Clone)]
pub struct Deletion {
    target: Target,
    /// Position of the target in its parent list
    slot: usize,
    thread: Option<Thread>,
    branches: Vec<Branch>,
    notes: Vec<Note>,
    /// Pending edit of each removed entity before the delete
    edits: Vec<(EntityKind, EntityId, Option<EditType>)>,
}

impl Deletion {
    /// Snapshot `target` and its possible cascade. `None` when the target is
    /// not in the graph.
    pub fn capture(graph: &Graph, log: &EditLog, target: Target) -> Option<Self> {
        let mut deletion = Deletion {
            target,
            slot: 0,
            thread: None,
            branches: Vec::new(),
            notes: Vec::new(),
            edits: Vec::new(),
        };

        match target {
            Target::Thread(id) => {
                deletion.slot = graph.threads.iter().position(|t| t.id == id)?;
                let thread = graph.thread(id)?;
                for branch in &thread.branches {
                    deletion.take_branch(graph, *branch);
                }
                deletion.thread = Some(thread.clone());
            }
            Target::Branch(id) => {
                let branch = graph.branch(id)?;
                deletion.slot = graph.branch_ids(branch.thread_id).iter().position(|b| *b == id)?;
                deletion.take_branch(graph, id);
            }
            Target::Note { branch, note } => {
                deletion.slot = graph.note_ids(branch).iter().position(|n| *n == note)?;
                deletion.notes.push(graph.note(note)?.clone());
            }
        }

        let edits = deletion
            .thread
            .iter()
            .map(|t| (EntityKind::Thread, t.id))
            .chain(deletion.branches.iter().map(|b| (EntityKind::Branch, b.id)))
            .chain(deletion.notes.iter().map(|n| (EntityKind::Note, n.id)))
            .map(|(kind, id)| (kind, id, log.get(kind, id)))
            .collect();
        deletion.edits = edits;
        Some(deletion)
    }

    fn take_branch(&mut self, graph: &Graph, id: EntityId) {
        let Some(branch) = graph.branch(id) else {
            return;
        };
        for note in &branch.notes {
            if let Some(note) = graph.note(*note) {
                if !self.notes.iter().any(|n| n.id == note.id) {
                    self.notes.push(note.clone());
                }
            }
        }
        self.branches.push(branch.clone());
    }

    /// Keep only the notes that actually left the arena. Threads and
    /// branches always go with their target.
    pub fn retain(&mut self, removed: &Removed) {
        self.notes.retain(|n| removed.notes.contains(&n.id));
        self.edits
            .retain(|(kind, id, _)| *kind != EntityKind::Note || removed.notes.contains(id));
    }

    pub fn target(&self) -> Target {
        self.target
    }

    /// Put the deleted entities back and rewind their pending edits.
    /// Returns false, changing nothing, when the parent is gone.
    pub fn restore(self, graph: &mut Graph, log: &mut EditLog) -> bool {
        let parent_present = match self.target {
            Target::Thread(_) => true,
            Target::Branch(id) => self
                .branches
                .iter()
                .find(|b| b.id == id)
                .is_some_and(|b| graph.thread(b.thread_id).is_some()),
            Target::Note { branch, .. } => graph.branch(branch).is_some(),
        };
        if !parent_present {
            warn!(kind = %self.target.kind(), id = %self.target.id(), "Parent of deleted entity is gone, cannot undo");
            return false;
        }

        for note in self.notes {
            graph.notes.insert(note.id, note);
        }
        let mut parent_thread = None;
        for branch in self.branches {
            if branch.id == self.target.id() {
                parent_thread = Some(branch.thread_id);
            }
            graph.branches.insert(branch.id, branch);
        }

        match self.target {
            Target::Thread(_) => {
                if let Some(thread) = self.thread {
                    let slot = self.slot.min(graph.threads.len());
                    graph.threads.insert(slot, thread);
                }
            }
            Target::Branch(id) => {
                if let Some(thread) = parent_thread.and_then(|t| graph.thread_mut(t)) {
                    insert_at(&mut thread.branches, self.slot, id);
                }
            }
            Target::Note { branch, note } => {
                if let Some(branch) = graph.branch_mut(branch) {
                    insert_at(&mut branch.notes, self.slot, note);
                }
            }
        }

        for (kind, id, previous) in self.edits {
            log.restore(kind, id, previous);
        }
        debug!(kind = %self.target.kind(), id = %self.target.id(), "Deletion undone");
        true
    }
}

fn insert_at(ids: &mut Vec<EntityId>, slot: usize, id: EntityId) {
    if !ids.contains(&id) {
        ids.insert(slot.min(ids.len()), id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edit_log::EditAction;

    fn pid(v: u64) -> EntityId {
        EntityId::Provisional(v)
    }

    /// Thread 1 with branches 10 and 11; note 100 shared, note 101 only in 10
    fn sample() -> Graph {
        let mut graph = Graph::new();
        graph.insert_thread(Thread::new(pid(1), "t"));
        graph.insert_branch(Branch::new(pid(10), pid(1), "b0"));
        graph.insert_branch(Branch::new(pid(11), pid(1), "b1"));
        graph.insert_note(pid(10), Note::new(pid(100)));
        graph.insert_note(pid(10), Note::new(pid(101)));
        graph.branch_mut(pid(11)).unwrap().attach_note(pid(100));
        graph
    }

    fn delete(graph: &mut Graph, log: &mut EditLog, target: Target) -> Deletion {
        let mut deletion = Deletion::capture(graph, log, target).unwrap();
        let removed = match target {
            Target::Thread(id) => graph.remove_thread(id),
            Target::Branch(id) => graph.remove_branch(id),
            Target::Note { branch, note } => graph.remove_note(branch, note),
        };
        log.record(target.kind(), target.id(), EditAction::Delete).unwrap();
        for note in &removed.notes {
            if *note != target.id() {
                log.record(EntityKind::Note, *note, EditAction::Delete).unwrap();
            }
        }
        deletion.retain(&removed);
        deletion
    }

    #[test]
    fn test_branch_comes_back_in_place() {
        let mut graph = sample();
        let before = graph.clone();
        let mut log = EditLog::new();

        let deletion = delete(&mut graph, &mut log, Target::Branch(pid(10)));
        assert_eq!(log.pending().len(), 2);
        assert!(deletion.restore(&mut graph, &mut log));

        assert_eq!(graph, before);
        assert!(log.is_empty());
    }

    #[test]
    fn test_shared_note_is_not_duplicated() {
        let mut graph = sample();
        let mut log = EditLog::new();
        let deletion = delete(&mut graph, &mut log, Target::Branch(pid(10)));
        assert_eq!(deletion.notes.len(), 1);

        deletion.restore(&mut graph, &mut log);
        assert_eq!(graph.branches_of_note(pid(100)).len(), 2);
        assert_eq!(graph.note_ids(pid(10)), vec![pid(100), pid(101)]);
    }

    #[test]
    fn test_thread_restore_rewinds_create() {
        let mut graph = sample();
        graph.insert_thread(Thread::new(pid(2), "second"));
        let mut log = EditLog::new();
        log.record(EntityKind::Thread, pid(1), EditAction::Create).unwrap();

        let deletion = delete(&mut graph, &mut log, Target::Thread(pid(1)));
        assert_eq!(log.get(EntityKind::Thread, pid(1)), Some(EditType::None));
        deletion.restore(&mut graph, &mut log);

        assert_eq!(graph.threads[0].id, pid(1));
        assert_eq!(graph.branches.len(), 2);
        assert_eq!(graph.notes.len(), 2);
        assert_eq!(log.pending(), vec![(EntityKind::Thread, pid(1), EditType::Create)]);
    }

    #[test]
    fn test_note_without_branch_cannot_return() {
        let mut graph = sample();
        let mut log = EditLog::new();
        let deletion = delete(
            &mut graph,
            &mut log,
            Target::Note {
                branch: pid(10),
                note: pid(101),
            },
        );
        graph.remove_branch(pid(10));

        assert!(!deletion.restore(&mut graph, &mut log));
        assert!(graph.note(pid(101)).is_none());
        assert_eq!(log.get(EntityKind::Note, pid(101)), Some(EditType::Delete));
    }

    #[test]
    fn test_capture_missing_target() {
        let graph = sample();
        assert!(Deletion::capture(&graph, &EditLog::new(), Target::Thread(pid(9))).is_none());
    }
}
