//! Entity arena
//!
//! `Graph` is the single owner of every thread, branch and note held in
//! memory. Threads are kept in creation order; branches and notes live in
//! tables keyed by [`EntityId`] and are referenced from their parents by
//! identifier only. A note shared by two branches exists exactly once.

use std::collections::HashMap;

use crate::models::{Branch, Entity, EntityId, Note, Thread};

/// Lookup of entities by identifier
///
/// Context views hold identifier lists and resolve them through this trait
/// at read time, so they never keep copies of entities.
pub trait EntitySource<E: Entity> {
    fn lookup(&self, id: EntityId) -> Option<&E>;
}

/// The canonical in-memory graph
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Graph {
    pub threads: Vec<Thread>,
    pub branches: HashMap<EntityId, Branch>,
    pub notes: HashMap<EntityId, Note>,
}

/// Entities that left the arena as a result of a removal
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Removed {
    pub threads: Vec<EntityId>,
    pub branches: Vec<EntityId>,
    pub notes: Vec<EntityId>,
}

impl Removed {
    pub fn is_empty(&self) -> bool {
        self.threads.is_empty() && self.branches.is_empty() && self.notes.is_empty()
    }
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.threads.is_empty()
    }

    pub fn thread(&self, id: EntityId) -> Option<&Thread> {
        self.threads.iter().find(|t| t.id == id)
    }

    pub fn thread_mut(&mut self, id: EntityId) -> Option<&mut Thread> {
        self.threads.iter_mut().find(|t| t.id == id)
    }

    pub fn branch(&self, id: EntityId) -> Option<&Branch> {
        self.branches.get(&id)
    }

    pub fn branch_mut(&mut self, id: EntityId) -> Option<&mut Branch> {
        self.branches.get_mut(&id)
    }

    pub fn note(&self, id: EntityId) -> Option<&Note> {
        self.notes.get(&id)
    }

    pub fn note_mut(&mut self, id: EntityId) -> Option<&mut Note> {
        self.notes.get_mut(&id)
    }

    /// Branch identifiers of a thread, in display order
    pub fn branch_ids(&self, thread: EntityId) -> Vec<EntityId> {
        self.thread(thread)
            .map(|t| t.branches.clone())
            .unwrap_or_default()
    }

    /// Note identifiers of a branch, in display order
    pub fn note_ids(&self, branch: EntityId) -> Vec<EntityId> {
        self.branch(branch)
            .map(|b| b.notes.clone())
            .unwrap_or_default()
    }

    /// Branches that reference the given note
    pub fn branches_of_note(&self, note: EntityId) -> Vec<EntityId> {
        let mut owners: Vec<EntityId> = self
            .branches
            .values()
            .filter(|b| b.notes.contains(&note))
            .map(|b| b.id)
            .collect();
        owners.sort();
        owners
    }

    // ==================== Insertion ====================

    /// Append a thread
    pub fn insert_thread(&mut self, thread: Thread) {
        self.threads.push(thread);
    }

    /// Append a branch to its owning thread. Returns false if the thread
    /// does not exist.
    pub fn insert_branch(&mut self, branch: Branch) -> bool {
        let Some(thread) = self.thread_mut(branch.thread_id) else {
            return false;
        };
        thread.branches.push(branch.id);
        self.branches.insert(branch.id, branch);
        true
    }

    /// Append a note to a branch. Returns false if the branch does not exist.
    pub fn insert_note(&mut self, branch: EntityId, note: Note) -> bool {
        let Some(owner) = self.branches.get_mut(&branch) else {
            return false;
        };
        owner.attach_note(note.id);
        self.notes.insert(note.id, note);
        true
    }

    // ==================== Removal ====================

    /// Remove a thread with its branches and every note left unreferenced
    pub fn remove_thread(&mut self, id: EntityId) -> Removed {
        let mut removed = Removed::default();
        let Some(pos) = self.threads.iter().position(|t| t.id == id) else {
            return removed;
        };
        let thread = self.threads.remove(pos);
        removed.threads.push(thread.id);

        for branch_id in thread.branches {
            if let Some(branch) = self.branches.remove(&branch_id) {
                removed.branches.push(branch_id);
                for note_id in branch.notes {
                    if !removed.notes.contains(&note_id) && self.drop_note_if_orphaned(note_id) {
                        removed.notes.push(note_id);
                    }
                }
            }
        }
        removed
    }

    /// Remove a branch and every note it alone referenced
    pub fn remove_branch(&mut self, id: EntityId) -> Removed {
        let mut removed = Removed::default();
        let Some(branch) = self.branches.remove(&id) else {
            return removed;
        };
        if let Some(thread) = self.thread_mut(branch.thread_id) {
            thread.branches.retain(|b| *b != id);
        }
        removed.branches.push(id);

        for note_id in branch.notes {
            if !removed.notes.contains(&note_id) && self.drop_note_if_orphaned(note_id) {
                removed.notes.push(note_id);
            }
        }
        removed
    }

    /// Detach a note from one branch; the note leaves the arena only when no
    /// other branch references it.
    pub fn remove_note(&mut self, branch: EntityId, note: EntityId) -> Removed {
        let mut removed = Removed::default();
        let detached = self
            .branches
            .get_mut(&branch)
            .map(|b| b.detach_note(note))
            .unwrap_or(false);
        if detached && self.drop_note_if_orphaned(note) {
            removed.notes.push(note);
        }
        removed
    }

    fn drop_note_if_orphaned(&mut self, note: EntityId) -> bool {
        let referenced = self.branches.values().any(|b| b.notes.contains(&note));
        !referenced && self.notes.remove(&note).is_some()
    }
}

impl EntitySource<Thread> for Graph {
    fn lookup(&self, id: EntityId) -> Option<&Thread> {
        self.thread(id)
    }
}

impl EntitySource<Branch> for Graph {
    fn lookup(&self, id: EntityId) -> Option<&Branch> {
        self.branch(id)
    }
}

impl EntitySource<Note> for Graph {
    fn lookup(&self, id: EntityId) -> Option<&Note> {
        self.note(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

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

    #[test]
    fn test_insert_requires_parent() {
        let mut graph = Graph::new();
        assert!(!graph.insert_branch(Branch::new(pid(2), pid(1), "orphan")));
        assert!(!graph.insert_note(pid(2), Note::new(pid(3))));
        assert!(graph.branches.is_empty());
        assert!(graph.notes.is_empty());
    }

    #[test]
    fn test_shared_note_survives_branch_removal() {
        let mut graph = sample();
        let removed = graph.remove_branch(pid(10));

        assert_eq!(removed.branches, vec![pid(10)]);
        assert_eq!(removed.notes, vec![pid(101)]);
        assert!(graph.note(pid(100)).is_some());
        assert_eq!(graph.branch_ids(pid(1)), vec![pid(11)]);
    }

    #[test]
    fn test_remove_thread_cascades() {
        let mut graph = sample();
        let removed = graph.remove_thread(pid(1));

        assert_eq!(removed.threads, vec![pid(1)]);
        assert_eq!(removed.branches.len(), 2);
        assert_eq!(removed.notes.len(), 2);
        assert!(graph.branches.is_empty());
        assert!(graph.notes.is_empty());
    }

    #[test]
    fn test_remove_note_detaches_only() {
        let mut graph = sample();
        let removed = graph.remove_note(pid(11), pid(100));
        assert!(removed.is_empty());
        assert!(graph.note(pid(100)).is_some());

        let removed = graph.remove_note(pid(10), pid(100));
        assert_eq!(removed.notes, vec![pid(100)]);
        assert!(graph.note(pid(100)).is_none());
    }

    #[test]
    fn test_branches_of_note() {
        let graph = sample();
        assert_eq!(graph.branches_of_note(pid(100)), vec![pid(10), pid(11)]);
        assert_eq!(graph.branches_of_note(pid(101)), vec![pid(10)]);
    }
}
