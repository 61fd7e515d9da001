//! Provisional identifier counters

use crate::models::{EntityId, EntityKind};
use crate::storage::{NoteStore, StorageResult};

/// Per-kind counters for identifiers of entities not yet in the store
///
/// Seeded one above the store's maximum identifier (tombstones included),
/// so a provisional value is never equal to an identifier the store has
/// handed out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProvisionalIds {
    thread: u64,
    branch: u64,
    note: u64,
}

impl Default for ProvisionalIds {
    fn default() -> Self {
        Self::seeded(0, 0, 0)
    }
}

impl ProvisionalIds {
    /// Counters starting just above the given maximum identifiers
    pub fn seeded(max_thread: u64, max_branch: u64, max_note: u64) -> Self {
        Self {
            thread: max_thread + 1,
            branch: max_branch + 1,
            note: max_note + 1,
        }
    }

    /// Seed from the store's maximum identifiers
    pub fn from_store<S: NoteStore + ?Sized>(store: &S) -> StorageResult<Self> {
        Ok(Self::seeded(
            store.max_id(EntityKind::Thread)?,
            store.max_id(EntityKind::Branch)?,
            store.max_id(EntityKind::Note)?,
        ))
    }

    /// Issue the next provisional identifier for `kind`
    pub fn next(&mut self, kind: EntityKind) -> EntityId {
        let slot = match kind {
            EntityKind::Thread => &mut self.thread,
            EntityKind::Branch => &mut self.branch,
            EntityKind::Note => &mut self.note,
        };
        let id = *slot;
        *slot += 1;
        EntityId::Provisional(id)
    }

    /// Value the next call to [`next`](Self::next) will return
    pub fn peek(&self, kind: EntityKind) -> u64 {
        match kind {
            EntityKind::Thread => self.thread,
            EntityKind::Branch => self.branch,
            EntityKind::Note => self.note,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_are_independent() {
        let mut ids = ProvisionalIds::seeded(4, 0, 10);
        assert_eq!(ids.next(EntityKind::Thread), EntityId::Provisional(5));
        assert_eq!(ids.next(EntityKind::Thread), EntityId::Provisional(6));
        assert_eq!(ids.next(EntityKind::Branch), EntityId::Provisional(1));
        assert_eq!(ids.peek(EntityKind::Note), 11);
    }
}
