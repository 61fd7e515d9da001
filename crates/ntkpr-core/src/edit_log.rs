//! Pending-mutation log
//!
//! Every mutation made in memory is recorded here until the next successful
//! sync. Repeated mutations of the same entity are merged into a single
//! pending edit rather than queued, so the reconciler sees at most one
//! action per entity:
//!
//! | previous | Create      | Update      | Delete        |
//! |----------|-------------|-------------|---------------|
//! | (none)   | Create      | Update      | Delete        |
//! | Create   | error       | Create      | None          |
//! | Update   | error       | Update      | Delete        |
//! | Delete   | error       | error       | error         |
//! | None     | error       | error       | error         |
//!
//! `None` means the entity was created and deleted before reaching the
//! store; the reconciler skips it unless a failed sync already wrote it.
//!
//! Undoing a delete puts the entry that preceded it back with
//! [`EditLog::restore`]. The history keeps the delete.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{EntityId, EntityKind};

/// A mutation as issued by the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EditAction {
    Create,
    Update,
    Delete,
}

/// Merged pending state of an entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EditType {
    Create,
    Update,
    Delete,
    /// Created and deleted before sync
    None,
}

/// One entry of the time-ordered history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edit {
    pub kind: EntityKind,
    pub id: EntityId,
    pub action: EditAction,
    pub at: DateTime<Utc>,
}

/// Illegal transition in the merge table
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("cannot record {incoming:?} on {kind} {id}: pending edit is {previous:?}")]
pub struct EditError {
    pub kind: EntityKind,
    pub id: EntityId,
    pub previous: EditType,
    pub incoming: EditAction,
}

/// Pending edits keyed by entity, plus the order they were issued in
#[derive(Debug, Clone, Default)]
pub struct EditLog {
    merged: HashMap<(EntityKind, EntityId), EditType>,
    history: Vec<Edit>,
}

/// Apply one incoming action to the previous merged state
fn merge(previous: Option<EditType>, incoming: EditAction) -> Option<EditType> {
    use EditAction as A;
    use EditType as T;

    match (previous, incoming) {
        (None, A::Create) => Some(T::Create),
        (None, A::Update) => Some(T::Update),
        (None, A::Delete) => Some(T::Delete),

        (Some(T::Create), A::Create) => None,
        (Some(T::Create), A::Update) => Some(T::Create),
        (Some(T::Create), A::Delete) => Some(T::None),

        (Some(T::Update), A::Create) => None,
        (Some(T::Update), A::Update) => Some(T::Update),
        (Some(T::Update), A::Delete) => Some(T::Delete),

        (Some(T::Delete), _) => None,
        (Some(T::None), _) => None,
    }
}

impl EditLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a mutation. On an illegal transition the log is left unchanged.
    pub fn record(
        &mut self,
        kind: EntityKind,
        id: EntityId,
        action: EditAction,
    ) -> Result<EditType, EditError> {
        let previous = self.merged.get(&(kind, id)).copied();
        let Some(next) = merge(previous, action) else {
            return Err(EditError {
                kind,
                id,
                // A missing entry never rejects, so previous is always set here
                previous: previous.unwrap_or(EditType::None),
                incoming: action,
            });
        };

        self.merged.insert((kind, id), next);
        self.history.push(Edit {
            kind,
            id,
            action,
            at: Utc::now(),
        });
        Ok(next)
    }

    /// Merged pending state of an entity
    pub fn get(&self, kind: EntityKind, id: EntityId) -> Option<EditType> {
        self.merged.get(&(kind, id)).copied()
    }

    /// Put back a merged entry previously read with [`EditLog::get`].
    /// `None` removes the entry.
    pub fn restore(&mut self, kind: EntityKind, id: EntityId, previous: Option<EditType>) {
        match previous {
            Some(ty) => {
                self.merged.insert((kind, id), ty);
            }
            None => {
                self.merged.remove(&(kind, id));
            }
        }
    }

    /// Number of entities with a merged entry (including `None`)
    pub fn len(&self) -> usize {
        self.merged.len()
    }

    pub fn is_empty(&self) -> bool {
        self.merged.is_empty()
    }

    /// Entries that still require store work, ordered by kind then id
    pub fn pending(&self) -> Vec<(EntityKind, EntityId, EditType)> {
        let mut pending: Vec<_> = self
            .merged
            .iter()
            .filter(|(_, ty)| **ty != EditType::None)
            .map(|((kind, id), ty)| (*kind, *id, *ty))
            .collect();
        pending.sort_by_key(|(kind, id, _)| (*kind, *id));
        pending
    }

    /// Every recorded action in issue order
    pub fn history(&self) -> &[Edit] {
        &self.history
    }

    /// Drop all pending edits. Only called after a successful sync.
    pub fn clear(&mut self) {
        self.merged.clear();
        self.history.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOTE: EntityKind = EntityKind::Note;

    fn id(v: u64) -> EntityId {
        EntityId::Persisted(v)
    }

    #[test]
    fn test_first_action_is_stored_verbatim() {
        let mut log = EditLog::new();
        assert_eq!(log.record(NOTE, id(1), EditAction::Create), Ok(EditType::Create));
        assert_eq!(log.record(NOTE, id(2), EditAction::Update), Ok(EditType::Update));
        assert_eq!(log.record(NOTE, id(3), EditAction::Delete), Ok(EditType::Delete));
        assert_eq!(log.len(), 3);
        assert_eq!(log.history().len(), 3);
    }

    #[test]
    fn test_create_then_delete_becomes_none() {
        let mut log = EditLog::new();
        let note = EntityId::Provisional(5);
        log.record(NOTE, note, EditAction::Create).unwrap();
        log.record(NOTE, note, EditAction::Update).unwrap();
        assert_eq!(log.get(NOTE, note), Some(EditType::Create));

        log.record(NOTE, note, EditAction::Delete).unwrap();
        assert_eq!(log.get(NOTE, note), Some(EditType::None));
        assert!(log.pending().is_empty());
        assert!(!log.is_empty());
    }

    #[test]
    fn test_update_then_delete_becomes_delete() {
        let mut log = EditLog::new();
        log.record(NOTE, id(1), EditAction::Update).unwrap();
        log.record(NOTE, id(1), EditAction::Update).unwrap();
        log.record(NOTE, id(1), EditAction::Delete).unwrap();
        assert_eq!(log.pending(), vec![(NOTE, id(1), EditType::Delete)]);
    }

    #[test]
    fn test_double_create_rejected() {
        let mut log = EditLog::new();
        log.record(NOTE, id(1), EditAction::Create).unwrap();
        let err = log.record(NOTE, id(1), EditAction::Create).unwrap_err();
        assert_eq!(err.previous, EditType::Create);
        assert_eq!(err.incoming, EditAction::Create);
        assert_eq!(log.history().len(), 1);
    }

    #[test]
    fn test_create_after_update_rejected() {
        let mut log = EditLog::new();
        log.record(NOTE, id(1), EditAction::Update).unwrap();
        assert!(log.record(NOTE, id(1), EditAction::Create).is_err());
        assert_eq!(log.get(NOTE, id(1)), Some(EditType::Update));
    }

    #[test]
    fn test_delete_is_terminal() {
        let mut log = EditLog::new();
        log.record(NOTE, id(1), EditAction::Delete).unwrap();
        for action in [EditAction::Create, EditAction::Update, EditAction::Delete] {
            assert!(log.record(NOTE, id(1), action).is_err());
        }
        assert_eq!(log.get(NOTE, id(1)), Some(EditType::Delete));
        assert_eq!(log.history().len(), 1);
    }

    #[test]
    fn test_none_rejects_everything() {
        let mut log = EditLog::new();
        let note = EntityId::Provisional(9);
        log.record(NOTE, note, EditAction::Create).unwrap();
        log.record(NOTE, note, EditAction::Delete).unwrap();
        let err = log.record(NOTE, note, EditAction::Update).unwrap_err();
        assert_eq!(err.previous, EditType::None);
    }

    #[test]
    fn test_restore_reverts_delete() {
        let mut log = EditLog::new();
        let note = EntityId::Provisional(3);
        log.record(NOTE, note, EditAction::Create).unwrap();
        let before = log.get(NOTE, note);
        log.record(NOTE, note, EditAction::Delete).unwrap();

        log.restore(NOTE, note, before);
        assert_eq!(log.get(NOTE, note), Some(EditType::Create));
        assert_eq!(log.record(NOTE, note, EditAction::Update), Ok(EditType::Create));

        log.record(NOTE, id(8), EditAction::Delete).unwrap();
        log.restore(NOTE, id(8), None);
        assert_eq!(log.get(NOTE, id(8)), None);
        assert_eq!(log.pending(), vec![(NOTE, note, EditType::Create)]);
    }

    #[test]
    fn test_kinds_are_independent() {
        let mut log = EditLog::new();
        log.record(EntityKind::Thread, id(1), EditAction::Create).unwrap();
        log.record(EntityKind::Branch, id(1), EditAction::Create).unwrap();
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn test_clear() {
        let mut log = EditLog::new();
        log.record(NOTE, id(1), EditAction::Update).unwrap();
        log.clear();
        assert!(log.is_empty());
        assert!(log.history().is_empty());
        assert_eq!(log.get(NOTE, id(1)), None);
    }

    #[test]
    fn test_error_message_names_target() {
        let mut log = EditLog::new();
        log.record(EntityKind::Branch, id(4), EditAction::Delete).unwrap();
        let err = log
            .record(EntityKind::Branch, id(4), EditAction::Delete)
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("branch 4"));
        assert!(msg.contains("Delete"));
    }
}
