//! Data models for ntkpr
//!
//! Defines the three-level hierarchy: Thread → Branch → Note.
//!
//! Threads own their branches by identifier. Branches reference notes by
//! identifier, and a note may be referenced by several branches of the same
//! thread. The entities themselves live in the [`Graph`](crate::graph::Graph)
//! arena; these types are plain values.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The three entity kinds tracked by the edit log and the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Thread,
    Branch,
    Note,
}

impl EntityKind {
    pub const ALL: [EntityKind; 3] = [EntityKind::Thread, EntityKind::Branch, EntityKind::Note];

    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::Thread => "thread",
            EntityKind::Branch => "branch",
            EntityKind::Note => "note",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifier of an entity
///
/// Entities created in memory carry a `Provisional` identifier until the
/// store assigns a real one during sync. Provisional values are drawn from
/// counters seeded above the store's maximum identifier, so the two spaces
/// never overlap numerically either.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "state", content = "value", rename_all = "lowercase")]
pub enum EntityId {
    /// Assigned in memory, not yet confirmed by the store
    Provisional(u64),
    /// Assigned by the store
    Persisted(u64),
}

impl EntityId {
    pub fn is_persisted(self) -> bool {
        matches!(self, EntityId::Persisted(_))
    }

    /// The store identifier, if this entity has one
    pub fn persisted(self) -> Option<u64> {
        match self {
            EntityId::Persisted(id) => Some(id),
            EntityId::Provisional(_) => None,
        }
    }

    /// Raw numeric value regardless of state (for display)
    pub fn value(self) -> u64 {
        match self {
            EntityId::Provisional(v) | EntityId::Persisted(v) => v,
        }
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityId::Persisted(id) => write!(f, "{}", id),
            EntityId::Provisional(id) => write!(f, "{}*", id),
        }
    }
}

/// Common behavior of the three entity kinds, used by the context views
pub trait Entity {
    const KIND: EntityKind;

    fn id(&self) -> EntityId;
    fn created_at(&self) -> DateTime<Utc>;
    fn updated_at(&self) -> DateTime<Utc>;

    /// Case-insensitive match against a query that is already lowercased
    fn matches(&self, needle: &str) -> bool;
}

/// Top-level grouping
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Thread {
    pub id: EntityId,
    pub name: String,
    pub summary: String,
    pub highlighted: bool,
    pub private: bool,
    /// Number of name/summary edits
    pub frequency: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Branch identifiers in display order
    pub branches: Vec<EntityId>,
}

impl Thread {
    /// Create a new thread with the given name
    pub fn new(id: EntityId, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            name: name.into(),
            summary: String::new(),
            highlighted: false,
            private: false,
            frequency: 0,
            created_at: now,
            updated_at: now,
            branches: Vec::new(),
        }
    }

    /// Rename the thread. Returns false if the name is unchanged.
    pub fn set_name(&mut self, name: impl Into<String>) -> bool {
        let name = name.into();
        if self.name == name {
            return false;
        }
        self.name = name;
        self.frequency += 1;
        self.touch();
        true
    }

    /// Set the summary; the first non-empty line becomes the name.
    /// Returns false if the summary is unchanged.
    pub fn set_summary(&mut self, summary: impl Into<String>) -> bool {
        let summary = summary.into();
        if self.summary == summary {
            return false;
        }
        self.name = headline(&summary);
        self.summary = summary;
        self.frequency += 1;
        self.touch();
        true
    }

    pub fn toggle_highlight(&mut self) {
        self.highlighted = !self.highlighted;
        self.touch();
    }

    pub fn toggle_private(&mut self) {
        self.private = !self.private;
        self.touch();
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

impl Entity for Thread {
    const KIND: EntityKind = EntityKind::Thread;

    fn id(&self) -> EntityId {
        self.id
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    fn matches(&self, needle: &str) -> bool {
        self.name.to_lowercase().contains(needle)
    }
}

/// Mid-level grouping, owned by exactly one thread
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Branch {
    pub id: EntityId,
    /// Owning thread (weak back-reference by identifier)
    pub thread_id: EntityId,
    pub name: String,
    pub summary: String,
    pub highlighted: bool,
    pub private: bool,
    pub frequency: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Note identifiers in display order
    pub notes: Vec<EntityId>,
}

impl Branch {
    /// Create a new branch belonging to `thread_id`
    pub fn new(id: EntityId, thread_id: EntityId, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            thread_id,
            name: name.into(),
            summary: String::new(),
            highlighted: false,
            private: false,
            frequency: 0,
            created_at: now,
            updated_at: now,
            notes: Vec::new(),
        }
    }

    /// Rename the branch. Returns false if the name is unchanged.
    pub fn set_name(&mut self, name: impl Into<String>) -> bool {
        let name = name.into();
        if self.name == name {
            return false;
        }
        self.name = name;
        self.frequency += 1;
        self.touch();
        true
    }

    /// Set the summary; the first non-empty line becomes the name.
    pub fn set_summary(&mut self, summary: impl Into<String>) -> bool {
        let summary = summary.into();
        if self.summary == summary {
            return false;
        }
        self.name = headline(&summary);
        self.summary = summary;
        self.frequency += 1;
        self.touch();
        true
    }

    pub fn toggle_highlight(&mut self) {
        self.highlighted = !self.highlighted;
        self.touch();
    }

    pub fn toggle_private(&mut self) {
        self.private = !self.private;
        self.touch();
    }

    /// Attach a note. Returns false if it is already attached.
    pub fn attach_note(&mut self, note: EntityId) -> bool {
        if self.notes.contains(&note) {
            return false;
        }
        self.notes.push(note);
        self.touch();
        true
    }

    /// Detach a note. Returns false if it was not attached.
    pub fn detach_note(&mut self, note: EntityId) -> bool {
        match self.notes.iter().position(|n| *n == note) {
            Some(pos) => {
                self.notes.remove(pos);
                self.touch();
                true
            }
            None => false,
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

impl Entity for Branch {
    const KIND: EntityKind = EntityKind::Branch;

    fn id(&self) -> EntityId {
        self.id
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    fn matches(&self, needle: &str) -> bool {
        self.name.to_lowercase().contains(needle)
    }
}

/// Leaf entity
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Note {
    pub id: EntityId,
    pub content: String,
    pub highlighted: bool,
    pub private: bool,
    /// Number of content edits
    pub frequency: u32,
    /// Normalized topic tags, insertion order preserved
    pub topics: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Note {
    /// Create an empty note
    pub fn new(id: EntityId) -> Self {
        let now = Utc::now();
        Self {
            id,
            content: String::new(),
            highlighted: false,
            private: false,
            frequency: 0,
            topics: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Replace the content. Returns false if it is unchanged.
    pub fn set_content(&mut self, content: impl Into<String>) -> bool {
        let content = content.into();
        if self.content == content {
            return false;
        }
        self.content = content;
        self.frequency += 1;
        self.touch();
        true
    }

    /// Add a topic. The text is normalized; duplicates and empty text are
    /// ignored. Returns true if the topic list changed.
    pub fn add_topic(&mut self, topic: &str) -> bool {
        let Some(topic) = normalize_topic(topic) else {
            return false;
        };
        if self.topics.contains(&topic) {
            return false;
        }
        self.topics.push(topic);
        self.touch();
        true
    }

    /// Add every topic of a comma-separated list. Returns true if any was new.
    pub fn add_topics(&mut self, list: &str) -> bool {
        let mut changed = false;
        for topic in list.split(',') {
            changed |= self.add_topic(topic);
        }
        changed
    }

    /// Remove a topic (matched case-insensitively)
    pub fn remove_topic(&mut self, topic: &str) -> bool {
        let Some(topic) = normalize_topic(topic) else {
            return false;
        };
        match self.topics.iter().position(|t| *t == topic) {
            Some(pos) => {
                self.topics.remove(pos);
                self.touch();
                true
            }
            None => false,
        }
    }

    pub fn toggle_highlight(&mut self) {
        self.highlighted = !self.highlighted;
        self.touch();
    }

    pub fn toggle_private(&mut self) {
        self.private = !self.private;
        self.touch();
    }

    /// First line of the content, for list displays
    pub fn headline(&self) -> String {
        headline(&self.content)
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

impl Entity for Note {
    const KIND: EntityKind = EntityKind::Note;

    fn id(&self) -> EntityId {
        self.id
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    fn matches(&self, needle: &str) -> bool {
        self.content.to_lowercase().contains(needle)
            || self.topics.iter().any(|t| t.contains(needle))
    }
}

/// Trim and lowercase a topic. `None` for blank input.
pub fn normalize_topic(topic: &str) -> Option<String> {
    let topic = topic.trim();
    if topic.is_empty() {
        None
    } else {
        Some(topic.to_lowercase())
    }
}

/// First non-empty line of a text, trimmed
fn headline(text: &str) -> String {
    text.lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or("")
        .to_string()
}
