//! Named views over an entity list
//!
//! Each entity kind gets a [`ContextManager`] with three views:
//!
//! - **Default**: the canonical list in creation order
//! - **Recent**: a copy of Default sorted by last update, capped
//! - **Search**: Default (or the previous view) filtered by a query
//!
//! Every view keeps its own cursor. Views store identifiers only and
//! resolve them through an [`EntitySource`] when they need timestamps or
//! text, so they may briefly go stale between a mutation and the next
//! refresh.

use std::collections::HashSet;
use std::marker::PhantomData;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::graph::EntitySource;
use crate::models::{Entity, EntityId};

/// Default cap for the Recent view
pub const DEFAULT_RECENT_LIMIT: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContextName {
    #[default]
    Default,
    Recent,
    Search,
}

impl ContextName {
    pub fn as_str(self) -> &'static str {
        match self {
            ContextName::Default => "default",
            ContextName::Recent => "recent",
            ContextName::Search => "search",
        }
    }

    fn order(self) -> ContextOrder {
        match self {
            ContextName::Recent => ContextOrder::UpdatedDesc,
            ContextName::Default | ContextName::Search => ContextOrder::CreatedAsc,
        }
    }
}

impl std::str::FromStr for ContextName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "default" => Ok(ContextName::Default),
            "recent" => Ok(ContextName::Recent),
            "search" => Ok(ContextName::Search),
            other => Err(format!("unknown view '{}'", other)),
        }
    }
}

/// Sort order of a view
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextOrder {
    CreatedAsc,
    UpdatedDesc,
}

/// Cursor of every view, for session persistence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ContextCursors {
    pub default: usize,
    pub recent: usize,
    pub search: usize,
}

#[derive(Debug, Clone, Default)]
struct Context {
    entities: Vec<EntityId>,
    cursor: usize,
}

impl Context {
    fn clamp_cursor(&mut self) {
        if self.entities.is_empty() {
            self.cursor = 0;
        } else if self.cursor >= self.entities.len() {
            self.cursor = self.entities.len() - 1;
        }
    }
}

/// Three named views over entities of type `E`
#[derive(Debug, Clone)]
pub struct ContextManager<E> {
    default: Context,
    recent: Context,
    search: Context,
    current: ContextName,
    previous: ContextName,
    /// Query that built the Search view
    query: Option<String>,
    recent_limit: usize,
    _kind: PhantomData<fn() -> E>,
}

impl<E: Entity> Default for ContextManager<E> {
    fn default() -> Self {
        Self::new(DEFAULT_RECENT_LIMIT)
    }
}

impl<E: Entity> ContextManager<E> {
    pub fn new(recent_limit: usize) -> Self {
        Self {
            default: Context::default(),
            recent: Context::default(),
            search: Context::default(),
            current: ContextName::Default,
            previous: ContextName::Default,
            query: None,
            recent_limit,
            _kind: PhantomData,
        }
    }

    fn context(&self, name: ContextName) -> &Context {
        match name {
            ContextName::Default => &self.default,
            ContextName::Recent => &self.recent,
            ContextName::Search => &self.search,
        }
    }

    fn context_mut(&mut self, name: ContextName) -> &mut Context {
        match name {
            ContextName::Default => &mut self.default,
            ContextName::Recent => &mut self.recent,
            ContextName::Search => &mut self.search,
        }
    }

    pub fn current(&self) -> ContextName {
        self.current
    }

    pub fn previous(&self) -> ContextName {
        self.previous
    }

    /// Last query run, if any
    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    pub fn recent_limit(&self) -> usize {
        self.recent_limit
    }

    /// Identifiers of the active view in display order
    pub fn entities(&self) -> &[EntityId] {
        &self.context(self.current).entities
    }

    /// Identifiers of a given view
    pub fn entities_of(&self, name: ContextName) -> &[EntityId] {
        &self.context(name).entities
    }

    pub fn cursor(&self) -> usize {
        self.context(self.current).cursor
    }

    pub fn len(&self) -> usize {
        self.entities().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities().is_empty()
    }

    /// Identifier under the active view's cursor
    pub fn current_item(&self) -> Option<EntityId> {
        let ctx = self.context(self.current);
        ctx.entities.get(ctx.cursor).copied()
    }

    /// Activate `target`, remembering the outgoing view as previous.
    /// Switching to the active view leaves previous untouched.
    pub fn switch_context(&mut self, target: ContextName) {
        if target == self.current {
            return;
        }
        debug!(kind = %E::KIND, from = self.current.as_str(), to = target.as_str(), "Switching view");
        self.previous = self.current;
        self.current = target;
    }

    /// Replace the Default view. Recent and Search are pruned to identifiers
    /// still present, and every cursor is clamped.
    pub fn refresh_default(&mut self, entities: Vec<EntityId>) {
        let live: HashSet<EntityId> = entities.iter().copied().collect();
        self.default.entities = entities;
        self.recent.entities.retain(|id| live.contains(id));
        self.search.entities.retain(|id| live.contains(id));
        for ctx in [&mut self.default, &mut self.recent, &mut self.search] {
            ctx.clamp_cursor();
        }
    }

    /// Rebuild Recent from Default: newest update first, capped
    pub fn refresh_recent(&mut self, source: &impl EntitySource<E>) {
        let mut entities = self.default.entities.clone();
        sort_ids(&mut entities, ContextOrder::UpdatedDesc, source);
        entities.truncate(self.recent_limit);
        self.recent.entities = entities;
        self.recent.clamp_cursor();
    }

    /// Rebuild Search from the current view (or the previous one when
    /// already searching, so repeated queries do not narrow each other).
    pub fn refresh_search(&mut self, query: &str, source: &impl EntitySource<E>) {
        let from = if self.current == ContextName::Search {
            self.previous
        } else {
            self.current
        };
        let base = self.context(from).entities.clone();

        let needle = query.trim().to_lowercase();
        let entities = if needle.is_empty() {
            base
        } else {
            let mut hits: Vec<EntityId> = base
                .into_iter()
                .filter(|id| source.lookup(*id).is_some_and(|e| e.matches(&needle)))
                .collect();
            sort_ids(&mut hits, ContextOrder::CreatedAsc, source);
            hits
        };

        debug!(kind = %E::KIND, query, hits = entities.len(), "Search refreshed");
        self.query = Some(query.to_string());
        self.search.entities = entities;
        self.search.clamp_cursor();
    }

    /// Run a query and activate the Search view
    pub fn search(&mut self, query: &str, source: &impl EntitySource<E>) {
        self.refresh_search(query, source);
        self.switch_context(ContextName::Search);
    }

    /// Re-run the last query against the current lists. Returns false when
    /// nothing has been searched yet.
    pub fn rerun_search(&mut self, source: &impl EntitySource<E>) -> bool {
        let Some(query) = self.query.clone() else {
            return false;
        };
        self.refresh_search(&query, source);
        true
    }

    /// Sort the active view in place by its order
    pub fn sort_current(&mut self, source: &impl EntitySource<E>) {
        let order = self.current.order();
        let ctx = self.context_mut(self.current);
        sort_ids(&mut ctx.entities, order, source);
    }

    /// Save `current_cursor` into the outgoing view, switch to `target`,
    /// sort it, and return its stored cursor.
    pub fn update_context(
        &mut self,
        target: ContextName,
        current_cursor: usize,
        source: &impl EntitySource<E>,
    ) -> usize {
        let outgoing = self.context_mut(self.current);
        outgoing.cursor = current_cursor;
        outgoing.clamp_cursor();

        self.switch_context(target);
        self.sort_current(source);
        self.cursor()
    }

    /// Entity at `cursor` in the active view; the cursor is stored only when
    /// it is in range.
    pub fn select_item(&mut self, cursor: usize) -> Option<EntityId> {
        let ctx = self.context_mut(self.current);
        let id = ctx.entities.get(cursor).copied()?;
        ctx.cursor = cursor;
        Some(id)
    }

    /// Position of an identifier in the active view
    pub fn position(&self, id: EntityId) -> Option<usize> {
        self.entities().iter().position(|e| *e == id)
    }

    pub fn cursors(&self) -> ContextCursors {
        ContextCursors {
            default: self.default.cursor,
            recent: self.recent.cursor,
            search: self.search.cursor,
        }
    }

    /// Restore saved cursors, clamped to the current lists
    pub fn set_cursors(&mut self, cursors: ContextCursors) {
        self.default.cursor = cursors.default;
        self.recent.cursor = cursors.recent;
        self.search.cursor = cursors.search;
        for ctx in [&mut self.default, &mut self.recent, &mut self.search] {
            ctx.clamp_cursor();
        }
    }
}

fn sort_ids<E: Entity>(ids: &mut [EntityId], order: ContextOrder, source: &impl EntitySource<E>) {
    let stamp = |id: &EntityId, f: fn(&E) -> DateTime<Utc>| {
        source
            .lookup(*id)
            .map(f)
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    };
    match order {
        ContextOrder::CreatedAsc => ids.sort_by_key(|id| stamp(id, E::created_at)),
        ContextOrder::UpdatedDesc => {
            ids.sort_by_key(|id| std::cmp::Reverse(stamp(id, E::updated_at)))
        }
    }
}
