//! SQLite implementation of [`NoteStore`]
//!
//! Timestamps are stored as Unix milliseconds. Rows are only ever
//! tombstoned, so `MAX(id)` over a table is the highest identifier ever
//! issued for that kind.

use std::collections::HashMap;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::debug;

use crate::config::Config;
use crate::graph::Graph;
use crate::models::{Branch, EntityId, EntityKind, Note, Thread};
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::schema::{init_schema, needs_init};
use crate::storage::NoteStore;

/// SQLite-backed store
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open or create the database under the configured data directory
    pub fn open(config: &Config) -> Result<Self> {
        let path = config.database_path();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StorageError::CreateDirectory {
                    path: parent.to_path_buf(),
                    source: e,
                })
                .with_context(|| format!("Failed to prepare data directory {:?}", parent))?;
        }

        let conn = Connection::open(&path)
            .with_context(|| format!("Failed to open SQLite database at {:?}", path))?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;

        if needs_init(&conn) {
            init_schema(&conn).context("Failed to initialize SQLite schema")?;
        }

        debug!(path = %path.display(), "Opened store");
        Ok(Self { conn })
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        init_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Get a reference to the underlying connection
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    // ==================== Private helpers ====================

    fn load_notes(&self) -> StorageResult<HashMap<u64, Note>> {
        let mut topics = self.load_note_topics()?;
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, content, highlighted, private, frequency, created_at, updated_at
            FROM notes
            WHERE deleted_at IS NULL
            "#,
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(NoteRow {
                id: row.get(0)?,
                content: row.get(1)?,
                highlighted: row.get(2)?,
                private: row.get(3)?,
                frequency: row.get(4)?,
                created_at: row.get(5)?,
                updated_at: row.get(6)?,
            })
        })?;

        let mut notes = HashMap::new();
        for row in rows {
            let row = row?;
            let id = row.id as u64;
            let note = Note {
                id: EntityId::Persisted(id),
                content: row.content,
                highlighted: row.highlighted,
                private: row.private,
                frequency: row.frequency,
                topics: topics.remove(&id).unwrap_or_default(),
                created_at: from_millis(row.created_at),
                updated_at: from_millis(row.updated_at),
            };
            notes.insert(id, note);
        }
        Ok(notes)
    }

    fn load_note_topics(&self) -> StorageResult<HashMap<u64, Vec<String>>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT nt.note_id, t.topic FROM note_topics nt
            JOIN topics t ON nt.topic_id = t.id
            ORDER BY nt.note_id, nt.position
            "#,
        )?;
        let pairs = stmt
            .query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;

        let mut topics: HashMap<u64, Vec<String>> = HashMap::new();
        for (note_id, topic) in pairs {
            topics.entry(note_id as u64).or_default().push(topic);
        }
        Ok(topics)
    }

    fn load_branch_notes(&self) -> StorageResult<HashMap<u64, Vec<u64>>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT bn.branch_id, bn.note_id FROM branch_notes bn
            JOIN notes n ON bn.note_id = n.id
            WHERE n.deleted_at IS NULL
            ORDER BY bn.branch_id, bn.position
            "#,
        )?;
        let pairs = stmt
            .query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;

        let mut links: HashMap<u64, Vec<u64>> = HashMap::new();
        for (branch_id, note_id) in pairs {
            links
                .entry(branch_id as u64)
                .or_default()
                .push(note_id as u64);
        }
        Ok(links)
    }

    fn table(kind: EntityKind) -> &'static str {
        match kind {
            EntityKind::Thread => "threads",
            EntityKind::Branch => "branches",
            EntityKind::Note => "notes",
        }
    }

    fn expect_row(changed: usize, kind: EntityKind, id: u64) -> StorageResult<()> {
        if changed == 0 {
            Err(StorageError::MissingRow { kind, id })
        } else {
            Ok(())
        }
    }
}

impl NoteStore for SqliteStore {
    fn load_graph(&self) -> StorageResult<Graph> {
        let mut notes = self.load_notes()?;
        let mut branch_notes = self.load_branch_notes()?;

        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, name, summary, highlighted, private, frequency, created_at, updated_at
            FROM threads
            WHERE deleted_at IS NULL
            ORDER BY created_at, id
            "#,
        )?;
        let threads = stmt
            .query_map([], |row| GroupRow::from_row(row, None))?
            .collect::<Result<Vec<_>, _>>()?;

        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, name, summary, highlighted, private, frequency, created_at, updated_at,
                   thread_id
            FROM branches
            WHERE deleted_at IS NULL
            ORDER BY created_at, id
            "#,
        )?;
        let branches = stmt
            .query_map([], |row| GroupRow::from_row(row, Some(8)))?
            .collect::<Result<Vec<_>, _>>()?;

        let mut graph = Graph::new();
        for row in threads {
            graph.insert_thread(row.into_thread());
        }
        for row in branches {
            let id = row.id as u64;
            let note_ids = branch_notes.remove(&id).unwrap_or_default();
            let mut branch = row.into_branch();
            // Branches of a tombstoned thread are unreachable
            if graph.thread(branch.thread_id).is_none() {
                continue;
            }
            for note_id in &note_ids {
                let key = EntityId::Persisted(*note_id);
                if !graph.notes.contains_key(&key) {
                    if let Some(note) = notes.remove(note_id) {
                        graph.notes.insert(key, note);
                    }
                }
                if graph.notes.contains_key(&key) {
                    branch.notes.push(key);
                }
            }
            graph.insert_branch(branch);
        }

        debug!(
            threads = graph.threads.len(),
            branches = graph.branches.len(),
            notes = graph.notes.len(),
            "Loaded graph"
        );
        Ok(graph)
    }

    fn max_id(&self, kind: EntityKind) -> StorageResult<u64> {
        let sql = format!("SELECT COALESCE(MAX(id), 0) FROM {}", Self::table(kind));
        let max: i64 = self.conn.query_row(&sql, [], |row| row.get(0))?;
        Ok(max as u64)
    }

    fn insert_thread(&mut self, thread: &Thread) -> StorageResult<u64> {
        self.conn.execute(
            r#"
            INSERT INTO threads (name, summary, highlighted, private, frequency, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
            params![
                thread.name,
                thread.summary,
                thread.highlighted,
                thread.private,
                thread.frequency,
                thread.created_at.timestamp_millis(),
                thread.updated_at.timestamp_millis(),
            ],
        )?;
        Ok(self.conn.last_insert_rowid() as u64)
    }

    fn update_thread(&mut self, id: u64, thread: &Thread) -> StorageResult<()> {
        let changed = self.conn.execute(
            r#"
            UPDATE threads
            SET name = ?, summary = ?, highlighted = ?, private = ?, frequency = ?, updated_at = ?
            WHERE id = ? AND deleted_at IS NULL
            "#,
            params![
                thread.name,
                thread.summary,
                thread.highlighted,
                thread.private,
                thread.frequency,
                thread.updated_at.timestamp_millis(),
                id as i64,
            ],
        )?;
        Self::expect_row(changed, EntityKind::Thread, id)
    }

    fn insert_branch(&mut self, thread_id: u64, branch: &Branch) -> StorageResult<u64> {
        self.conn.execute(
            r#"
            INSERT INTO branches (thread_id, name, summary, highlighted, private, frequency,
                                  created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
            params![
                thread_id as i64,
                branch.name,
                branch.summary,
                branch.highlighted,
                branch.private,
                branch.frequency,
                branch.created_at.timestamp_millis(),
                branch.updated_at.timestamp_millis(),
            ],
        )?;
        Ok(self.conn.last_insert_rowid() as u64)
    }

    fn update_branch(&mut self, id: u64, thread_id: u64, branch: &Branch) -> StorageResult<()> {
        let changed = self.conn.execute(
            r#"
            UPDATE branches
            SET thread_id = ?, name = ?, summary = ?, highlighted = ?, private = ?, frequency = ?,
                updated_at = ?
            WHERE id = ? AND deleted_at IS NULL
            "#,
            params![
                thread_id as i64,
                branch.name,
                branch.summary,
                branch.highlighted,
                branch.private,
                branch.frequency,
                branch.updated_at.timestamp_millis(),
                id as i64,
            ],
        )?;
        Self::expect_row(changed, EntityKind::Branch, id)
    }

    fn insert_note(&mut self, note: &Note) -> StorageResult<u64> {
        self.conn.execute(
            r#"
            INSERT INTO notes (content, highlighted, private, frequency, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
            params![
                note.content,
                note.highlighted,
                note.private,
                note.frequency,
                note.created_at.timestamp_millis(),
                note.updated_at.timestamp_millis(),
            ],
        )?;
        Ok(self.conn.last_insert_rowid() as u64)
    }

    fn update_note(&mut self, id: u64, note: &Note) -> StorageResult<()> {
        let changed = self.conn.execute(
            r#"
            UPDATE notes
            SET content = ?, highlighted = ?, private = ?, frequency = ?, updated_at = ?
            WHERE id = ? AND deleted_at IS NULL
            "#,
            params![
                note.content,
                note.highlighted,
                note.private,
                note.frequency,
                note.updated_at.timestamp_millis(),
                id as i64,
            ],
        )?;
        Self::expect_row(changed, EntityKind::Note, id)
    }

    fn resolve_topic(&mut self, topic: &str) -> StorageResult<u64> {
        let existing: Option<i64> = self
            .conn
            .query_row(
                "SELECT id FROM topics WHERE topic = ?",
                params![topic],
                |row| row.get(0),
            )
            .optional()?;

        if let Some(id) = existing {
            return Ok(id as u64);
        }

        self.conn
            .execute("INSERT INTO topics (topic) VALUES (?)", params![topic])?;
        Ok(self.conn.last_insert_rowid() as u64)
    }

    fn replace_note_topics(&mut self, note_id: u64, topic_ids: &[u64]) -> StorageResult<()> {
        let tx = self.conn.transaction()?;
        tx.execute(
            "DELETE FROM note_topics WHERE note_id = ?",
            params![note_id as i64],
        )?;
        for (position, topic_id) in topic_ids.iter().enumerate() {
            tx.execute(
                "INSERT OR IGNORE INTO note_topics (note_id, topic_id, position) VALUES (?, ?, ?)",
                params![note_id as i64, *topic_id as i64, position as i64],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    fn replace_branch_notes(&mut self, branch_id: u64, note_ids: &[u64]) -> StorageResult<()> {
        let tx = self.conn.transaction()?;
        tx.execute(
            "DELETE FROM branch_notes WHERE branch_id = ?",
            params![branch_id as i64],
        )?;
        for (position, note_id) in note_ids.iter().enumerate() {
            tx.execute(
                "INSERT OR IGNORE INTO branch_notes (branch_id, note_id, position) VALUES (?, ?, ?)",
                params![branch_id as i64, *note_id as i64, position as i64],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    fn soft_delete(&mut self, kind: EntityKind, id: u64) -> StorageResult<()> {
        let sql = format!(
            "UPDATE {} SET deleted_at = ? WHERE id = ? AND deleted_at IS NULL",
            Self::table(kind)
        );
        let changed = self
            .conn
            .execute(&sql, params![Utc::now().timestamp_millis(), id as i64])?;
        Self::expect_row(changed, kind, id)
    }
}

// ==================== Internal structs ====================

struct NoteRow {
    id: i64,
    content: String,
    highlighted: bool,
    private: bool,
    frequency: u32,
    created_at: i64,
    updated_at: i64,
}

/// Shared row shape of threads and branches
struct GroupRow {
    id: i64,
    name: String,
    summary: String,
    highlighted: bool,
    private: bool,
    frequency: u32,
    created_at: i64,
    updated_at: i64,
    thread_id: Option<i64>,
}

impl GroupRow {
    fn from_row(row: &Row<'_>, thread_col: Option<usize>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            summary: row.get(2)?,
            highlighted: row.get(3)?,
            private: row.get(4)?,
            frequency: row.get(5)?,
            created_at: row.get(6)?,
            updated_at: row.get(7)?,
            thread_id: thread_col.map(|col| row.get(col)).transpose()?,
        })
    }

    fn into_thread(self) -> Thread {
        Thread {
            id: EntityId::Persisted(self.id as u64),
            name: self.name,
            summary: self.summary,
            highlighted: self.highlighted,
            private: self.private,
            frequency: self.frequency,
            created_at: from_millis(self.created_at),
            updated_at: from_millis(self.updated_at),
            branches: Vec::new(),
        }
    }

    fn into_branch(self) -> Branch {
        Branch {
            id: EntityId::Persisted(self.id as u64),
            thread_id: EntityId::Persisted(self.thread_id.unwrap_or_default() as u64),
            name: self.name,
            summary: self.summary,
            highlighted: self.highlighted,
            private: self.private,
            frequency: self.frequency,
            created_at: from_millis(self.created_at),
            updated_at: from_millis(self.updated_at),
            notes: Vec::new(),
        }
    }
}

fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_else(Utc::now)
}
