//! Session state persistence
//!
//! Remembers which thread, branch and note were active and which note view
//! was showing, so the next run opens where the last one stopped.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::context::{ContextCursors, ContextName};
use crate::storage::StorageError;

/// Cursor and view state saved between runs
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionState {
    pub thread_cursor: usize,
    pub branch_cursor: usize,
    pub note_cursor: usize,
    /// Active note view
    pub note_view: ContextName,
    /// Cursors of the note views
    pub note_cursors: ContextCursors,
}

impl SessionState {
    /// Load state from `path`. A missing or unreadable file yields defaults.
    pub fn load(path: &Path) -> Self {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Self::default(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Cannot read session state, using defaults");
                return Self::default();
            }
        };

        serde_json::from_str(&content).unwrap_or_else(|e| {
            warn!(path = %path.display(), error = %e, "Invalid session state, using defaults");
            Self::default()
        })
    }

    /// Save state to `path` atomically (temp file + rename)
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| StorageError::from_io(e, parent.to_path_buf()))
                .context("Failed to create session state directory")?;
        }

        let json = serde_json::to_string_pretty(self).context("Failed to serialize session state")?;

        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json)
            .map_err(|e| StorageError::from_io(e, tmp.clone()))
            .context("Failed to save session state")?;
        fs::rename(&tmp, path)
            .map_err(|e| StorageError::AtomicWriteFailed {
                from: tmp.clone(),
                to: path.to_path_buf(),
                source: e,
            })
            .context("Failed to save session state")?;
        Ok(())
    }
}
