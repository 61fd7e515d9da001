//! Export and backup of the data directory
//!
//! Export writes every note held in memory as a JSON array. Backup copies
//! the whole data directory (database, session state, logs) into a new
//! directory, by default named after the current time.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Local};
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::graph::Graph;
use crate::models::Note;
use crate::storage::StorageError;

/// File name used when no export path is given
pub const EXPORT_FILE: &str = "notes.json";

/// Default backup directory name for `now`
pub fn backup_name(now: DateTime<Local>) -> String {
    format!("ntkpr_backup_{}", now.format("%Y-%m-%d_%H-%M-%S"))
}

/// Write the notes of `graph`, ordered by identifier, to `path`.
/// Returns the number of notes written.
pub fn export_notes(graph: &Graph, path: &Path) -> Result<usize> {
    let mut notes: Vec<&Note> = graph.notes.values().collect();
    notes.sort_by_key(|n| n.id);

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .map_err(|e| StorageError::from_io(e, parent.to_path_buf()))
            .context("Failed to create export directory")?;
    }
    let json = serde_json::to_string_pretty(&notes).context("Failed to serialize notes")?;

    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, json)
        .map_err(|e| StorageError::from_io(e, tmp.clone()))
        .context("Failed to write export")?;
    fs::rename(&tmp, path)
        .map_err(|e| StorageError::AtomicWriteFailed {
            from: tmp.clone(),
            to: path.to_path_buf(),
            source: e,
        })
        .context("Failed to write export")?;

    info!(path = %path.display(), notes = notes.len(), "Exported notes");
    Ok(notes.len())
}

/// Copy `data_dir` recursively to `dest`, which must not exist yet.
/// Returns the number of files copied.
pub fn backup(data_dir: &Path, dest: &Path) -> Result<usize> {
    if !data_dir.is_dir() {
        return Err(StorageError::NotFound {
            path: data_dir.to_path_buf(),
        })
        .context("Nothing to back up");
    }
    if dest.exists() {
        bail!("Backup destination '{}' already exists", dest.display());
    }
    let source = data_dir
        .canonicalize()
        .with_context(|| format!("Failed to resolve {:?}", data_dir))?;
    if absolute(dest)?.starts_with(&source) {
        bail!(
            "Backup destination '{}' is inside the data directory",
            dest.display()
        );
    }

    let mut files = 0;
    for entry in WalkDir::new(&source) {
        let entry = entry.context("Failed to read data directory")?;
        let relative = entry
            .path()
            .strip_prefix(&source)
            .context("Walked outside the data directory")?;
        let target = dest.join(relative);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)
                .map_err(|e| StorageError::from_io(e, target.clone()))
                .context("Failed to create backup directory")?;
        } else if entry.file_type().is_file() {
            fs::copy(entry.path(), &target)
                .map_err(|e| StorageError::from_io(e, target.clone()))
                .with_context(|| format!("Failed to copy {:?}", entry.path()))?;
            debug!(file = %relative.display(), "Backed up");
            files += 1;
        }
    }

    info!(from = %source.display(), to = %dest.display(), files, "Backup complete");
    Ok(files)
}

/// Absolute form of `path` with an existing parent resolved through links
fn absolute(path: &Path) -> Result<PathBuf> {
    let path = if path.is_absolute() {
        path.to_path_buf()
    } else {
        let cwd = std::env::current_dir().context("Failed to read working directory")?;
        cwd.join(path)
    };
    match (path.parent(), path.file_name()) {
        (Some(parent), Some(name)) if parent.exists() => Ok(parent
            .canonicalize()
            .with_context(|| format!("Failed to resolve {:?}", parent))?
            .join(name)),
        _ => Ok(path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Branch, EntityId, Thread};
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn graph() -> Graph {
        let id = EntityId::Persisted;
        let mut graph = Graph::new();
        graph.insert_thread(Thread::new(id(1), "t"));
        graph.insert_branch(Branch::new(id(1), id(1), "b"));
        for (n, content) in [(3, "third"), (1, "first")] {
            let mut note = Note::new(id(n));
            note.set_content(content);
            graph.insert_note(id(1), note);
        }
        graph
    }

    #[test]
    fn test_export_orders_by_id() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out").join(EXPORT_FILE);

        assert_eq!(export_notes(&graph(), &path).unwrap(), 2);
        let notes: Vec<serde_json::Value> =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        let contents: Vec<_> = notes.iter().map(|n| n["content"].clone()).collect();
        assert_eq!(contents, vec!["first", "third"]);
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn test_backup_copies_tree() {
        let dir = TempDir::new().unwrap();
        let data = dir.path().join("data");
        fs::create_dir_all(data.join("logs")).unwrap();
        fs::write(data.join("ntkpr.db"), b"db").unwrap();
        fs::write(data.join("logs").join("debug.log"), b"log").unwrap();

        let dest = dir.path().join("copy");
        assert_eq!(backup(&data, &dest).unwrap(), 2);
        assert_eq!(fs::read(dest.join("ntkpr.db")).unwrap(), b"db");
        assert_eq!(fs::read(dest.join("logs").join("debug.log")).unwrap(), b"log");

        // Refuses to overwrite
        assert!(backup(&data, &dest).is_err());
    }

    #[test]
    fn test_backup_rejects_nested_destination() {
        let dir = TempDir::new().unwrap();
        let err = backup(dir.path(), &dir.path().join("inner")).unwrap_err();
        assert!(err.to_string().contains("inside the data directory"));
        assert!(backup(&dir.path().join("missing"), &dir.path().join("x")).is_err());
    }

    #[test]
    fn test_backup_name() {
        let at = Local.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap();
        assert_eq!(backup_name(at), "ntkpr_backup_2024-03-09_07-05-01");
    }
}
