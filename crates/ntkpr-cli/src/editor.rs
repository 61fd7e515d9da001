//! Note editing in an external editor
//!
//! Opens $EDITOR (or $VISUAL) on a temporary file holding the note content.

use anyhow::{bail, Context, Result};
use std::env;
use std::fs;
use std::process::Command;

/// Edit `initial` in the user's editor.
///
/// Returns `None` when the text comes back unchanged. A single trailing
/// newline added by the editor is dropped.
pub fn edit_note(initial: &str) -> Result<Option<String>> {
    let editor = find_editor()?;
    let path = env::temp_dir().join(format!("ntkpr_note_{}.md", std::process::id()));

    fs::write(&path, initial)
        .with_context(|| format!("Failed to create temp file: {:?}", path))?;

    let status = Command::new(&editor)
        .arg(&path)
        .status()
        .with_context(|| format!("Failed to run editor: {}", editor));

    let status = match status {
        Ok(status) => status,
        Err(e) => {
            let _ = fs::remove_file(&path);
            return Err(e);
        }
    };
    if !status.success() {
        let _ = fs::remove_file(&path);
        bail!("Editor '{}' exited with {}", editor, status);
    }

    let edited = fs::read_to_string(&path)
        .with_context(|| format!("Failed to read edited file: {:?}", path))?;
    let _ = fs::remove_file(&path);

    Ok(changed(initial, edited))
}

fn changed(initial: &str, mut edited: String) -> Option<String> {
    if edited.ends_with('\n') && !initial.ends_with('\n') {
        edited.pop();
        if edited.ends_with('\r') {
            edited.pop();
        }
    }
    (edited != initial).then_some(edited)
}

/// The user's preferred editor, falling back to common ones on PATH
fn find_editor() -> Result<String> {
    for var in ["EDITOR", "VISUAL"] {
        if let Ok(editor) = env::var(var) {
            if !editor.is_empty() {
                return Ok(editor);
            }
        }
    }

    for editor in ["nano", "vim", "vi"] {
        if command_exists(editor) {
            return Ok(editor.to_string());
        }
    }

    bail!(
        "No editor found. Set $EDITOR environment variable.\n\
         Example: export EDITOR=nano"
    )
}

/// Check if a command exists in PATH
fn command_exists(cmd: &str) -> bool {
    Command::new("which")
        .arg(cmd)
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}
