//! Export and backup command handlers

use std::path::PathBuf;

use anyhow::Result;
use chrono::Local;

use ntkpr_core::archive::{self, EXPORT_FILE};
use ntkpr_core::{App, Config, NoteStore};

use crate::output::Output;

/// Write all notes as JSON, by default to `<data_dir>/notes.json`
pub fn export<S: NoteStore>(
    app: &App<S>,
    config: &Config,
    path: Option<PathBuf>,
    output: &Output,
) -> Result<()> {
    let path = path.unwrap_or_else(|| config.data_dir.join(EXPORT_FILE));
    let count = app.export_notes(&path)?;
    output.success(&format!("Exported {} note(s) to {}", count, path.display()));
    Ok(())
}

/// Copy the data directory, by default to a timestamped directory in the
/// working directory
pub fn backup(config: &Config, dest: Option<PathBuf>, output: &Output) -> Result<()> {
    let dest = dest.unwrap_or_else(|| PathBuf::from(archive::backup_name(Local::now())));
    let files = archive::backup(&config.data_dir, &dest)?;
    output.success(&format!(
        "Backed up {} file(s) from {} to {}",
        files,
        config.data_dir.display(),
        dest.display()
    ));
    Ok(())
}
