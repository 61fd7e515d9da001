//! Status command handler

use anyhow::Result;

use ntkpr_core::{App, Config, NoteStore};

use crate::output::{Output, OutputFormat};

/// Show entity counts and pending edits
pub fn show<S: NoteStore>(app: &App<S>, config: &Config, output: &Output) -> Result<()> {
    let status = app.status();

    if output.format == OutputFormat::Human {
        println!("ntkpr status");
        println!("============");
        println!();
        println!("Database: {}", config.database_path().display());
        println!();
    }
    output.print_status(&status);

    Ok(())
}
