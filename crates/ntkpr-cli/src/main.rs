//! ntkpr CLI
//!
//! Command-line interface for ntkpr - staged thread, branch and note editing.

use std::fs::File;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use ntkpr_core::{App, Config, SqliteStore};

mod commands;
mod editor;
mod output;
mod shell;

use output::{Output, OutputFormat};

#[derive(Parser)]
#[command(name = "ntkpr")]
#[command(about = "ntkpr - threads, branches and notes with lazy sync")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Quiet mode - minimal output
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the interactive shell (default)
    Shell,
    /// Show entity counts
    Status,
    /// Export all notes as JSON
    Export {
        /// Destination file (default: <data_dir>/notes.json)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Copy the data directory
    Backup {
        /// Destination directory (default: ./ntkpr_backup_<timestamp>)
        dest: Option<PathBuf>,
    },
    /// Show or set configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Set a configuration value
    Set {
        /// Configuration key (data_dir, recent_limit, sync_on_exit, log_file)
        key: String,
        /// Configuration value
        value: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let output = Output::new(OutputFormat::from_flags(cli.json, cli.quiet));

    match cli.command {
        Some(Commands::Config { command }) => handle_config_command(command, &output),
        Some(Commands::Status) => {
            let (config, app) = open_app()?;
            commands::status::show(&app, &config, &output)
        }
        Some(Commands::Export { output: path }) => {
            let (config, app) = open_app()?;
            commands::data::export(&app, &config, path, &output)
        }
        Some(Commands::Backup { dest }) => {
            let config = Config::load().context("Failed to load configuration")?;
            init_logging(&config);
            commands::data::backup(&config, dest, &output)
        }
        Some(Commands::Shell) | None => {
            let (config, app) = open_app()?;
            let shell = shell::Shell::new(&app, &output);
            let result = shell.run(std::io::stdin().lock());
            shell::close(&app, &config, &output)?;
            result
        }
    }
}

fn handle_config_command(command: Option<ConfigCommands>, output: &Output) -> Result<()> {
    match command {
        Some(ConfigCommands::Show) | None => commands::config::show(output),
        Some(ConfigCommands::Set { key, value }) => commands::config::set(key, value, output),
    }
}

/// Load configuration, start logging and open the database
fn open_app() -> Result<(Config, App<SqliteStore>)> {
    let config = Config::load().context("Failed to load configuration")?;
    init_logging(&config);
    let app = App::open(&config)?;
    Ok((config, app))
}

/// Initialize file-based logging
///
/// Only initializes if NTKPR_LOG is set, so the shell's output stays clean.
fn init_logging(config: &Config) {
    let Ok(log_level) = std::env::var("NTKPR_LOG") else {
        return;
    };

    let log_path = config.log_path();
    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    let log_file = match File::create(&log_path) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("Warning: Could not create log file {:?}: {}", log_path, e);
            return;
        }
    };

    let env_filter = EnvFilter::new(format!(
        "ntkpr_core={},ntkpr_cli={}",
        log_level, log_level
    ));

    // Ignore error if already initialized
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_ansi(false)
        .with_writer(log_file)
        .try_init();

    info!("Logging initialized to {:?}", log_path);
}
