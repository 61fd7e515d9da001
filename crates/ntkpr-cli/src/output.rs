//! Output formatting for CLI
//!
//! Provides consistent output formatting across all commands:
//! - Human-readable default output
//! - JSON output (--json flag)
//! - Quiet mode for scripting (--quiet flag)

use serde::Serialize;

use ntkpr_core::{Branch, Entity, EntityId, Note, Status, SyncReport, Thread, View};

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable output (default)
    Human,
    /// JSON output
    Json,
    /// Quiet mode - minimal output
    Quiet,
}

impl OutputFormat {
    /// Create format from CLI flags
    pub fn from_flags(json: bool, quiet: bool) -> Self {
        if quiet {
            OutputFormat::Quiet
        } else if json {
            OutputFormat::Json
        } else {
            OutputFormat::Human
        }
    }
}

/// How an entity is shown in a one-line listing
pub trait Listing: Entity + Serialize {
    fn label(&self) -> String;
    fn highlighted(&self) -> bool;
    fn private(&self) -> bool;
}

impl Listing for Thread {
    fn label(&self) -> String {
        self.name.clone()
    }

    fn highlighted(&self) -> bool {
        self.highlighted
    }

    fn private(&self) -> bool {
        self.private
    }
}

impl Listing for Branch {
    fn label(&self) -> String {
        self.name.clone()
    }

    fn highlighted(&self) -> bool {
        self.highlighted
    }

    fn private(&self) -> bool {
        self.private
    }
}

impl Listing for Note {
    fn label(&self) -> String {
        let headline = self.headline();
        if self.topics.is_empty() {
            headline
        } else {
            format!("{}  #{}", headline, self.topics.join(" #"))
        }
    }

    fn highlighted(&self) -> bool {
        self.highlighted
    }

    fn private(&self) -> bool {
        self.private
    }
}

/// Output helper for consistent formatting
pub struct Output {
    /// The output format
    pub format: OutputFormat,
}

impl Output {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Print one context view, marking the cursor row
    pub fn print_view<E: Listing>(&self, title: &str, view: &View<E>) {
        match self.format {
            OutputFormat::Human => {
                println!("── {} ({}) ──", title, view.name.as_str());
                if view.items.is_empty() {
                    println!("  (empty)");
                    return;
                }
                for (index, item) in view.items.iter().enumerate() {
                    let marker = if index == view.cursor { '>' } else { ' ' };
                    println!(
                        "{} {:>3}  {:<6} {}{}",
                        marker,
                        index,
                        item.id().to_string(),
                        truncate(&item.label(), 60),
                        flags(item.highlighted(), item.private())
                    );
                }
            }
            OutputFormat::Json => print_json(&serde_json::json!({
                "view": view.name,
                "cursor": view.cursor,
                "items": view.items,
            })),
            OutputFormat::Quiet => {
                for item in &view.items {
                    println!("{}", item.id());
                }
            }
        }
    }

    /// Print one entity in full
    pub fn print_note(&self, note: &Note) {
        match self.format {
            OutputFormat::Human => {
                println!("ID:      {}", note.id);
                if !note.topics.is_empty() {
                    println!("Topics:  {}", note.topics.join(", "));
                }
                println!("Created: {}", note.created_at.format("%Y-%m-%d %H:%M"));
                println!("Updated: {}", note.updated_at.format("%Y-%m-%d %H:%M"));
                let flags = flags(note.highlighted, note.private);
                if !flags.is_empty() {
                    println!("Flags:  {}", flags);
                }
                println!();
                println!("{}", note.content);
            }
            OutputFormat::Json => print_json(note),
            OutputFormat::Quiet => println!("{}", note.id),
        }
    }

    pub fn print_status(&self, status: &Status) {
        match self.format {
            OutputFormat::Human => {
                println!("Threads:       {}", status.threads);
                println!("Branches:      {}", status.branches);
                println!("Notes:         {}", status.notes);
                println!("Pending edits: {}", status.pending_edits);
                if status.undoable > 0 {
                    println!("Undoable:      {} delete(s)", status.undoable);
                }
                if status.dropped_edits > 0 {
                    println!(
                        "Dropped edits: {} (rejected by the edit log, see the debug log)",
                        status.dropped_edits
                    );
                }
            }
            OutputFormat::Json => print_json(status),
            OutputFormat::Quiet => println!("{}", status.pending_edits),
        }
    }

    pub fn print_sync_report(&self, report: &SyncReport) {
        match self.format {
            OutputFormat::Human => {
                println!(
                    "✓ Synced: {} created, {} updated, {} deleted",
                    report.created, report.updated, report.deleted
                );
                if report.skipped > 0 {
                    println!("  {} stale edit(s) skipped", report.skipped);
                }
                for failure in &report.failures {
                    println!(
                        "  ✗ {:?} {} {}: {}",
                        failure.action, failure.kind, failure.id, failure.reason
                    );
                }
            }
            OutputFormat::Json => print_json(report),
            OutputFormat::Quiet => {}
        }
    }

    /// Print the identifier of a newly created entity
    pub fn created(&self, kind: &str, id: EntityId) {
        match self.format {
            OutputFormat::Human => println!("✓ Added {} {}", kind, id),
            OutputFormat::Json => print_json(&serde_json::json!({
                "status": "success",
                "kind": kind,
                "id": id.to_string(),
            })),
            OutputFormat::Quiet => println!("{}", id),
        }
    }

    /// Print a success message
    pub fn success(&self, message: &str) {
        match self.format {
            OutputFormat::Human => println!("✓ {}", message),
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::json!({"status": "success", "message": message})
                );
            }
            OutputFormat::Quiet => {}
        }
    }

    /// Print an error without stopping the shell
    pub fn error(&self, message: &str) {
        match self.format {
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::json!({"status": "error", "message": message})
                );
            }
            _ => eprintln!("✗ {}", message),
        }
    }

    /// Print an informational message
    pub fn message(&self, msg: &str) {
        match self.format {
            OutputFormat::Human => println!("{}", msg),
            OutputFormat::Json => {
                println!("{}", serde_json::json!({"message": msg}));
            }
            OutputFormat::Quiet => {}
        }
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("✗ Failed to serialize output: {}", e),
    }
}

fn flags(highlighted: bool, private: bool) -> String {
    let mut out = String::new();
    if highlighted {
        out.push_str(" [h]");
    }
    if private {
        out.push_str(" [p]");
    }
    out
}

/// Truncate a string to max characters, adding "..." if truncated
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_from_flags() {
        assert_eq!(OutputFormat::from_flags(false, false), OutputFormat::Human);
        assert_eq!(OutputFormat::from_flags(true, false), OutputFormat::Json);
        assert_eq!(OutputFormat::from_flags(false, true), OutputFormat::Quiet);
        // Quiet takes precedence
        assert_eq!(OutputFormat::from_flags(true, true), OutputFormat::Quiet);
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("this is a long string", 10), "this is...");
        assert_eq!(truncate("ééééééééééééé", 5), "éé...");
    }

    #[test]
    fn test_flags() {
        assert_eq!(flags(false, false), "");
        assert_eq!(flags(true, true), " [h] [p]");
    }

    #[test]
    fn test_note_label_shows_topics() {
        let mut note = Note::new(EntityId::Provisional(1));
        note.content = "Chapter one\nmore".to_string();
        note.add_topics("rust, books");
        assert_eq!(note.label(), "Chapter one  #rust #books");
    }
}
