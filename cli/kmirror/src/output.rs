//! Output formatting for the run summary.

use clap::ValueEnum;
use colored::Colorize;
use kmirror_images::{ComponentOutcome, ComponentSync, SyncReport};
use serde::Serialize;
use tabled::{Table, Tabled};

/// Summary output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table format.
    #[default]
    Table,
    /// JSON format.
    Json,
}

/// Print rows as a table.
pub fn print_table<T: Tabled>(rows: &[T]) {
    if rows.is_empty() {
        println!("{}", "No images.".dimmed());
    } else {
        println!("{}", Table::new(rows));
    }
}

/// Print a value as pretty JSON.
pub fn print_json<T: Serialize>(data: &T) {
    let json = serde_json::to_string_pretty(data).unwrap_or_else(|_| "{}".to_string());
    println!("{}", json);
}

/// Print a success message.
pub fn print_success(message: &str) {
    println!("{} {}", "Success:".green().bold(), message);
}

/// Print an info message.
pub fn print_info(message: &str) {
    println!("{} {}", "Info:".blue().bold(), message);
}

/// Print a warning message.
pub fn print_warning(message: &str) {
    println!("{} {}", "Warning:".yellow().bold(), message);
}

/// One line of the sync summary table.
#[derive(Debug, Tabled)]
pub struct SyncRow {
    #[tabled(rename = "Component")]
    pub component: String,
    #[tabled(rename = "Mirror image")]
    pub mirror: String,
    #[tabled(rename = "Probe")]
    pub probe: String,
    #[tabled(rename = "Result")]
    pub result: String,
}

impl From<&ComponentSync> for SyncRow {
    fn from(entry: &ComponentSync) -> Self {
        Self {
            component: entry.component.clone(),
            mirror: entry
                .mirror
                .as_ref()
                .map_or_else(|| "-".to_string(), ToString::to_string),
            probe: entry.presence.label().to_string(),
            result: outcome_label(&entry.outcome),
        }
    }
}

fn outcome_label(outcome: &ComponentOutcome) -> String {
    match outcome {
        ComponentOutcome::AlreadyPresent => "skipped (present)".to_string(),
        ComponentOutcome::Mirrored => "mirrored".to_string(),
        ComponentOutcome::Failed { failures, skipped } => {
            let mut steps: Vec<String> = failures
                .iter()
                .map(|f| format!("{} failed", f.step))
                .collect();
            steps.extend(skipped.iter().map(|s| format!("{s} skipped")));
            format!("FAILED ({})", steps.join(", "))
        }
    }
}

pub fn sync_rows(report: &SyncReport) -> Vec<SyncRow> {
    report.components.iter().map(SyncRow::from).collect()
}
