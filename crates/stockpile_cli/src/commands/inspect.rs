//! Inspect command implementation.

use crate::Format;
use serde::Serialize;
use std::path::Path;
use stockpile_core::read_entries;
use stockpile_protocol::Entry;

/// Entry file inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Entry file path.
    pub path: String,
    /// Number of entries.
    pub entry_count: usize,
    /// Number of entries flagged missing.
    pub missing_count: usize,
    /// Line numbers that did not parse.
    pub skipped_lines: Vec<usize>,
    /// The entries, in file order.
    pub entries: Vec<Entry>,
}

/// Runs the inspect command.
pub fn run(path: &Path, format: Format) -> Result<(), Box<dyn std::error::Error>> {
    let result = inspect(path)?;

    match format {
        Format::Json => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Format::Text => {
            print_text_output(&result);
        }
    }

    Ok(())
}

/// Loads the entry file without locking it.
pub fn inspect(path: &Path) -> Result<InspectResult, Box<dyn std::error::Error>> {
    if !path.exists() {
        return Err(format!("No entry file found at {:?}", path).into());
    }

    let report = read_entries(path)?;
    Ok(InspectResult {
        path: path.display().to_string(),
        entry_count: report.entries.len(),
        missing_count: report.entries.iter().filter(|e| e.is_missing()).count(),
        skipped_lines: report.skipped.iter().map(|s| s.line_number).collect(),
        entries: report.entries,
    })
}

fn print_text_output(result: &InspectResult) {
    println!("Entry file: {}", result.path);
    println!();
    for (i, entry) in result.entries.iter().enumerate() {
        println!("{:>5}  {}", i + 1, entry);
    }
    println!();
    println!("Entries:  {}", result.entry_count);
    println!("Missing:  {}", result.missing_count);
    if !result.skipped_lines.is_empty() {
        println!(
            "Skipped:  {} (run `stockpile verify` for details)",
            result.skipped_lines.len()
        );
    }
}
