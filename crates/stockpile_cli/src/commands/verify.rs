//! Verify command implementation.

use std::path::Path;
use stockpile_core::{read_entries, LoadReport};

/// Runs the verify command.
///
/// Fails if any line of the entry file does not parse.
pub fn run(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    println!("Verifying entry file at {:?}", path);
    println!();

    let report = read_entries(path)?;
    print_result(&report);

    println!();
    if report.skipped.is_empty() {
        println!("✓ Entry file verification passed");
        Ok(())
    } else {
        println!("✗ Entry file verification failed");
        Err("Verification failed".into())
    }
}

fn print_result(report: &LoadReport) {
    println!("  Valid entries: {}", report.entries.len());
    println!("  Bad lines: {}", report.skipped.len());
    for skipped in &report.skipped {
        println!(
            "    line {}: {} ({:?})",
            skipped.line_number, skipped.error, skipped.content
        );
    }
}
