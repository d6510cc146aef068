//! Entry file fixtures.

use std::fs;
use std::path::{Path, PathBuf};
use stockpile_core::read_entries;
use stockpile_protocol::{Entry, DEFAULT_DB_FILENAME};
use tempfile::TempDir;

/// A temporary directory holding an entry file path.
///
/// The directory is removed when the fixture is dropped.
pub struct TempEntryFile {
    dir: TempDir,
    path: PathBuf,
}

impl TempEntryFile {
    /// Creates a fixture whose file does not exist yet.
    pub fn empty() -> Self {
        let dir = TempDir::new().expect("Failed to create temp directory");
        let path = dir.path().join(DEFAULT_DB_FILENAME);
        Self { dir, path }
    }

    /// Creates a fixture whose file holds `contents` verbatim.
    pub fn with_contents(contents: &str) -> Self {
        let fixture = Self::empty();
        fs::write(&fixture.path, contents).expect("Failed to write entry file");
        fixture
    }

    /// Creates a fixture whose file holds one wire line per entry.
    pub fn with_entries(entries: &[Entry]) -> Self {
        Self::with_contents(&render_entries(entries))
    }

    /// Returns the entry file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the temporary directory.
    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    /// Reads the file back as text.
    pub fn contents(&self) -> String {
        fs::read_to_string(&self.path).expect("Failed to read entry file")
    }

    /// Parses the file back into entries, failing on any bad line.
    pub fn entries(&self) -> Vec<Entry> {
        let report = read_entries(&self.path).expect("Failed to load entry file");
        assert!(
            report.skipped.is_empty(),
            "entry file has bad lines: {:?}",
            report.skipped
        );
        report.entries
    }
}

/// Renders entries the way the server persists them.
pub fn render_entries(entries: &[Entry]) -> String {
    entries
        .iter()
        .map(|e| format!("{}\n", e.to_wire()))
        .collect()
}

/// The entries used throughout the scenario tests.
pub fn sample_entries() -> Vec<Entry> {
    vec![
        Entry::new("foo", "kitchen", 0),
        Entry::new("bar", "garage", 1),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_wire_lines() {
        assert_eq!(
            render_entries(&sample_entries()),
            "3|0|fookitchen\n3|1|bargarage\n"
        );
    }

    #[test]
    fn fixture_round_trips() {
        let fixture = TempEntryFile::with_entries(&sample_entries());
        assert_eq!(fixture.entries(), sample_entries());
        assert!(fixture.path().starts_with(fixture.dir()));
    }

    #[test]
    fn empty_fixture_has_no_file() {
        let fixture = TempEntryFile::empty();
        assert!(!fixture.path().exists());
    }
}
