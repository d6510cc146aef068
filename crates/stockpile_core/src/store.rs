//! On-disk entry file.
//!
//! The file holds one entry wire form per line with no header or trailer:
//!
//! ```text
//! <dir>/
//! ├─ entries.db        # one wire form per line
//! ├─ entries.db.lock   # advisory lock held while a server owns the file
//! └─ entries.db.tmp    # transient, written then renamed over entries.db
//! ```

use crate::error::{CoreError, CoreResult};
use fs2::FileExt;
use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use stockpile_protocol::{Entry, ProtocolError};
use tracing::{debug, warn};

/// A line that could not be loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedLine {
    /// 1-based line number.
    pub line_number: usize,
    /// The raw line, lossily decoded.
    pub content: String,
    /// Why the line was rejected.
    pub error: ProtocolError,
}

/// Result of reading an entry file.
#[derive(Debug, Clone, Default)]
pub struct LoadReport {
    /// Entries in file order.
    pub entries: Vec<Entry>,
    /// Lines that were skipped.
    pub skipped: Vec<SkippedLine>,
}

/// Exclusive handle on the entry file.
///
/// Opening creates the file if it is missing and takes an advisory lock
/// on a sibling `.lock` file, so two servers never flush over each other.
/// The lock is released when the handle is dropped.
#[derive(Debug)]
pub struct EntryFile {
    path: PathBuf,
    temp_path: PathBuf,
    _lock_file: File,
}

impl EntryFile {
    /// Opens or creates the entry file at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The path has no file name (`InvalidPath`)
    /// - Another handle holds the lock (`DatabaseLocked`)
    /// - The file cannot be created (`Io`)
    pub fn open(path: &Path) -> CoreResult<Self> {
        let lock_path = sibling(path, ".lock")?;
        let temp_path = sibling(path, ".tmp")?;

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)?;
        if lock_file.try_lock_exclusive().is_err() {
            return Err(CoreError::DatabaseLocked { path: lock_path });
        }

        if !path.exists() {
            debug!(path = %path.display(), "creating empty entry file");
            File::create(path)?;
        }

        Ok(Self {
            path: path.to_path_buf(),
            temp_path,
            _lock_file: lock_file,
        })
    }

    /// Returns the path of the entry file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads every parseable entry, logging and skipping the rest.
    pub fn load(&self) -> CoreResult<LoadReport> {
        let report = read_entries(&self.path)?;
        for skipped in &report.skipped {
            warn!(
                path = %self.path.display(),
                line = skipped.line_number,
                error = %skipped.error,
                "skipping unparseable entry line"
            );
        }
        Ok(report)
    }

    /// Rewrites the whole file with `entries`.
    ///
    /// Uses write-then-rename so a crash mid-write leaves the previous
    /// file intact:
    /// 1. Write every wire form to the temp file
    /// 2. Sync the temp file
    /// 3. Rename it over the entry file
    /// 4. Sync the directory
    pub fn write(&self, entries: &[Entry]) -> CoreResult<()> {
        let file = File::create(&self.temp_path)?;
        let mut writer = BufWriter::new(file);
        for entry in entries {
            writer.write_all(entry.to_wire().as_bytes())?;
            writer.write_all(b"\n")?;
        }
        let file = writer.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()?;
        drop(file);

        fs::rename(&self.temp_path, &self.path)?;
        self.sync_directory()?;
        Ok(())
    }

    #[cfg(unix)]
    fn sync_directory(&self) -> CoreResult<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        File::open(dir)?.sync_all()?;
        Ok(())
    }

    #[cfg(not(unix))]
    fn sync_directory(&self) -> CoreResult<()> {
        Ok(())
    }
}

/// Reads an entry file without taking its lock.
///
/// Lines that are not valid UTF-8 or do not parse are reported in
/// [`LoadReport::skipped`]. A trailing `\r` is ignored.
pub fn read_entries(path: &Path) -> CoreResult<LoadReport> {
    let reader = BufReader::new(File::open(path)?);
    let mut report = LoadReport::default();

    for (index, line) in reader.split(b'\n').enumerate() {
        let mut bytes = line?;
        if bytes.last() == Some(&b'\r') {
            bytes.pop();
        }

        let parsed = String::from_utf8(bytes)
            .map_err(|e| {
                let content = String::from_utf8_lossy(e.as_bytes()).into_owned();
                (content, ProtocolError::bad_entry("line is not valid UTF-8"))
            })
            .and_then(|text| match Entry::parse(&text) {
                Ok(entry) => Ok(entry),
                Err(error) => Err((text, error)),
            });

        match parsed {
            Ok(entry) => report.entries.push(entry),
            Err((content, error)) => report.skipped.push(SkippedLine {
                line_number: index + 1,
                content,
                error,
            }),
        }
    }

    Ok(report)
}

fn sibling(path: &Path, suffix: &str) -> CoreResult<PathBuf> {
    let name = path.file_name().ok_or_else(|| {
        CoreError::invalid_path(format!("{} has no file name", path.display()))
    })?;
    let mut sibling_name = OsString::from(name);
    sibling_name.push(suffix);
    Ok(path.with_file_name(sibling_name))
}
