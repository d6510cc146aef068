//! The shared entry database.

use crate::error::CoreResult;
use parking_lot::Mutex;
use stockpile_protocol::{Command, Entry, ProtocolResult};

/// The shared, ordered entry list plus its dirty state.
///
/// All access goes through one mutex. Mutations are expressed as command
/// lines and parsed by the protocol codec, so every writer agrees on the
/// semantics of `+`, `-` and `>`.
///
/// # Dirty tracking
///
/// Each successful command bumps a mutation version. The database is dirty
/// while that version is ahead of the version of the last completed write.
/// A writer takes a [`FlushTicket`] with [`Database::take_dirty_snapshot`],
/// writes it out, and reports success with [`Database::complete_flush`].
/// A failed write simply never completes its ticket, so the database stays
/// dirty and the next attempt retries.
///
/// # Example
///
/// ```
/// use stockpile_core::Database;
///
/// let db = Database::new();
/// db.apply("+1|0|ax").unwrap();
/// assert!(db.is_dirty());
///
/// let ticket = db.take_dirty_snapshot().unwrap();
/// assert_eq!(ticket.entries().len(), 1);
/// db.complete_flush(&ticket);
/// assert!(!db.is_dirty());
/// ```
#[derive(Debug, Default)]
pub struct Database {
    state: Mutex<State>,
}

#[derive(Debug, Default)]
struct State {
    entries: Vec<Entry>,
    /// Number of successful commands applied so far.
    version: u64,
    /// Version reflected by the last completed write.
    flushed_version: u64,
}

impl State {
    fn is_dirty(&self) -> bool {
        self.version != self.flushed_version
    }
}

/// A copy of the entries taken for a flush, tagged with the mutation
/// version it reflects.
#[derive(Debug, Clone)]
pub struct FlushTicket {
    entries: Vec<Entry>,
    version: u64,
}

impl FlushTicket {
    /// Returns the entries to write.
    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    /// Returns the mutation version this ticket reflects.
    pub fn version(&self) -> u64 {
        self.version
    }
}

impl Database {
    /// Creates an empty, clean database.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a clean database holding `entries`.
    ///
    /// Used at startup: entries loaded from disk already match the file.
    pub fn from_entries(entries: Vec<Entry>) -> Self {
        Self {
            state: Mutex::new(State {
                entries,
                version: 0,
                flushed_version: 0,
            }),
        }
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    /// Returns true if there are no entries.
    pub fn is_empty(&self) -> bool {
        self.state.lock().entries.is_empty()
    }

    /// Returns true if a command succeeded since the last completed write.
    pub fn is_dirty(&self) -> bool {
        self.state.lock().is_dirty()
    }

    /// Returns the current mutation version.
    pub fn version(&self) -> u64 {
        self.state.lock().version
    }

    /// Returns a consistent copy of the entries.
    pub fn snapshot(&self) -> Vec<Entry> {
        self.state.lock().entries.clone()
    }

    /// Runs `f` over the entries while holding the database lock.
    ///
    /// No command can be applied while `f` runs, so whatever `f` streams
    /// or registers is atomic with respect to mutations. `f` must not
    /// block.
    pub fn with_snapshot<R>(&self, f: impl FnOnce(&[Entry]) -> R) -> R {
        let state = self.state.lock();
        f(&state.entries)
    }

    /// Parses and applies a command line.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Protocol`](crate::CoreError::Protocol) if the
    /// line is malformed; the database is left unchanged and stays as
    /// dirty or clean as it was.
    pub fn apply(&self, line: &str) -> CoreResult<Command> {
        let (command, ()) = self.apply_and_then(line, |_| ())?;
        Ok(command)
    }

    /// Applies a command line and, on success, runs `f` before the lock is
    /// released.
    ///
    /// Anything `f` does is ordered exactly like the mutations themselves,
    /// which is what fan-out relies on. `f` must not block.
    ///
    /// # Errors
    ///
    /// Returns the decode error if the line is malformed; `f` is not run.
    pub fn apply_and_then<R>(
        &self,
        line: &str,
        f: impl FnOnce(&Command) -> R,
    ) -> ProtocolResult<(Command, R)> {
        let mut state = self.state.lock();
        let command = stockpile_protocol::apply(&mut state.entries, line)?;
        state.version += 1;
        let result = f(&command);
        Ok((command, result))
    }

    /// Takes a snapshot for the persistence writer if the database is dirty.
    ///
    /// Returns `None` when there is nothing to write.
    pub fn take_dirty_snapshot(&self) -> Option<FlushTicket> {
        let state = self.state.lock();
        if !state.is_dirty() {
            return None;
        }
        Some(FlushTicket {
            entries: state.entries.clone(),
            version: state.version,
        })
    }

    /// Records that `ticket` has been written successfully.
    ///
    /// Commands applied after the ticket was taken keep the database dirty.
    /// Returns true if the database is clean afterwards.
    pub fn complete_flush(&self, ticket: &FlushTicket) -> bool {
        let mut state = self.state.lock();
        if ticket.version > state.flushed_version {
            state.flushed_version = ticket.version;
        }
        !state.is_dirty()
    }
}
