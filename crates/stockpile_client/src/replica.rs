//! Client-side mirror of the server's entry list.

use parking_lot::Mutex;
use std::sync::Arc;
use stockpile_protocol::{apply, Command, Entry, ProtocolResult};
use tracing::warn;

/// Local copy of the entry list kept in step with the server.
///
/// Built from the bulk snapshot, then fed every relayed update through the
/// same codec the server uses, so both sides hold the same sequence.
#[derive(Debug, Clone, Default)]
pub struct Replica {
    entries: Vec<Entry>,
    rejected: usize,
}

impl Replica {
    /// Creates an empty replica.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a replica from snapshot lines.
    ///
    /// Lines that do not decode are logged and skipped.
    pub fn from_snapshot<S: AsRef<str>>(lines: &[S]) -> Self {
        let mut replica = Self::new();
        for line in lines {
            match Entry::parse(line.as_ref()) {
                Ok(entry) => replica.entries.push(entry),
                Err(err) => {
                    warn!(line = %line.as_ref(), error = %err, "skipping snapshot line");
                    replica.rejected += 1;
                }
            }
        }
        replica
    }

    /// Applies one relayed command.
    ///
    /// # Errors
    ///
    /// Returns the decode error; the replica is unchanged in that case.
    pub fn apply(&mut self, line: &str) -> ProtocolResult<Command> {
        let result = apply(&mut self.entries, line);
        if result.is_err() {
            self.rejected += 1;
        }
        result
    }

    /// Returns the entries in server order.
    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if there are no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns how many lines failed to decode so far.
    pub fn rejected(&self) -> usize {
        self.rejected
    }

    /// Returns an update listener that applies every line to `replica`.
    pub fn listener(replica: Arc<Mutex<Replica>>) -> impl Fn(&str) + Send + Sync + 'static {
        move |line: &str| {
            if let Err(err) = replica.lock().apply(line) {
                warn!(line = %line, error = %err, "discarding relayed line");
            }
        }
    }
}
