//! One-line mutation commands.
//!
//! ```text
//! command := add | del | move
//! add     := '+' entry
//! del     := '-' entry
//! move    := '>' decimal '>' entry entry
//! ```
//!
//! The `move` header length is decimal and counts the bytes of the first
//! entry's wire form; the lengths inside each entry are hexadecimal.

use crate::entry::Entry;
use crate::error::{ProtocolError, ProtocolResult};
use std::fmt;

const OP_ADD: char = '+';
const OP_REMOVE: char = '-';
const OP_REPLACE: char = '>';

/// A parsed mutation against an ordered list of entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Append an entry. No uniqueness check is made.
    Add(Entry),
    /// Remove the first entry equal to this one.
    Remove(Entry),
    /// Replace every entry equal to `from` with `to`.
    Replace {
        /// Entry to look for.
        from: Entry,
        /// Entry that takes its place.
        to: Entry,
    },
}

impl Command {
    /// Creates an add command.
    pub fn add(entry: Entry) -> Self {
        Command::Add(entry)
    }

    /// Creates a remove command.
    pub fn remove(entry: Entry) -> Self {
        Command::Remove(entry)
    }

    /// Creates a replace command.
    pub fn replace(from: Entry, to: Entry) -> Self {
        Command::Replace { from, to }
    }

    /// Parses a command line.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::BadCommand`] when the line is empty, the
    /// opcode is unknown, the payload is empty, or a move header is
    /// malformed. Entry parse failures are returned as
    /// [`ProtocolError::BadEntryEncoding`].
    pub fn parse(line: &str) -> ProtocolResult<Self> {
        let mut chars = line.chars();
        let op = chars
            .next()
            .ok_or_else(|| ProtocolError::bad_command("empty command"))?;
        let payload = chars.as_str();
        if payload.is_empty() {
            return Err(ProtocolError::bad_command(format!(
                "empty payload after {op:?}"
            )));
        }

        match op {
            OP_ADD => Ok(Command::Add(Entry::parse(payload)?)),
            OP_REMOVE => Ok(Command::Remove(Entry::parse(payload)?)),
            OP_REPLACE => Self::parse_replace(payload),
            other => Err(ProtocolError::bad_command(format!(
                "{other:?} is not a valid command"
            ))),
        }
    }

    fn parse_replace(payload: &str) -> ProtocolResult<Self> {
        let (len_field, body) = payload
            .split_once(OP_REPLACE)
            .ok_or_else(|| ProtocolError::bad_command("move header has no second '>'"))?;

        if len_field.is_empty() || !len_field.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ProtocolError::bad_command(format!(
                "move length is not a decimal: {len_field:?}"
            )));
        }
        let from_len: usize = len_field
            .parse()
            .map_err(|e| ProtocolError::bad_command(format!("move length: {e}")))?;

        if from_len > body.len() || !body.is_char_boundary(from_len) {
            return Err(ProtocolError::bad_command(format!(
                "move length {from_len} out of range for {} byte body",
                body.len()
            )));
        }

        let (from, to) = body.split_at(from_len);
        Ok(Command::Replace {
            from: Entry::parse(from)?,
            to: Entry::parse(to)?,
        })
    }

    /// Returns the wire form of this command.
    #[must_use]
    pub fn encode(&self) -> String {
        match self {
            Command::Add(entry) => format!("{OP_ADD}{}", entry.to_wire()),
            Command::Remove(entry) => format!("{OP_REMOVE}{}", entry.to_wire()),
            Command::Replace { from, to } => {
                let from = from.to_wire();
                format!(
                    "{OP_REPLACE}{}{OP_REPLACE}{from}{}",
                    from.len(),
                    to.to_wire()
                )
            }
        }
    }

    /// Applies this command to `entries` and returns how many positions
    /// changed.
    ///
    /// A remove that matches nothing is not an error and returns 0.
    pub fn apply_to(&self, entries: &mut Vec<Entry>) -> usize {
        match self {
            Command::Add(entry) => {
                entries.push(entry.clone());
                1
            }
            Command::Remove(entry) => match entries.iter().position(|e| e == entry) {
                Some(index) => {
                    entries.remove(index);
                    1
                }
                None => 0,
            },
            Command::Replace { from, to } => {
                let mut replaced = 0;
                for slot in entries.iter_mut() {
                    if *slot == *from {
                        *slot = to.clone();
                        replaced += 1;
                    }
                }
                replaced
            }
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

/// Parses `line` and applies it to `entries`.
///
/// On success the caller is responsible for marking its store dirty.
/// `entries` is left untouched when parsing fails.
pub fn apply(entries: &mut Vec<Entry>, line: &str) -> ProtocolResult<Command> {
    let command = Command::parse(line)?;
    command.apply_to(entries);
    Ok(command)
}
