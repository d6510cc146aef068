//! Tokens and defaults shared by both ends of a connection.

/// First line the server sends on every accepted connection.
pub const HANDSHAKE_TOKEN: &str = "ACK_STOCKPILE_SERVER";

/// Line that terminates the bulk snapshot phase.
pub const BULK_DONE: &str = "BULK_DONE";

/// Default TCP port of the server.
pub const DEFAULT_PORT: u16 = 2377;

/// Default name of the on-disk entry file.
pub const DEFAULT_DB_FILENAME: &str = "entries.db";

/// Returns true if `line` can travel as a single protocol line.
///
/// A line is safe when it is non-empty and carries no line break.
pub fn is_line_safe(line: &str) -> bool {
    !line.is_empty() && !line.contains(['\n', '\r'])
}
