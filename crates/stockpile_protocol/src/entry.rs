//! Inventory entries and their wire form.

use crate::error::{ProtocolError, ProtocolResult};
use serde::Serialize;
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

/// Flag bit marking an entry as missing from its location.
pub const FLAG_MISSING: u32 = 1;

/// Field separator of the wire form.
const SEPARATOR: char = '|';

/// A single inventory record.
///
/// `Entry` is an immutable value. Equality, ordering and hashing are
/// structural over `(name, location, flags)`, name first. The lowercase
/// forms of `name` and `location` are cached for client-side matching and
/// never participate in comparisons or the wire form.
///
/// # Wire form
///
/// ```text
/// HEX(len(name)) '|' HEX(flags) '|' name location
/// ```
///
/// Hex digits are lowercase on output; `len(name)` is a UTF-8 byte count.
///
/// ```
/// use stockpile_protocol::Entry;
///
/// let entry = Entry::new("foo", "kitchen", 0);
/// assert_eq!(entry.to_wire(), "3|0|fookitchen");
/// assert_eq!(Entry::parse("3|0|fookitchen").unwrap(), entry);
/// ```
#[derive(Debug, Clone, Serialize)]
pub struct Entry {
    name: String,
    location: String,
    flags: u32,
    #[serde(skip)]
    name_lower: String,
    #[serde(skip)]
    location_lower: String,
}

impl Entry {
    /// Creates a new entry.
    pub fn new(name: impl Into<String>, location: impl Into<String>, flags: u32) -> Self {
        let name = name.into();
        let location = location.into();
        Self {
            name_lower: name.to_lowercase(),
            location_lower: location.to_lowercase(),
            name,
            location,
            flags,
        }
    }

    /// Parses an entry from its wire form.
    ///
    /// The input is split on the first two `|`. The third field holds the
    /// name immediately followed by the location; the first field gives the
    /// byte length of the name.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::BadEntryEncoding`] if fewer than three
    /// fields are present, a number is not hexadecimal, or the name length
    /// does not fit inside the third field.
    pub fn parse(wire: &str) -> ProtocolResult<Self> {
        let mut fields = wire.splitn(3, SEPARATOR);
        let (Some(len_field), Some(flags_field), Some(body)) =
            (fields.next(), fields.next(), fields.next())
        else {
            return Err(ProtocolError::bad_entry(format!(
                "expected 3 '|'-separated fields in {wire:?}"
            )));
        };

        let name_len = parse_hex(len_field, "name length")? as usize;
        let flags = parse_hex(flags_field, "flags")?;

        if name_len > body.len() || !body.is_char_boundary(name_len) {
            return Err(ProtocolError::bad_entry(format!(
                "name length {name_len} out of range for {body:?}"
            )));
        }

        let (name, location) = body.split_at(name_len);
        Ok(Self::new(name, location, flags))
    }

    /// Returns the wire form of this entry.
    #[must_use]
    pub fn to_wire(&self) -> String {
        format!(
            "{:x}{}{:x}{}{}{}",
            self.name.len(),
            SEPARATOR,
            self.flags,
            SEPARATOR,
            self.name,
            self.location
        )
    }

    /// Returns the item name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the item location.
    pub fn location(&self) -> &str {
        &self.location
    }

    /// Returns the raw flag bits.
    pub fn flags(&self) -> u32 {
        self.flags
    }

    /// Returns the cached lowercase name.
    pub fn name_lower(&self) -> &str {
        &self.name_lower
    }

    /// Returns the cached lowercase location.
    pub fn location_lower(&self) -> &str {
        &self.location_lower
    }

    /// Returns true if the item is flagged as missing.
    pub fn is_missing(&self) -> bool {
        self.flags & FLAG_MISSING != 0
    }

    /// Returns a copy of this entry with the missing flag set or cleared.
    #[must_use]
    pub fn with_missing(&self, missing: bool) -> Self {
        let flags = if missing {
            self.flags | FLAG_MISSING
        } else {
            self.flags & !FLAG_MISSING
        };
        Self::new(self.name.clone(), self.location.clone(), flags)
    }

    /// Returns a copy of this entry with a new name.
    #[must_use]
    pub fn with_name(&self, name: impl Into<String>) -> Self {
        Self::new(name, self.location.clone(), self.flags)
    }

    /// Returns a copy of this entry with a new location.
    #[must_use]
    pub fn with_location(&self, location: impl Into<String>) -> Self {
        Self::new(self.name.clone(), location, self.flags)
    }
}

fn parse_hex(field: &str, what: &str) -> ProtocolResult<u32> {
    if field.is_empty() || !field.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(ProtocolError::bad_entry(format!(
            "invalid hex {what}: {field:?}"
        )));
    }
    u32::from_str_radix(field, 16)
        .map_err(|e| ProtocolError::bad_entry(format!("invalid hex {what}: {e}")))
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.location == other.location && self.flags == other.flags
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.name
            .cmp(&other.name)
            .then_with(|| self.location.cmp(&other.location))
            .then_with(|| self.flags.cmp(&other.flags))
    }
}

impl Hash for Entry {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
        self.location.hash(state);
        self.flags.hash(state);
    }
}

impl FromStr for Entry {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} @ {}", self.name, self.location)?;
        if self.is_missing() {
            write!(f, " (missing)")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashSet;

    #[test]
    fn wire_form_uses_lowercase_hex() {
        let entry = Entry::new("abcdefghijklmnop", "shelf", 0xab);
        assert_eq!(entry.to_wire(), "10|ab|abcdefghijklmnopshelf");
    }

    #[test]
    fn parse_reference_lines() {
        let entry = Entry::parse("3|0|fookitchen").unwrap();
        assert_eq!(entry.name(), "foo");
        assert_eq!(entry.location(), "kitchen");
        assert_eq!(entry.flags(), 0);

        let entry = Entry::parse("4|1|bartable").unwrap();
        assert_eq!(entry.name(), "bart");
        assert_eq!(entry.location(), "able");
        assert!(entry.is_missing());
    }

    #[test]
    fn parse_accepts_uppercase_hex() {
        let entry = Entry::parse("A|FF|0123456789garage").unwrap();
        assert_eq!(entry.name(), "0123456789");
        assert_eq!(entry.flags(), 0xff);
    }

    #[test]
    fn parse_keeps_separator_in_location() {
        let entry = Entry::new("a", "b|c", 2);
        assert_eq!(entry.to_wire(), "1|2|ab|c");
        assert_eq!(Entry::parse(&entry.to_wire()).unwrap(), entry);
    }

    #[test]
    fn parse_empty_name_and_location() {
        let entry = Entry::parse("0|0|").unwrap();
        assert_eq!(entry, Entry::new("", "", 0));
    }

    #[test]
    fn parse_rejects_missing_fields() {
        assert!(matches!(
            Entry::parse("3|fookitchen"),
            Err(ProtocolError::BadEntryEncoding { .. })
        ));
        assert!(matches!(
            Entry::parse("garbage"),
            Err(ProtocolError::BadEntryEncoding { .. })
        ));
    }

    #[test]
    fn parse_rejects_bad_hex() {
        for wire in ["x|0|ab", "1|zz|ab", "|0|ab", "1||ab", "-1|0|ab", "+1|0|ab"] {
            assert!(
                matches!(Entry::parse(wire), Err(ProtocolError::BadEntryEncoding { .. })),
                "{wire} should be rejected"
            );
        }
    }

    #[test]
    fn parse_rejects_out_of_range_name_length() {
        assert!(Entry::parse("9|0|short").is_err());
        assert!(Entry::parse("ffffffff|0|x").is_err());
        assert!(Entry::parse("100000000|0|x").is_err());
    }

    #[test]
    fn parse_rejects_split_inside_character() {
        // "é" is two bytes; a one byte name would cut it in half.
        assert!(Entry::parse("1|0|éx").is_err());
        let entry = Entry::parse("2|0|éx").unwrap();
        assert_eq!(entry.name(), "é");
    }

    #[test]
    fn ordering_is_name_then_location_then_flags() {
        let mut entries = vec![
            Entry::new("b", "a", 0),
            Entry::new("a", "z", 1),
            Entry::new("a", "z", 0),
            Entry::new("a", "b", 9),
        ];
        entries.sort();
        assert_eq!(
            entries,
            vec![
                Entry::new("a", "b", 9),
                Entry::new("a", "z", 0),
                Entry::new("a", "z", 1),
                Entry::new("b", "a", 0),
            ]
        );
    }

    #[test]
    fn equality_ignores_lowercase_cache() {
        let a = Entry::new("Hammer", "Garage", 0);
        let b = Entry::new("hammer", "garage", 0);
        assert_ne!(a, b);
        assert_eq!(a.name_lower(), b.name_lower());
        assert_eq!(a.location_lower(), "garage");

        let set: HashSet<_> = [a.clone(), a.clone(), b].into_iter().collect();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn missing_flag_preserves_other_bits() {
        let entry = Entry::new("drill", "shed", 0b110);
        let missing = entry.with_missing(true);
        assert_eq!(missing.flags(), 0b111);
        assert!(missing.is_missing());
        assert_eq!(missing.with_missing(false), entry);
    }

    #[test]
    fn derived_copies_refresh_lowercase_cache() {
        let entry = Entry::new("saw", "shed", 0).with_location("ATTIC");
        assert_eq!(entry.location_lower(), "attic");
        let entry = entry.with_name("Saw");
        assert_eq!(entry.name_lower(), "saw");
    }

    #[test]
    fn display_is_human_readable() {
        assert_eq!(Entry::new("saw", "shed", 0).to_string(), "saw @ shed");
        assert_eq!(
            Entry::new("saw", "shed", FLAG_MISSING).to_string(),
            "saw @ shed (missing)"
        );
    }

    proptest! {
        #[test]
        fn wire_round_trip(
            name in "[^\r\n]{0,24}",
            location in "[^\r\n]{0,24}",
            flags in 0u32..(1 << 31),
        ) {
            let entry = Entry::new(name, location, flags);
            prop_assert_eq!(Entry::parse(&entry.to_wire()).unwrap(), entry);
        }
    }
}
