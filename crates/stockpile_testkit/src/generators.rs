//! Property-based test generators using proptest.

use proptest::prelude::*;
use stockpile_protocol::{Command, Entry};

/// Strategy for item names and locations.
///
/// Includes `|`, `>` and non-ASCII characters, which the wire form must
/// carry through unchanged. Line breaks are excluded.
pub fn text_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-zA-Z0-9 |>+\\-éß☃]{0,16}").expect("Invalid regex")
}

/// Strategy for flag words, biased towards the defined bits.
pub fn flags_strategy() -> impl Strategy<Value = u32> {
    prop_oneof![
        3 => 0u32..2,
        1 => any::<u32>(),
    ]
}

/// Strategy for arbitrary entries.
pub fn entry_strategy() -> impl Strategy<Value = Entry> {
    (text_strategy(), text_strategy(), flags_strategy())
        .prop_map(|(name, location, flags)| Entry::new(name, location, flags))
}

/// Strategy for entries drawn from a small pool, so commands collide.
pub fn pooled_entry_strategy() -> impl Strategy<Value = Entry> {
    (
        prop::sample::select(vec!["hammer", "drill", "saw"]),
        prop::sample::select(vec!["garage", "kitchen"]),
        0u32..2,
    )
        .prop_map(|(name, location, flags)| Entry::new(name, location, flags))
}

/// Strategy for commands over the pooled entries.
pub fn command_strategy() -> impl Strategy<Value = Command> {
    prop_oneof![
        pooled_entry_strategy().prop_map(Command::add),
        pooled_entry_strategy().prop_map(Command::remove),
        (pooled_entry_strategy(), pooled_entry_strategy())
            .prop_map(|(from, to)| Command::replace(from, to)),
    ]
}

/// Strategy for a sequence of encoded command lines.
pub fn command_lines_strategy(max_len: usize) -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec(command_strategy().prop_map(|c| c.encode()), 0..max_len)
}
