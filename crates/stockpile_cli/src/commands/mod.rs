//! CLI command implementations.

pub mod inspect;
pub mod serve;
pub mod verify;
pub mod watch;
