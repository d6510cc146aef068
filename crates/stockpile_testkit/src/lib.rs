//! # Stockpile Testkit
//!
//! Test utilities for Stockpile.
//!
//! This crate provides:
//! - Property-based generators for entries and commands
//! - Temporary entry file fixtures
//! - A raw line client for driving a server over TCP
//!
//! ## Usage
//!
//! ```rust,ignore
//! use stockpile_testkit::prelude::*;
//!
//! let mut client = LineClient::connect(addr).await;
//! let snapshot = client.read_bulk().await;
//! client.send("+3|0|fookitchen").await;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod client;
pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::client::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
}

pub use client::*;
pub use fixtures::*;
pub use generators::*;
