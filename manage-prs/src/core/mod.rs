//! Deterministic, pure logic shared by the commands.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! text and data structures and return deterministic outputs suitable for tests.

pub mod filter;
pub mod indent;
pub mod lifecycle;
pub mod patch;
pub mod registry;
pub mod scan;
pub mod types;
