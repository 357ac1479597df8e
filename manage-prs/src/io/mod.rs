//! Side-effecting adapters: child processes, the code host, files on disk.

pub mod config;
pub mod git;
pub mod github;
pub mod handoff;
pub mod process;
pub mod rest;
