//! Fleet-wide pull request automation.
//!
//! A template edits one repository checkout, the PR lifecycle decides what
//! happens to the pull request carrying that edit, and a fleet walk triggers
//! the per-repository automation for every repository in a registry.
//!
//! - **[`core`]**: pure, deterministic logic (text patching, lifecycle
//!   decisions, registry parsing, filters). No I/O.
//! - **[`io`]**: side effects (`gh`, HTTP, git, hand-off files, config).
//! - **[`templates`]**: the statically registered templates and the runner
//!   that applies them.
//!
//! Orchestration modules ([`apply`], [`manage`], [`walk`]) wire core logic to
//! the adapters through traits so tests can substitute scripted fakes.

pub mod apply;
pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod manage;
pub mod templates;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod walk;
