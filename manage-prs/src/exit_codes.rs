//! Stable exit codes for `manage-prs` commands.

/// Command succeeded, including intentional skips and no-op template runs.
pub const OK: i32 = 0;
/// Missing precondition, template failure, invalid mode or failed PR creation.
pub const FAILURE: i32 = 1;
