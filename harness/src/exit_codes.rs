//! Stable exit codes for processes hosting a script.

/// Every enabled action succeeded.
pub const OK: i32 = 0;
/// Invalid setup (config, listener registration) or a listener failed.
pub const INVALID: i32 = 1;
/// The run finished but at least one action ended with an operation error.
pub const ACTION_ERROR: i32 = 2;
/// The run was aborted by a fatal condition.
pub const FATAL: i32 = 10;
