//! Stable exit codes for lab CLI commands.

/// Run completed (finalized or not), quick search answered, or config written.
pub const OK: i32 = 0;
/// Invalid config, model transport failure or any other unhandled error.
pub const INVALID: i32 = 1;
