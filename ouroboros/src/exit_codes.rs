//! Stable exit codes for ouroboros CLI commands.

/// Command succeeded.
pub const OK: i32 = 0;
/// Command failed due to invalid layout/config or other errors.
pub const INVALID: i32 = 1;
/// The lineage's structural contract was violated (extraction failure,
/// missing instruction block).
pub const CONTRACT: i32 = 2;
/// The archive's fixed-width index space is exhausted.
pub const EXHAUSTED: i32 = 3;
