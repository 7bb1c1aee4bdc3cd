//! Stable exit codes for the runner CLI.

/// The pipeline reached a terminal status.
pub const OK: i32 = 0;
/// Invalid config, unreachable setup, or a step fault.
pub const INVALID: i32 = 1;
/// The iteration budget or the retry policy ran out first.
pub const EXHAUSTED: i32 = 2;
