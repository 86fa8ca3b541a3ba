//! Stable exit codes for the stage-runner CLI.

/// Every stage passed (or `plan`/`init` succeeded).
pub const OK: i32 = 0;
/// At least one stage failed or timed out.
pub const STAGE_FAILED: i32 = 1;
/// Invalid config or arguments, or a stage could not be started.
pub const INVALID: i32 = 2;
