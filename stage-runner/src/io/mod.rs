//! I/O helpers for stage-runner commands.

pub mod config;
pub mod executor;
pub mod process;
pub mod stage_log;
