//! Deterministic, pure logic shared by the stage runner.
//!
//! Core modules must be free of I/O side effects. They describe what to run
//! and how verdicts propagate; the `io` layer does the running.

pub mod policy;
pub mod stage;
