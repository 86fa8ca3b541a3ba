//! Sequential lint → format → test stage runner.
//!
//! Invokes three external collaborators in a fixed order against a target
//! directory and reports a verdict per stage. The architecture enforces a
//! strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (stage model, argument rendering,
//!   failure propagation). No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting operations (config files, process execution,
//!   stage logs). Isolated behind [`io::executor::StageExecutor`] so
//!   orchestration can be tested without spawning tools.
//!
//! [`pipeline`] coordinates the two to implement `stage-runner run`.

pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod pipeline;
pub mod report;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
