//! Diagnostics for the stage runner itself, written through `tracing`.
//!
//! What the lint, format and test tools print is echoed untouched and is not
//! routed through here. Neither are the per-stage summary lines or the
//! `--log-dir` files. This module only controls the runner's own events
//! (stage start/finish, timeouts, truncation) on stderr.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Filter used when `RUST_LOG` is unset, by `-v` count.
pub fn default_directive(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn",
        1 => "stage_runner=info,warn",
        _ => "stage_runner=debug,info",
    }
}

/// Install the stderr subscriber.
///
/// `RUST_LOG` takes precedence over `verbosity`, e.g.
/// `RUST_LOG=stage_runner=trace stage-runner run`.
pub fn init(verbosity: u8) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbosity)));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .compact(),
        )
        .init();
}
