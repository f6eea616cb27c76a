//! Diagnostic tracing.
//!
//! User-facing progress goes through [`crate::ui::Reporter`]. This module only
//! configures `tracing` output, written to stderr and never persisted.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Environment variable holding a tracing filter directive.
pub const LOG_ENV: &str = "RALPH_LOG";

/// Install the global subscriber.
///
/// `RALPH_LOG` wins when set; otherwise the level is `debug` with `--verbose`
/// and `warn` without.
pub fn init(verbose: bool) {
    let default = if verbose { "ralph=debug" } else { "warn" };
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default));

    // A second init (e.g. from tests) is harmless.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .try_init();
}
