//! Diagnostic logging setup.
//!
//! Everything goes to stderr; stdout carries records only.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Variable consulted when `RUST_LOG` is not set.
const LOG_ENV: &str = "HP_LOG";

/// Install the global subscriber.
///
/// Filter precedence: `RUST_LOG`, then `HP_LOG`, then the built-in default
/// (warnings and errors only, or debug output for this tool with `verbose`).
pub fn init_logging(verbose: bool) {
    let directives = std::env::var("RUST_LOG")
        .or_else(|_| std::env::var(LOG_ENV))
        .unwrap_or_else(|_| default_directives(verbose).to_string());

    let filter = EnvFilter::try_new(&directives)
        .unwrap_or_else(|_| EnvFilter::new(default_directives(verbose)));

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(verbose)
        .with_ansi(console::colors_enabled_stderr());

    // A second init (tests) is harmless.
    let _ = tracing_subscriber::registry()
        .with(stderr_layer)
        .with(filter)
        .try_init();
}

fn default_directives(verbose: bool) -> &'static str {
    if verbose {
        "warn,hostprobe=debug,hostprobe_lib=debug"
    } else {
        "warn"
    }
}
