use std::io::IsTerminal;
use tracing::Level;

use crate::cli::CliArgs;

/// Default tracing filter expression for INFO level logging.
const DEFAULT_TRACING_FILTER: &str = "info";

/// Initialize tracing/logging based on the contents of the parsed CLI args.
///
/// Everything dirvana prints on stdout is meant to be `eval`-ed by the host
/// shell, so all diagnostics go to stderr and default to WARN.
///
/// # Verbosity levels
///
/// - `0`: WARN and ERROR only, simple format with color (silent on happy path)
/// - `1`: INFO level, structured format with timestamp/target
/// - `2`: DEBUG level, structured format
/// - `3+`: TRACE level, structured format
///
/// # Environment variable support
///
/// Log filtering can be controlled via environment variables in priority order:
/// 1. `DIRVANA_LOG` - dirvana-specific log filter (checked first)
/// 2. `RUST_LOG` - standard Rust log filter (fallback)
/// 3. `DIRVANA_LOG_LEVEL` - legacy single-level knob used by the shell hooks
///    (e.g. `DIRVANA_LOG_LEVEL=debug`)
/// 4. Hard-coded defaults based on verbosity level
///
/// # Panics
///
/// This function will panic if called more than once in the same process, as the
/// global tracing subscriber can only be initialized once.
pub(crate) fn init(args: &CliArgs) {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let (level, use_simple_format) = match args.verbose {
        0 => (Level::WARN, true),
        1 => (Level::INFO, false),
        2 => (Level::DEBUG, false),
        _ => (Level::TRACE, false),
    };

    // Try environment variables in priority order:
    // DIRVANA_LOG > RUST_LOG > DIRVANA_LOG_LEVEL > hard-coded default
    let filter = EnvFilter::try_from_env("DIRVANA_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .or_else(|_| EnvFilter::try_from_env("DIRVANA_LOG_LEVEL"))
        .unwrap_or_else(|_| {
            if args.verbose == 0 {
                EnvFilter::new("warn")
            } else {
                EnvFilter::new(format!("{},{}", DEFAULT_TRACING_FILTER, level))
            }
        });

    let use_ansi = std::io::stderr().is_terminal();

    if use_simple_format {
        // Simple format for default (non-verbose) mode: just the message, one per line.
        // Hook users only ever see this when something is actually wrong.
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(false)
                    .with_level(true)
                    .with_ansi(use_ansi)
                    .without_time(),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_level(true)
                    .with_ansi(use_ansi),
            )
            .init();
    }
}

/// Initialize tracing for tests with sensible defaults.
///
/// Uses [`std::sync::OnceLock`] so logging is initialized only once per test
/// process regardless of how many tests call it, and `test_writer()` so output
/// only appears for failed tests unless `--nocapture` is used.
#[cfg(test)]
pub(crate) fn init_test_logging() {
    use std::sync::OnceLock;
    use tracing_subscriber::{EnvFilter, fmt};

    static INIT: OnceLock<()> = OnceLock::new();

    INIT.get_or_init(|| {
        let filter = EnvFilter::try_from_env("DIRVANA_LOG")
            .or_else(|_| EnvFilter::try_from_default_env())
            .unwrap_or_else(|_| EnvFilter::new("debug"));

        fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .with_level(true)
            .init();
    });
}
