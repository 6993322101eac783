use std::env;
use std::io;

use tracing_subscriber::EnvFilter;

/// Install the stderr subscriber for the binary.
///
/// `RUST_LOG` wins when set, then `LOG_LEVEL`, then `warn` (`error` when
/// quiet).
pub fn init_logging(quiet: bool) {
    let default = if quiet { "error" } else { "warn" };
    let level = env::var("LOG_LEVEL").unwrap_or_else(|_| default.to_string());
    let level = level.to_lowercase();

    let filter = match env::var("RUST_LOG") {
        Ok(rust_log) => EnvFilter::new(rust_log),
        Err(_) => EnvFilter::new(level),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}
