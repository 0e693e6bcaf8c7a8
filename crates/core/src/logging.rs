//! Tracing setup for services and scheduled jobs embedding the core.

use tracing_subscriber::{fmt, EnvFilter};

/// Initialize a console tracing subscriber.
///
/// `RUST_LOG` takes precedence over the supplied default level. Returns an
/// error string when a global subscriber was already installed.
pub fn init_logging(default_level: &str) -> Result<(), String> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    fmt()
        .with_target(true)
        .with_env_filter(env_filter)
        .try_init()
        .map_err(|e| format!("Failed to initialize logging: {}", e))
}
