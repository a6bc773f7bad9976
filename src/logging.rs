//! Logging setup for binaries and tools built on this crate
//!
//! The library itself only emits `tracing` events; nothing is printed unless
//! the application installs a subscriber. [`init_from_env`] installs the
//! usual one.

use tracing_subscriber::EnvFilter;

/// Environment variable holding the filter directives.
pub const LOG_ENV: &str = "DDCLINK_LOG";

/// Builds the filter from `DDCLINK_LOG`, then `RUST_LOG`, then `warn`.
pub fn env_filter() -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("warn"))
}

/// Installs a fmt subscriber filtered by [`env_filter`].
///
/// Returns false when a global subscriber was already installed.
pub fn init_from_env() -> bool {
    tracing_subscriber::fmt().with_env_filter(env_filter()).with_target(true).try_init().is_ok()
}
