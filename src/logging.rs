//! Logging and tracing setup.
//!
//! Every log line goes to **stderr**; stdout belongs to the host framework.
//!
//! # Quick Start
//!
//! ```no_run
//! use dataplat_params::logging::init_logging;
//!
//! init_logging();
//! tracing::info!("reconciler starting");
//! ```
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: Controls log levels (e.g., `info`, `debug`, `dataplat_params=debug`)
//!
//! ```bash
//! # Planned operations and lifecycle transitions
//! RUST_LOG=dataplat_params=debug ./my-provider
//!
//! # Only drift and failures
//! RUST_LOG=warn ./my-provider
//! ```

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::ProviderConfig;

/// Initialize the default logging subscriber.
///
/// This sets up a `tracing` subscriber that:
/// - Writes to **stderr**
/// - Respects the `RUST_LOG` environment variable for filtering
/// - Defaults to `info` level if `RUST_LOG` is not set
///
/// # Panics
///
/// Panics if a global subscriber has already been set.
pub fn init_logging() {
    init_logging_with_default("info");
}

/// Like [`init_logging`], with the filter to use when `RUST_LOG` is not set.
///
/// # Panics
///
/// Panics if a global subscriber has already been set.
pub fn init_logging_with_default(default_level: &str) {
    tracing_subscriber::registry()
        .with(env_filter(default_level))
        .with(stderr_layer())
        .init();
}

/// Initialize logging from provider configuration, falling back to
/// `default_log_level` when `RUST_LOG` is not set.
///
/// Returns false if a subscriber was already set.
pub fn init_logging_from_config(config: &ProviderConfig) -> bool {
    try_init_with(&config.default_log_level)
}

/// Try to initialize logging, returning false if already initialized.
///
/// Unlike [`init_logging`], this does not panic, so tests and embedding hosts
/// can call it more than once.
pub fn try_init_logging() -> bool {
    try_init_with("info")
}

fn try_init_with(default_level: &str) -> bool {
    tracing_subscriber::registry()
        .with(env_filter(default_level))
        .with(stderr_layer())
        .try_init()
        .is_ok()
}

/// `RUST_LOG` if set and valid, otherwise `default_level`, otherwise `info`.
fn env_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

fn stderr_layer<S>() -> impl tracing_subscriber::Layer<S>
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
}

#[cfg(test)]
mod tests {
    // The global subscriber can only be set once per process, so only the
    // non-panicking initializer is exercised here.

    use super::*;

    #[test]
    fn test_env_filter_parsing() {
        assert!(EnvFilter::try_new("info").is_ok());
        assert!(EnvFilter::try_new("dataplat_params=debug").is_ok());
        assert!(EnvFilter::try_new("warn,dataplat_params::lifecycle=trace").is_ok());
        assert!(EnvFilter::try_new("dataplat_params=loudest").is_err());
    }

    #[test]
    fn test_try_init_is_idempotent() {
        let _ = try_init_logging();
        assert!(!try_init_logging());
        assert!(!init_logging_from_config(&ProviderConfig::default()));
    }
}
