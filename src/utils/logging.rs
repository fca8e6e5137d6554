//! Logging initialization
//!
//! Sets up a `tracing` subscriber for the process hosting the runtime.
//! Filter precedence:
//! 1. `RUST_LOG`
//! 2. the filter passed in (from [`LoggingConfig`](crate::config::LoggingConfig)
//!    or `PLATFORM_LOG`)
//! 3. `info`
//!
//! # Usage
//! ```rust,no_run
//! use platform_core::utils::init_logging;
//!
//! init_logging(None); // Uses RUST_LOG or defaults to "info"
//! ```

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LoggingConfig;

const DEFAULT_FILTER: &str = "info";

fn build_filter(filter: Option<&str>) -> EnvFilter {
    if std::env::var("RUST_LOG").is_ok() {
        return EnvFilter::from_default_env();
    }
    EnvFilter::new(filter.unwrap_or(DEFAULT_FILTER))
}

/// Initialize human-readable logging to stderr
///
/// `filter` uses `EnvFilter` syntax, e.g. `"info,platform_core::module=debug"`.
/// Silently does nothing if a global subscriber is already installed.
pub fn init_logging(filter: Option<&str>) {
    let _ = tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(false)
                .with_ansi(std::env::var("NO_COLOR").is_err()),
        )
        .with(build_filter(filter))
        .try_init();
}

/// Initialize logging with JSON output, for log aggregation systems
#[cfg(feature = "json-logging")]
pub fn init_json_logging(filter: Option<&str>) {
    let _ = tracing_subscriber::registry()
        .with(
            fmt::layer()
                .json()
                .with_target(true)
                .with_current_span(true)
                .with_span_list(true),
        )
        .with(build_filter(filter))
        .try_init();
}

/// Initialize logging from configuration
///
/// JSON output requires the `json-logging` feature; without it the
/// human-readable format is used.
pub fn init_logging_from_config(config: &LoggingConfig) {
    let filter = config.effective_filter();
    if config.json_format {
        #[cfg(feature = "json-logging")]
        {
            init_json_logging(filter.as_deref());
            return;
        }
    }
    init_logging(filter.as_deref());
}
