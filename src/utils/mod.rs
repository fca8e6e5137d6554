//! Shared helpers: logging setup, environment access, time and timeouts

pub mod env;
pub mod error;
pub mod logging;
pub mod time;
pub mod timeout;

// Re-export commonly used items
pub use env::{env_bool, env_opt, env_or_default};
pub use error::panic_message;
pub use logging::{init_logging, init_logging_from_config};
#[cfg(feature = "json-logging")]
pub use logging::init_json_logging;
pub use time::current_timestamp;
pub use timeout::{
    optional_timeout, with_custom_timeout, DEFAULT_HANDLER_TIMEOUT, DEFAULT_HEALTH_CHECK_TIMEOUT,
};
