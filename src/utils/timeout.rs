//! Timeout utilities
//!
//! Defaults used when configuration does not supply a value. Configured
//! values come from [`EventRouterConfig`](crate::config::EventRouterConfig)
//! and [`HealthConfig`](crate::config::HealthConfig).

use std::time::Duration;
use tokio::time::timeout;

/// Default bound on a single module health check
pub const DEFAULT_HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(5);

/// Default bound on a single event handler invocation
pub const DEFAULT_HANDLER_TIMEOUT: Duration = Duration::from_secs(30);

/// Execute operation with custom timeout
pub async fn with_custom_timeout<F, T>(
    operation: F,
    duration: Duration,
) -> Result<T, tokio::time::error::Elapsed>
where
    F: std::future::Future<Output = T>,
{
    timeout(duration, operation).await
}

/// Convert a millisecond setting to a timeout, where 0 disables it
pub fn optional_timeout(millis: u64) -> Option<Duration> {
    (millis > 0).then(|| Duration::from_millis(millis))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_custom_timeout_elapses() {
        let slow = tokio::time::sleep(Duration::from_secs(5));
        assert!(with_custom_timeout(slow, Duration::from_millis(10)).await.is_err());
        assert_eq!(with_custom_timeout(async { 7 }, Duration::from_secs(1)).await.ok(), Some(7));
    }

    #[test]
    fn test_zero_disables_timeout() {
        assert_eq!(optional_timeout(0), None);
        assert_eq!(optional_timeout(250), Some(Duration::from_millis(250)));
    }
}
