//! Environment variable utilities
//!
//! Provides helpers for reading environment variables with defaults.

/// Get environment variable or return default value
///
/// # Example
/// ```rust
/// use platform_core::utils::env_or_default;
///
/// let filter = env_or_default("PLATFORM_LOG", "info");
/// ```
pub fn env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Get environment variable as Option
///
/// Returns `Some(value)` if set and non-empty, `None` otherwise.
pub fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

/// Get environment variable as boolean
///
/// Returns `true` if value is "true", "1", "yes", "on" (case-insensitive).
/// Returns `false` otherwise or if not set.
pub fn env_bool(key: &str) -> bool {
    std::env::var(key)
        .ok()
        .map(|v| {
            let v_lower = v.to_lowercase();
            v_lower == "true" || v_lower == "1" || v_lower == "yes" || v_lower == "on"
        })
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unset_variables_fall_back() {
        let key = "PLATFORM_CORE_TEST_SURELY_UNSET";
        assert_eq!(env_opt(key), None);
        assert_eq!(env_or_default(key, "info"), "info");
        assert!(!env_bool(key));
    }
}
