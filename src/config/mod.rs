//! Configuration management for platform-core
//!
//! Handles configuration loading, validation, and environment overrides.
//! Every field has a default, so an empty TOML file is a valid configuration.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use crate::tenant::{TenantIdFormat, TENANT_HEADER};
use crate::utils::{
    env_bool, env_opt, optional_timeout, DEFAULT_HANDLER_TIMEOUT, DEFAULT_HEALTH_CHECK_TIMEOUT,
};

/// Environment variable overriding the log filter (RUST_LOG still wins)
pub const LOG_FILTER_ENV: &str = "PLATFORM_LOG";
/// Environment variable enabling JSON log output
pub const LOG_JSON_ENV: &str = "PLATFORM_LOG_JSON";

/// Module system configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleConfig {
    /// List of enabled modules (empty = every module in the catalog)
    #[serde(default)]
    pub enabled_modules: Vec<String>,

    /// Module-specific configuration, handed to the module at initialization
    #[serde(default)]
    pub module_configs: HashMap<String, HashMap<String, String>>,

    /// Prefix under which the gateway mounts module routes
    #[serde(default = "default_route_prefix")]
    pub route_prefix: String,
}

fn default_route_prefix() -> String {
    "/api".to_string()
}

impl Default for ModuleConfig {
    fn default() -> Self {
        Self {
            enabled_modules: Vec::new(),
            module_configs: HashMap::new(),
            route_prefix: default_route_prefix(),
        }
    }
}

/// Event router configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRouterConfig {
    /// Bounded queue size per subscription
    #[serde(default = "default_queue_capacity")]
    pub subscriber_queue_capacity: usize,

    /// Per-invocation handler timeout in milliseconds (0 = no timeout)
    #[serde(default = "default_handler_timeout_ms")]
    pub handler_timeout_ms: u64,
}

fn default_queue_capacity() -> usize {
    256
}

fn default_handler_timeout_ms() -> u64 {
    DEFAULT_HANDLER_TIMEOUT.as_millis() as u64
}

impl Default for EventRouterConfig {
    fn default() -> Self {
        Self {
            subscriber_queue_capacity: default_queue_capacity(),
            handler_timeout_ms: default_handler_timeout_ms(),
        }
    }
}

impl EventRouterConfig {
    pub fn handler_timeout(&self) -> Option<Duration> {
        optional_timeout(self.handler_timeout_ms)
    }
}

/// Health check configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthConfig {
    /// Bound on each module's health check, in milliseconds
    #[serde(default = "default_check_timeout_ms")]
    pub check_timeout_ms: u64,

    /// Consecutive failures before a Ready module is marked Degraded
    #[serde(default = "default_degraded_after_failures")]
    pub degraded_after_failures: u32,
}

fn default_check_timeout_ms() -> u64 {
    DEFAULT_HEALTH_CHECK_TIMEOUT.as_millis() as u64
}

fn default_degraded_after_failures() -> u32 {
    3
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            check_timeout_ms: default_check_timeout_ms(),
            degraded_after_failures: default_degraded_after_failures(),
        }
    }
}

impl HealthConfig {
    pub fn check_timeout(&self) -> Duration {
        Duration::from_millis(self.check_timeout_ms)
    }
}

/// Tenant identity configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantConfig {
    /// Accepted tenant identifier format
    #[serde(default)]
    pub id_format: TenantIdFormat,

    /// Header carrying the tenant identifier
    #[serde(default = "default_header_name")]
    pub header_name: String,
}

fn default_header_name() -> String {
    TENANT_HEADER.to_string()
}

impl Default for TenantConfig {
    fn default() -> Self {
        Self {
            id_format: TenantIdFormat::default(),
            header_name: default_header_name(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log filter, e.g. "info" or "platform_core::module=debug"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,

    /// Emit JSON logs (requires the `json-logging` feature)
    #[serde(default)]
    pub json_format: bool,
}

impl LoggingConfig {
    /// Filter to use: `PLATFORM_LOG` if set, otherwise the configured one
    pub fn effective_filter(&self) -> Option<String> {
        env_opt(LOG_FILTER_ENV).or_else(|| self.filter.clone())
    }
}

/// Runtime configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub modules: ModuleConfig,

    #[serde(default)]
    pub events: EventRouterConfig,

    #[serde(default)]
    pub health: HealthConfig,

    #[serde(default)]
    pub tenant: TenantConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl RuntimeConfig {
    /// Parse configuration from TOML
    pub fn from_toml_str(contents: &str) -> anyhow::Result<Self> {
        let config: RuntimeConfig =
            toml::from_str(contents).context("Failed to parse runtime configuration")?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml_str(&content)
            .with_context(|| format!("Invalid config file {}", path.display()))
    }

    /// Save configuration to a TOML file
    pub fn to_toml_file<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path.as_ref(), content)?;
        Ok(())
    }

    /// Apply environment overrides
    pub fn apply_env_overrides(&mut self) {
        if let Some(filter) = env_opt(LOG_FILTER_ENV) {
            self.logging.filter = Some(filter);
        }
        if env_bool(LOG_JSON_ENV) {
            self.logging.json_format = true;
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.events.subscriber_queue_capacity == 0 {
            return Err(anyhow::anyhow!(
                "events.subscriber_queue_capacity must be greater than 0"
            ));
        }

        if self.health.check_timeout_ms == 0 {
            return Err(anyhow::anyhow!(
                "health.check_timeout_ms must be greater than 0"
            ));
        }

        if self.health.degraded_after_failures == 0 {
            return Err(anyhow::anyhow!(
                "health.degraded_after_failures must be greater than 0"
            ));
        }

        if !self.modules.route_prefix.starts_with('/') {
            return Err(anyhow::anyhow!(
                "modules.route_prefix must start with '/' (got {:?})",
                self.modules.route_prefix
            ));
        }

        if self.tenant.header_name.trim().is_empty() {
            return Err(anyhow::anyhow!("tenant.header_name cannot be empty"));
        }

        for id in self.modules.module_configs.keys() {
            if !self.modules.enabled_modules.is_empty() && !self.modules.enabled_modules.contains(id)
            {
                tracing::warn!("Configuration given for module {} which is not enabled", id);
            }
        }

        Ok(())
    }
}
