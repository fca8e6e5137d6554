//! Module system traits and interfaces
//!
//! Defines the lifecycle contract every module implements and the context
//! the registry hands to a module when it is initialized.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use crate::module::api::events::ModuleEvents;
use crate::tenant::TenantId;

/// Module lifecycle phase
///
/// Transitions are driven exclusively by the registry. `Stopped` and
/// `Failed` are terminal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModuleState {
    /// Registered, not yet initialized
    Registered,
    /// `initialize()` is in progress
    Initializing,
    /// Initialized and serving
    Ready,
    /// Serving, but health checks or event handlers keep failing
    Degraded,
    /// `shutdown()` is in progress
    ShuttingDown,
    /// Shut down cleanly
    Stopped,
    /// Initialization or shutdown failed (terminal)
    Failed(String),
}

impl ModuleState {
    /// Whether no transition may leave this phase
    pub fn is_terminal(&self) -> bool {
        matches!(self, ModuleState::Stopped | ModuleState::Failed(_))
    }

    /// Whether the module is initialized and not shutting down
    pub fn is_live(&self) -> bool {
        matches!(self, ModuleState::Ready | ModuleState::Degraded)
    }

    /// Check a transition against the lifecycle state machine
    pub fn can_transition_to(&self, next: &ModuleState) -> bool {
        use ModuleState::*;
        matches!(
            (self, next),
            (Registered, Initializing)
                | (Registered, Failed(_))
                | (Initializing, Ready)
                | (Initializing, Failed(_))
                | (Ready, Degraded)
                | (Degraded, Ready)
                | (Ready, ShuttingDown)
                | (Degraded, ShuttingDown)
                | (ShuttingDown, Stopped)
                | (ShuttingDown, Failed(_))
        )
    }

    /// Short lowercase name, used in logs and reports
    pub fn name(&self) -> &'static str {
        match self {
            ModuleState::Registered => "registered",
            ModuleState::Initializing => "initializing",
            ModuleState::Ready => "ready",
            ModuleState::Degraded => "degraded",
            ModuleState::ShuttingDown => "shutting_down",
            ModuleState::Stopped => "stopped",
            ModuleState::Failed(_) => "failed",
        }
    }
}

impl fmt::Display for ModuleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModuleState::Failed(reason) => write!(f, "failed: {}", reason),
            other => f.write_str(other.name()),
        }
    }
}

/// Self-reported module health
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum HealthStatus {
    /// Operating normally
    Healthy,
    /// Functional with reduced capability
    Degraded,
    /// Not functioning correctly
    Unhealthy,
    /// Not running or not responding
    Down,
}

impl HealthStatus {
    /// Severity rank used when aggregating (higher is worse)
    pub(crate) fn severity(self) -> u8 {
        match self {
            HealthStatus::Healthy => 0,
            HealthStatus::Degraded => 1,
            HealthStatus::Unhealthy => 2,
            HealthStatus::Down => 3,
        }
    }
}

/// Module trait that all modules must implement
///
/// One instance exists per process and is shared across tenants, so every
/// method takes `&self`; modules keep their runtime state behind their own
/// synchronization.
#[async_trait]
pub trait Module: Send + Sync {
    /// Initialize the module
    ///
    /// Called once, after every declared dependency is `Ready`. May perform
    /// blocking I/O; the registry imposes no deadline here.
    async fn initialize(&self, context: ModuleContext) -> Result<(), ModuleError>;

    /// Release resources held by the module
    async fn shutdown(&self) -> Result<(), ModuleError>;

    /// Report current health
    async fn health_check(&self) -> HealthStatus {
        HealthStatus::Healthy
    }

    /// Hook called when a tenant is provisioned
    async fn on_tenant_created(&self, _tenant: &TenantId) -> Result<(), ModuleError> {
        Ok(())
    }

    /// Hook called when a tenant is removed
    async fn on_tenant_deleted(&self, _tenant: &TenantId) -> Result<(), ModuleError> {
        Ok(())
    }
}

/// Typed map of shared resources (storage adapters, clients) handed to modules
///
/// The core never manages these resources; it only passes references.
#[derive(Clone, Default)]
pub struct ResourceMap {
    entries: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
}

impl ResourceMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a resource, replacing any previous one of the same type
    pub fn insert<T: Any + Send + Sync>(&mut self, resource: Arc<T>) {
        self.entries.insert(TypeId::of::<T>(), resource);
    }

    /// Look up a resource by type
    pub fn get<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.entries
            .get(&TypeId::of::<T>())
            .and_then(|r| Arc::clone(r).downcast::<T>().ok())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for ResourceMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceMap")
            .field("entries", &self.entries.len())
            .finish()
    }
}

/// Context provided to a module at initialization
#[derive(Debug, Clone)]
pub struct ModuleContext {
    /// Module identifier
    pub module_id: String,
    /// Module configuration (key-value pairs from the runtime config)
    pub config: HashMap<String, String>,
    /// Publish/subscribe access, bound to this module's id
    pub events: ModuleEvents,
    /// Shared resources
    pub resources: ResourceMap,
}

impl ModuleContext {
    /// Create a new module context
    pub fn new(
        module_id: String,
        config: HashMap<String, String>,
        events: ModuleEvents,
        resources: ResourceMap,
    ) -> Self {
        Self {
            module_id,
            config,
            events,
            resources,
        }
    }

    /// Get a configuration value
    pub fn get_config(&self, key: &str) -> Option<&String> {
        self.config.get(key)
    }

    /// Get a configuration value with default
    pub fn get_config_or(&self, key: &str, default: &str) -> String {
        self.config
            .get(key)
            .map(|s| s.as_str())
            .unwrap_or(default)
            .to_string()
    }

    /// Get a shared resource by type
    pub fn resource<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.resources.get::<T>()
    }

    /// Get a shared resource the module cannot run without
    pub fn require_resource<T: Any + Send + Sync>(&self) -> Result<Arc<T>, ModuleError> {
        self.resources
            .get::<T>()
            .ok_or_else(|| ModuleError::ResourceUnavailable(std::any::type_name::<T>().to_string()))
    }
}

/// Errors returned by module implementations
///
/// `ResourceUnavailable` comes from [`ModuleContext::require_resource`];
/// `SerializationError` lets implementations use `?` on `serde_json` calls.
#[derive(Debug, Error)]
pub enum ModuleError {
    #[error("Module initialization failed: {0}")]
    InitializationError(String),

    #[error("Module operation failed: {0}")]
    OperationError(String),

    #[error("Module shutdown failed: {0}")]
    ShutdownError(String),

    #[error("Required resource unavailable: {0}")]
    ResourceUnavailable(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<serde_json::Error> for ModuleError {
    fn from(e: serde_json::Error) -> Self {
        ModuleError::SerializationError(e.to_string())
    }
}

impl From<anyhow::Error> for ModuleError {
    fn from(e: anyhow::Error) -> Self {
        ModuleError::OperationError(e.to_string())
    }
}
