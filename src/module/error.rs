//! Runtime error taxonomy
//!
//! Registration and graph errors are fatal to startup. Lifecycle errors are
//! scoped to one module (and its dependents). Delivery errors never leave the
//! event router; authentication errors go back to the caller only.

use std::fmt;
use thiserror::Error;

use crate::module::api::events::RouterError;
use crate::module::traits::ModuleError;
use crate::tenant::AuthenticationError;

/// Errors raised while registering modules
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistrationError {
    #[error("Module identifier already registered: {0}")]
    DuplicateIdentifier(String),

    #[error("Module {module} depends on unregistered module {dependency}")]
    UnknownDependency { module: String, dependency: String },

    #[error("Invalid descriptor for module {module}: {}", .errors.join("; "))]
    InvalidDescriptor { module: String, errors: Vec<String> },

    #[error("Registry is sealed: initialization has already begun")]
    Sealed,
}

/// Errors in the dependency graph
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    /// `path` starts and ends with the same identifier
    #[error("Circular dependency detected: {}", .path.join(" -> "))]
    Cycle { path: Vec<String> },
}

/// Lifecycle operation a module was performing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleOperation {
    Initialize,
    Shutdown,
    TenantCreated,
    TenantDeleted,
}

impl fmt::Display for LifecycleOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LifecycleOperation::Initialize => "initialize",
            LifecycleOperation::Shutdown => "shutdown",
            LifecycleOperation::TenantCreated => "on_tenant_created",
            LifecycleOperation::TenantDeleted => "on_tenant_deleted",
        })
    }
}

/// Why a lifecycle operation failed
#[derive(Debug, Error)]
pub enum LifecycleCause {
    #[error(transparent)]
    Module(#[from] ModuleError),

    #[error("dependency {0} did not become ready")]
    DependencyFailed(String),

    #[error("module panicked: {0}")]
    Panicked(String),
}

/// Per-module lifecycle failure
#[derive(Debug, Error)]
#[error("{operation} failed for module {module_id}: {cause}")]
pub struct LifecycleError {
    pub module_id: String,
    pub operation: LifecycleOperation,
    #[source]
    pub cause: LifecycleCause,
}

impl LifecycleError {
    pub fn new(
        module_id: impl Into<String>,
        operation: LifecycleOperation,
        cause: impl Into<LifecycleCause>,
    ) -> Self {
        Self {
            module_id: module_id.into(),
            operation,
            cause: cause.into(),
        }
    }

    /// Whether the module itself failed, as opposed to being skipped
    pub fn is_direct(&self) -> bool {
        !matches!(self.cause, LifecycleCause::DependencyFailed(_))
    }
}

/// Top-level error returned by registry and runtime entry points
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Registration(#[from] RegistrationError),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error("{} module(s) failed to initialize: {}", .0.len(), describe_failures(.0))]
    Initialization(Vec<LifecycleError>),

    #[error(transparent)]
    Router(#[from] RouterError),

    #[error(transparent)]
    Authentication(#[from] AuthenticationError),

    #[error("Module not found: {0}")]
    ModuleNotFound(String),
}

impl RuntimeError {
    /// Failures recorded by `initialize_all`, if this is an initialization error
    pub fn initialization_failures(&self) -> &[LifecycleError] {
        match self {
            RuntimeError::Initialization(failures) => failures,
            _ => &[],
        }
    }
}

fn describe_failures(failures: &[LifecycleError]) -> String {
    failures
        .iter()
        .map(|f| format!("{} ({})", f.module_id, f.cause))
        .collect::<Vec<_>>()
        .join(", ")
}
