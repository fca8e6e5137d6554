//! Module system
//!
//! Modules are independently developed units with declared dependencies and
//! a lifecycle. The [`ModuleRegistry`] initializes them in dependency order,
//! shuts them down in reverse, and tracks their health; modules talk to each
//! other only through the tenant-scoped [`EventRouter`].
//!
//! ## Guarantees
//!
//! - **Ordering**: no module is initialized before all of its dependencies are `Ready`
//! - **Containment**: a failing or panicking module fails itself and its dependents only
//! - **Isolation**: events published under one tenant never reach another tenant's subscriptions

pub mod api;
pub mod error;
pub mod health;
pub mod manager;
pub mod registry;
pub mod traits;
pub mod validation;

pub use api::{EventEnvelope, EventHandler, EventRouter, ModuleEvents, SubscriptionHandle};
pub use error::{GraphError, LifecycleError, RegistrationError, RuntimeError};
pub use health::{HealthReport, ModuleHealthReport};
pub use manager::{ModuleRegistry, MountPoint, ShutdownReport};
pub use registry::{ModuleCatalog, ModuleDependencies, ModuleDescriptor};
pub use traits::{HealthStatus, Module, ModuleContext, ModuleError, ModuleState, ResourceMap};
