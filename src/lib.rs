//! Platform Core - module runtime for a multi-tenant platform
//!
//! This crate hosts independently developed product modules behind a shared
//! gateway. It accepts module registrations, resolves their declared
//! dependencies into a safe initialization order, drives each module through
//! its lifecycle, and connects modules through a tenant-scoped, topic-routed
//! event channel.
//!
//! ## Components
//!
//! 1. [`module::registry`] - descriptors, catalogs and dependency resolution
//! 2. [`module::ModuleRegistry`] - lifecycle orchestration and health
//! 3. [`module::EventRouter`] - tenant-scoped publish/subscribe
//! 4. [`tenant::TenantContextGate`] - validates the tenant identity of inbound calls
//! 5. [`PlatformRuntime`] - owns all of the above for one process
//!
//! ## Design Principles
//!
//! 1. **Dependencies First**: no module starts before every dependency is ready
//! 2. **Tenant Isolation**: events never cross tenant boundaries
//! 3. **Failure Containment**: a failing module only takes down its dependents
//! 4. **Event Ownership**: a module subscribes and publishes only under its own id
//!
//! ## Example
//!
//! ```rust,no_run
//! use platform_core::{PlatformRuntime, RuntimeConfig};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let runtime = PlatformRuntime::new(RuntimeConfig::default())?;
//! // runtime.register(descriptor, Arc::new(MyModule))?;
//! let mounts = runtime.start().await?;
//! # let _ = mounts;
//! runtime.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod module;
pub mod runtime;
pub mod tenant;
pub mod utils;

pub use config::{
    EventRouterConfig, HealthConfig, LoggingConfig, ModuleConfig, RuntimeConfig, TenantConfig,
};
pub use module::{
    EventEnvelope, EventHandler, EventRouter, HealthReport, HealthStatus, Module, ModuleContext,
    ModuleDescriptor, ModuleError, ModuleEvents, ModuleRegistry, ModuleState, RuntimeError,
};
pub use runtime::PlatformRuntime;
pub use tenant::{RawIdentity, TenantContext, TenantContextGate, TenantId};
