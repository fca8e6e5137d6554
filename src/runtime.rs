//! Platform runtime context
//!
//! [`PlatformRuntime`] owns the configuration, event router, module registry
//! and tenant gate for one process. The gateway constructs it, registers
//! modules, calls [`start`](PlatformRuntime::start), mounts the returned
//! [`MountPoint`]s, and calls [`shutdown`](PlatformRuntime::shutdown) on exit.

use std::sync::Arc;
use tracing::{info, warn};

use crate::config::RuntimeConfig;
use crate::module::api::events::EventRouter;
use crate::module::error::{LifecycleError, RuntimeError};
use crate::module::health::HealthReport;
use crate::module::manager::{ModuleRegistry, MountPoint, ShutdownReport};
use crate::module::registry::{ModuleCatalog, ModuleDescriptor};
use crate::module::traits::{Module, ResourceMap};
use crate::tenant::{RawIdentity, TenantContext, TenantContextGate, TenantId};

/// Runtime context for one process
pub struct PlatformRuntime {
    config: RuntimeConfig,
    router: Arc<EventRouter>,
    registry: ModuleRegistry,
    gate: TenantContextGate,
}

impl PlatformRuntime {
    /// Build a runtime from validated configuration
    pub fn new(config: RuntimeConfig) -> anyhow::Result<Self> {
        Self::with_resources(config, ResourceMap::new())
    }

    /// Build a runtime whose modules receive `resources` at initialization
    pub fn with_resources(config: RuntimeConfig, resources: ResourceMap) -> anyhow::Result<Self> {
        config.validate()?;

        let router = Arc::new(EventRouter::new(&config.events));
        let registry =
            ModuleRegistry::with_config(Arc::clone(&router), &config.modules, &config.health)
                .with_resources(resources);
        let gate = TenantContextGate::from_config(&config.tenant);

        Ok(Self {
            config,
            router,
            registry,
            gate,
        })
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn registry(&self) -> &ModuleRegistry {
        &self.registry
    }

    pub fn router(&self) -> &Arc<EventRouter> {
        &self.router
    }

    pub fn gate(&self) -> &TenantContextGate {
        &self.gate
    }

    /// Register a module unless the configuration disables it
    ///
    /// Returns `false` when the module was skipped.
    pub fn register(
        &self,
        descriptor: ModuleDescriptor,
        module: Arc<dyn Module>,
    ) -> Result<bool, RuntimeError> {
        let enabled = &self.config.modules.enabled_modules;
        if !enabled.is_empty() && !enabled.iter().any(|id| id == descriptor.id()) {
            info!("Module {} not enabled, skipping registration", descriptor.id());
            return Ok(false);
        }
        self.registry.register(descriptor, module)?;
        Ok(true)
    }

    /// Register every enabled catalog entry, taking implementations from `factory`
    ///
    /// Fails with [`RuntimeError::ModuleNotFound`] if the factory has no
    /// implementation for an enabled entry.
    pub fn register_catalog<F>(
        &self,
        catalog: &ModuleCatalog,
        mut factory: F,
    ) -> Result<usize, RuntimeError>
    where
        F: FnMut(&ModuleDescriptor) -> Option<Arc<dyn Module>>,
    {
        let descriptors = catalog.descriptors(&self.config.modules.enabled_modules);
        let count = descriptors.len();
        for descriptor in descriptors {
            let module = factory(&descriptor)
                .ok_or_else(|| RuntimeError::ModuleNotFound(descriptor.id().to_string()))?;
            self.registry.register(descriptor, module)?;
        }
        info!("Registered {} module(s) from catalog", count);
        Ok(count)
    }

    /// Initialize all registered modules
    pub async fn start(&self) -> Result<Vec<MountPoint>, RuntimeError> {
        info!("Starting platform runtime ({} module(s))", self.registry.len());
        self.registry.initialize_all().await?;
        let mounts = self.registry.mount_points();
        info!("Platform runtime started, {} route prefix(es) ready", mounts.len());
        Ok(mounts)
    }

    /// Shut down all modules, then close the event router
    pub async fn shutdown(&self) -> ShutdownReport {
        info!("Shutting down platform runtime");
        let report = self.registry.shutdown_all().await;
        self.router.close().await;
        if !report.is_clean() {
            warn!(
                "Platform runtime stopped with {} shutdown failure(s)",
                report.failures.len()
            );
        }
        report
    }

    /// Validate the identity of an inbound request
    pub fn resolve_tenant(&self, raw: &RawIdentity) -> Result<TenantContext, RuntimeError> {
        Ok(self.gate.resolve(raw)?)
    }

    /// Notify live modules that a tenant was provisioned
    pub async fn tenant_created(&self, tenant: &TenantId) -> Vec<LifecycleError> {
        self.registry.notify_tenant_created(tenant).await
    }

    /// Notify live modules that a tenant was removed, then drop its routing state
    ///
    /// Subscriptions still scoped to the tenant after the hooks ran are
    /// removed along with its topic sequence counters.
    pub async fn tenant_deleted(&self, tenant: &TenantId) -> Vec<LifecycleError> {
        let failures = self.registry.notify_tenant_deleted(tenant).await;
        let leftover = self.router.remove_tenant(tenant).await;
        if leftover > 0 {
            info!(
                "Removed {} subscription(s) left behind for deleted tenant {}",
                leftover, tenant
            );
        }
        failures
    }

    /// Current health of all modules
    pub async fn health(&self) -> HealthReport {
        self.registry.check_health().await
    }

    pub fn mount_points(&self) -> Vec<MountPoint> {
        self.registry.mount_points()
    }
}
