//! Module registry
//!
//! Owns the registered modules, drives them through their lifecycle in
//! dependency order, and tracks per-module phase and health.

use futures::future::{join_all, BoxFuture, Shared};
use futures::FutureExt;
use serde::Serialize;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::config::{HealthConfig, ModuleConfig};
use crate::module::api::events::EventRouter;
use crate::module::error::{
    LifecycleCause, LifecycleError, LifecycleOperation, RegistrationError, RuntimeError,
};
use crate::module::health::{HealthReport, ModuleHealthReport};
use crate::module::registry::{ModuleDependencies, ModuleDescriptor};
use crate::module::traits::{HealthStatus, Module, ModuleContext, ModuleState, ResourceMap};
use crate::module::validation::{DescriptorValidator, ValidationResult};
use crate::tenant::TenantId;
use crate::utils::{current_timestamp, panic_message, with_custom_timeout};

/// Route prefix under which a live module is mounted by the gateway
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MountPoint {
    pub module_id: String,
    pub path: String,
}

/// Outcome of [`ModuleRegistry::shutdown_all`]
#[derive(Debug, Default)]
pub struct ShutdownReport {
    /// Modules in the order shutdown was attempted
    pub attempted: Vec<String>,
    pub failures: Vec<LifecycleError>,
}

impl ShutdownReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

struct PhaseRecord {
    state: ModuleState,
    consecutive_failures: u32,
}

/// Registered module entry
struct RegisteredModule {
    descriptor: Arc<ModuleDescriptor>,
    module: Arc<dyn Module>,
    /// Short, non-async lock for phase snapshots
    record: RwLock<PhaseRecord>,
    /// Serializes lifecycle transitions of this module
    transition: tokio::sync::Mutex<()>,
}

impl RegisteredModule {
    fn id(&self) -> &str {
        self.descriptor.id()
    }

    fn phase(&self) -> ModuleState {
        self.record
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .state
            .clone()
    }

    /// Apply a transition if the state machine allows it
    fn set_phase(&self, next: ModuleState) -> bool {
        let mut record = self.record.write().unwrap_or_else(PoisonError::into_inner);
        if !record.state.can_transition_to(&next) {
            warn!(
                "Module {}: rejected transition {} -> {}",
                self.id(),
                record.state,
                next
            );
            return false;
        }
        info!("Module {}: {} -> {}", self.id(), record.state.name(), next);
        record.state = next;
        true
    }
}

type InitFuture<'a> = Shared<BoxFuture<'a, bool>>;

/// Module registry
pub struct ModuleRegistry {
    /// Registration order
    modules: RwLock<Vec<Arc<RegisteredModule>>>,
    /// Set once `initialize_all` has begun
    sealed: AtomicBool,
    /// Order in which initialization actually completed
    init_order: Mutex<Vec<String>>,
    router: Arc<EventRouter>,
    validator: DescriptorValidator,
    resources: ResourceMap,
    module_configs: HashMap<String, HashMap<String, String>>,
    route_prefix: String,
    health_timeout: Duration,
    degraded_after_failures: u32,
}

impl ModuleRegistry {
    /// Create a registry with default module and health settings
    pub fn new(router: Arc<EventRouter>) -> Self {
        Self::with_config(router, &ModuleConfig::default(), &HealthConfig::default())
    }

    /// Create a registry from configuration
    pub fn with_config(
        router: Arc<EventRouter>,
        modules: &ModuleConfig,
        health: &HealthConfig,
    ) -> Self {
        Self {
            modules: RwLock::new(Vec::new()),
            sealed: AtomicBool::new(false),
            init_order: Mutex::new(Vec::new()),
            router,
            validator: DescriptorValidator::new(),
            resources: ResourceMap::new(),
            module_configs: modules.module_configs.clone(),
            route_prefix: modules.route_prefix.clone(),
            health_timeout: health.check_timeout(),
            degraded_after_failures: health.degraded_after_failures.max(1),
        }
    }

    /// Shared resources handed to every module at initialization
    pub fn with_resources(mut self, resources: ResourceMap) -> Self {
        self.resources = resources;
        self
    }

    /// Event router backing every module's event handle
    pub fn router(&self) -> &Arc<EventRouter> {
        &self.router
    }

    /// Register a module
    pub fn register(
        &self,
        descriptor: ModuleDescriptor,
        module: Arc<dyn Module>,
    ) -> Result<(), RegistrationError> {
        if self.sealed.load(Ordering::SeqCst) {
            return Err(RegistrationError::Sealed);
        }

        if let ValidationResult::Invalid(errors) = self.validator.validate(&descriptor) {
            return Err(RegistrationError::InvalidDescriptor {
                module: descriptor.id().to_string(),
                errors,
            });
        }

        let mut modules = self.modules.write().unwrap_or_else(PoisonError::into_inner);
        // Re-checked under the lock so a racing initialize_all cannot miss this entry
        if self.sealed.load(Ordering::SeqCst) {
            return Err(RegistrationError::Sealed);
        }
        if modules.iter().any(|m| m.id() == descriptor.id()) {
            return Err(RegistrationError::DuplicateIdentifier(
                descriptor.id().to_string(),
            ));
        }

        info!(
            "Registered module {} v{} (depends on: {:?})",
            descriptor.id(),
            descriptor.version(),
            descriptor.dependencies()
        );
        modules.push(Arc::new(RegisteredModule {
            descriptor: Arc::new(descriptor),
            module,
            record: RwLock::new(PhaseRecord {
                state: ModuleState::Registered,
                consecutive_failures: 0,
            }),
            transition: tokio::sync::Mutex::new(()),
        }));
        Ok(())
    }

    /// Initialize every registered module in dependency order
    ///
    /// A module starts only after all of its dependencies are `Ready`;
    /// independent modules initialize concurrently. When a module fails,
    /// its transitive dependents are marked `Failed` without being
    /// initialized, while unrelated branches continue. Every failure is
    /// returned.
    pub async fn initialize_all(&self) -> Result<(), RuntimeError> {
        let entries = {
            let modules = self.modules.write().unwrap_or_else(PoisonError::into_inner);
            if self.sealed.swap(true, Ordering::SeqCst) {
                return Err(RegistrationError::Sealed.into());
            }
            modules.clone()
        };

        let descriptors: Vec<ModuleDescriptor> =
            entries.iter().map(|e| (*e.descriptor).clone()).collect();
        let resolution = match ModuleDependencies::resolve(&descriptors) {
            Ok(resolution) => resolution,
            Err(e) => {
                // Nothing has started; allow the caller to fix registrations.
                self.sealed.store(false, Ordering::SeqCst);
                error!("Module graph rejected: {}", e);
                return Err(e);
            }
        };

        info!(
            "Initializing {} module(s), resolved order: {:?}",
            resolution.load_order.len(),
            resolution.load_order
        );

        let by_id: HashMap<&str, &Arc<RegisteredModule>> =
            entries.iter().map(|e| (e.id(), e)).collect();
        let failures: Mutex<Vec<LifecycleError>> = Mutex::new(Vec::new());
        let mut tasks: HashMap<&str, InitFuture<'_>> = HashMap::new();

        for id in &resolution.load_order {
            let Some(entry) = by_id.get(id.as_str()).copied() else {
                continue;
            };
            // Load order puts every dependency before its dependents.
            let dependencies: Vec<(&str, InitFuture<'_>)> = entry
                .descriptor
                .dependencies()
                .iter()
                .filter_map(|dep| tasks.get(dep.as_str()).map(|f| (dep.as_str(), f.clone())))
                .collect();
            let failures = &failures;

            let task = async move {
                for (dependency, ready) in dependencies {
                    if !ready.await {
                        self.fail_dependent(entry, dependency, failures);
                        return false;
                    }
                }
                self.initialize_one(entry, failures).await
            }
            .boxed()
            .shared();
            tasks.insert(id.as_str(), task);
        }

        join_all(tasks.into_values()).await;

        let mut failures = failures.into_inner().unwrap_or_else(PoisonError::into_inner);
        if failures.is_empty() {
            info!("All modules initialized");
            return Ok(());
        }

        failures.sort_by_key(|f| resolution.position(&f.module_id));
        for failure in failures.iter().filter(|f| f.is_direct()) {
            let dependents = resolution.dependents_of(&failure.module_id);
            if !dependents.is_empty() {
                warn!(
                    "Module {} failed; dependents not initialized: {:?}",
                    failure.module_id, dependents
                );
            }
        }
        error!(
            "{} module(s) failed to initialize ({} direct)",
            failures.len(),
            failures.iter().filter(|f| f.is_direct()).count()
        );
        Err(RuntimeError::Initialization(failures))
    }

    async fn initialize_one(
        &self,
        entry: &RegisteredModule,
        failures: &Mutex<Vec<LifecycleError>>,
    ) -> bool {
        let _transition = entry.transition.lock().await;
        if !entry.set_phase(ModuleState::Initializing) {
            return false;
        }

        let context = self.context_for(entry.id());
        let started = Instant::now();
        let outcome = AssertUnwindSafe(entry.module.initialize(context))
            .catch_unwind()
            .await;

        let cause = match outcome {
            Ok(Ok(())) => {
                entry.set_phase(ModuleState::Ready);
                self.init_order
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push(entry.id().to_string());
                debug!(
                    "Module {} initialized in {:?}",
                    entry.id(),
                    started.elapsed()
                );
                return true;
            }
            Ok(Err(e)) => LifecycleCause::Module(e),
            Err(panic) => LifecycleCause::Panicked(panic_message(panic.as_ref())),
        };

        error!("Module {} failed to initialize: {}", entry.id(), cause);
        entry.set_phase(ModuleState::Failed(cause.to_string()));
        failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(LifecycleError::new(
                entry.id(),
                LifecycleOperation::Initialize,
                cause,
            ));
        false
    }

    fn fail_dependent(
        &self,
        entry: &RegisteredModule,
        dependency: &str,
        failures: &Mutex<Vec<LifecycleError>>,
    ) {
        warn!(
            "Skipping initialization of {}: dependency {} failed",
            entry.id(),
            dependency
        );
        let cause = LifecycleCause::DependencyFailed(dependency.to_string());
        entry.set_phase(ModuleState::Failed(cause.to_string()));
        failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(LifecycleError::new(
                entry.id(),
                LifecycleOperation::Initialize,
                cause,
            ));
    }

    fn context_for(&self, module_id: &str) -> ModuleContext {
        ModuleContext::new(
            module_id.to_string(),
            self.module_configs
                .get(module_id)
                .cloned()
                .unwrap_or_default(),
            self.router.scoped(module_id),
            self.resources.clone(),
        )
    }

    /// Shut down every initialized module in reverse initialization order
    ///
    /// Each module's subscriptions are removed as it enters `ShuttingDown`.
    /// Every module gets an attempt; failures are collected.
    pub async fn shutdown_all(&self) -> ShutdownReport {
        let order: Vec<String> = self
            .init_order
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .rev()
            .cloned()
            .collect();

        info!("Shutting down {} module(s): {:?}", order.len(), order);
        let mut report = ShutdownReport::default();

        for id in order {
            let Some(entry) = self.entry(&id) else {
                continue;
            };
            let _transition = entry.transition.lock().await;
            if !entry.phase().is_live() {
                debug!("Module {} is {}, skipping shutdown", id, entry.phase());
                continue;
            }
            if !entry.set_phase(ModuleState::ShuttingDown) {
                continue;
            }
            report.attempted.push(id.clone());

            self.router.unsubscribe_owner(&id).await;

            let outcome = AssertUnwindSafe(entry.module.shutdown())
                .catch_unwind()
                .await;
            let cause = match outcome {
                Ok(Ok(())) => {
                    entry.set_phase(ModuleState::Stopped);
                    continue;
                }
                Ok(Err(e)) => LifecycleCause::Module(e),
                Err(panic) => LifecycleCause::Panicked(panic_message(panic.as_ref())),
            };

            error!("Module {} failed to shut down: {}", id, cause);
            entry.set_phase(ModuleState::Failed(cause.to_string()));
            report
                .failures
                .push(LifecycleError::new(id, LifecycleOperation::Shutdown, cause));
        }

        if report.is_clean() {
            info!("All modules shut down");
        } else {
            warn!("{} module(s) failed to shut down", report.failures.len());
        }
        report
    }

    /// Run health checks with the configured timeout
    pub async fn check_health(&self) -> HealthReport {
        self.health(self.health_timeout).await
    }

    /// Run every live module's health check concurrently
    ///
    /// A check that exceeds `timeout` is reported `Degraded`. After the
    /// configured number of consecutive failed checks (or event deliveries)
    /// a `Ready` module becomes `Degraded`; a passing check restores it.
    pub async fn health(&self, timeout: Duration) -> HealthReport {
        let entries = self.snapshot();
        let checks = entries.iter().map(|entry| self.check_module(entry, timeout));
        let modules = join_all(checks).await;
        HealthReport::new(modules, current_timestamp())
    }

    async fn check_module(&self, entry: &RegisteredModule, timeout: Duration) -> ModuleHealthReport {
        let phase = entry.phase();
        if !phase.is_live() {
            return ModuleHealthReport {
                module_id: entry.id().to_string(),
                status: HealthStatus::Down,
                message: Some(format!("module is {}", phase)),
                consecutive_failures: 0,
                response_time_ms: None,
                phase,
            };
        }

        let started = Instant::now();
        let probe = AssertUnwindSafe(entry.module.health_check()).catch_unwind();
        let (mut status, mut message) = match with_custom_timeout(probe, timeout).await {
            Ok(Ok(status)) => (status, None),
            Ok(Err(panic)) => (
                HealthStatus::Unhealthy,
                Some(format!("health check panicked: {}", panic_message(panic.as_ref()))),
            ),
            Err(_) => (
                HealthStatus::Degraded,
                Some(format!("health check timed out after {:?}", timeout)),
            ),
        };
        let response_time_ms = started.elapsed().as_secs_f64() * 1000.0;

        let delivery = self.router.delivery_health(entry.id());
        let delivery_failures = u32::try_from(delivery.consecutive_failures).unwrap_or(u32::MAX);
        if delivery_failures >= self.degraded_after_failures && status == HealthStatus::Healthy {
            status = HealthStatus::Degraded;
            message = Some(format!(
                "{} consecutive event delivery failures (last: {})",
                delivery_failures,
                delivery.last_error.as_deref().unwrap_or("unknown")
            ));
        }

        let consecutive_failures = {
            let mut record = entry.record.write().unwrap_or_else(PoisonError::into_inner);
            if status == HealthStatus::Healthy {
                record.consecutive_failures = 0;
            } else {
                record.consecutive_failures = record.consecutive_failures.saturating_add(1);
            }
            record.consecutive_failures.max(delivery_failures)
        };

        // Skip the phase update when a lifecycle transition is in flight.
        if let Ok(_transition) = entry.transition.try_lock() {
            match entry.phase() {
                ModuleState::Ready if consecutive_failures >= self.degraded_after_failures => {
                    warn!(
                        "Module {} degraded after {} consecutive failures",
                        entry.id(),
                        consecutive_failures
                    );
                    entry.set_phase(ModuleState::Degraded);
                }
                ModuleState::Degraded if status == HealthStatus::Healthy => {
                    info!("Module {} recovered", entry.id());
                    entry.set_phase(ModuleState::Ready);
                }
                _ => {}
            }
        }

        ModuleHealthReport {
            module_id: entry.id().to_string(),
            phase: entry.phase(),
            status,
            message,
            consecutive_failures,
            response_time_ms: Some(response_time_ms),
        }
    }

    /// Dispatch `on_tenant_created` to live modules in initialization order
    pub async fn notify_tenant_created(&self, tenant: &TenantId) -> Vec<LifecycleError> {
        self.dispatch_tenant_hook(tenant, LifecycleOperation::TenantCreated)
            .await
    }

    /// Dispatch `on_tenant_deleted` to live modules in reverse initialization order
    pub async fn notify_tenant_deleted(&self, tenant: &TenantId) -> Vec<LifecycleError> {
        self.dispatch_tenant_hook(tenant, LifecycleOperation::TenantDeleted)
            .await
    }

    async fn dispatch_tenant_hook(
        &self,
        tenant: &TenantId,
        operation: LifecycleOperation,
    ) -> Vec<LifecycleError> {
        let mut order = self.initialization_order();
        if operation == LifecycleOperation::TenantDeleted {
            order.reverse();
        }

        let mut failures = Vec::new();
        for id in order {
            let Some(entry) = self.entry(&id) else {
                continue;
            };
            if !entry.phase().is_live() {
                continue;
            }

            let call = match operation {
                LifecycleOperation::TenantDeleted => entry.module.on_tenant_deleted(tenant),
                _ => entry.module.on_tenant_created(tenant),
            };
            let cause = match AssertUnwindSafe(call).catch_unwind().await {
                Ok(Ok(())) => continue,
                Ok(Err(e)) => LifecycleCause::Module(e),
                Err(panic) => LifecycleCause::Panicked(panic_message(panic.as_ref())),
            };
            warn!("Module {} {} for tenant {} failed: {}", id, operation, tenant, cause);
            failures.push(LifecycleError::new(id, operation, cause));
        }

        debug!(
            "Tenant {} {} dispatched ({} failure(s))",
            tenant,
            operation,
            failures.len()
        );
        failures
    }

    /// Current phase of a module
    pub fn phase(&self, module_id: &str) -> Option<ModuleState> {
        self.entry(module_id).map(|e| e.phase())
    }

    /// Phases of all modules, in registration order
    pub fn status(&self) -> Vec<(String, ModuleState)> {
        self.snapshot()
            .iter()
            .map(|e| (e.id().to_string(), e.phase()))
            .collect()
    }

    pub fn descriptor(&self, module_id: &str) -> Option<Arc<ModuleDescriptor>> {
        self.entry(module_id).map(|e| Arc::clone(&e.descriptor))
    }

    /// Order in which module initialization completed
    pub fn initialization_order(&self) -> Vec<String> {
        self.init_order
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Route prefixes of live modules, in initialization order
    pub fn mount_points(&self) -> Vec<MountPoint> {
        let prefix = self.route_prefix.trim_end_matches('/');
        self.initialization_order()
            .into_iter()
            .filter(|id| self.phase(id).map_or(false, |p| p.is_live()))
            .map(|id| MountPoint {
                path: format!("{}/{}", prefix, id),
                module_id: id,
            })
            .collect()
    }

    pub fn contains(&self, module_id: &str) -> bool {
        self.entry(module_id).is_some()
    }

    pub fn len(&self) -> usize {
        self.modules
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether initialization has begun
    pub fn is_sealed(&self) -> bool {
        self.sealed.load(Ordering::SeqCst)
    }

    fn entry(&self, module_id: &str) -> Option<Arc<RegisteredModule>> {
        self.modules
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|m| m.id() == module_id)
            .cloned()
    }

    fn snapshot(&self) -> Vec<Arc<RegisteredModule>> {
        self.modules
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
