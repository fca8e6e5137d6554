//! Shared helpers for integration tests
//!
//! `RecordingModule` writes every lifecycle call it receives to a shared
//! `Journal`, so tests can assert on global call order across modules.

#![allow(dead_code)]

use async_trait::async_trait;
use platform_core::module::api::{handler_fn, EventEnvelope};
use platform_core::module::{HealthStatus, Module, ModuleContext, ModuleDescriptor, ModuleError};
use platform_core::tenant::TenantId;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::sleep;

/// Ordered log of lifecycle calls, shared by all modules in a test
#[derive(Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, entry: impl Into<String>) {
        self.0.lock().unwrap().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    /// Module ids of entries recorded as `<action>:<id>`, in order
    pub fn ids(&self, action: &str) -> Vec<String> {
        let prefix = format!("{}:", action);
        self.entries()
            .into_iter()
            .filter_map(|e| e.strip_prefix(&prefix).map(str::to_string))
            .collect()
    }
}

/// Tracks how many modules are inside `initialize` at once
#[derive(Default)]
pub struct Gauge {
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl Gauge {
    fn enter(&self) {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    fn exit(&self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[derive(Clone)]
pub enum InitBehavior {
    Succeed,
    Fail(String),
    Panic,
}

/// Module double that records lifecycle calls
pub struct RecordingModule {
    id: String,
    journal: Journal,
    init: InitBehavior,
    init_delay: Option<Duration>,
    shutdown_fails: bool,
    health: Mutex<HealthStatus>,
    health_delay: Mutex<Option<Duration>>,
    gauge: Option<Arc<Gauge>>,
    subscription: Option<(String, TenantId)>,
}

impl RecordingModule {
    pub fn new(id: &str, journal: &Journal) -> Self {
        Self {
            id: id.to_string(),
            journal: journal.clone(),
            init: InitBehavior::Succeed,
            init_delay: None,
            shutdown_fails: false,
            health: Mutex::new(HealthStatus::Healthy),
            health_delay: Mutex::new(None),
            gauge: None,
            subscription: None,
        }
    }

    pub fn failing(mut self, reason: &str) -> Self {
        self.init = InitBehavior::Fail(reason.to_string());
        self
    }

    pub fn panicking(mut self) -> Self {
        self.init = InitBehavior::Panic;
        self
    }

    pub fn with_init_delay(mut self, delay: Duration) -> Self {
        self.init_delay = Some(delay);
        self
    }

    pub fn failing_shutdown(mut self) -> Self {
        self.shutdown_fails = true;
        self
    }

    pub fn with_gauge(mut self, gauge: &Arc<Gauge>) -> Self {
        self.gauge = Some(Arc::clone(gauge));
        self
    }

    /// Subscribe to `pattern` under `tenant` during initialization
    pub fn subscribing(mut self, pattern: &str, tenant: &str) -> Self {
        self.subscription = Some((pattern.to_string(), TenantId::parse(tenant).unwrap()));
        self
    }

    pub fn set_health(&self, status: HealthStatus) {
        *self.health.lock().unwrap() = status;
    }

    pub fn set_health_delay(&self, delay: Option<Duration>) {
        *self.health_delay.lock().unwrap() = delay;
    }
}

#[async_trait]
impl Module for RecordingModule {
    async fn initialize(&self, context: ModuleContext) -> Result<(), ModuleError> {
        if let Some(gauge) = &self.gauge {
            gauge.enter();
        }
        if let Some(delay) = self.init_delay {
            sleep(delay).await;
        }
        if let Some(gauge) = &self.gauge {
            gauge.exit();
        }

        match &self.init {
            InitBehavior::Succeed => {}
            InitBehavior::Fail(reason) => {
                self.journal.record(format!("init-failed:{}", self.id));
                return Err(ModuleError::InitializationError(reason.clone()));
            }
            InitBehavior::Panic => panic!("{} exploded during initialize", self.id),
        }

        if let Some((pattern, tenant)) = &self.subscription {
            let journal = self.journal.clone();
            let id = self.id.clone();
            context
                .events
                .subscribe(
                    pattern,
                    tenant,
                    handler_fn(move |event: Arc<EventEnvelope>| {
                        let journal = journal.clone();
                        let id = id.clone();
                        async move {
                            journal.record(format!("event:{}:{}", id, event.event_type));
                            Ok(())
                        }
                    }),
                )
                .map_err(|e| ModuleError::InitializationError(e.to_string()))?;
        }

        self.journal.record(format!("init:{}", self.id));
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), ModuleError> {
        self.journal.record(format!("shutdown:{}", self.id));
        if self.shutdown_fails {
            return Err(ModuleError::ShutdownError("connection pool stuck".into()));
        }
        Ok(())
    }

    async fn health_check(&self) -> HealthStatus {
        let delay = *self.health_delay.lock().unwrap();
        if let Some(delay) = delay {
            sleep(delay).await;
        }
        *self.health.lock().unwrap()
    }

    async fn on_tenant_created(&self, tenant: &TenantId) -> Result<(), ModuleError> {
        self.journal
            .record(format!("tenant-created:{}:{}", self.id, tenant));
        Ok(())
    }

    async fn on_tenant_deleted(&self, tenant: &TenantId) -> Result<(), ModuleError> {
        self.journal
            .record(format!("tenant-deleted:{}:{}", self.id, tenant));
        Ok(())
    }
}

/// Descriptor with version 1.0.0 and the given dependencies
pub fn descriptor(id: &str, deps: &[&str]) -> ModuleDescriptor {
    ModuleDescriptor::new(id, "1.0.0").with_dependencies(deps.iter().copied())
}

pub fn tenant(id: &str) -> TenantId {
    TenantId::parse(id).unwrap()
}

/// Poll `condition` until it holds or one second passes
pub async fn eventually<F: Fn() -> bool>(condition: F) -> bool {
    for _ in 0..200 {
        if condition() {
            return true;
        }
        sleep(Duration::from_millis(5)).await;
    }
    condition()
}
