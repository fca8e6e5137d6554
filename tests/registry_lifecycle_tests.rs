//! Module registry lifecycle tests
//!
//! Initialization ordering, failure containment, shutdown ordering, health
//! and tenant hooks.

mod common;

use common::*;
use platform_core::config::{HealthConfig, ModuleConfig};
use platform_core::module::error::{GraphError, LifecycleCause, LifecycleOperation};
use platform_core::module::{
    EventRouter, HealthStatus, ModuleRegistry, ModuleState, RuntimeError,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

fn registry() -> ModuleRegistry {
    ModuleRegistry::new(Arc::new(EventRouter::default()))
}

#[tokio::test]
async fn test_dependencies_initialize_first_and_shut_down_last() {
    let journal = Journal::new();
    let registry = registry();
    // Registered in reverse so ordering cannot come from registration order.
    registry
        .register(descriptor("c", &["a", "b"]), Arc::new(RecordingModule::new("c", &journal)))
        .unwrap();
    registry
        .register(descriptor("b", &["a"]), Arc::new(RecordingModule::new("b", &journal)))
        .unwrap();
    registry
        .register(descriptor("a", &[]), Arc::new(RecordingModule::new("a", &journal)))
        .unwrap();

    registry.initialize_all().await.unwrap();
    assert_eq!(journal.ids("init"), ["a", "b", "c"]);
    assert_eq!(registry.initialization_order(), ["a", "b", "c"]);
    for id in ["a", "b", "c"] {
        assert_eq!(registry.phase(id), Some(ModuleState::Ready));
    }

    let report = registry.shutdown_all().await;
    assert!(report.is_clean());
    assert_eq!(report.attempted, ["c", "b", "a"]);
    assert_eq!(journal.ids("shutdown"), ["c", "b", "a"]);
    for id in ["a", "b", "c"] {
        assert_eq!(registry.phase(id), Some(ModuleState::Stopped));
    }
}

#[tokio::test]
async fn test_cycle_prevents_any_initialization() {
    let journal = Journal::new();
    let registry = registry();
    registry
        .register(descriptor("x", &["y"]), Arc::new(RecordingModule::new("x", &journal)))
        .unwrap();
    registry
        .register(descriptor("y", &["x"]), Arc::new(RecordingModule::new("y", &journal)))
        .unwrap();

    let err = registry.initialize_all().await.unwrap_err();
    match err {
        RuntimeError::Graph(GraphError::Cycle { path }) => assert_eq!(path, ["x", "y", "x"]),
        other => panic!("expected cycle, got {other}"),
    }
    assert!(journal.entries().is_empty());
    assert_eq!(registry.phase("x"), Some(ModuleState::Registered));
    assert_eq!(registry.phase("y"), Some(ModuleState::Registered));
}

#[tokio::test]
async fn test_siblings_initialize_concurrently() {
    let journal = Journal::new();
    let gauge = Arc::new(Gauge::default());
    let registry = registry();
    registry
        .register(descriptor("base", &[]), Arc::new(RecordingModule::new("base", &journal)))
        .unwrap();
    for id in ["left", "right"] {
        registry
            .register(
                descriptor(id, &["base"]),
                Arc::new(
                    RecordingModule::new(id, &journal)
                        .with_init_delay(Duration::from_millis(50))
                        .with_gauge(&gauge),
                ),
            )
            .unwrap();
    }

    registry.initialize_all().await.unwrap();
    assert_eq!(gauge.peak(), 2);
    assert_eq!(journal.ids("init")[0], "base");
}

#[tokio::test]
async fn test_shutdown_reverses_actual_completion_order() {
    let journal = Journal::new();
    let registry = registry();
    registry
        .register(descriptor("a", &[]), Arc::new(RecordingModule::new("a", &journal)))
        .unwrap();
    registry
        .register(
            descriptor("b", &["a"]),
            Arc::new(RecordingModule::new("b", &journal).with_init_delay(Duration::from_millis(50))),
        )
        .unwrap();
    registry
        .register(descriptor("c", &["a"]), Arc::new(RecordingModule::new("c", &journal)))
        .unwrap();

    registry.initialize_all().await.unwrap();
    let completed = registry.initialization_order();
    assert_eq!(completed, ["a", "c", "b"]);

    let report = registry.shutdown_all().await;
    let reversed: Vec<String> = completed.iter().rev().cloned().collect();
    assert_eq!(report.attempted, reversed);
    assert_eq!(journal.ids("shutdown"), reversed);
    assert_eq!(report.attempted.last().map(String::as_str), Some("a"));
}

#[tokio::test]
async fn test_failure_short_circuits_dependents_only() {
    let journal = Journal::new();
    let registry = registry();
    registry
        .register(
            descriptor("netbox", &[]),
            Arc::new(RecordingModule::new("netbox", &journal).failing("api unreachable")),
        )
        .unwrap();
    registry
        .register(
            descriptor("topology", &["netbox"]),
            Arc::new(RecordingModule::new("topology", &journal)),
        )
        .unwrap();
    registry
        .register(
            descriptor("alerts", &["topology"]),
            Arc::new(RecordingModule::new("alerts", &journal)),
        )
        .unwrap();
    registry
        .register(descriptor("ipam", &[]), Arc::new(RecordingModule::new("ipam", &journal)))
        .unwrap();

    let err = registry.initialize_all().await.unwrap_err();
    let failures = err.initialization_failures();
    let ids: Vec<&str> = failures.iter().map(|f| f.module_id.as_str()).collect();
    assert_eq!(ids, ["netbox", "topology", "alerts"]);
    assert!(failures[0].is_direct());
    assert!(matches!(
        &failures[1].cause,
        LifecycleCause::DependencyFailed(dep) if dep == "netbox"
    ));
    assert!(matches!(
        &failures[2].cause,
        LifecycleCause::DependencyFailed(dep) if dep == "topology"
    ));
    assert!(failures
        .iter()
        .all(|f| f.operation == LifecycleOperation::Initialize));

    // Dependents were never initialized; the independent branch was.
    assert_eq!(journal.ids("init"), ["ipam"]);
    assert!(matches!(registry.phase("netbox"), Some(ModuleState::Failed(_))));
    assert!(matches!(registry.phase("alerts"), Some(ModuleState::Failed(_))));
    assert_eq!(registry.phase("ipam"), Some(ModuleState::Ready));

    // Only initialized modules are shut down.
    let report = registry.shutdown_all().await;
    assert_eq!(report.attempted, ["ipam"]);
}

#[tokio::test]
async fn test_independent_failures_are_all_reported() {
    let journal = Journal::new();
    let registry = registry();
    registry
        .register(
            descriptor("a", &[]),
            Arc::new(RecordingModule::new("a", &journal).failing("first")),
        )
        .unwrap();
    registry
        .register(
            descriptor("b", &[]),
            Arc::new(RecordingModule::new("b", &journal).panicking()),
        )
        .unwrap();

    let err = registry.initialize_all().await.unwrap_err();
    let failures = err.initialization_failures();
    assert_eq!(failures.len(), 2);
    assert!(failures.iter().all(|f| f.is_direct()));
    assert!(failures
        .iter()
        .any(|f| matches!(&f.cause, LifecycleCause::Panicked(msg) if msg.contains("exploded"))));
}

#[tokio::test]
async fn test_shutdown_failure_does_not_stop_others() {
    let journal = Journal::new();
    let registry = registry();
    registry
        .register(descriptor("a", &[]), Arc::new(RecordingModule::new("a", &journal)))
        .unwrap();
    registry
        .register(
            descriptor("b", &["a"]),
            Arc::new(RecordingModule::new("b", &journal).failing_shutdown()),
        )
        .unwrap();
    registry.initialize_all().await.unwrap();

    let report = registry.shutdown_all().await;
    assert_eq!(journal.ids("shutdown"), ["b", "a"]);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].module_id, "b");
    assert_eq!(report.failures[0].operation, LifecycleOperation::Shutdown);
    assert!(matches!(registry.phase("b"), Some(ModuleState::Failed(_))));
    assert_eq!(registry.phase("a"), Some(ModuleState::Stopped));

    // A second pass finds nothing left to stop.
    assert!(registry.shutdown_all().await.attempted.is_empty());
}

#[tokio::test]
async fn test_shutdown_removes_module_subscriptions() {
    let journal = Journal::new();
    let router = Arc::new(EventRouter::default());
    let registry = ModuleRegistry::new(Arc::clone(&router));
    registry
        .register(
            descriptor("topology", &[]),
            Arc::new(RecordingModule::new("topology", &journal).subscribing("t1.device.*", "t1")),
        )
        .unwrap();
    registry.initialize_all().await.unwrap();
    assert_eq!(router.subscription_count(), 1);

    let netbox = router.scoped("netbox");
    netbox
        .publish(&tenant("t1"), "t1.device.added", json!({}))
        .unwrap();
    assert!(eventually(|| journal.ids("event").len() == 1).await);

    registry.shutdown_all().await;
    assert_eq!(router.subscription_count(), 0);
    let receipt = netbox
        .publish(&tenant("t1"), "t1.device.added", json!({}))
        .unwrap();
    assert_eq!(receipt.matched, 0);
}

#[tokio::test]
async fn test_module_receives_configuration() {
    use async_trait::async_trait;
    use platform_core::module::{Module, ModuleContext, ModuleError};
    use std::sync::Mutex;

    struct ConfigProbe(Mutex<Option<String>>);

    #[async_trait]
    impl Module for ConfigProbe {
        async fn initialize(&self, context: ModuleContext) -> Result<(), ModuleError> {
            *self.0.lock().unwrap() = context.get_config("url").cloned();
            Ok(())
        }

        async fn shutdown(&self) -> Result<(), ModuleError> {
            Ok(())
        }
    }

    let mut modules = ModuleConfig::default();
    modules.module_configs.insert(
        "netbox".into(),
        [("url".to_string(), "https://netbox.example".to_string())].into(),
    );
    let registry = ModuleRegistry::with_config(
        Arc::new(EventRouter::default()),
        &modules,
        &HealthConfig::default(),
    );
    let probe = Arc::new(ConfigProbe(Mutex::new(None)));
    registry
        .register(descriptor("netbox", &[]), probe.clone())
        .unwrap();
    registry.initialize_all().await.unwrap();

    assert_eq!(
        probe.0.lock().unwrap().as_deref(),
        Some("https://netbox.example")
    );
}

#[tokio::test]
async fn test_health_timeout_reports_degraded() {
    let journal = Journal::new();
    let registry = registry();
    let slow = Arc::new(RecordingModule::new("slow", &journal));
    registry.register(descriptor("slow", &[]), slow.clone()).unwrap();
    registry
        .register(descriptor("fast", &[]), Arc::new(RecordingModule::new("fast", &journal)))
        .unwrap();
    registry.initialize_all().await.unwrap();

    slow.set_health_delay(Some(Duration::from_secs(5)));
    let report = registry.health(Duration::from_millis(20)).await;

    let slow_report = report.module("slow").unwrap();
    assert_eq!(slow_report.status, HealthStatus::Degraded);
    assert!(slow_report.message.as_deref().unwrap().contains("timed out"));
    assert_eq!(report.module("fast").unwrap().status, HealthStatus::Healthy);
    assert_eq!(report.overall_status, HealthStatus::Degraded);
    // One failed check is below the default threshold.
    assert_eq!(registry.phase("slow"), Some(ModuleState::Ready));
}

#[tokio::test]
async fn test_repeated_health_failures_degrade_and_recover() {
    let journal = Journal::new();
    let registry = registry();
    let module = Arc::new(RecordingModule::new("flaky", &journal));
    registry.register(descriptor("flaky", &[]), module.clone()).unwrap();
    registry.initialize_all().await.unwrap();

    module.set_health(HealthStatus::Unhealthy);
    for expected in [ModuleState::Ready, ModuleState::Ready, ModuleState::Degraded] {
        registry.health(Duration::from_secs(1)).await;
        assert_eq!(registry.phase("flaky"), Some(expected));
    }
    assert_eq!(registry.mount_points().len(), 1);

    module.set_health(HealthStatus::Healthy);
    let report = registry.health(Duration::from_secs(1)).await;
    assert_eq!(registry.phase("flaky"), Some(ModuleState::Ready));
    assert_eq!(report.module("flaky").unwrap().consecutive_failures, 0);
}

#[tokio::test]
async fn test_failed_modules_report_down() {
    let journal = Journal::new();
    let registry = registry();
    registry
        .register(
            descriptor("broken", &[]),
            Arc::new(RecordingModule::new("broken", &journal).failing("no database")),
        )
        .unwrap();
    let _ = registry.initialize_all().await;

    let report = registry.health(Duration::from_secs(1)).await;
    let broken = report.module("broken").unwrap();
    assert_eq!(broken.status, HealthStatus::Down);
    assert!(broken.response_time_ms.is_none());
    assert_eq!(report.overall_status, HealthStatus::Down);
}

#[tokio::test]
async fn test_tenant_hooks_follow_initialization_order() {
    let journal = Journal::new();
    let registry = registry();
    registry
        .register(descriptor("b", &["a"]), Arc::new(RecordingModule::new("b", &journal)))
        .unwrap();
    registry
        .register(descriptor("a", &[]), Arc::new(RecordingModule::new("a", &journal)))
        .unwrap();
    registry.initialize_all().await.unwrap();

    let acme = tenant("acme");
    assert!(registry.notify_tenant_created(&acme).await.is_empty());
    assert!(registry.notify_tenant_deleted(&acme).await.is_empty());

    assert_eq!(journal.ids("tenant-created"), ["a:acme", "b:acme"]);
    assert_eq!(journal.ids("tenant-deleted"), ["b:acme", "a:acme"]);
}

mod event_ownership {
    use super::*;
    use async_trait::async_trait;
    use platform_core::module::api::handler_fn;
    use platform_core::module::{EventEnvelope, Module, ModuleContext, ModuleError};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Subscribes to everything under two tenants and rejects every event
    #[derive(Default)]
    struct Listener {
        hits: AtomicUsize,
        origins: Mutex<Vec<String>>,
    }

    struct ListeningModule(Arc<Listener>);

    #[async_trait]
    impl Module for ListeningModule {
        async fn initialize(&self, context: ModuleContext) -> Result<(), ModuleError> {
            for scope in ["t1", "t2"] {
                let listener = Arc::clone(&self.0);
                context
                    .events
                    .subscribe(
                        "#",
                        &tenant(scope),
                        handler_fn(move |event: Arc<EventEnvelope>| {
                            let listener = Arc::clone(&listener);
                            async move {
                                listener.hits.fetch_add(1, Ordering::SeqCst);
                                listener.origins.lock().unwrap().push(event.origin.clone());
                                anyhow::bail!("rejects everything")
                            }
                        }),
                    )
                    .map_err(|e| ModuleError::InitializationError(e.to_string()))?;
            }
            context
                .events
                .publish(&tenant("t1"), "t1.billing.started", json!({}))
                .map_err(|e| ModuleError::InitializationError(e.to_string()))?;
            Ok(())
        }

        async fn shutdown(&self) -> Result<(), ModuleError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_module_events_are_bound_to_the_module() {
        let journal = Journal::new();
        let router = Arc::new(EventRouter::default());
        let registry = ModuleRegistry::new(Arc::clone(&router));
        let listener = Arc::new(Listener::default());
        registry
            .register(descriptor("listener", &[]), Arc::new(ListeningModule(Arc::clone(&listener))))
            .unwrap();
        registry
            .register(descriptor("billing", &[]), Arc::new(RecordingModule::new("billing", &journal)))
            .unwrap();
        registry.initialize_all().await.unwrap();
        assert_eq!(router.subscription_count(), 2);

        // Its own publish carries its id as origin; the failure is charged to it alone.
        assert!(eventually(|| router.delivery_health("listener").failed == 1).await);
        assert_eq!(*listener.origins.lock().unwrap(), ["listener"]);
        assert_eq!(router.delivery_health("billing").failed, 0);

        let report = registry.shutdown_all().await;
        assert!(report.attempted.contains(&"listener".to_string()));
        assert_eq!(registry.phase("listener"), Some(ModuleState::Stopped));
        assert_eq!(router.subscription_count(), 0);

        let host = router.scoped("gateway");
        for scope in ["t1", "t2"] {
            let receipt = host
                .publish(&tenant(scope), &format!("{scope}.billing.started"), json!({}))
                .unwrap();
            assert_eq!(receipt.matched, 0);
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(listener.hits.load(Ordering::SeqCst), 1);
    }
}
