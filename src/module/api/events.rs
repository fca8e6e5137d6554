//! Tenant-scoped event routing between modules
//!
//! Subscriptions are partitioned by tenant, so a publish only ever looks at
//! the publishing tenant's subscriptions before any topic matching happens.
//! Each subscription owns a bounded queue drained by its own worker task:
//! a slow or failing handler only delays its own queue, and the publisher
//! never waits on a handler.

use async_trait::async_trait;
use futures::FutureExt;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::EventRouterConfig;
use crate::module::api::topic::{validate_topic, TopicPattern};
use crate::tenant::TenantId;
use crate::utils::{current_timestamp, panic_message, with_custom_timeout};

/// Event payload, opaque to the router
pub type EventPayload = serde_json::Value;

/// Event envelope delivered to handlers
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventEnvelope {
    /// Random event identifier
    pub id: Uuid,
    /// Hierarchical topic
    pub event_type: String,
    /// Tenant the event was published under
    pub tenant: TenantId,
    pub payload: EventPayload,
    /// Publishing module
    pub origin: String,
    /// Monotonic per (tenant, topic), starting at 1
    pub sequence: u64,
    /// Unix seconds
    pub published_at: u64,
}

/// Event handler registered with a subscription
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: Arc<EventEnvelope>) -> anyhow::Result<()>;
}

/// Adapter turning an async closure into an [`EventHandler`]
pub struct FnHandler<F>(F);

#[async_trait]
impl<F, Fut> EventHandler for FnHandler<F>
where
    F: Fn(Arc<EventEnvelope>) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<()>> + Send,
{
    async fn handle(&self, event: Arc<EventEnvelope>) -> anyhow::Result<()> {
        (self.0)(event).await
    }
}

/// Wrap an async closure as a shareable handler
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn EventHandler>
where
    F: Fn(Arc<EventEnvelope>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(FnHandler(f))
}

/// Router errors returned to callers
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouterError {
    #[error("Invalid topic: {0}")]
    InvalidTopic(String),

    #[error("Invalid topic pattern: {0}")]
    InvalidPattern(String),

    #[error("Event router is closed")]
    Closed,
}

/// Delivery failures; contained inside the router and recorded per owner
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeliveryError {
    #[error("handler returned error: {0}")]
    HandlerFailed(String),

    #[error("handler panicked: {0}")]
    HandlerPanicked(String),

    #[error("handler timed out after {0:?}")]
    HandlerTimedOut(Duration),

    #[error("subscriber queue full, event dropped")]
    QueueFull,
}

/// Delivery statistics for one owning module
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeliveryHealth {
    pub delivered: u64,
    pub failed: u64,
    /// Reset by every successful delivery
    pub consecutive_failures: u64,
    pub last_error: Option<String>,
}

/// Handle returned by [`ModuleEvents::subscribe`]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle {
    id: u64,
    tenant: TenantId,
    owner: String,
}

impl SubscriptionHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn tenant(&self) -> &TenantId {
        &self.tenant
    }

    /// Module the subscription is charged to
    pub fn owner(&self) -> &str {
        &self.owner
    }
}

/// Outcome of a publish call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishReceipt {
    /// Sequence number assigned to the event
    pub sequence: u64,
    /// Subscriptions whose scope and pattern matched
    pub matched: usize,
    /// Events queued for delivery
    pub enqueued: usize,
    /// Matched subscriptions whose queue was full
    pub dropped: usize,
}

struct Subscription {
    id: u64,
    owner: String,
    pattern: TopicPattern,
    sender: mpsc::Sender<Arc<EventEnvelope>>,
    cancel: CancellationToken,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Subscription {
    fn take_worker(&self) -> Option<JoinHandle<()>> {
        self.worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

#[derive(Default)]
struct RouterState {
    by_tenant: HashMap<TenantId, Vec<Arc<Subscription>>>,
    closed: bool,
}

type DeliveryStats = Arc<Mutex<HashMap<String, DeliveryHealth>>>;

/// Tenant-scoped publish/subscribe router
///
/// Subscribing and publishing go through a [`ModuleEvents`] handle bound to
/// one owner. The registry hands each module its own handle; host code gets
/// one from [`EventRouter::scoped`].
pub struct EventRouter {
    state: RwLock<RouterState>,
    /// Held across sequence assignment and enqueueing so queue order follows sequence order
    sequences: Mutex<HashMap<(TenantId, String), u64>>,
    stats: DeliveryStats,
    next_id: AtomicU64,
    queue_capacity: usize,
    handler_timeout: Option<Duration>,
}

impl EventRouter {
    /// Create a new event router
    pub fn new(config: &EventRouterConfig) -> Self {
        Self {
            state: RwLock::new(RouterState::default()),
            sequences: Mutex::new(HashMap::new()),
            stats: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(1),
            queue_capacity: config.subscriber_queue_capacity.max(1),
            handler_timeout: config.handler_timeout(),
        }
    }

    /// Handle that subscribes and publishes as `owner`
    pub fn scoped(self: &Arc<Self>, owner: impl Into<String>) -> ModuleEvents {
        ModuleEvents {
            owner: owner.into(),
            router: Arc::clone(self),
        }
    }

    /// Subscribe `handler` to topics matching `pattern` under `tenant`
    ///
    /// Spawns the subscription's delivery worker, so this must be called
    /// from within a Tokio runtime.
    pub(crate) fn subscribe(
        &self,
        owner: &str,
        pattern: &str,
        tenant: &TenantId,
        handler: Arc<dyn EventHandler>,
    ) -> Result<SubscriptionHandle, RouterError> {
        let pattern = TopicPattern::parse(pattern)?;

        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if state.closed {
            return Err(RouterError::Closed);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = mpsc::channel(self.queue_capacity);
        let cancel = CancellationToken::new();

        let worker = tokio::spawn(run_subscriber(
            id,
            owner.to_string(),
            handler,
            receiver,
            cancel.clone(),
            Arc::clone(&self.stats),
            self.handler_timeout,
        ));

        info!(
            "Module {} subscribed to {} for tenant {} (subscription {})",
            owner, pattern, tenant, id
        );

        state
            .by_tenant
            .entry(tenant.clone())
            .or_default()
            .push(Arc::new(Subscription {
                id,
                owner: owner.to_string(),
                pattern,
                sender,
                cancel,
                worker: Mutex::new(Some(worker)),
            }));

        Ok(SubscriptionHandle {
            id,
            tenant: tenant.clone(),
            owner: owner.to_string(),
        })
    }

    /// Remove a subscription
    ///
    /// Events still queued for it are discarded; an invocation already in
    /// progress runs to completion. Returns whether the handle was live.
    pub(crate) fn unsubscribe(&self, handle: &SubscriptionHandle) -> bool {
        let removed = {
            let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
            let Some(subs) = state.by_tenant.get_mut(&handle.tenant) else {
                return false;
            };
            let removed = subs
                .iter()
                .position(|s| s.id == handle.id)
                .map(|pos| subs.remove(pos));
            if subs.is_empty() {
                state.by_tenant.remove(&handle.tenant);
            }
            removed
        };

        match removed {
            Some(sub) => {
                sub.cancel.cancel();
                debug!("Subscription {} removed", sub.id);
                true
            }
            None => false,
        }
    }

    /// Remove every subscription owned by a module and wait for their workers
    pub async fn unsubscribe_owner(&self, owner: &str) -> usize {
        let removed: Vec<Arc<Subscription>> = {
            let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
            let mut removed = Vec::new();
            for subs in state.by_tenant.values_mut() {
                let (theirs, kept): (Vec<_>, Vec<_>) =
                    subs.drain(..).partition(|s| s.owner == owner);
                *subs = kept;
                removed.extend(theirs);
            }
            state.by_tenant.retain(|_, subs| !subs.is_empty());
            removed
        };

        let count = removed.len();
        stop_workers(removed).await;
        if count > 0 {
            info!("Removed {} subscription(s) owned by module {}", count, owner);
        }
        count
    }

    /// Publish an event under `tenant`
    ///
    /// Never waits on handlers. Subscribers whose queue is full miss the
    /// event; the miss is recorded against the owning module.
    pub(crate) fn publish(
        &self,
        tenant: &TenantId,
        topic: &str,
        payload: EventPayload,
        origin: &str,
    ) -> Result<PublishReceipt, RouterError> {
        validate_topic(topic)?;

        let mut sequences = self
            .sequences
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        if state.closed {
            return Err(RouterError::Closed);
        }

        let counter = sequences
            .entry((tenant.clone(), topic.to_string()))
            .or_insert(0);
        *counter += 1;
        let sequence = *counter;

        let envelope = Arc::new(EventEnvelope {
            id: Uuid::new_v4(),
            event_type: topic.to_string(),
            tenant: tenant.clone(),
            payload,
            origin: origin.to_string(),
            sequence,
            published_at: current_timestamp(),
        });

        let mut receipt = PublishReceipt {
            sequence,
            ..PublishReceipt::default()
        };

        // Tenant partition first; topic matching only within it.
        let Some(subs) = state.by_tenant.get(tenant) else {
            debug!("Published {}#{} for tenant {}: no subscribers", topic, sequence, tenant);
            return Ok(receipt);
        };

        for sub in subs.iter().filter(|s| s.pattern.matches(topic)) {
            receipt.matched += 1;
            match sub.sender.try_send(Arc::clone(&envelope)) {
                Ok(()) => receipt.enqueued += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    receipt.dropped += 1;
                    warn!(
                        "Subscription {} ({}) queue full, dropped {}#{} for tenant {}",
                        sub.id, sub.owner, topic, sequence, tenant
                    );
                    record_outcome(&self.stats, &sub.owner, Err(DeliveryError::QueueFull));
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    debug!("Subscription {} worker already stopped", sub.id);
                }
            }
        }

        debug!(
            "Published {}#{} for tenant {} from {}: {} matched, {} enqueued",
            topic, sequence, tenant, origin, receipt.matched, receipt.enqueued
        );
        Ok(receipt)
    }

    /// Delivery statistics for a module (zeroed if it never received events)
    pub fn delivery_health(&self, owner: &str) -> DeliveryHealth {
        self.stats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(owner)
            .cloned()
            .unwrap_or_default()
    }

    /// Total number of live subscriptions
    pub fn subscription_count(&self) -> usize {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .by_tenant
            .values()
            .map(Vec::len)
            .sum()
    }

    /// Drop every subscription scoped to `tenant` and its sequence counters
    ///
    /// Waits for the removed subscriptions' workers. A later publish under
    /// the same tenant starts its sequences again at 1.
    pub async fn remove_tenant(&self, tenant: &TenantId) -> usize {
        let removed = self
            .state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .by_tenant
            .remove(tenant)
            .unwrap_or_default();

        let purged = {
            let mut sequences = self
                .sequences
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            let before = sequences.len();
            sequences.retain(|(scope, _), _| scope != tenant);
            before - sequences.len()
        };

        let count = removed.len();
        stop_workers(removed).await;
        info!(
            "Tenant {} removed from event router ({} subscription(s), {} topic sequence(s))",
            tenant, count, purged
        );
        count
    }

    /// Number of (tenant, topic) sequence counters currently held
    pub fn sequence_count(&self) -> usize {
        self.sequences
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_closed(&self) -> bool {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .closed
    }

    /// Stop accepting publishes and subscriptions, and stop every worker
    pub async fn close(&self) {
        let removed: Vec<Arc<Subscription>> = {
            let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
            state.closed = true;
            state.by_tenant.drain().flat_map(|(_, subs)| subs).collect()
        };
        let count = removed.len();
        stop_workers(removed).await;
        info!("Event router closed ({} subscription(s) removed)", count);
    }
}

impl fmt::Debug for EventRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventRouter")
            .field("subscriptions", &self.subscription_count())
            .field("queue_capacity", &self.queue_capacity)
            .field("handler_timeout", &self.handler_timeout)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Default for EventRouter {
    fn default() -> Self {
        Self::new(&EventRouterConfig::default())
    }
}

/// Event access for one module
///
/// Every subscription made through this handle is owned by, and every event
/// published through it originates from, the handle's module. Delivery
/// failures of its subscriptions count against that module only.
#[derive(Debug, Clone)]
pub struct ModuleEvents {
    owner: String,
    router: Arc<EventRouter>,
}

impl ModuleEvents {
    pub fn module_id(&self) -> &str {
        &self.owner
    }

    /// Subscribe `handler` to topics matching `pattern` under `tenant`
    ///
    /// Must be called from within a Tokio runtime.
    pub fn subscribe(
        &self,
        pattern: &str,
        tenant: &TenantId,
        handler: Arc<dyn EventHandler>,
    ) -> Result<SubscriptionHandle, RouterError> {
        self.router.subscribe(&self.owner, pattern, tenant, handler)
    }

    /// Remove one of this module's subscriptions
    ///
    /// Handles owned by another module are left alone and return `false`.
    pub fn unsubscribe(&self, handle: &SubscriptionHandle) -> bool {
        if handle.owner != self.owner {
            warn!(
                "Module {} tried to remove subscription {} owned by {}",
                self.owner, handle.id, handle.owner
            );
            return false;
        }
        self.router.unsubscribe(handle)
    }

    /// Publish an event under `tenant` with this module as origin
    pub fn publish(
        &self,
        tenant: &TenantId,
        topic: &str,
        payload: EventPayload,
    ) -> Result<PublishReceipt, RouterError> {
        self.router.publish(tenant, topic, payload, &self.owner)
    }

    /// Delivery statistics of this module's subscriptions
    pub fn delivery_health(&self) -> DeliveryHealth {
        self.router.delivery_health(&self.owner)
    }
}

async fn stop_workers(subscriptions: Vec<Arc<Subscription>>) {
    let workers: Vec<JoinHandle<()>> = subscriptions
        .iter()
        .filter_map(|sub| {
            sub.cancel.cancel();
            sub.take_worker()
        })
        .collect();
    for result in futures::future::join_all(workers).await {
        if let Err(e) = result {
            warn!("Subscriber worker ended abnormally: {}", e);
        }
    }
}

async fn run_subscriber(
    id: u64,
    owner: String,
    handler: Arc<dyn EventHandler>,
    mut receiver: mpsc::Receiver<Arc<EventEnvelope>>,
    cancel: CancellationToken,
    stats: DeliveryStats,
    handler_timeout: Option<Duration>,
) {
    loop {
        let event = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            event = receiver.recv() => match event {
                Some(event) => event,
                None => break,
            },
        };

        let topic = event.event_type.clone();
        let sequence = event.sequence;
        let outcome = invoke_handler(handler.as_ref(), event, handler_timeout).await;
        if let Err(e) = &outcome {
            warn!(
                "Delivery of {}#{} to subscription {} ({}) failed: {}",
                topic, sequence, id, owner, e
            );
        }
        record_outcome(&stats, &owner, outcome);
    }
    debug!("Subscription {} worker stopped", id);
}

async fn invoke_handler(
    handler: &dyn EventHandler,
    event: Arc<EventEnvelope>,
    handler_timeout: Option<Duration>,
) -> Result<(), DeliveryError> {
    let call = AssertUnwindSafe(handler.handle(event)).catch_unwind();
    let result = match handler_timeout {
        Some(limit) => with_custom_timeout(call, limit)
            .await
            .map_err(|_| DeliveryError::HandlerTimedOut(limit))?,
        None => call.await,
    };

    match result {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(DeliveryError::HandlerFailed(format!("{:#}", e))),
        Err(panic) => Err(DeliveryError::HandlerPanicked(panic_message(panic.as_ref()))),
    }
}

fn record_outcome(stats: &DeliveryStats, owner: &str, outcome: Result<(), DeliveryError>) {
    let mut stats = stats.lock().unwrap_or_else(PoisonError::into_inner);
    let entry = stats.entry(owner.to_string()).or_default();
    match outcome {
        Ok(()) => {
            entry.delivered += 1;
            entry.consecutive_failures = 0;
        }
        Err(e) => {
            entry.failed += 1;
            entry.consecutive_failures += 1;
            entry.last_error = Some(e.to_string());
        }
    }
}
