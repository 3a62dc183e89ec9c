//! Broker driving loop.
//!
//! Each subscribed consumer gets its own [`ActionLoop`], so a consumer's
//! poll → handle → ack cycle never overlaps with itself while different
//! consumers progress independently. A failing consumer is logged and
//! retried after the throttle; it never stalls the others.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use folio_core::{DomainError, DomainResult, Lease};
use folio_events::CommittedEvent;

use crate::config::BrokerConfig;
use crate::event_store::{EventStore, EventStoreError};

use super::action_loop::{Action, ActionLoop};
use super::consumer::EventHandler;

/// Outcome of one consumer cycle, as reported through the action loop.
///
/// - `Some(true)`: events were handled and acknowledged
/// - `Some(false)`: nothing to deliver
/// - `None`: the cycle failed
type CycleResult = Option<bool>;

#[derive(Clone)]
struct Consumer {
    handler: Arc<dyn EventHandler>,
    names: Arc<[String]>,
    actions: ActionLoop,
}

impl Consumer {
    fn name(&self) -> &str {
        self.handler.name()
    }
}

struct Inner<S> {
    store: S,
    config: BrokerConfig,
    consumers: RwLock<Vec<Consumer>>,
    started: AtomicBool,
    disposed: AtomicBool,
}

/// Drives subscribed consumers against an [`EventStore`].
pub struct Broker<S> {
    inner: Arc<Inner<S>>,
}

impl<S> Clone for Broker<S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<S> core::fmt::Debug for Broker<S> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Broker")
            .field("config", &self.inner.config)
            .field("consumers", &self.consumers())
            .field("started", &self.inner.started.load(Ordering::SeqCst))
            .field("disposed", &self.inner.disposed.load(Ordering::SeqCst))
            .finish()
    }
}

impl<S> Broker<S> {
    pub fn consumers(&self) -> Vec<String> {
        self.inner
            .consumers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|c| c.name().to_string())
            .collect()
    }

    pub fn store(&self) -> &S {
        &self.inner.store
    }

    pub fn config(&self) -> &BrokerConfig {
        &self.inner.config
    }

    fn snapshot(&self) -> Vec<Consumer> {
        self.inner
            .consumers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl<S> Broker<S>
where
    S: EventStore + 'static,
{
    pub fn new(store: S, config: BrokerConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                config,
                consumers: RwLock::new(Vec::new()),
                started: AtomicBool::new(false),
                disposed: AtomicBool::new(false),
            }),
        }
    }

    /// Register a consumer. Consumer names are unique.
    ///
    /// A consumer subscribed after [`Broker::start`] is scheduled immediately.
    pub fn subscribe<H>(&self, handler: H) -> DomainResult<()>
    where
        H: EventHandler + 'static,
    {
        let handler: Arc<dyn EventHandler> = Arc::new(handler);
        let consumer = Consumer {
            names: handler.events().into(),
            actions: ActionLoop::new(handler.name()).with_stop_policy(self.inner.config.stop),
            handler,
        };

        {
            let mut consumers = self
                .inner
                .consumers
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            if consumers.iter().any(|c| c.name() == consumer.name()) {
                return Err(DomainError::DuplicateHandler(consumer.name().to_string()));
            }
            consumers.push(consumer.clone());
        }

        debug!(consumer = %consumer.name(), events = ?consumer.names, "consumer subscribed");
        if self.inner.started.load(Ordering::SeqCst) {
            schedule(self.inner.clone(), consumer, false);
        }
        Ok(())
    }

    /// Begin polling every subscribed consumer. Repeated calls are no-ops.
    pub fn start(&self) {
        if self.inner.disposed.load(Ordering::SeqCst)
            || self.inner.started.swap(true, Ordering::SeqCst)
        {
            return;
        }
        let consumers = self.snapshot();
        info!(consumers = consumers.len(), "broker started");
        for consumer in consumers {
            schedule(self.inner.clone(), consumer, false);
        }
    }

    /// Run consumer cycles until every consumer reports nothing left to do.
    ///
    /// Cycles go through each consumer's loop, so they are serialized with
    /// any cycles already scheduled by [`Broker::start`].
    pub async fn drain(&self) {
        loop {
            if self.inner.disposed.load(Ordering::SeqCst) {
                return;
            }

            let mut pending = Vec::new();
            for consumer in self.snapshot() {
                let (tx, rx) = oneshot::channel::<CycleResult>();
                let inner = self.inner.clone();
                let target = consumer.clone();
                consumer.actions.push(
                    Action::new(consumer.name(), move || cycle(inner, target)).with_callback(
                        move |_, result| {
                            let _ = tx.send(result);
                        },
                    ),
                );
                pending.push(rx);
            }

            let mut busy = false;
            for rx in pending {
                // A dropped action (loop stopped) counts as idle.
                busy |= matches!(rx.await, Ok(Some(true)));
            }
            if !busy {
                return;
            }
        }
    }

    /// Stop every consumer loop (bounded wait) and dispose the store.
    pub async fn dispose(&self) -> Result<(), EventStoreError> {
        if self.inner.disposed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        for consumer in self.snapshot() {
            consumer.actions.stop().await;
        }
        self.inner.store.dispose().await?;
        info!("broker disposed");
        Ok(())
    }
}

/// Queue the next cycle for `consumer`, after the throttle when `throttled`.
///
/// Throttled cycles are debounced by consumer name.
fn schedule<S>(inner: Arc<Inner<S>>, consumer: Consumer, throttled: bool)
where
    S: EventStore + 'static,
{
    if inner.disposed.load(Ordering::SeqCst) {
        return;
    }

    let actions = consumer.actions.clone();
    let id = consumer.name().to_string();
    let throttle = inner.config.throttle;
    let next = (inner.clone(), consumer.clone());
    let mut action = Action::new(id, move || cycle(inner, consumer)).with_callback(
        move |_, result| {
            let (inner, consumer) = next;
            schedule(inner, consumer, result != Some(true));
        },
    );
    if throttled {
        action = action.with_delay(throttle);
    }
    actions.push(action);
}

/// One poll → handle → ack pass for `consumer`.
async fn cycle<S>(inner: Arc<Inner<S>>, consumer: Consumer) -> CycleResult
where
    S: EventStore + 'static,
{
    if inner.disposed.load(Ordering::SeqCst) {
        return None;
    }

    let name = consumer.name();
    let lease = Lease::generate();
    let mut batch: Vec<CommittedEvent> = Vec::new();
    let polled = inner
        .store
        .poll(
            name,
            &consumer.names,
            inner.config.limit,
            &lease,
            inner.config.timeout,
            &mut |event| batch.push(event),
        )
        .await;
    if let Err(error) = polled {
        warn!(consumer = %name, error = %error, "poll failed");
        return None;
    }

    // An empty poll still holds the lease; release it so the next poll is not fenced.
    let Some(last) = batch.last().map(|e| e.id) else {
        return match inner.store.ack(name, &lease, -1).await {
            Ok(_) => Some(false),
            Err(error) => {
                warn!(consumer = %name, error = %error, "lease release failed");
                None
            }
        };
    };

    for event in &batch {
        if let Err(error) = consumer.handler.handle(event).await {
            warn!(
                consumer = %name,
                event_id = event.id,
                event = %event.name,
                error = %error,
                "handler failed; batch left for redelivery"
            );
            return None;
        }
    }

    match inner.store.ack(name, &lease, last).await {
        Ok(true) => {
            debug!(consumer = %name, count = batch.len(), watermark = last, "batch acknowledged");
            Some(true)
        }
        Ok(false) => {
            warn!(consumer = %name, watermark = last, "ack rejected: lease expired");
            Some(true)
        }
        Err(error) => {
            warn!(consumer = %name, error = %error, "ack failed");
            None
        }
    }
}
