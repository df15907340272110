use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::models::EventEnvelope;
use crate::services::{metrics, ServiceError};

/// Reaction to one named event.
#[async_trait]
pub trait Subscriber: Send + Sync {
    fn event_name(&self) -> &'static str;

    fn name(&self) -> &'static str;

    async fn handle(&self, envelope: &EventEnvelope) -> Result<(), ServiceError>;
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchSummary {
    pub handled: usize,
    pub failed: usize,
}

/// Subscribers grouped by the event they react to.
#[derive(Default)]
pub struct SubscriberRegistry {
    subscribers: HashMap<&'static str, Vec<Arc<dyn Subscriber>>>,
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, subscriber: Arc<dyn Subscriber>) {
        self.subscribers
            .entry(subscriber.event_name())
            .or_default()
            .push(subscriber);
    }

    pub fn subscribers_for(&self, event_name: &str) -> &[Arc<dyn Subscriber>] {
        self.subscribers
            .get(event_name)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Runs every subscriber of the envelope's event. Failures are logged and
    /// counted, never retried.
    pub async fn dispatch(&self, envelope: &EventEnvelope) -> DispatchSummary {
        let mut summary = DispatchSummary::default();
        let event = envelope.name();

        for subscriber in self.subscribers_for(event) {
            match subscriber.handle(envelope).await {
                Ok(()) => {
                    summary.handled += 1;
                    metrics::record_event_processed(event, "ok");
                }
                Err(e) => {
                    summary.failed += 1;
                    metrics::record_event_processed(event, "error");
                    tracing::error!(
                        event_id = %envelope.id,
                        event,
                        subscriber = subscriber.name(),
                        error = %e,
                        "Subscriber failed"
                    );
                }
            }
        }

        if summary.handled + summary.failed == 0 {
            tracing::debug!(event_id = %envelope.id, event, "No subscribers for event");
        }

        summary
    }
}

/// In-process event bus: a bounded queue drained by one dispatcher task.
#[derive(Clone)]
pub struct EventBus {
    tx: mpsc::Sender<EventEnvelope>,
    shutdown: CancellationToken,
}

impl EventBus {
    /// Spawns the dispatcher and returns the publishing handle with its task.
    pub fn start(registry: Arc<SubscriberRegistry>, queue_size: usize) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel::<EventEnvelope>(queue_size.max(1));
        let shutdown = CancellationToken::new();
        let token = shutdown.clone();

        let handle = tokio::spawn(async move {
            tracing::info!(queue_size, "Event dispatcher started");

            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        rx.close();
                        let mut drained = 0usize;
                        while let Some(envelope) = rx.recv().await {
                            registry.dispatch(&envelope).await;
                            drained += 1;
                        }
                        tracing::info!(drained, "Event dispatcher shutting down");
                        break;
                    }
                    envelope = rx.recv() => {
                        match envelope {
                            Some(envelope) => {
                                tracing::info!(
                                    event_id = %envelope.id,
                                    event = envelope.name(),
                                    "Dispatching event"
                                );
                                registry.dispatch(&envelope).await;
                            }
                            None => {
                                tracing::info!("Event channel closed, dispatcher exiting");
                                break;
                            }
                        }
                    }
                }
            }
        });

        (Self { tx, shutdown }, handle)
    }

    /// Queues an envelope without waiting; a full queue is reported, not awaited.
    pub fn publish(&self, envelope: EventEnvelope) -> Result<(), ServiceError> {
        let event_id = envelope.id.clone();
        let event = envelope.name();

        self.tx.try_send(envelope).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => {
                tracing::warn!(event_id = %event_id, event, "Event queue full");
                ServiceError::QueueUnavailable("event queue is full".to_string())
            }
            mpsc::error::TrySendError::Closed(_) => {
                ServiceError::QueueUnavailable("event dispatcher stopped".to_string())
            }
        })?;

        tracing::debug!(event_id = %event_id, event, "Event published");
        Ok(())
    }

    /// Stops the dispatcher after it drains what is already queued.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::event::{OrderPlaced, ORDER_PLACED};
    use crate::models::DomainEvent;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting {
        seen: Arc<AtomicUsize>,
        fail: bool,
    }

    #[async_trait]
    impl Subscriber for Counting {
        fn event_name(&self) -> &'static str {
            ORDER_PLACED
        }

        fn name(&self) -> &'static str {
            "counting"
        }

        async fn handle(&self, _envelope: &EventEnvelope) -> Result<(), ServiceError> {
            self.seen.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(ServiceError::invalid_data("boom"))
            } else {
                Ok(())
            }
        }
    }

    fn placed() -> EventEnvelope {
        EventEnvelope::new(DomainEvent::OrderPlaced(OrderPlaced { id: "order_1".into() }))
    }

    #[tokio::test]
    async fn dispatch_keeps_going_after_a_failure() {
        let seen = Arc::new(AtomicUsize::new(0));
        let mut registry = SubscriberRegistry::new();
        registry.register(Arc::new(Counting { seen: seen.clone(), fail: true }));
        registry.register(Arc::new(Counting { seen: seen.clone(), fail: false }));

        let summary = registry.dispatch(&placed()).await;

        assert_eq!(summary, DispatchSummary { handled: 1, failed: 1 });
        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn bus_drains_queue_on_shutdown() {
        let seen = Arc::new(AtomicUsize::new(0));
        let mut registry = SubscriberRegistry::new();
        registry.register(Arc::new(Counting { seen: seen.clone(), fail: false }));

        let (bus, handle) = EventBus::start(Arc::new(registry), 8);
        for _ in 0..3 {
            bus.publish(placed()).unwrap();
        }
        bus.shutdown();
        handle.await.unwrap();

        assert_eq!(seen.load(Ordering::SeqCst), 3);
        assert!(matches!(
            bus.publish(placed()),
            Err(ServiceError::QueueUnavailable(_))
        ));
    }
}
