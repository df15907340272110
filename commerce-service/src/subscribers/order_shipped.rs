use async_trait::async_trait;
use serde_json::json;

use super::SubscriberContext;
use crate::events::Subscriber;
use crate::models::event::SHIPMENT_CREATED;
use crate::models::{DomainEvent, EventEnvelope, NotificationTemplate};
use crate::services::ServiceError;

pub struct OrderShippedSubscriber {
    context: SubscriberContext,
}

impl OrderShippedSubscriber {
    pub fn new(context: SubscriberContext) -> Self {
        Self { context }
    }
}

#[async_trait]
impl Subscriber for OrderShippedSubscriber {
    fn event_name(&self) -> &'static str {
        SHIPMENT_CREATED
    }

    fn name(&self) -> &'static str {
        "order-shipped"
    }

    async fn handle(&self, envelope: &EventEnvelope) -> Result<(), ServiceError> {
        let DomainEvent::ShipmentCreated(event) = &envelope.event else {
            return Ok(());
        };

        if event.no_notification {
            return Ok(());
        }

        let Some(order) = self.context.order_for_fulfillment(event).await? else {
            tracing::info!(event_id = %envelope.id, "No order found for shipment");
            return Ok(());
        };

        let Some(to) = order.recipient() else {
            return Ok(());
        };

        // Tracking numbers are not stored on orders yet.
        self.context
            .notify(
                envelope,
                to,
                NotificationTemplate::OrderShipped,
                json!({
                    "order": { "display_id": order.display_id, "email": to },
                    "tracking_links": [],
                }),
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::event::FulfillmentEvent;
    use crate::subscribers::test_support::{harness, order};

    #[tokio::test]
    async fn falls_back_to_order_id() {
        let h = harness(None);
        h.store.insert_order(order("order_1", Some("a@b.com"), &[]));

        OrderShippedSubscriber::new(h.context.clone())
            .handle(&EventEnvelope::new(DomainEvent::ShipmentCreated(
                FulfillmentEvent {
                    fulfillment_id: Some("ful_missing".into()),
                    order_id: Some("order_1".into()),
                    ..Default::default()
                },
            )))
            .await
            .unwrap();

        let sent = h.email.sent_to("a@b.com").await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].subject, "Your Order Has Shipped");
    }
}
