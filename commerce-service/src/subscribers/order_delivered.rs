use async_trait::async_trait;
use serde_json::json;

use super::SubscriberContext;
use crate::events::Subscriber;
use crate::models::event::DELIVERY_CREATED;
use crate::models::{DomainEvent, EventEnvelope, NotificationTemplate};
use crate::services::ServiceError;

pub struct OrderDeliveredSubscriber {
    context: SubscriberContext,
}

impl OrderDeliveredSubscriber {
    pub fn new(context: SubscriberContext) -> Self {
        Self { context }
    }
}

#[async_trait]
impl Subscriber for OrderDeliveredSubscriber {
    fn event_name(&self) -> &'static str {
        DELIVERY_CREATED
    }

    fn name(&self) -> &'static str {
        "order-delivered"
    }

    async fn handle(&self, envelope: &EventEnvelope) -> Result<(), ServiceError> {
        let DomainEvent::DeliveryCreated(event) = &envelope.event else {
            return Ok(());
        };

        if event.no_notification {
            tracing::debug!(event_id = %envelope.id, "Delivery flagged no_notification");
            return Ok(());
        }

        let Some(order) = self.context.order_for_fulfillment(event).await? else {
            tracing::info!(event_id = %envelope.id, "No order found for delivery");
            return Ok(());
        };

        let Some(to) = order.recipient() else {
            tracing::info!(order_id = %order.id, "Order has no email, skipping delivery notice");
            return Ok(());
        };

        self.context
            .notify(
                envelope,
                to,
                NotificationTemplate::OrderDelivered,
                json!({ "order": { "display_id": order.display_id, "email": to } }),
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::event::FulfillmentEvent;
    use crate::subscribers::test_support::{harness, order};

    fn delivery(fulfillment_id: &str, no_notification: bool) -> EventEnvelope {
        EventEnvelope::with_id(
            "evt_delivery",
            DomainEvent::DeliveryCreated(FulfillmentEvent {
                id: Some(fulfillment_id.into()),
                no_notification,
                ..Default::default()
            }),
        )
    }

    #[tokio::test]
    async fn sends_exactly_one_delivery_notice() {
        let h = harness(None);
        h.store.insert_order(order("order_1", Some("a@b.com"), &["ful_1"]));
        let subscriber = OrderDeliveredSubscriber::new(h.context.clone());

        subscriber.handle(&delivery("ful_1", false)).await.unwrap();
        subscriber.handle(&delivery("ful_1", false)).await.unwrap();

        let notifications = h.store.notifications();
        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0].template, NotificationTemplate::OrderDelivered);
        assert_eq!(notifications[0].to, "a@b.com");
        assert_eq!(h.email.sent().await.len(), 1);
    }

    #[tokio::test]
    async fn no_notification_flag_skips() {
        let h = harness(None);
        h.store.insert_order(order("order_1", Some("a@b.com"), &["ful_1"]));

        OrderDeliveredSubscriber::new(h.context.clone())
            .handle(&delivery("ful_1", true))
            .await
            .unwrap();

        assert!(h.store.notifications().is_empty());
    }

    #[tokio::test]
    async fn missing_order_or_email_skips() {
        let h = harness(None);
        h.store.insert_order(order("order_2", None, &["ful_2"]));
        let subscriber = OrderDeliveredSubscriber::new(h.context.clone());

        subscriber.handle(&delivery("ful_unknown", false)).await.unwrap();
        subscriber.handle(&delivery("ful_2", false)).await.unwrap();

        assert!(h.store.notifications().is_empty());
    }
}
