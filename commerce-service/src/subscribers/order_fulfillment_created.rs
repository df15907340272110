use async_trait::async_trait;
use serde_json::json;

use super::SubscriberContext;
use crate::events::Subscriber;
use crate::models::event::ORDER_FULFILLMENT_CREATED;
use crate::models::{DomainEvent, EventEnvelope, NotificationTemplate};
use crate::services::ServiceError;

pub struct OrderFulfillmentCreatedSubscriber {
    context: SubscriberContext,
}

impl OrderFulfillmentCreatedSubscriber {
    pub fn new(context: SubscriberContext) -> Self {
        Self { context }
    }
}

#[async_trait]
impl Subscriber for OrderFulfillmentCreatedSubscriber {
    fn event_name(&self) -> &'static str {
        ORDER_FULFILLMENT_CREATED
    }

    fn name(&self) -> &'static str {
        "order-fulfillment-created"
    }

    async fn handle(&self, envelope: &EventEnvelope) -> Result<(), ServiceError> {
        let DomainEvent::OrderFulfillmentCreated(event) = &envelope.event else {
            return Ok(());
        };

        if event.no_notification {
            return Ok(());
        }

        let Some(order_id) = event.order_id.as_deref().filter(|id| !id.is_empty()) else {
            tracing::warn!(event_id = %envelope.id, "Fulfillment event without an order id");
            return Ok(());
        };

        let Some(order) = self.context.orders.find_order(order_id).await? else {
            return Ok(());
        };

        let Some(to) = order.recipient() else {
            return Ok(());
        };

        self.context
            .notify(
                envelope,
                to,
                NotificationTemplate::OrderFulfillmentCreated,
                json!({ "order": { "display_id": order.display_id, "email": to } }),
            )
            .await
    }
}
