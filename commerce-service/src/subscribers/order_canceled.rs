use async_trait::async_trait;
use serde_json::json;

use super::SubscriberContext;
use crate::events::Subscriber;
use crate::models::event::ORDER_CANCELED;
use crate::models::{DomainEvent, EventEnvelope, NotificationTemplate};
use crate::services::ServiceError;

pub struct OrderCanceledSubscriber {
    context: SubscriberContext,
}

impl OrderCanceledSubscriber {
    pub fn new(context: SubscriberContext) -> Self {
        Self { context }
    }
}

#[async_trait]
impl Subscriber for OrderCanceledSubscriber {
    fn event_name(&self) -> &'static str {
        ORDER_CANCELED
    }

    fn name(&self) -> &'static str {
        "order-canceled"
    }

    async fn handle(&self, envelope: &EventEnvelope) -> Result<(), ServiceError> {
        let DomainEvent::OrderCanceled(event) = &envelope.event else {
            return Ok(());
        };

        let Some(order_id) = event.id.as_deref().filter(|id| !id.is_empty()) else {
            tracing::warn!(event_id = %envelope.id, "order.canceled without an order id");
            return Ok(());
        };

        let Some(order) = self.context.orders.find_order(order_id).await? else {
            tracing::info!(order_id, "Canceled order not found");
            return Ok(());
        };

        let Some(to) = order.recipient() else {
            return Ok(());
        };

        self.context
            .notify(
                envelope,
                to,
                NotificationTemplate::OrderCanceled,
                json!({
                    "order": {
                        "display_id": order.display_id,
                        "email": to,
                        "reason": event.reason,
                    }
                }),
            )
            .await
    }
}
