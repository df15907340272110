use async_trait::async_trait;
use serde_json::json;

use super::SubscriberContext;
use crate::events::Subscriber;
use crate::models::event::ORDER_PLACED;
use crate::models::{DomainEvent, EventEnvelope, NotificationTemplate};
use crate::services::ServiceError;

/// Confirmation to the customer, plus a copy to the shop admin when one is configured.
pub struct OrderPlacedSubscriber {
    context: SubscriberContext,
}

impl OrderPlacedSubscriber {
    pub fn new(context: SubscriberContext) -> Self {
        Self { context }
    }
}

#[async_trait]
impl Subscriber for OrderPlacedSubscriber {
    fn event_name(&self) -> &'static str {
        ORDER_PLACED
    }

    fn name(&self) -> &'static str {
        "order-placed"
    }

    async fn handle(&self, envelope: &EventEnvelope) -> Result<(), ServiceError> {
        let DomainEvent::OrderPlaced(event) = &envelope.event else {
            return Ok(());
        };

        let Some(order) = self.context.orders.find_order(&event.id).await? else {
            tracing::info!(order_id = %event.id, "Placed order not found");
            return Ok(());
        };

        let data = json!({
            "order": {
                "display_id": order.display_id,
                "email": order.recipient(),
                "total": order.total,
                "currency_code": order.currency_code,
            }
        });

        if let Some(to) = order.recipient() {
            self.context
                .notify(envelope, to, NotificationTemplate::OrderPlaced, data.clone())
                .await?;
        }

        let admin = self
            .context
            .urls
            .admin_order_email
            .as_deref()
            .map(str::trim)
            .filter(|email| !email.is_empty());

        if let Some(admin) = admin {
            self.context
                .notify(envelope, admin, NotificationTemplate::OrderPlacedAdmin, data)
                .await?;
        }

        Ok(())
    }
}
