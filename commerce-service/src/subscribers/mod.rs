//! Event subscribers turning order lifecycle and auth events into notifications.
//!
//! Each one fetches what it needs, skips quietly when there is nobody to
//! mail, and lets fetch or delivery failures propagate to the bus.

pub mod order_canceled;
pub mod order_delivered;
pub mod order_fulfillment_created;
pub mod order_placed;
pub mod order_shipped;
pub mod password_reset;

use serde_json::Value;
use std::sync::Arc;

use crate::config::UrlConfig;
use crate::events::SubscriberRegistry;
use crate::models::event::FulfillmentEvent;
use crate::models::{CreateNotification, EventEnvelope, NotificationTemplate, Order};
use crate::services::{NotificationService, OrderRepository, ServiceError};

pub use order_canceled::OrderCanceledSubscriber;
pub use order_delivered::OrderDeliveredSubscriber;
pub use order_fulfillment_created::OrderFulfillmentCreatedSubscriber;
pub use order_placed::OrderPlacedSubscriber;
pub use order_shipped::OrderShippedSubscriber;
pub use password_reset::PasswordResetSubscriber;

/// Collaborators shared by every subscriber.
#[derive(Clone)]
pub struct SubscriberContext {
    pub orders: Arc<dyn OrderRepository>,
    pub notifications: NotificationService,
    pub urls: UrlConfig,
}

impl SubscriberContext {
    /// Sends one notification keyed on the event id, so a redelivered event
    /// does not mail twice.
    pub(crate) async fn notify(
        &self,
        envelope: &EventEnvelope,
        to: &str,
        template: NotificationTemplate,
        data: Value,
    ) -> Result<(), ServiceError> {
        let request = CreateNotification::email(to, template, data)
            .with_idempotency_key(format!("{}:{}", envelope.id, template));
        self.notifications.create_notification(request).await?;
        Ok(())
    }

    /// Order behind a delivery or shipment, by fulfillment first and then by order id.
    pub(crate) async fn order_for_fulfillment(
        &self,
        event: &FulfillmentEvent,
    ) -> Result<Option<Order>, ServiceError> {
        if let Some(fulfillment_id) = event.fulfillment_id() {
            if let Some(order) = self.orders.find_order_by_fulfillment(fulfillment_id).await? {
                return Ok(Some(order));
            }
        }

        match event.order_id.as_deref().filter(|id| !id.is_empty()) {
            Some(order_id) => Ok(self.orders.find_order(order_id).await?),
            None => Ok(None),
        }
    }
}

/// Registry with every subscriber of this service.
pub fn build_registry(context: SubscriberContext) -> SubscriberRegistry {
    let mut registry = SubscriberRegistry::new();
    registry.register(Arc::new(OrderPlacedSubscriber::new(context.clone())));
    registry.register(Arc::new(OrderCanceledSubscriber::new(context.clone())));
    registry.register(Arc::new(OrderDeliveredSubscriber::new(context.clone())));
    registry.register(Arc::new(OrderFulfillmentCreatedSubscriber::new(context.clone())));
    registry.register(Arc::new(OrderShippedSubscriber::new(context.clone())));
    registry.register(Arc::new(PasswordResetSubscriber::new(context)));
    registry
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::services::{MemoryStore, MockEmailProvider};

    pub struct Harness {
        pub store: Arc<MemoryStore>,
        pub email: Arc<MockEmailProvider>,
        pub context: SubscriberContext,
    }

    pub fn harness(admin_order_email: Option<&str>) -> Harness {
        let store = Arc::new(MemoryStore::new());
        let email = Arc::new(MockEmailProvider::new());
        let context = SubscriberContext {
            orders: store.clone(),
            notifications: NotificationService::new(store.clone(), email.clone()),
            urls: UrlConfig {
                store_cors: vec!["https://shop.example.com/".into()],
                storefront_url: None,
                admin_backend_url: "/".into(),
                admin_path: "/app".into(),
                admin_order_email: admin_order_email.map(str::to_string),
            },
        };
        Harness {
            store,
            email,
            context,
        }
    }

    pub fn order(id: &str, email: Option<&str>, fulfillment_ids: &[&str]) -> Order {
        Order {
            id: id.to_string(),
            display_id: Some(42),
            email: email.map(str::to_string),
            currency_code: Some("usd".into()),
            total: Some(99.5),
            fulfillment_ids: fulfillment_ids.iter().map(|f| f.to_string()).collect(),
        }
    }
}
