use async_trait::async_trait;
use serde_json::json;

use super::SubscriberContext;
use crate::events::Subscriber;
use crate::models::event::AUTH_PASSWORD_RESET;
use crate::models::{DomainEvent, EventEnvelope, NotificationTemplate};
use crate::services::{ActorType, ServiceError};

/// Mails the reset link minted by the reset-password route.
pub struct PasswordResetSubscriber {
    context: SubscriberContext,
}

impl PasswordResetSubscriber {
    pub fn new(context: SubscriberContext) -> Self {
        Self { context }
    }
}

#[async_trait]
impl Subscriber for PasswordResetSubscriber {
    fn event_name(&self) -> &'static str {
        AUTH_PASSWORD_RESET
    }

    fn name(&self) -> &'static str {
        "password-reset"
    }

    async fn handle(&self, envelope: &EventEnvelope) -> Result<(), ServiceError> {
        let DomainEvent::PasswordReset(event) = &envelope.event else {
            return Ok(());
        };

        let to = event.entity_id.trim();
        if to.is_empty() || event.token.is_empty() {
            tracing::warn!(event_id = %envelope.id, "Password reset event without recipient or token");
            return Ok(());
        }

        let prefix = if event.actor_type == ActorType::Customer.as_str() {
            self.context.urls.storefront_url()
        } else {
            self.context.urls.admin_url()
        };

        let reset_url = format!(
            "{}/reset-password?token={}&email={}",
            prefix,
            event.token,
            urlencoding::encode(to)
        );

        self.context
            .notify(
                envelope,
                to,
                NotificationTemplate::PasswordReset,
                json!({ "reset_url": reset_url }),
            )
            .await
    }
}
