use std::sync::Arc;

use super::email::{EmailMessage, EmailProvider};
use super::error::ServiceError;
use super::metrics;
use super::repository::{NotificationRepository, RecordOutcome};
use super::templates;
use crate::models::{CreateNotification, Notification, NotificationStatus};

#[derive(Debug, Clone)]
pub enum NotificationOutcome {
    Sent(Notification),
    /// Already handled by an earlier delivery with the same idempotency key.
    Duplicate(Notification),
}

/// Renders, records and delivers notifications.
#[derive(Clone)]
pub struct NotificationService {
    repository: Arc<dyn NotificationRepository>,
    email: Arc<dyn EmailProvider>,
}

impl NotificationService {
    pub fn new(repository: Arc<dyn NotificationRepository>, email: Arc<dyn EmailProvider>) -> Self {
        Self { repository, email }
    }

    pub async fn create_notification(
        &self,
        request: CreateNotification,
    ) -> Result<NotificationOutcome, ServiceError> {
        let rendered = templates::render(request.template, &request.data)?;

        let notification = match self.repository.record(Notification::pending(&request)).await? {
            RecordOutcome::Recorded(notification) => notification,
            RecordOutcome::Duplicate(existing) => {
                tracing::info!(
                    notification_id = %existing.id,
                    template = %existing.template,
                    idempotency_key = ?existing.idempotency_key,
                    "Skipping duplicate notification"
                );
                return Ok(NotificationOutcome::Duplicate(existing));
            }
        };

        let message = EmailMessage {
            to: request.to.clone(),
            subject: rendered.subject,
            body_text: rendered.text,
            body_html: rendered.html,
        };

        if let Err(e) = self.email.send(&message).await {
            tracing::error!(
                notification_id = %notification.id,
                template = %request.template,
                error = %e,
                "Failed to deliver notification"
            );
            self.repository
                .set_status(&notification.id, NotificationStatus::Failed, Some(e.to_string()))
                .await?;
            return Err(ServiceError::EmailError(e.to_string()));
        }

        self.repository
            .set_status(&notification.id, NotificationStatus::Sent, None)
            .await?;
        metrics::record_notification_created(request.template);

        tracing::info!(
            notification_id = %notification.id,
            template = %request.template,
            "Notification sent"
        );

        Ok(NotificationOutcome::Sent(Notification {
            status: NotificationStatus::Sent,
            ..notification
        }))
    }

    pub async fn list_for_recipient(&self, to: &str) -> Result<Vec<Notification>, ServiceError> {
        Ok(self.repository.list_by_recipient(to).await?)
    }
}
