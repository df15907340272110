use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Email,
}

/// The fixed set of notification templates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NotificationTemplate {
    EmailVerification,
    PasswordReset,
    OrderPlaced,
    OrderPlacedAdmin,
    OrderCanceled,
    OrderDelivered,
    OrderFulfillmentCreated,
    OrderShipped,
}

impl NotificationTemplate {
    pub const ALL: [NotificationTemplate; 8] = [
        NotificationTemplate::EmailVerification,
        NotificationTemplate::PasswordReset,
        NotificationTemplate::OrderPlaced,
        NotificationTemplate::OrderPlacedAdmin,
        NotificationTemplate::OrderCanceled,
        NotificationTemplate::OrderDelivered,
        NotificationTemplate::OrderFulfillmentCreated,
        NotificationTemplate::OrderShipped,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationTemplate::EmailVerification => "email-verification",
            NotificationTemplate::PasswordReset => "password-reset",
            NotificationTemplate::OrderPlaced => "order-placed",
            NotificationTemplate::OrderPlacedAdmin => "order-placed-admin",
            NotificationTemplate::OrderCanceled => "order-canceled",
            NotificationTemplate::OrderDelivered => "order-delivered",
            NotificationTemplate::OrderFulfillmentCreated => "order-fulfillment-created",
            NotificationTemplate::OrderShipped => "order-shipped",
        }
    }
}

impl fmt::Display for NotificationTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotificationTemplate {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|template| template.as_str() == s)
            .ok_or_else(|| format!("Unknown notification template: {}", s))
    }
}

/// Request to notify one recipient.
#[derive(Debug, Clone)]
pub struct CreateNotification {
    pub to: String,
    pub channel: Channel,
    pub template: NotificationTemplate,
    pub data: Value,
    /// Deliveries sharing a key produce one notification.
    pub idempotency_key: Option<String>,
}

impl CreateNotification {
    pub fn email(to: impl Into<String>, template: NotificationTemplate, data: Value) -> Self {
        Self {
            to: to.into(),
            channel: Channel::Email,
            template,
            data,
            idempotency_key: None,
        }
    }

    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationStatus {
    Pending,
    Sent,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Notification {
    pub id: String,
    pub to: String,
    pub channel: Channel,
    pub template: NotificationTemplate,
    pub data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
    pub status: NotificationStatus,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Notification {
    pub fn pending(request: &CreateNotification) -> Self {
        let now = Utc::now();
        Self {
            id: format!("noti_{}", Uuid::new_v4().simple()),
            to: request.to.clone(),
            channel: request.channel,
            template: request.template,
            data: request.data.clone(),
            idempotency_key: request.idempotency_key.clone(),
            status: NotificationStatus::Pending,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }
}
