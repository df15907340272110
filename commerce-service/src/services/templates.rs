//! Rendering of notification payloads into email bodies.
//!
//! HTML goes through askama (auto-escaped); the plain-text part is built
//! alongside from the same view.

use askama::Template;
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::Value;

use super::error::ServiceError;
use crate::models::NotificationTemplate;

#[derive(Debug, Clone, PartialEq)]
pub struct RenderedEmail {
    pub subject: String,
    pub html: String,
    pub text: String,
}

#[derive(Debug, Deserialize)]
struct VerificationData {
    verify_url: String,
    #[serde(default)]
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PasswordResetData {
    reset_url: String,
}

#[derive(Debug, Default, Deserialize)]
struct OrderData {
    #[serde(default)]
    display_id: Option<Value>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    total: Option<f64>,
    #[serde(default)]
    currency_code: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TrackingLink {
    #[serde(default)]
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OrderPayload {
    #[serde(default)]
    order: OrderData,
    #[serde(default)]
    tracking_links: Vec<TrackingLink>,
}

impl OrderData {
    /// `#<display id>`, or the order email when there is no display id.
    fn label(&self) -> String {
        let display_id = self.display_id.as_ref().and_then(|id| match id {
            Value::Number(n) => Some(n.to_string()),
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            _ => None,
        });
        match (display_id, self.email.as_deref()) {
            (Some(id), _) => format!("#{}", id),
            (None, Some(email)) => email.to_string(),
            (None, None) => String::new(),
        }
    }

    fn total(&self) -> String {
        match (self.total, self.currency_code.as_deref()) {
            (Some(total), Some(currency)) => format!("{} {}", total, currency.to_uppercase()),
            (Some(total), None) => total.to_string(),
            (None, _) => String::new(),
        }
    }
}

#[derive(Template)]
#[template(path = "emails/email_verification.html")]
struct EmailVerificationEmail<'a> {
    email: &'a str,
    verify_url: &'a str,
}

#[derive(Template)]
#[template(path = "emails/password_reset.html")]
struct PasswordResetEmail<'a> {
    reset_url: &'a str,
}

#[derive(Template)]
#[template(path = "emails/order_placed.html")]
struct OrderPlacedEmail {
    order_label: String,
    total: String,
}

#[derive(Template)]
#[template(path = "emails/order_placed_admin.html")]
struct OrderPlacedAdminEmail {
    order_label: String,
    customer: String,
    total: String,
}

#[derive(Template)]
#[template(path = "emails/order_canceled.html")]
struct OrderCanceledEmail {
    order_label: String,
    reason: String,
}

#[derive(Template)]
#[template(path = "emails/order_delivered.html")]
struct OrderDeliveredEmail {
    order_label: String,
}

#[derive(Template)]
#[template(path = "emails/order_fulfillment_created.html")]
struct OrderFulfillmentCreatedEmail {
    order_label: String,
}

#[derive(Template)]
#[template(path = "emails/order_shipped.html")]
struct OrderShippedEmail {
    order_label: String,
    tracking_urls: Vec<String>,
}

const DEFAULT_CANCEL_REASON: &str = "Your order was canceled";

fn parse<T: DeserializeOwned>(template: NotificationTemplate, data: &Value) -> Result<T, ServiceError> {
    T::deserialize(data).map_err(|e| {
        ServiceError::invalid_data(format!("Invalid data for template {}: {}", template, e))
    })
}

fn html(template: impl Template) -> Result<String, ServiceError> {
    template
        .render()
        .map_err(|e| ServiceError::Internal(anyhow::anyhow!("Failed to render email: {}", e)))
}

pub fn render(template: NotificationTemplate, data: &Value) -> Result<RenderedEmail, ServiceError> {
    let rendered = match template {
        NotificationTemplate::EmailVerification => {
            let data: VerificationData = parse(template, data)?;
            let email = data.email.as_deref().unwrap_or_default();
            let greeting = if email.is_empty() {
                String::new()
            } else {
                format!("Hello {},\n\n", email)
            };
            RenderedEmail {
                subject: "Confirm your email".to_string(),
                html: html(EmailVerificationEmail {
                    email,
                    verify_url: &data.verify_url,
                })?,
                text: format!(
                    "{}Thanks for creating an account. Please confirm this email address so we can finish setting up your account.\n\nVerify email: {}\n\nIf you didn't create this account, you can ignore this email or contact support.\n",
                    greeting, data.verify_url
                ),
            }
        }
        NotificationTemplate::PasswordReset => {
            let data: PasswordResetData = parse(template, data)?;
            RenderedEmail {
                subject: "Reset your password".to_string(),
                html: html(PasswordResetEmail {
                    reset_url: &data.reset_url,
                })?,
                text: format!(
                    "We received a request to reset the password for your account.\n\nReset password: {}\n\nIf you didn't request a password reset, you can safely ignore this email.\n",
                    data.reset_url
                ),
            }
        }
        NotificationTemplate::OrderPlaced => {
            let payload: OrderPayload = parse(template, data)?;
            let order_label = payload.order.label();
            let total = payload.order.total();
            RenderedEmail {
                subject: "Thank you for your order".to_string(),
                text: format!(
                    "Order ID: {}\n{}\nWe've received your order and will let you know as soon as it ships.\n",
                    order_label,
                    line_if("Total: ", &total)
                ),
                html: html(OrderPlacedEmail { order_label, total })?,
            }
        }
        NotificationTemplate::OrderPlacedAdmin => {
            let payload: OrderPayload = parse(template, data)?;
            let order_label = payload.order.label();
            let customer = payload.order.email.clone().unwrap_or_default();
            let total = payload.order.total();
            RenderedEmail {
                subject: "New Order Received".to_string(),
                text: format!(
                    "Order ID: {}\nCustomer: {}\n{}\nYou can view the order details in the admin dashboard.\n",
                    order_label,
                    customer,
                    line_if("Total: ", &total)
                ),
                html: html(OrderPlacedAdminEmail {
                    order_label,
                    customer,
                    total,
                })?,
            }
        }
        NotificationTemplate::OrderCanceled => {
            let payload: OrderPayload = parse(template, data)?;
            let order_label = payload.order.label();
            let reason = payload
                .order
                .reason
                .clone()
                .filter(|r| !r.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_CANCEL_REASON.to_string());
            RenderedEmail {
                subject: "Order Canceled".to_string(),
                text: format!(
                    "Your order {} has been canceled.\nReason: {}\n\nIf you believe this was a mistake, please reply to this email and we'll be happy to help.\n",
                    order_label, reason
                ),
                html: html(OrderCanceledEmail {
                    order_label,
                    reason,
                })?,
            }
        }
        NotificationTemplate::OrderDelivered => {
            let payload: OrderPayload = parse(template, data)?;
            let order_label = payload.order.label();
            RenderedEmail {
                subject: "Order Delivered".to_string(),
                text: format!(
                    "Order ID: {}\n\nWe hope you enjoy your purchase. If anything is wrong with your order, reply to this email and we'll help right away.\n",
                    order_label
                ),
                html: html(OrderDeliveredEmail { order_label })?,
            }
        }
        NotificationTemplate::OrderFulfillmentCreated => {
            let payload: OrderPayload = parse(template, data)?;
            let order_label = payload.order.label();
            RenderedEmail {
                subject: "We're preparing your order".to_string(),
                text: format!(
                    "Order ID: {}\n\nWe've started processing your shipment. You'll receive tracking details once it ships.\n",
                    order_label
                ),
                html: html(OrderFulfillmentCreatedEmail { order_label })?,
            }
        }
        NotificationTemplate::OrderShipped => {
            let payload: OrderPayload = parse(template, data)?;
            let order_label = payload.order.label();
            let tracking_urls: Vec<String> = payload
                .tracking_links
                .into_iter()
                .filter_map(|link| link.url)
                .filter(|url| !url.trim().is_empty())
                .collect();
            let tracking = if tracking_urls.is_empty() {
                String::new()
            } else {
                format!("\nTracking:\n{}\n", tracking_urls.join("\n"))
            };
            RenderedEmail {
                subject: "Your Order Has Shipped".to_string(),
                text: format!(
                    "Order ID: {}\n{}\nWe'll notify you once your package is delivered.\n",
                    order_label, tracking
                ),
                html: html(OrderShippedEmail {
                    order_label,
                    tracking_urls,
                })?,
            }
        }
    };

    Ok(rendered)
}

fn line_if(prefix: &str, value: &str) -> String {
    if value.is_empty() {
        String::new()
    } else {
        format!("{}{}\n", prefix, value)
    }
}
