use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

pub const ORDER_PLACED: &str = "order.placed";
pub const ORDER_CANCELED: &str = "order.canceled";
pub const DELIVERY_CREATED: &str = "delivery.created";
pub const ORDER_FULFILLMENT_CREATED: &str = "order.fulfillment_created";
pub const SHIPMENT_CREATED: &str = "shipment.created";
pub const AUTH_PASSWORD_RESET: &str = "auth.password_reset";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderPlaced {
    pub id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderCanceled {
    pub id: Option<String>,
    pub reason: Option<String>,
}

/// Payload shared by `delivery.created` and `shipment.created`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FulfillmentEvent {
    pub id: Option<String>,
    pub fulfillment_id: Option<String>,
    pub order_id: Option<String>,
    #[serde(default)]
    pub no_notification: bool,
}

impl FulfillmentEvent {
    pub fn fulfillment_id(&self) -> Option<&str> {
        self.fulfillment_id
            .as_deref()
            .or(self.id.as_deref())
            .filter(|id| !id.is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderFulfillmentCreated {
    pub order_id: Option<String>,
    pub fulfillment_id: Option<String>,
    #[serde(default)]
    pub no_notification: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PasswordReset {
    pub entity_id: String,
    pub token: String,
    pub actor_type: String,
}

/// Events this service reacts to, with their payloads validated up front.
#[derive(Debug, Clone, PartialEq)]
pub enum DomainEvent {
    OrderPlaced(OrderPlaced),
    OrderCanceled(OrderCanceled),
    DeliveryCreated(FulfillmentEvent),
    OrderFulfillmentCreated(OrderFulfillmentCreated),
    ShipmentCreated(FulfillmentEvent),
    PasswordReset(PasswordReset),
}

impl DomainEvent {
    pub fn from_parts(name: &str, data: Value) -> Result<Self, String> {
        let event = match name {
            ORDER_PLACED => DomainEvent::OrderPlaced(payload(name, data)?),
            ORDER_CANCELED => DomainEvent::OrderCanceled(payload(name, data)?),
            DELIVERY_CREATED => DomainEvent::DeliveryCreated(payload(name, data)?),
            ORDER_FULFILLMENT_CREATED => DomainEvent::OrderFulfillmentCreated(payload(name, data)?),
            SHIPMENT_CREATED => DomainEvent::ShipmentCreated(payload(name, data)?),
            AUTH_PASSWORD_RESET => DomainEvent::PasswordReset(payload(name, data)?),
            other => return Err(format!("Unknown event: {}", other)),
        };
        Ok(event)
    }

    pub fn name(&self) -> &'static str {
        match self {
            DomainEvent::OrderPlaced(_) => ORDER_PLACED,
            DomainEvent::OrderCanceled(_) => ORDER_CANCELED,
            DomainEvent::DeliveryCreated(_) => DELIVERY_CREATED,
            DomainEvent::OrderFulfillmentCreated(_) => ORDER_FULFILLMENT_CREATED,
            DomainEvent::ShipmentCreated(_) => SHIPMENT_CREATED,
            DomainEvent::PasswordReset(_) => AUTH_PASSWORD_RESET,
        }
    }
}

fn payload<T: DeserializeOwned>(name: &str, data: Value) -> Result<T, String> {
    let data = if data.is_null() {
        Value::Object(Default::default())
    } else {
        data
    };
    serde_json::from_value(data).map_err(|e| format!("Invalid payload for {}: {}", name, e))
}

/// An event on the bus. The id is stable across redeliveries.
#[derive(Debug, Clone)]
pub struct EventEnvelope {
    pub id: String,
    pub event: DomainEvent,
    pub received_at: DateTime<Utc>,
}

impl EventEnvelope {
    pub fn new(event: DomainEvent) -> Self {
        Self::with_id(format!("evt_{}", Uuid::new_v4().simple()), event)
    }

    pub fn with_id(id: impl Into<String>, event: DomainEvent) -> Self {
        Self {
            id: id.into(),
            event,
            received_at: Utc::now(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.event.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_delivery_payload() {
        let event = DomainEvent::from_parts(
            DELIVERY_CREATED,
            json!({ "id": "ful_1", "no_notification": true }),
        )
        .unwrap();
        match event {
            DomainEvent::DeliveryCreated(data) => {
                assert_eq!(data.fulfillment_id(), Some("ful_1"));
                assert!(data.no_notification);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn explicit_fulfillment_id_wins_over_id() {
        let data = FulfillmentEvent {
            id: Some("dlv_1".into()),
            fulfillment_id: Some("ful_2".into()),
            ..Default::default()
        };
        assert_eq!(data.fulfillment_id(), Some("ful_2"));
    }

    #[test]
    fn rejects_unknown_names_and_bad_payloads() {
        assert!(DomainEvent::from_parts("order.refunded", json!({})).is_err());
        assert!(DomainEvent::from_parts(AUTH_PASSWORD_RESET, json!({ "token": "t" })).is_err());
    }
}
