use serde::{Deserialize, Serialize};

/// Read-only view of an order, as much as the notification subscribers need.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Order {
    pub id: String,
    pub display_id: Option<i64>,
    pub email: Option<String>,
    pub currency_code: Option<String>,
    pub total: Option<f64>,
    #[serde(default)]
    pub fulfillment_ids: Vec<String>,
}

impl Order {
    /// Deliverable address, if the order has one.
    pub fn recipient(&self) -> Option<&str> {
        self.email
            .as_deref()
            .map(str::trim)
            .filter(|email| !email.is_empty())
    }
}
