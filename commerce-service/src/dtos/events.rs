use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;
use validator::Validate;

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct PublishEventRequest {
    #[validate(length(min = 1, message = "Event name is required"))]
    #[schema(example = "delivery.created")]
    pub name: String,
    #[serde(default)]
    #[schema(value_type = Object, example = json!({ "id": "ful_123" }))]
    pub data: Value,
    /// Caller supplied id; reusing it makes redelivery idempotent.
    #[schema(example = "evt_01")]
    pub id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PublishEventResponse {
    pub id: String,
    pub accepted: bool,
}
