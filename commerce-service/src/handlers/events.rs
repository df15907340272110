use axum::{extract::State, http::StatusCode, Json};
use service_core::error::AppError;

use crate::dtos::events::{PublishEventRequest, PublishEventResponse};
use crate::models::{DomainEvent, EventEnvelope};
use crate::utils::ValidatedJson;
use crate::AppState;

/// Publish a domain event onto the in-process bus
///
/// Reusing an `id` makes redelivery idempotent: subscribers mail at most once per id.
#[utoipa::path(
    post,
    path = "/admin/events",
    request_body = PublishEventRequest,
    responses(
        (status = 202, description = "Event accepted", body = PublishEventResponse),
        (status = 400, description = "Unknown event or malformed payload", body = ErrorResponse),
        (status = 401, description = "Missing or invalid admin API key", body = ErrorResponse),
        (status = 503, description = "Event queue full", body = ErrorResponse)
    ),
    tag = "Admin",
    security(("admin_api_key" = []))
)]
pub async fn publish_event(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<PublishEventRequest>,
) -> Result<(StatusCode, Json<PublishEventResponse>), AppError> {
    let event = DomainEvent::from_parts(req.name.trim(), req.data).map_err(AppError::InvalidData)?;
    let envelope = match req.id.filter(|id| !id.trim().is_empty()) {
        Some(id) => EventEnvelope::with_id(id, event),
        None => EventEnvelope::new(event),
    };
    let id = envelope.id.clone();

    tracing::info!(event_id = %id, event = envelope.name(), "Event received");
    state.events.publish(envelope)?;

    Ok((
        StatusCode::ACCEPTED,
        Json(PublishEventResponse { id, accepted: true }),
    ))
}
