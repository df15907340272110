use service_core::observability::render_metrics;

/// Prometheus metrics endpoint
#[utoipa::path(
    get,
    path = "/metrics",
    responses(
        (status = 200, description = "Prometheus metrics in text format", body = String)
    ),
    tag = "Observability"
)]
pub async fn metrics() -> String {
    render_metrics()
}
