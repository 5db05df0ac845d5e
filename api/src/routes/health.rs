use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::{Json, Router, routing::get};
use healthmate_core::jobs::HealthStatus;

use crate::HealthResponse;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}

pub fn health_response(status: HealthStatus) -> (StatusCode, HealthResponse) {
    let http_status = if status.is_ok() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        http_status,
        HealthResponse {
            status: status.status,
            version: env!("CARGO_PKG_VERSION").to_string(),
            failing: status.failing,
            checked_at: status.checked_at,
        },
    )
}

/// Health check endpoint. Reports the last collaborator probe (store, completion, messenger)
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse),
        (status = 503, description = "A collaborator failed the last probe", body = HealthResponse)
    ),
    tag = "system"
)]
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let (status, body) = health_response(state.health.current().await);
    (status, Json(body))
}
