use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;

use crate::state::AppState;

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
}

/// `GET /healthz` — liveness/readiness: pings the db pool, 200/503.
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    match sqlx::query("SELECT 1").execute(&state.pool).await {
        Ok(_) => (StatusCode::OK, Json(HealthResponse { status: "healthy" })),
        Err(_) => (StatusCode::SERVICE_UNAVAILABLE, Json(HealthResponse { status: "unavailable" })),
    }
}
