pub mod admin;
pub mod error;
pub mod health;
pub mod state;
pub mod webhook;

use axum::routing::{delete, get, post};
use axum::Router;

pub use error::{ApiError, ApiResult, ErrorResponse};
pub use state::AppState;

/// Build the full router: the single webhook-ingress route plus the
/// connect/admin surface, wired to one `AppState`.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/webhooks", post(webhook::handle_webhook))
        .route("/repos", post(admin::connect_repo))
        .route("/repos/{slug}", delete(admin::disconnect_repo))
        .route("/repos/{slug}/pause", post(admin::pause_repo))
        .route("/repos/{slug}/resume", post(admin::resume_repo))
        .route("/repos/{slug}/interview", post(admin::interview_step))
        .route("/healthz", get(health::health))
        .with_state(state)
}
