use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::{body::Bytes, http::StatusCode, Json};
use reviewbot_core::{Provider, RepoStatus};
use reviewbot_db::{Queue, WEBHOOK_EVENTS_QUEUE};
use reviewbot_forge::{
    extract_repo_full_name, parse_github_event, parse_gitlab_event, verify_github_signature,
    verify_gitlab_token,
};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

fn skipped(reason: &str) -> axum::response::Response {
    (StatusCode::OK, Json(serde_json::json!({"skipped": true, "reason": reason}))).into_response()
}

fn accepted(matched: usize) -> axum::response::Response {
    (StatusCode::OK, Json(serde_json::json!({"accepted": true, "matched": matched}))).into_response()
}

/// Single webhook-ingress route. GitHub verifies the HMAC signature against
/// one App-level secret before parsing the body; GitLab parses the body
/// first to find the project path, then accepts if the `X-Gitlab-Token`
/// header matches any connected repo's per-repo `webhook_secret`. Matches
/// fan out to one `WebhookEvent` per non-paused subscriber.
pub async fn handle_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<axum::response::Response> {
    if let Some(event_header) = headers.get("X-GitHub-Event").and_then(|v| v.to_str().ok()) {
        return handle_github(&state, &headers, event_header, &body).await;
    }
    if let Some(event_header) = headers.get("X-Gitlab-Event").and_then(|v| v.to_str().ok()) {
        return handle_gitlab(&state, &headers, event_header, &body).await;
    }

    Ok(skipped("missing X-GitHub-Event or X-Gitlab-Event header"))
}

async fn handle_github(
    state: &AppState,
    headers: &HeaderMap,
    event_header: &str,
    body: &[u8],
) -> ApiResult<axum::response::Response> {
    if event_header != "pull_request" {
        return Ok(skipped("unhandled GitHub event type"));
    }

    let signature = headers
        .get("X-Hub-Signature-256")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::InvalidSignature("missing X-Hub-Signature-256".into()))?;
    if !verify_github_signature(body, signature, &state.github_webhook_secret) {
        return Err(ApiError::InvalidSignature("signature mismatch".into()));
    }

    let payload: serde_json::Value = serde_json::from_slice(body)
        .map_err(|e| ApiError::InvalidPayload(format!("invalid JSON body: {e}")))?;

    let Some(parsed) = parse_github_event(&payload) else {
        return Ok(skipped("unrecognized or unsupported action"));
    };

    let subscribers = reviewbot_db::repos::list_by_name(&state.pool, Provider::Github, &parsed.repo_name)
        .await
        .map_err(ApiError::from)?;

    let queue = Queue::new(&state.pool, WEBHOOK_EVENTS_QUEUE);
    let mut matched = 0;
    for repo in subscribers.iter().filter(|r| r.status != RepoStatus::Paused) {
        let event = parsed.clone().into_webhook_event(&repo.user_id, &repo.slug);
        queue.enqueue(&event).await.map_err(ApiError::from)?;
        matched += 1;
    }

    Ok(accepted(matched))
}

async fn handle_gitlab(
    state: &AppState,
    headers: &HeaderMap,
    event_header: &str,
    body: &[u8],
) -> ApiResult<axum::response::Response> {
    if event_header != "Merge Request Hook" {
        return Ok(skipped("unhandled GitLab event type"));
    }

    let payload: serde_json::Value = serde_json::from_slice(body)
        .map_err(|e| ApiError::InvalidPayload(format!("invalid JSON body: {e}")))?;

    let Some(project_path) = extract_repo_full_name(&payload, Provider::Gitlab) else {
        return Err(ApiError::InvalidPayload("missing project.path_with_namespace".into()));
    };

    let token = headers
        .get("X-Gitlab-Token")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::InvalidSignature("missing X-Gitlab-Token".into()))?;

    let subscribers = reviewbot_db::repos::list_by_name(&state.pool, Provider::Gitlab, &project_path)
        .await
        .map_err(ApiError::from)?;

    let any_secret_matches = subscribers
        .iter()
        .any(|r| r.webhook_secret.as_deref().is_some_and(|secret| verify_gitlab_token(token, secret)));
    if !any_secret_matches {
        return Err(ApiError::InvalidSignature("token matched no connected repo".into()));
    }

    let Some(parsed) = parse_gitlab_event(&payload) else {
        return Ok(skipped("unrecognized or unsupported action"));
    };

    let queue = Queue::new(&state.pool, WEBHOOK_EVENTS_QUEUE);
    let mut matched = 0;
    for repo in subscribers.iter().filter(|r| r.status != RepoStatus::Paused) {
        let event = parsed.clone().into_webhook_event(&repo.user_id, &repo.slug);
        queue.enqueue(&event).await.map_err(ApiError::from)?;
        matched += 1;
    }

    Ok(accepted(matched))
}
