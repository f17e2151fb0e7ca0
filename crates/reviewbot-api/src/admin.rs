use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use rand::Rng;
use reviewbot_core::{ConnectedRepo, InterviewQuestion, InterviewStep, Provider, RepoStatus};
use reviewbot_pipeline::{interview_driver, AnsweredQuestion, RepoAnalysisPayload};
use reviewbot_db::{Queue, REPO_ANALYSIS_QUEUE};
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

fn require_user_id(headers: &HeaderMap) -> ApiResult<String> {
    headers
        .get("X-User-Id")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .ok_or_else(|| ApiError::Unauthorized("missing X-User-Id header".into()))
}

#[derive(Debug, Deserialize)]
pub struct ConnectRepoRequest {
    pub user_id: String,
    pub slug: String,
    pub name: String,
    pub provider: Provider,
}

/// `POST /repos` — insert a new `ConnectedRepo` in `analyzing` state, enqueue
/// its analysis job, and for GitLab create the per-project webhook up front
/// (GitHub App installations get their webhook automatically).
pub async fn connect_repo(
    State(state): State<AppState>,
    Json(req): Json<ConnectRepoRequest>,
) -> ApiResult<impl IntoResponse> {
    let repo = ConnectedRepo {
        user_id: req.user_id.clone(),
        slug: req.slug.clone(),
        name: req.name.clone(),
        provider: req.provider,
        status: RepoStatus::Analyzing,
        connected_at: reviewbot_db::repos::now(),
        analysis_profile: None,
        persona: None,
        persona_edited: false,
        custom_skills: vec![],
        webhook_hook_id: None,
        webhook_secret: None,
    };

    reviewbot_db::repos::insert(&state.pool, &repo).await.map_err(ApiError::from)?;

    if req.provider == Provider::Gitlab {
        let settings = reviewbot_db::settings::get(&state.pool, &req.user_id)
            .await
            .map_err(ApiError::from)?;
        let token = settings
            .gitlab_token
            .ok_or_else(|| ApiError::Unauthorized("no GitLab token on file for user".into()))?;

        let secret_bytes: [u8; 32] = rand::rng().random();
        let secret = hex::encode(secret_bytes);

        let hook_id = state
            .gitlab_adapter
            .create_webhook(&req.name, &token, &state.webhook_base_url, &secret)
            .await
            .map_err(|e| ApiError::Internal(format!("failed to create GitLab webhook: {e}")))?;

        reviewbot_db::repos::set_webhook(&state.pool, &req.user_id, &req.slug, hook_id, &secret)
            .await
            .map_err(ApiError::from)?;
    }

    let payload = RepoAnalysisPayload {
        user_id: req.user_id,
        slug: req.slug,
        repo_name: req.name,
        provider: req.provider,
    };
    Queue::new(&state.pool, REPO_ANALYSIS_QUEUE)
        .enqueue(&payload)
        .await
        .map_err(ApiError::from)?;

    Ok((StatusCode::CREATED, Json(repo)))
}

/// `DELETE /repos/{slug}` — best-effort webhook teardown (GitLab), then
/// delete the row; reviews cascade per storage foreign keys.
pub async fn disconnect_repo(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(slug): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let user_id = require_user_id(&headers)?;
    let repo = reviewbot_db::repos::get(&state.pool, &user_id, &slug).await.map_err(ApiError::from)?;

    if repo.provider == Provider::Gitlab {
        if let Some(hook_id) = repo.webhook_hook_id {
            if let Ok(settings) = reviewbot_db::settings::get(&state.pool, &user_id).await {
                if let Some(token) = settings.gitlab_token {
                    if let Err(e) = state.gitlab_adapter.delete_webhook(&repo.name, hook_id, &token).await {
                        tracing::warn!(user_id = %user_id, slug = %slug, error = %e, "failed to delete GitLab webhook, proceeding with disconnect");
                    }
                }
            }
        }
    }

    reviewbot_db::repos::delete(&state.pool, &user_id, &slug).await.map_err(ApiError::from)?;
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /repos/{slug}/pause` and `POST /repos/{slug}/resume` — toggle
/// `active <-> paused`; 409 outside those two states.
async fn set_active(state: AppState, user_id: &str, slug: &str, target: RepoStatus) -> ApiResult<impl IntoResponse> {
    let repo = reviewbot_db::repos::get(&state.pool, user_id, slug).await.map_err(ApiError::from)?;

    let allowed = matches!(
        (repo.status, target),
        (RepoStatus::Active, RepoStatus::Paused) | (RepoStatus::Paused, RepoStatus::Active)
    );
    if !allowed {
        return Err(ApiError::Conflict(format!(
            "cannot transition {:?} -> {:?}",
            repo.status, target
        )));
    }

    reviewbot_db::repos::set_status(&state.pool, user_id, slug, target).await.map_err(ApiError::from)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn pause_repo(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(slug): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let user_id = require_user_id(&headers)?;
    set_active(state, &user_id, &slug, RepoStatus::Paused).await
}

pub async fn resume_repo(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(slug): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let user_id = require_user_id(&headers)?;
    set_active(state, &user_id, &slug, RepoStatus::Active).await
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct TranscriptEntry {
    question: InterviewQuestion,
    answer: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct InterviewAnswerRequest {
    #[serde(default)]
    pub answer: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
enum InterviewResponse {
    Question { question: InterviewQuestion, question_number: u32, estimated_total: u32 },
    Complete { persona: String },
}

/// `POST /repos/{slug}/interview` — one stateless `InterviewDriver` step.
/// The Q/A transcript is persisted between calls on the repo row itself
/// (see the interview-transcript-persistence decision in `DESIGN.md`), so
/// each HTTP call only needs to carry the latest answer.
pub async fn interview_step(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(slug): Path<String>,
    Json(req): Json<InterviewAnswerRequest>,
) -> ApiResult<impl IntoResponse> {
    let user_id = require_user_id(&headers)?;
    let repo = reviewbot_db::repos::get(&state.pool, &user_id, &slug).await.map_err(ApiError::from)?;

    if repo.status != RepoStatus::Interview {
        return Err(ApiError::Conflict(format!(
            "repo is not in the interview state (currently {:?})",
            repo.status
        )));
    }

    let raw_transcript = reviewbot_db::repos::get_interview_transcript(&state.pool, &user_id, &slug)
        .await
        .map_err(ApiError::from)?;
    let mut transcript: Vec<TranscriptEntry> = match raw_transcript {
        Some(ref raw) => serde_json::from_str(raw).map_err(ApiError::from)?,
        None => vec![],
    };

    if let Some(answer) = req.answer {
        if let Some(last) = transcript.last_mut() {
            if last.answer.is_none() {
                last.answer = Some(answer);
            }
        }
    }

    let answers: Vec<AnsweredQuestion> = transcript
        .iter()
        .filter_map(|e| e.answer.clone().map(|a| AnsweredQuestion { question: e.question.clone(), answer: a }))
        .collect();

    let settings = reviewbot_db::settings::get(&state.pool, &user_id).await.map_err(ApiError::from)?;
    let api_key = settings
        .api_key
        .clone()
        .ok_or_else(|| ApiError::Unauthorized("no LLM API key configured for user".into()))?;
    let model = settings.normalized_model();

    let step = interview_driver::run(
        &state.services,
        &api_key,
        &model,
        repo.analysis_profile.as_deref(),
        &answers,
    )
    .await
    .map_err(ApiError::from)?;

    match step {
        InterviewStep::Question { question, question_number, estimated_total } => {
            transcript.push(TranscriptEntry { question: question.clone(), answer: None });
            let encoded = serde_json::to_string(&transcript).map_err(ApiError::from)?;
            reviewbot_db::repos::set_interview_transcript(&state.pool, &user_id, &slug, Some(&encoded))
                .await
                .map_err(ApiError::from)?;

            Ok((
                StatusCode::OK,
                Json(InterviewResponse::Question { question, question_number, estimated_total }),
            ))
        }
        InterviewStep::Complete { persona } => {
            reviewbot_db::repos::set_persona(
                &state.pool,
                &user_id,
                &slug,
                &persona,
                repo.analysis_profile.as_deref(),
                false,
            )
            .await
            .map_err(ApiError::from)?;
            reviewbot_db::repos::set_status(&state.pool, &user_id, &slug, RepoStatus::Active)
                .await
                .map_err(ApiError::from)?;
            reviewbot_db::repos::set_interview_transcript(&state.pool, &user_id, &slug, None)
                .await
                .map_err(ApiError::from)?;

            Ok((StatusCode::OK, Json(InterviewResponse::Complete { persona })))
        }
        InterviewStep::Error { message } => Err(ApiError::Internal(format!("interview agent error: {message}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transcript_entry_round_trips_through_json() {
        let entry = TranscriptEntry {
            question: InterviewQuestion::ShortText { prompt: "p".into(), placeholder: None },
            answer: Some("a".into()),
        };
        let json = serde_json::to_string(&entry).unwrap();
        let back: TranscriptEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(back.answer.as_deref(), Some("a"));
    }
}
