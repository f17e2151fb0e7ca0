/// Integration tests for the webhook-ingress route, exercised end to end
/// through the router rather than calling handlers directly.
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use chrono::Utc;
use hmac::{Hmac, Mac};
use reviewbot_api::{router, AppState};
use reviewbot_core::{ConnectedRepo, Provider, RepoStatus};
use reviewbot_db::{Queue, WEBHOOK_EVENTS_QUEUE};
use reviewbot_forge::{GithubAdapter, GitlabAdapter};
use reviewbot_pipeline::{OAuthClientConfig, PipelineConfig, Services, TokenStore};
use sha2::Sha256;
use sqlx::any::AnyPoolOptions;
use std::sync::Arc;
use tower::ServiceExt;

type HmacSha256 = Hmac<Sha256>;

const WEBHOOK_SECRET: &str = "test-secret";

async fn setup_test_state() -> AppState {
    sqlx::any::install_default_drivers();

    let pool = AnyPoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("failed to create test database pool");

    sqlx::query("PRAGMA foreign_keys = ON")
        .execute(&pool)
        .await
        .expect("failed to enable foreign keys");

    sqlx::query(include_str!("../../reviewbot-db/migrations/001_initial.sql"))
        .execute(&pool)
        .await
        .expect("failed to run migrations");

    let oauth = OAuthClientConfig { client_id: "x".into(), client_secret: "y".into() };
    let token_store = TokenStore::new(pool.clone(), reqwest::Client::new(), oauth.clone(), oauth);

    let skills = reviewbot_core::SkillsCatalog::load(std::path::Path::new("/nonexistent"))
        .expect("missing skills dir loads empty");

    let services = Arc::new(Services::new(
        pool.clone(),
        token_store,
        PipelineConfig::default(),
        skills,
        Arc::new(GithubAdapter::new()),
        Arc::new(GitlabAdapter::new()),
        None,
        None,
    ));

    AppState::new(
        pool,
        services,
        Arc::new(GitlabAdapter::new()),
        WEBHOOK_SECRET.to_string(),
        "https://example.com/webhooks".to_string(),
    )
}

fn compute_signature(body: &[u8], secret: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(body);
    format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
}

fn create_app(state: AppState) -> Router {
    router(state)
}

fn pr_opened_payload() -> serde_json::Value {
    serde_json::json!({
        "action": "opened",
        "number": 1,
        "pull_request": {
            "number": 1,
            "title": "Test PR",
            "html_url": "https://github.com/owner/repo/pull/1",
            "user": {"login": "testuser"},
            "base": {"ref": "main"},
            "head": {"ref": "feature"},
        },
        "repository": {
            "full_name": "owner/repo",
        },
    })
}

async fn connect_sample_repo(state: &AppState) {
    reviewbot_db::repos::insert(
        &state.pool,
        &ConnectedRepo {
            user_id: "u1".into(),
            slug: "owner-repo".into(),
            name: "owner/repo".into(),
            provider: Provider::Github,
            status: RepoStatus::Active,
            connected_at: Utc::now(),
            analysis_profile: Some("a monorepo".into()),
            persona: Some("be terse".into()),
            persona_edited: true,
            custom_skills: vec![],
            webhook_hook_id: None,
            webhook_secret: None,
        },
    )
    .await
    .expect("failed to insert connected repo");
}

#[tokio::test]
async fn health_endpoint_reports_ok() {
    let state = setup_test_state().await;
    let app = create_app(state);

    let response = app
        .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["status"], "healthy");
}

#[tokio::test]
async fn webhook_with_invalid_signature_is_rejected() {
    let state = setup_test_state().await;
    let app = create_app(state);

    let body = serde_json::to_vec(&pr_opened_payload()).unwrap();

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/webhooks")
                .header("Content-Type", "application/json")
                .header("X-GitHub-Event", "pull_request")
                .header("X-Hub-Signature-256", "sha256=0000")
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn webhook_with_no_subscriber_is_accepted_with_zero_matches() {
    let state = setup_test_state().await;
    let app = create_app(state);

    let body = serde_json::to_vec(&pr_opened_payload()).unwrap();
    let signature = compute_signature(&body, WEBHOOK_SECRET);

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/webhooks")
                .header("Content-Type", "application/json")
                .header("X-GitHub-Event", "pull_request")
                .header("X-Hub-Signature-256", signature)
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["matched"], 0);
}

#[tokio::test]
async fn webhook_pr_opened_enqueues_event_for_connected_subscriber() {
    let state = setup_test_state().await;
    connect_sample_repo(&state).await;
    let pool = state.pool.clone();
    let app = create_app(state);

    let body = serde_json::to_vec(&pr_opened_payload()).unwrap();
    let signature = compute_signature(&body, WEBHOOK_SECRET);

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/webhooks")
                .header("Content-Type", "application/json")
                .header("X-GitHub-Event", "pull_request")
                .header("X-Hub-Signature-256", signature)
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let resp_body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json: serde_json::Value = serde_json::from_slice(&resp_body).unwrap();
    assert_eq!(json["matched"], 1);

    let queue = Queue::new(&pool, WEBHOOK_EVENTS_QUEUE);
    let msg: reviewbot_db::QueueMessage<reviewbot_core::WebhookEvent> = queue
        .read(chrono::Duration::seconds(60))
        .await
        .unwrap()
        .expect("event should have been enqueued");

    assert_eq!(msg.body.repo_name, "owner/repo");
    assert_eq!(msg.body.user_id, "u1");
    assert_eq!(msg.body.pr_number, 1);
}

#[tokio::test]
async fn webhook_non_pull_request_event_is_skipped() {
    let state = setup_test_state().await;
    let app = create_app(state);

    let payload = serde_json::json!({
        "action": "created",
        "comment": {"body": "Test comment"},
    });
    let body = serde_json::to_vec(&payload).unwrap();
    let signature = compute_signature(&body, WEBHOOK_SECRET);

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/webhooks")
                .header("Content-Type", "application/json")
                .header("X-GitHub-Event", "issue_comment")
                .header("X-Hub-Signature-256", signature)
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let resp_body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json: serde_json::Value = serde_json::from_slice(&resp_body).unwrap();
    assert_eq!(json["skipped"], true);
}
