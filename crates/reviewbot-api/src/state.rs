use std::sync::Arc;

use axum::extract::FromRef;
use reviewbot_forge::GitlabAdapter;
use reviewbot_pipeline::Services;
use sqlx::{Any, Pool};

/// Application state for Axum dependency injection: the db pool, the
/// pipeline's shared `Services` (token store, forge adapters, skills
/// catalog, config) for running interview steps, a bare `GitlabAdapter` for
/// the webhook-management calls that aren't part of the `ForgeAdapter`
/// trait, the App-level GitHub webhook secret, and the base URL new GitLab
/// hooks are pointed at.
#[derive(Clone)]
pub struct AppState {
    pub pool: Pool<Any>,
    pub services: Arc<Services>,
    pub gitlab_adapter: Arc<GitlabAdapter>,
    pub github_webhook_secret: Arc<str>,
    pub webhook_base_url: Arc<str>,
}

impl AppState {
    pub fn new(
        pool: Pool<Any>,
        services: Arc<Services>,
        gitlab_adapter: Arc<GitlabAdapter>,
        github_webhook_secret: String,
        webhook_base_url: String,
    ) -> Self {
        Self {
            pool,
            services,
            gitlab_adapter,
            github_webhook_secret: github_webhook_secret.into(),
            webhook_base_url: webhook_base_url.into(),
        }
    }
}

impl FromRef<AppState> for Pool<Any> {
    fn from_ref(state: &AppState) -> Self {
        state.pool.clone()
    }
}

impl FromRef<AppState> for Arc<Services> {
    fn from_ref(state: &AppState) -> Self {
        state.services.clone()
    }
}
