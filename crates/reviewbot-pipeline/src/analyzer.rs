use reviewbot_core::{JobError, JobResult, Provider, RepoStatus};
use reviewbot_sandbox::with_sandbox;
use serde::{Deserialize, Serialize};

use crate::runtime::Services;

/// The `repo_analysis` queue's payload: just enough to re-derive everything
/// else (tokens, settings, persona state) by loading the live rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepoAnalysisPayload {
    pub user_id: String,
    pub slug: String,
    pub repo_name: String,
    pub provider: Provider,
}

const ANALYSIS_PROMPT: &str = "\
You are analyzing a freshly cloned repository at /repo to build a concise \
profile of its architecture, layers, and conventions for later use as review \
context. Respond with plain text, no JSON.";

/// Clone the repo into a scoped sandbox, run the agent's analysis pass, and
/// persist the resulting profile. Any failure along the way still
/// transitions the repo to `interview` with no profile rather than leaving
/// it stuck in `analyzing` — the interview can proceed with broader
/// questions when there is no profile to draw on.
pub async fn run(services: &Services, payload: &RepoAnalysisPayload) -> JobResult<()> {
    let Some(token) = services.token_store.get_valid(&payload.user_id, payload.provider).await else {
        return degrade_to_interview(services, payload).await;
    };

    let settings = match reviewbot_db::settings::get(&services.pool, &payload.user_id).await {
        Ok(s) => s,
        Err(_) => return degrade_to_interview(services, payload).await,
    };
    let Some(api_key) = settings.api_key.clone() else {
        return degrade_to_interview(services, payload).await;
    };
    let model = settings.normalized_model();

    let clone_user = Services::clone_url_user(payload.provider);
    let host = Services::forge_host(payload.provider);
    let clone_url = format!("https://{clone_user}:{token}@{host}/{repo}.git", repo = payload.repo_name);

    let image = services.config.sandbox_image.clone();
    let docker_bin = services.config.docker_bin.clone();
    let agent_bin = services.config.agent_bin.clone();
    let timeout = services.config.analyze_timeout;

    let outcome = with_sandbox(&image, &docker_bin, move |sandbox| {
        Box::pin(async move {
            let clone = sandbox
                .exec(&["git", "clone", "--depth", "1", &clone_url, "/repo"])
                .await?;
            if !clone.success() {
                return Err(reviewbot_sandbox::SandboxError::ExecFailed {
                    argv: vec!["git".into(), "clone".into()],
                    exit_code: clone.exit_code,
                    stderr: clone.stderr,
                });
            }

            sandbox.write_file("/tmp/prompt.txt", ANALYSIS_PROMPT).await?;

            let mut keys = std::collections::BTreeMap::new();
            keys.insert(settings_provider_key(&model), api_key);
            reviewbot_agent::write_auth_json(&keys)
                .await
                .map_err(|e| reviewbot_sandbox::SandboxError::WriteFile {
                    path: "auth.json".into(),
                    source: std::io::Error::other(e.to_string()),
                })?;

            let command = format!(
                "cat /tmp/prompt.txt | {agent_bin} run --model {model} --format json --dir /repo > /tmp/result.txt"
            );
            sandbox
                .exec_with_timeout(&["sh", "-c", &command], timeout)
                .await?;

            let read = sandbox.exec(&["cat", "/tmp/result.txt"]).await?;
            Ok(read.stdout)
        })
    })
    .await;

    let profile = match outcome {
        Ok(stdout) => reviewbot_agent::extract_text(&stdout),
        Err(e) => {
            tracing::warn!(user_id = %payload.user_id, slug = %payload.slug, error = %e, "analysis sandbox run failed");
            return degrade_to_interview(services, payload).await;
        }
    };

    let existing = reviewbot_db::repos::get(&services.pool, &payload.user_id, &payload.slug)
        .await
        .map_err(|e| JobError::Transient(e.to_string()))?;

    reviewbot_db::repos::set_persona(
        &services.pool,
        &payload.user_id,
        &payload.slug,
        existing.persona.as_deref().unwrap_or(""),
        Some(&profile),
        existing.persona_edited,
    )
    .await
    .map_err(|e| JobError::Transient(e.to_string()))?;

    reviewbot_db::repos::set_status(&services.pool, &payload.user_id, &payload.slug, RepoStatus::Interview)
        .await
        .map_err(|e| JobError::Transient(e.to_string()))
}

async fn degrade_to_interview(services: &Services, payload: &RepoAnalysisPayload) -> JobResult<()> {
    reviewbot_db::repos::set_status(&services.pool, &payload.user_id, &payload.slug, RepoStatus::Interview)
        .await
        .map_err(|e| JobError::Transient(e.to_string()))
}

fn settings_provider_key(model: &str) -> String {
    model.split_once('/').map(|(p, _)| p).unwrap_or(model).to_string()
}
