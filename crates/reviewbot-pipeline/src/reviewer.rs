use reviewbot_core::model::CustomSkill;
use reviewbot_core::persona::DEFAULT_REVIEW_PROMPT_TEMPLATE;
use reviewbot_core::{JobError, JobResult, ReviewComment, Severity};
use reviewbot_forge::PendingComment;
use reviewbot_sandbox::with_sandbox;
use serde::Deserialize;

use crate::runtime::Services;

const REVIEW_SYSTEM_PROMPT_HEADER: &str = DEFAULT_REVIEW_PROMPT_TEMPLATE;
const SUGGESTION_DROP_THRESHOLD: usize = 5;
const DEDUP_LINE_WINDOW: u32 = 3;
const FLAGGED_ISSUE_TRUNCATE_CHARS: usize = 120;
const DEDUP_PREFIX_CHARS: usize = 80;

/// Fetch the diff, run the review prompt in a scoped sandbox, dedup against
/// prior reviews of this PR, and post surviving comments. Any step raising
/// propagates so the Scheduler leaves the message for redelivery; admission
/// checks return `Ok(())` directly (skip, not failure).
pub async fn run(services: &Services, event: &reviewbot_core::WebhookEvent) -> JobResult<()> {
    let repo = reviewbot_db::repos::get(&services.pool, &event.user_id, &event.repo_slug)
        .await
        .map_err(|e| JobError::Transient(e.to_string()))?;

    if repo.status != reviewbot_core::RepoStatus::Active {
        return Ok(());
    }
    let Some(persona) = repo.persona.as_deref().filter(|p| !p.trim().is_empty()) else {
        return Ok(());
    };

    let subscription = reviewbot_db::subscriptions::get(&services.pool, &event.user_id)
        .await
        .map_err(|e| JobError::Transient(e.to_string()))?;
    let window_elapsed = subscription.counter_window_elapsed(chrono::Utc::now());
    if !window_elapsed && subscription.over_review_cap() {
        return Ok(());
    }

    let Some(token) = services.token_store.get_valid(&event.user_id, event.provider).await else {
        return Ok(());
    };

    let settings = match reviewbot_db::settings::get(&services.pool, &event.user_id).await {
        Ok(s) => s,
        Err(_) => return Ok(()),
    };
    let Some(api_key) = settings.api_key.clone() else {
        return Ok(());
    };
    let model = settings.normalized_model();

    let adapter = services.adapter(event.provider);
    let (metadata, files) = adapter
        .fetch_diff(&event.repo_name, event.pr_number, &token)
        .await
        .map_err(|e| JobError::Transient(e.to_string()))?;

    if metadata.draft {
        return Ok(());
    }
    if !reviewbot_forge::types::diff_file_count_accepted(files.len()) {
        return Ok(());
    }
    let diff = reviewbot_forge::format_diff(&files);

    let prior_reviews = reviewbot_db::reviews::recent_for_pr(
        &services.pool,
        &event.user_id,
        &event.repo_slug,
        event.pr_number,
    )
    .await
    .map_err(|e| JobError::Transient(e.to_string()))?;
    let prior: Vec<ReviewComment> = prior_reviews.into_iter().flat_map(|r| r.comments).collect();

    let predefined_skills = services.skills.render();
    let custom_skills = render_custom_skills(&repo.custom_skills);
    let system_prompt = reviewbot_core::render_system_prompt(
        REVIEW_SYSTEM_PROMPT_HEADER,
        Some(persona),
        repo.analysis_profile.as_deref(),
        &predefined_skills,
        &custom_skills,
    );
    let user_message = build_user_message(&metadata, &event.repo_name, files.len(), &prior, &diff);

    let clone_user = Services::clone_url_user(event.provider);
    let host = Services::forge_host(event.provider);
    let clone_url = format!("https://{clone_user}:{token}@{host}/{repo}.git", repo = event.repo_name);
    let checkout_argv = pr_checkout_command(event.provider, event.pr_number);

    let image = services.config.sandbox_image.clone();
    let docker_bin = services.config.docker_bin.clone();
    let agent_bin = services.config.agent_bin.clone();
    let timeout = services.config.review_timeout;
    let model_for_agent = model.clone();

    let outcome = with_sandbox(&image, &docker_bin, move |sandbox| {
        let model = model_for_agent;
        Box::pin(async move {
            let clone = sandbox
                .exec(&["git", "clone", "--depth", "50", &clone_url, "/repo"])
                .await?;
            if !clone.success() {
                return Err(reviewbot_sandbox::SandboxError::ExecFailed {
                    argv: vec!["git".into(), "clone".into()],
                    exit_code: clone.exit_code,
                    stderr: clone.stderr,
                });
            }

            let checkout = sandbox
                .exec(&["sh", "-c", &format!("cd /repo && {checkout_argv}")])
                .await?;
            if !checkout.success() {
                tracing::warn!(
                    stderr = %checkout.stderr,
                    "PR branch checkout failed; reviewing default branch with the fetched diff instead"
                );
            }

            sandbox.write_file("/tmp/system-prompt.md", &system_prompt).await?;
            sandbox.write_file("/tmp/user-message.md", &user_message).await?;

            let mut keys = std::collections::BTreeMap::new();
            keys.insert(settings_provider_key(&model), api_key);
            reviewbot_agent::write_auth_json(&keys)
                .await
                .map_err(|e| reviewbot_sandbox::SandboxError::WriteFile {
                    path: "auth.json".into(),
                    source: std::io::Error::other(e.to_string()),
                })?;

            let command = format!(
                "cat /tmp/user-message.md | {agent_bin} run --model {model} --format json \
                 --file /tmp/system-prompt.md --dir /repo > /tmp/result.txt"
            );
            sandbox
                .exec_with_timeout(&["sh", "-c", &command], timeout)
                .await?;

            let read = sandbox.exec(&["cat", "/tmp/result.txt"]).await?;
            Ok(read.stdout)
        })
    })
    .await
    .map_err(JobError::from)?;

    let parsed = reviewbot_agent::parse_agent_response(&outcome).map_err(JobError::from)?;
    let response: AgentReviewResponse = serde_json::from_value(parsed)
        .map_err(|e| JobError::AgentResponseInvalidShape(e.to_string()))?;

    let mut comments = response.comments;
    if comments.len() > settings.max_comments as usize {
        comments.truncate(settings.max_comments as usize);
    }
    if comments.len() > SUGGESTION_DROP_THRESHOLD {
        comments.retain(|c| c.severity != Severity::Suggestion);
    }
    comments.retain(|c| !is_duplicate(c, &prior));

    let posting_token = services.posting_token(event.provider, &event.repo_name, &token).await;
    let pending: Vec<PendingComment> = comments
        .iter()
        .map(|c| PendingComment {
            file: c.file.clone(),
            line: c.line,
            end_line: c.end_line,
            body: reviewbot_forge::format_comment(c),
        })
        .collect();

    let posted_count = adapter
        .post_review(&event.repo_name, event.pr_number, &posting_token, &pending, &metadata.refs)
        .await
        .map_err(|e| JobError::Transient(e.to_string()))?;

    reviewbot_db::reviews::insert(
        &services.pool,
        &event.user_id,
        &event.repo_slug,
        event.pr_number,
        &event.pr_title,
        &event.pr_url,
        &event.pr_author,
        "comment",
        None,
        &comments,
        posted_count as i32,
        &settings.llm_provider,
        &model,
    )
    .await
    .map_err(|e| JobError::Transient(e.to_string()))?;

    if subscription.plan != reviewbot_core::model::Plan::Pro {
        reviewbot_db::subscriptions::increment_review_count(&services.pool, &event.user_id)
            .await
            .map_err(|e| JobError::Transient(e.to_string()))?;
    }

    Ok(())
}

#[derive(Debug, Deserialize)]
struct AgentReviewResponse {
    comments: Vec<ReviewComment>,
}

/// A prior comment dedups a fresh one when they're on the same file,
/// within 3 lines of each other, and the first 80 lowercased chars of
/// their messages match.
fn is_duplicate(candidate: &ReviewComment, prior: &[ReviewComment]) -> bool {
    prior.iter().any(|p| {
        p.file == candidate.file
            && p.line.abs_diff(candidate.line) <= DEDUP_LINE_WINDOW
            && truncate_lower(&p.message) == truncate_lower(&candidate.message)
    })
}

fn truncate_lower(message: &str) -> String {
    message.chars().take(DEDUP_PREFIX_CHARS).collect::<String>().to_lowercase()
}

fn render_custom_skills(skills: &[CustomSkill]) -> String {
    skills
        .iter()
        .map(|s| format!("## {}\n\n{}\n", s.name, s.content))
        .collect::<Vec<_>>()
        .join("\n")
}

fn build_user_message(
    metadata: &reviewbot_forge::PrMetadata,
    repo_name: &str,
    file_count: usize,
    prior: &[ReviewComment],
    diff: &str,
) -> String {
    let mut out = format!(
        "# {title}\n\nRepository: {repo_name}\nAuthor: {author}\nTarget branch: {base}\nFiles changed: {file_count}\n\n{body}\n",
        title = metadata.title,
        author = metadata.author,
        base = metadata.base_branch,
        body = metadata.body.as_deref().unwrap_or(""),
    );

    if !prior.is_empty() {
        out.push_str("\n## Previously Flagged Issues\n\n");
        for p in prior {
            let truncated: String = p.message.chars().take(FLAGGED_ISSUE_TRUNCATE_CHARS).collect();
            out.push_str(&format!("- [{}:{}] {}\n", p.file, p.line, truncated));
        }
    }

    out.push('\n');
    out.push_str(diff);
    out
}

fn pr_checkout_command(provider: reviewbot_core::Provider, pr_number: i64) -> String {
    match provider {
        reviewbot_core::Provider::Github => format!(
            "git fetch origin pull/{pr_number}/head:pr-review && git checkout pr-review"
        ),
        reviewbot_core::Provider::Gitlab => format!(
            "git fetch origin merge-requests/{pr_number}/head:mr-review && git checkout mr-review"
        ),
    }
}

fn settings_provider_key(model: &str) -> String {
    model.split_once('/').map(|(p, _)| p).unwrap_or(model).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use reviewbot_core::Severity;

    fn comment(file: &str, line: u32, message: &str) -> ReviewComment {
        ReviewComment {
            file: file.into(),
            line,
            end_line: None,
            severity: Severity::Warning,
            category: "style".into(),
            message: message.into(),
            suggestion: None,
        }
    }

    #[test]
    fn dedup_matches_within_line_window_and_message_prefix() {
        let long_prefix = "x".repeat(DEDUP_PREFIX_CHARS);
        let prior = vec![comment("a.rs", 10, &format!("{long_prefix} prior detail"))];
        let fresh = comment("a.rs", 12, &format!("{} fresh detail", long_prefix.to_uppercase()));
        assert!(is_duplicate(&fresh, &prior));
    }

    #[test]
    fn dedup_rejects_beyond_line_window() {
        let prior = vec![comment("a.rs", 10, "same message")];
        let fresh = comment("a.rs", 14, "same message");
        assert!(!is_duplicate(&fresh, &prior));
    }

    #[test]
    fn dedup_rejects_different_file() {
        let prior = vec![comment("a.rs", 10, "same message")];
        let fresh = comment("b.rs", 10, "same message");
        assert!(!is_duplicate(&fresh, &prior));
    }

    #[test]
    fn dedup_is_case_insensitive_on_prefix() {
        let prior = vec![comment("a.rs", 10, "SAME MESSAGE here")];
        let fresh = comment("a.rs", 10, "same message here");
        assert!(is_duplicate(&fresh, &prior));
    }

    #[test]
    fn checkout_command_differs_by_provider() {
        assert!(pr_checkout_command(reviewbot_core::Provider::Github, 42).contains("pull/42/head"));
        assert!(pr_checkout_command(reviewbot_core::Provider::Gitlab, 7).contains("merge-requests/7/head"));
    }

    #[test]
    fn render_custom_skills_joins_name_and_content() {
        let skills = vec![CustomSkill {
            name: "No TODOs".into(),
            content: "Reject any TODO left in a diff.".into(),
        }];
        let rendered = render_custom_skills(&skills);
        assert!(rendered.contains("## No TODOs"));
        assert!(rendered.contains("Reject any TODO left in a diff."));
    }
}
