use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::adapter::ForgeAdapter;
use crate::error::ForgeResult;
use crate::types::{DiffRefs, FileChange, FileStatus, PendingComment, PrMetadata};

const GITLAB_API: &str = "https://gitlab.com/api/v4";

/// GitLab v4 REST adapter. A project path (`owner/repo`) must be percent-
/// encoded with the slash escaped as `%2F` for every `/projects/...` route.
pub struct GitlabAdapter {
    client: reqwest::Client,
    base_url: String,
}

impl Default for GitlabAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl GitlabAdapter {
    pub fn new() -> Self {
        Self { client: reqwest::Client::new(), base_url: GITLAB_API.to_string() }
    }

    /// Point at a mock server instead of `gitlab.com`.
    #[cfg(test)]
    fn new_with_base(base_url: String) -> Self {
        Self { client: reqwest::Client::new(), base_url }
    }

    /// Create a merge-request + note webhook scoped to one project, with
    /// the per-repo secret as the `token` GitLab echoes back in
    /// `X-Gitlab-Token` on every delivery.
    pub async fn create_webhook(
        &self,
        project_path: &str,
        token: &str,
        webhook_url: &str,
        secret: &str,
    ) -> ForgeResult<i64> {
        let url = format!("{}/projects/{}/hooks", self.base_url, encode_path(project_path));
        let body = json!({
            "url": webhook_url,
            "merge_requests_events": true,
            "note_events": true,
            "push_events": false,
            "enable_ssl_verification": true,
            "token": secret,
        });

        let resp: GlHook = self
            .client
            .post(url)
            .private_token(token)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(resp.id)
    }

    /// Delete a project webhook. 204 and 404 both count as success: the
    /// caller's intent (no hook left behind) is already satisfied either way.
    pub async fn delete_webhook(&self, project_path: &str, hook_id: i64, token: &str) -> ForgeResult<()> {
        let url = format!(
            "{}/projects/{}/hooks/{hook_id}",
            self.base_url,
            encode_path(project_path)
        );
        let status = self.client.delete(url).private_token(token).send().await?.status();
        if status == reqwest::StatusCode::NO_CONTENT || status == reqwest::StatusCode::NOT_FOUND {
            Ok(())
        } else {
            Err(crate::error::ForgeError::UnexpectedResponse(format!(
                "unexpected status deleting webhook: {status}"
            )))
        }
    }

    /// Invite the bot user into a project. 409 (already a member) is treated
    /// as success.
    pub async fn invite_bot(
        &self,
        project_path: &str,
        user_token: &str,
        bot_user_id: i64,
        access_level: u32,
    ) -> ForgeResult<()> {
        let url = format!("{}/projects/{}/members", self.base_url, encode_path(project_path));
        let body = json!({"user_id": bot_user_id, "access_level": access_level});
        let status = self
            .client
            .post(url)
            .private_token(user_token)
            .json(&body)
            .send()
            .await?
            .status();
        if status.is_success() || status == reqwest::StatusCode::CONFLICT {
            Ok(())
        } else {
            Err(crate::error::ForgeError::UnexpectedResponse(format!(
                "unexpected status inviting bot: {status}"
            )))
        }
    }
}

#[async_trait]
impl ForgeAdapter for GitlabAdapter {
    async fn fetch_diff(
        &self,
        repo_name: &str,
        pr_number: i64,
        token: &str,
    ) -> ForgeResult<(PrMetadata, Vec<FileChange>)> {
        let url = format!(
            "{}/projects/{}/merge_requests/{pr_number}/changes",
            self.base_url,
            encode_path(repo_name)
        );
        let mr: GlMrChanges = self
            .client
            .get(url)
            .private_token(token)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let metadata = PrMetadata {
            title: mr.title,
            body: mr.description,
            base_branch: mr.target_branch,
            head_branch: mr.source_branch,
            author: mr.author.username,
            draft: mr.draft || mr.work_in_progress,
            refs: DiffRefs {
                base_sha: mr.diff_refs.base_sha,
                head_sha: mr.diff_refs.head_sha,
                start_sha: Some(mr.diff_refs.start_sha),
            },
        };

        let files = mr.changes.into_iter().map(GlChange::into_file_change).collect();
        Ok((metadata, files))
    }

    async fn post_review(
        &self,
        repo_name: &str,
        pr_number: i64,
        token: &str,
        comments: &[PendingComment],
        refs: &DiffRefs,
    ) -> ForgeResult<usize> {
        let url = format!(
            "{}/projects/{}/merge_requests/{pr_number}/discussions",
            self.base_url,
            encode_path(repo_name)
        );

        let mut posted = 0usize;
        for comment in comments {
            let body = json!({
                "body": comment.body,
                "position": {
                    "position_type": "text",
                    "base_sha": refs.base_sha,
                    "head_sha": refs.head_sha,
                    "start_sha": refs.start_sha,
                    "old_path": comment.file,
                    "new_path": comment.file,
                    "new_line": comment.line,
                },
            });

            let result = self
                .client
                .post(url.clone())
                .private_token(token)
                .json(&body)
                .send()
                .await
                .and_then(|r| r.error_for_status());

            match result {
                Ok(_) => posted += 1,
                Err(e) => tracing::warn!(error = %e, file = %comment.file, "discussion post failed"),
            }
        }

        Ok(posted)
    }
}

/// `GITLAB_BOT_TOKEN`-style personal access tokens (`glpat-` prefix) must be
/// sent via `PRIVATE-TOKEN` rather than `Authorization: Bearer`; everything
/// else (an OAuth user access token) uses Bearer.
trait PrivateTokenAuth {
    fn private_token(self, token: &str) -> Self;
}

impl PrivateTokenAuth for reqwest::RequestBuilder {
    fn private_token(self, token: &str) -> Self {
        if token.starts_with("glpat-") {
            self.header("PRIVATE-TOKEN", token)
        } else {
            self.bearer_auth(token)
        }
    }
}

fn encode_path(project_path: &str) -> String {
    project_path.replace('/', "%2F")
}

#[derive(Debug, Deserialize)]
struct GlAuthor {
    username: String,
}

#[derive(Debug, Deserialize)]
struct GlDiffRefs {
    base_sha: String,
    head_sha: String,
    start_sha: String,
}

#[derive(Debug, Deserialize)]
struct GlChange {
    old_path: String,
    new_path: String,
    diff: String,
    new_file: bool,
    renamed_file: bool,
    deleted_file: bool,
}

impl GlChange {
    fn into_file_change(self) -> FileChange {
        let status = if self.deleted_file {
            FileStatus::Removed
        } else if self.new_file {
            FileStatus::Added
        } else if self.renamed_file {
            FileStatus::Renamed
        } else {
            FileStatus::Modified
        };
        let (additions, deletions) = count_diff_lines(&self.diff);
        FileChange {
            path: self.new_path,
            status,
            additions,
            deletions,
            patch: Some(self.diff),
        }
    }
}

fn count_diff_lines(diff: &str) -> (u32, u32) {
    let mut additions = 0u32;
    let mut deletions = 0u32;
    for line in diff.lines() {
        if line.starts_with("+++") || line.starts_with("---") {
            continue;
        }
        if line.starts_with('+') {
            additions += 1;
        } else if line.starts_with('-') {
            deletions += 1;
        }
    }
    (additions, deletions)
}

#[derive(Debug, Deserialize)]
struct GlMrChanges {
    title: String,
    description: Option<String>,
    target_branch: String,
    source_branch: String,
    author: GlAuthor,
    #[serde(default)]
    draft: bool,
    #[serde(default)]
    work_in_progress: bool,
    diff_refs: GlDiffRefs,
    changes: Vec<GlChange>,
}

#[derive(Debug, Deserialize)]
struct GlHook {
    id: i64,
}
