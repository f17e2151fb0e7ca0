use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::adapter::ForgeAdapter;
use crate::error::ForgeResult;
use crate::types::{DiffRefs, FileChange, FileStatus, PendingComment, PrMetadata};

const GITHUB_API: &str = "https://api.github.com";
const API_VERSION: &str = "2022-11-28";
const PER_PAGE: u32 = 100;

/// GitHub REST adapter. Talks to the v2022-11-28 API directly over
/// `reqwest` rather than through an SDK, so the atomic-review-then-fallback
/// posting contract in §4.C can be expressed exactly (octocrab's typed
/// review builder doesn't expose the per-comment `side`/`start_line` shape
/// this spec needs, and the fallback path requires inspecting the raw 422).
pub struct GithubAdapter {
    client: reqwest::Client,
    base_url: String,
}

impl Default for GithubAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl GithubAdapter {
    pub fn new() -> Self {
        Self { client: reqwest::Client::new(), base_url: GITHUB_API.to_string() }
    }

    /// Point at a mock server instead of `api.github.com`.
    #[cfg(test)]
    fn new_with_base(base_url: String) -> Self {
        Self { client: reqwest::Client::new(), base_url }
    }

    fn request(&self, method: reqwest::Method, url: String, token: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, url)
            .bearer_auth(token)
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", API_VERSION)
            .header("User-Agent", "reviewbot")
    }

    async fn fetch_all_files(&self, repo_name: &str, pr_number: i64, token: &str) -> ForgeResult<Vec<FileChange>> {
        let mut files = Vec::new();
        let mut page = 1u32;
        loop {
            let url = format!(
                "{base}/repos/{repo_name}/pulls/{pr_number}/files?per_page={PER_PAGE}&page={page}",
                base = self.base_url
            );
            let batch: Vec<GhFile> = self
                .request(reqwest::Method::GET, url, token)
                .send()
                .await?
                .error_for_status()?
                .json()
                .await?;
            let len = batch.len();
            files.extend(batch.into_iter().map(GhFile::into_file_change));
            if len < PER_PAGE as usize {
                break;
            }
            page += 1;
        }
        Ok(files)
    }
}

#[async_trait]
impl ForgeAdapter for GithubAdapter {
    async fn fetch_diff(
        &self,
        repo_name: &str,
        pr_number: i64,
        token: &str,
    ) -> ForgeResult<(PrMetadata, Vec<FileChange>)> {
        let pr_url = format!("{}/repos/{repo_name}/pulls/{pr_number}", self.base_url);
        let (pr, files) = tokio::join!(
            self.request(reqwest::Method::GET, pr_url, token).send(),
            self.fetch_all_files(repo_name, pr_number, token),
        );
        let pr: GhPullRequest = pr?.error_for_status()?.json().await?;
        let files = files?;

        let metadata = PrMetadata {
            title: pr.title,
            body: pr.body,
            base_branch: pr.base.git_ref.clone(),
            head_branch: pr.head.git_ref,
            author: pr.user.login,
            draft: pr.draft,
            refs: DiffRefs {
                base_sha: pr.base.sha,
                head_sha: pr.head.sha,
                start_sha: None,
            },
        };

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
        if comments.is_empty() {
            return Ok(0);
        }

        let url = format!("{}/repos/{repo_name}/pulls/{pr_number}/reviews", self.base_url);
        let body = json!({
            "commit_id": refs.head_sha,
            "event": "COMMENT",
            "comments": comments.iter().map(gh_review_comment).collect::<Vec<_>>(),
        });

        let resp = self.request(reqwest::Method::POST, url.clone(), token).json(&body).send().await?;

        if resp.status() == reqwest::StatusCode::UNPROCESSABLE_ENTITY {
            // At least one comment's line isn't part of the diff; fall back
            // to individual single-comment reviews and count successes.
            let mut posted = 0usize;
            for comment in comments {
                let single = json!({
                    "commit_id": refs.head_sha,
                    "event": "COMMENT",
                    "comments": [gh_review_comment(comment)],
                });
                let result = self
                    .request(reqwest::Method::POST, url.clone(), token)
                    .json(&single)
                    .send()
                    .await
                    .and_then(|r| r.error_for_status());
                match result {
                    Ok(_) => posted += 1,
                    Err(e) => tracing::warn!(error = %e, file = %comment.file, "per-comment review post failed"),
                }
            }
            return Ok(posted);
        }

        resp.error_for_status()?;
        Ok(comments.len())
    }
}

fn gh_review_comment(comment: &PendingComment) -> serde_json::Value {
    let mut value = json!({
        "path": comment.file,
        "line": comment.line,
        "side": "RIGHT",
        "body": comment.body,
    });
    if let Some(end_line) = comment.end_line {
        value["end_line"] = json!(end_line);
        value["start_line"] = json!(comment.line);
        value["start_side"] = json!("RIGHT");
        value["line"] = json!(end_line);
    }
    value
}

#[derive(Debug, Deserialize)]
struct GhUser {
    login: String,
}

#[derive(Debug, Deserialize)]
struct GhRef {
    #[serde(rename = "ref")]
    git_ref: String,
    sha: String,
}

#[derive(Debug, Deserialize)]
struct GhPullRequest {
    title: String,
    body: Option<String>,
    draft: bool,
    user: GhUser,
    base: GhRef,
    head: GhRef,
}

#[derive(Debug, Deserialize)]
struct GhFile {
    filename: String,
    status: String,
    additions: u32,
    deletions: u32,
    patch: Option<String>,
}

impl GhFile {
    fn into_file_change(self) -> FileChange {
        let status = match self.status.as_str() {
            "added" => FileStatus::Added,
            "removed" => FileStatus::Removed,
            "renamed" => FileStatus::Renamed,
            _ => FileStatus::Modified,
        };
        FileChange {
            path: self.filename,
            status,
            additions: self.additions,
            deletions: self.deletions,
            patch: self.patch,
        }
    }
}
