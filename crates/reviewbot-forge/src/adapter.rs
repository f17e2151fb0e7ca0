use async_trait::async_trait;

use crate::error::ForgeResult;
use crate::types::{DiffRefs, FileChange, PendingComment, PrMetadata};

/// Uniform surface over GitHub and GitLab: diff fetching and comment
/// posting. Signature verification and webhook event parsing are free
/// functions in [`crate::webhook`] since they run before any repo/provider
/// is known; webhook management and bot-identity lookups are GitLab- and
/// GitHub-specific respectively and live outside this trait
/// (`GitlabAdapter::create_webhook`, `crate::auth::InstallationTokenManager`).
#[async_trait]
pub trait ForgeAdapter: Send + Sync {
    /// Fetch PR/MR metadata and the normalized file list for a diff.
    async fn fetch_diff(
        &self,
        repo_name: &str,
        pr_number: i64,
        token: &str,
    ) -> ForgeResult<(PrMetadata, Vec<FileChange>)>;

    /// Post review comments. Returns the number actually posted (not
    /// necessarily `comments.len()` — see the atomic-post fallback and
    /// per-comment failure handling documented on each implementation).
    async fn post_review(
        &self,
        repo_name: &str,
        pr_number: i64,
        token: &str,
        comments: &[PendingComment],
        refs: &DiffRefs,
    ) -> ForgeResult<usize>;
}
