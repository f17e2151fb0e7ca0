pub mod adapter;
pub mod auth;
pub mod diff_format;
pub mod error;
pub mod github;
pub mod gitlab;
pub mod types;
pub mod webhook;

pub use adapter::ForgeAdapter;
pub use auth::{GithubAppAuth, InstallationTokenManager};
pub use diff_format::{format_comment, format_diff};
pub use error::{ForgeError, ForgeResult};
pub use github::GithubAdapter;
pub use gitlab::GitlabAdapter;
pub use types::{DiffRefs, FileChange, FileStatus, PendingComment, PrMetadata};
pub use webhook::{
    extract_repo_full_name, parse_github_event, parse_gitlab_event, verify_github_signature,
    verify_gitlab_token, ParsedPrEvent,
};
