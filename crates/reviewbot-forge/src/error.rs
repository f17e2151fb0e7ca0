use thiserror::Error;

#[derive(Debug, Error)]
pub enum ForgeError {
    #[error("HMAC verification failed: {0}")]
    SignatureInvalid(String),

    #[error("missing required header: {0}")]
    MissingHeader(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("JWT signing error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),

    #[error("unexpected response shape: {0}")]
    UnexpectedResponse(String),

    #[error("draft pull request rejected")]
    DraftRejected,

    #[error("diff file count {0} outside accepted range")]
    DiffOutOfRange(usize),

    #[error("atomic review post rejected (422), caller should fall back to per-comment posts")]
    AtomicPostRejected,
}

pub type ForgeResult<T> = Result<T, ForgeError>;
