use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("connected repo not found: {0}/{1}")]
    RepoNotFound(String, String),

    #[error("user settings not found: {0}")]
    SettingsNotFound(String),

    #[error("subscription not found: {0}")]
    SubscriptionNotFound(String),
}

pub type DbResult<T> = Result<T, DbError>;
