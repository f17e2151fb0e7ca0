use thiserror::Error;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("agent response malformed: {0}")]
    Malformed(String),

    #[error("io error writing agent auth/prompt files: {0}")]
    Io(#[from] std::io::Error),

    #[error("could not resolve a home directory for the auth.json path")]
    NoHomeDir,
}

pub type AgentResult<T> = Result<T, AgentError>;

impl From<AgentError> for reviewbot_core::JobError {
    fn from(err: AgentError) -> Self {
        reviewbot_core::JobError::AgentResponseMalformed(err.to_string())
    }
}
