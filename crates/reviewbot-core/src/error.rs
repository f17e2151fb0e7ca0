use thiserror::Error;

/// The error taxonomy a job (Analyzer or Reviewer) can fail with, per §7.
/// Scheduler dispatch decides redelivery vs. give-up purely from the variant.
#[derive(Debug, Error)]
pub enum JobError {
    /// Required configuration missing at startup. Only ever surfaces from
    /// `AppConfig::load`, never from a running job, but lives here so every
    /// crate can construct it without a cyclic dependency on the server crate.
    #[error("missing required configuration: {0}")]
    Config(String),

    /// Network timeout, 5xx, queue-backend blip. Not deleted; relies on redelivery.
    #[error("transient failure: {0}")]
    Transient(String),

    /// Token invalid after a refresh attempt. Skip the job, do not retry.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Paused repo, plan limit, draft PR, empty/oversized diff. Skip silently, delete message.
    #[error("admission denied: {0}")]
    AdmissionDenied(String),

    /// Agent output failed to parse even after sanitization. Consume the message.
    #[error("agent response malformed: {0}")]
    AgentResponseMalformed(String),

    /// Agent output parsed as JSON but not the expected shape. Consume the message.
    #[error("agent response has unexpected shape: {0}")]
    AgentResponseInvalidShape(String),

    /// Sandbox exec failed or timed out. Redelivers up to the cap, then gives up.
    #[error("sandbox failure: {0}")]
    SandboxFailure(String),
}

pub type JobResult<T> = Result<T, JobError>;

impl JobError {
    /// Whether the Scheduler should leave the message for redelivery
    /// (true) or delete it immediately (false), independent of the
    /// `read_ct` cap that bounds redelivery regardless of variant.
    pub fn is_retryable(&self) -> bool {
        matches!(self, JobError::Transient(_) | JobError::SandboxFailure(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_variants() {
        assert!(JobError::Transient("x".into()).is_retryable());
        assert!(JobError::SandboxFailure("x".into()).is_retryable());
        assert!(!JobError::AdmissionDenied("x".into()).is_retryable());
        assert!(!JobError::AgentResponseMalformed("x".into()).is_retryable());
        assert!(!JobError::Unauthorized("x".into()).is_retryable());
    }
}
