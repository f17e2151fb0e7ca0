use thiserror::Error;

#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("failed to start container: {0}")]
    StartFailed(String),

    #[error("exec {argv:?} exited {exit_code}: {stderr}")]
    ExecFailed {
        argv: Vec<String>,
        exit_code: i32,
        stderr: String,
    },

    #[error("exec {argv:?} exceeded the {timeout_secs}s wall clock and was killed")]
    Timeout { argv: Vec<String>, timeout_secs: u64 },

    #[error("failed to write {path}: {source}")]
    WriteFile { path: String, source: std::io::Error },

    #[error("failed to stop container {container_id}: {source}")]
    StopFailed { container_id: String, source: std::io::Error },

    #[error("io error spawning container process: {0}")]
    Io(#[from] std::io::Error),
}

pub type SandboxResult<T> = Result<T, SandboxError>;

/// `SandboxError` is local to this crate, so this impl satisfies the orphan
/// rule even though `JobError` lives in `reviewbot-core`: every Analyzer/
/// Reviewer call site can just `.map_err(Into::into)` or `?` through to a
/// `JobResult`.
impl From<SandboxError> for reviewbot_core::JobError {
    fn from(err: SandboxError) -> Self {
        reviewbot_core::JobError::SandboxFailure(err.to_string())
    }
}
