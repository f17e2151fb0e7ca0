use std::path::PathBuf;
use std::time::Duration;

/// Knobs the orchestration layer needs that aren't per-request data:
/// sandbox image/runtime, the agent CLI invocation, and the poll cadence.
/// Distinct from the server binary's full `AppConfig` so this crate has no
/// dependency on HTTP/server concerns.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub sandbox_image: String,
    pub docker_bin: String,
    pub agent_bin: String,
    pub skills_root: PathBuf,
    pub poll_interval: Duration,
    pub analyze_timeout: Duration,
    pub review_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            sandbox_image: "reviewbot-sandbox:latest".to_string(),
            docker_bin: "docker".to_string(),
            agent_bin: "agent".to_string(),
            skills_root: PathBuf::from("./skills"),
            poll_interval: Duration::from_millis(5000),
            analyze_timeout: Duration::from_secs(15 * 60),
            review_timeout: Duration::from_secs(5 * 60),
        }
    }
}
