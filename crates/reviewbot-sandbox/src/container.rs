use std::process::Stdio;
use std::time::Duration;

use rand::Rng;
use tokio::process::Command;
use tokio::time::timeout;

use crate::error::{SandboxError, SandboxResult};

/// Output of one `exec` call, mirroring what a shell sees: the container's
/// own exit code, plus the streams captured rather than inherited so the
/// caller can log stderr on failure without the job's own logs interleaving
/// with the container's.
#[derive(Debug, Clone)]
pub struct ExecOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl ExecOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// One ephemeral container, started from an image and torn down at the end
/// of a job. `docker` is shelled out to directly (matching how a sandboxed
/// agent CLI is itself typically driven — see `tokio::process::Command`
/// usage for child-process lifecycle across the retrieval pack) rather than
/// through a Docker Engine API client, since every operation this spec
/// needs (`run`, `exec`, `cp`/heredoc write, `rm -f`) maps onto one CLI
/// invocation and a shelled-out binary is trivially swappable (`podman`,
/// `nerdctl`) via `docker_bin`.
pub struct Sandbox {
    container_id: String,
    docker_bin: String,
}

impl Sandbox {
    /// Start a detached, long-lived container from `image` so `exec` calls
    /// can be issued into it repeatedly. `docker_bin` is typically `"docker"`
    /// but is configurable for `podman`-compatible runtimes.
    pub async fn start(image: &str, docker_bin: &str) -> SandboxResult<Self> {
        let output = Command::new(docker_bin)
            .args(["run", "-d", "--rm", image, "sleep", "infinity"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await?;

        if !output.status.success() {
            return Err(SandboxError::StartFailed(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }

        let container_id = String::from_utf8_lossy(&output.stdout).trim().to_string();
        Ok(Self { container_id, docker_bin: docker_bin.to_string() })
    }

    /// Run a command inside the container with no wall-clock limit beyond
    /// whatever the caller's own runtime imposes. Prefer
    /// [`Sandbox::exec_with_timeout`] for anything driven by an LLM agent,
    /// which can hang.
    pub async fn exec(&self, argv: &[&str]) -> SandboxResult<ExecOutput> {
        let output = Command::new(&self.docker_bin)
            .arg("exec")
            .arg(&self.container_id)
            .args(argv)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await?;

        Ok(ExecOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code().unwrap_or(-1),
        })
    }

    /// Like [`Sandbox::exec`], but kills the container if `wall_clock` elapses
    /// before the command exits. A hard wall clock: SIGTERM via `docker kill`,
    /// not a graceful shutdown request.
    pub async fn exec_with_timeout(&self, argv: &[&str], wall_clock: Duration) -> SandboxResult<ExecOutput> {
        match timeout(wall_clock, self.exec(argv)).await {
            Ok(result) => result,
            Err(_) => {
                let _ = self.kill().await;
                Err(SandboxError::Timeout {
                    argv: argv.iter().map(|s| s.to_string()).collect(),
                    timeout_secs: wall_clock.as_secs(),
                })
            }
        }
    }

    /// Write `content` to `path` inside the container using a heredoc with a
    /// randomized sentinel, so prompt content containing a line that happens
    /// to equal a fixed sentinel can never prematurely terminate the write.
    pub async fn write_file(&self, path: &str, content: &str) -> SandboxResult<()> {
        let sentinel = random_sentinel();
        let script = format!("cat > {path} <<'{sentinel}'\n{content}\n{sentinel}\n");

        let result = self.exec(&["sh", "-c", &script]).await?;
        if !result.success() {
            return Err(SandboxError::ExecFailed {
                argv: vec!["sh".into(), "-c".into(), "<write_file>".into()],
                exit_code: result.exit_code,
                stderr: result.stderr,
            });
        }
        Ok(())
    }

    /// Force-remove the container. Always called on every exit path by
    /// [`crate::scoped::with_sandbox`], success or failure.
    pub async fn stop(&self) -> SandboxResult<()> {
        let output = Command::new(&self.docker_bin)
            .args(["rm", "-f", &self.container_id])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| SandboxError::StopFailed { container_id: self.container_id.clone(), source: e })?;

        if !output.status.success() {
            tracing::warn!(
                container_id = %self.container_id,
                stderr = %String::from_utf8_lossy(&output.stderr),
                "docker rm -f reported an error"
            );
        }
        Ok(())
    }

    async fn kill(&self) -> SandboxResult<()> {
        let _ = Command::new(&self.docker_bin)
            .args(["kill", "-s", "SIGTERM", &self.container_id])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .output()
            .await?;
        Ok(())
    }

    pub fn container_id(&self) -> &str {
        &self.container_id
    }
}

fn random_sentinel() -> String {
    let bytes: [u8; 16] = rand::rng().random();
    format!("REVIEWBOT_EOF_{}", hex::encode(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_sentinel_is_unique_and_fixed_width() {
        let a = random_sentinel();
        let b = random_sentinel();
        assert_ne!(a, b);
        assert!(a.starts_with("REVIEWBOT_EOF_"));
        assert_eq!(a.len(), "REVIEWBOT_EOF_".len() + 32);
    }

    #[test]
    fn exec_output_success_reflects_zero_exit() {
        let ok = ExecOutput { stdout: String::new(), stderr: String::new(), exit_code: 0 };
        assert!(ok.success());
        let err = ExecOutput { stdout: String::new(), stderr: String::new(), exit_code: 1 };
        assert!(!err.success());
    }
}
