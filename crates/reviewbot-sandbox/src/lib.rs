pub mod container;
pub mod error;
pub mod scoped;

pub use container::{ExecOutput, Sandbox};
pub use error::{SandboxError, SandboxResult};
pub use scoped::with_sandbox;

#[cfg(test)]
mod fake_docker_tests {
    use super::*;
    use std::io::Write;
    use std::os::unix::fs::PermissionsExt;

    /// A fake `docker` binary good enough to exercise `with_sandbox`'s
    /// guarantee without a real container runtime: `run -d ... IMAGE ...`
    /// prints a fixed id, `rm -f ID` appends to a marker file so the test
    /// can assert it ran, everything else no-ops successfully.
    fn write_fake_docker(dir: &std::path::Path) -> std::path::PathBuf {
        let marker = dir.join("stopped.marker");
        let script = format!(
            "#!/bin/sh\n\
             if [ \"$1\" = \"run\" ]; then echo fake-container-id; exit 0; fi\n\
             if [ \"$1\" = \"rm\" ]; then echo \"$3\" >> {marker}; exit 0; fi\n\
             if [ \"$1\" = \"exec\" ]; then shift 2; \"$@\"; exit $?; fi\n\
             exit 0\n",
            marker = marker.display()
        );
        let path = dir.join("docker");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(script.as_bytes()).unwrap();
        let mut perms = file.metadata().unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&path, perms).unwrap();
        path
    }

    #[tokio::test]
    async fn with_sandbox_stops_container_on_success() {
        let dir = std::env::temp_dir().join(format!("reviewbot-sandbox-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let docker_bin = write_fake_docker(&dir);

        let result: SandboxResult<i32> = with_sandbox("test-image", docker_bin.to_str().unwrap(), |sandbox| {
            Box::pin(async move {
                let out = sandbox.exec(&["echo", "hi"]).await?;
                Ok(if out.success() { 42 } else { 0 })
            })
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(
            std::fs::read_to_string(dir.join("stopped.marker")).unwrap().trim(),
            "fake-container-id"
        );

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn with_sandbox_stops_container_even_when_closure_errors() {
        let dir = std::env::temp_dir().join(format!("reviewbot-sandbox-test-err-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let docker_bin = write_fake_docker(&dir);

        let result: SandboxResult<()> = with_sandbox("test-image", docker_bin.to_str().unwrap(), |_sandbox| {
            Box::pin(async move {
                Err(SandboxError::StartFailed("boom".into()))
            })
        })
        .await;

        assert!(result.is_err());
        assert!(dir.join("stopped.marker").exists());

        std::fs::remove_dir_all(&dir).ok();
    }
}
