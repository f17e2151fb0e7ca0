use futures::future::BoxFuture;

use crate::container::Sandbox;
use crate::error::SandboxResult;

/// Acquire a [`Sandbox`], run `f` against it, and guarantee `stop()` runs on
/// every exit path — success, error, or the closure itself returning early.
/// Not `Drop`, since tearing down a container is an async operation and
/// `Drop::drop` cannot `.await`; this free function is the async
/// equivalent of the scoped-acquisition pattern.
///
/// `f`'s result is returned as-is; a failure to `stop()` the container is
/// logged but never shadows `f`'s own result or error.
pub async fn with_sandbox<T, F>(image: &str, docker_bin: &str, f: F) -> SandboxResult<T>
where
    F: for<'s> FnOnce(&'s Sandbox) -> BoxFuture<'s, SandboxResult<T>>,
{
    let sandbox = Sandbox::start(image, docker_bin).await?;
    let result = f(&sandbox).await;

    if let Err(e) = sandbox.stop().await {
        tracing::warn!(
            container_id = %sandbox.container_id(),
            error = %e,
            "failed to stop sandbox container after job"
        );
    }

    result
}
