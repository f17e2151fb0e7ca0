use reviewbot_core::{EventType, JobError};
use reviewbot_db::{Queue, REPO_ANALYSIS_QUEUE, WEBHOOK_EVENTS_QUEUE};
use tokio::sync::watch;

use crate::analyzer::{self, RepoAnalysisPayload};
use crate::reviewer;
use crate::runtime::Services;

const REPO_ANALYSIS_VISIBILITY_SECS: i64 = 60;
const WEBHOOK_EVENTS_VISIBILITY_SECS: i64 = 300;
const MAX_READ_COUNT: i32 = 3;

/// The single long-lived cooperative scheduler loop: one iteration polls
/// both queues sequentially, then sleeps `poll_interval`. Visibility
/// timeouts stand in for back-off — a failed job simply isn't deleted, and
/// redelivers once its lease expires. Stops between iterations (never
/// mid-job) once `shutdown` is signaled.
pub async fn run_scheduler_loop(services: &Services, mut shutdown: watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow() {
            break;
        }

        poll_repo_analysis(services).await;
        poll_webhook_events(services).await;

        tokio::select! {
            _ = tokio::time::sleep(services.config.poll_interval) => {}
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    tracing::info!("scheduler loop stopped");
}

async fn poll_repo_analysis(services: &Services) {
    let queue = Queue::new(&services.pool, REPO_ANALYSIS_QUEUE);
    let visibility = chrono::Duration::seconds(REPO_ANALYSIS_VISIBILITY_SECS);
    let msg = match queue.read::<RepoAnalysisPayload>(visibility).await {
        Ok(Some(msg)) => msg,
        Ok(None) => return,
        Err(e) => {
            tracing::error!(error = %e, "failed to poll repo_analysis queue");
            return;
        }
    };

    if msg.read_ct > MAX_READ_COUNT {
        tracing::warn!(msg_id = msg.msg_id, read_ct = msg.read_ct, "giving up on repo_analysis message after too many retries");
        if let Err(e) = queue.delete(msg.msg_id).await {
            tracing::error!(msg_id = msg.msg_id, error = %e, "failed to delete abandoned repo_analysis message");
        }
        return;
    }

    match analyzer::run(services, &msg.body).await {
        Ok(()) => {
            if let Err(e) = queue.delete(msg.msg_id).await {
                tracing::error!(msg_id = msg.msg_id, error = %e, "failed to delete completed repo_analysis message");
            }
        }
        Err(e) => log_job_failure("repo_analysis", msg.msg_id, &e),
    }
}

async fn poll_webhook_events(services: &Services) {
    let queue = Queue::new(&services.pool, WEBHOOK_EVENTS_QUEUE);
    let visibility = chrono::Duration::seconds(WEBHOOK_EVENTS_VISIBILITY_SECS);
    let msg = match queue.read::<reviewbot_core::WebhookEvent>(visibility).await {
        Ok(Some(msg)) => msg,
        Ok(None) => return,
        Err(e) => {
            tracing::error!(error = %e, "failed to poll webhook_events queue");
            return;
        }
    };

    if msg.read_ct > MAX_READ_COUNT {
        tracing::warn!(msg_id = msg.msg_id, read_ct = msg.read_ct, "giving up on webhook_events message after too many retries");
        if let Err(e) = queue.delete(msg.msg_id).await {
            tracing::error!(msg_id = msg.msg_id, error = %e, "failed to delete abandoned webhook_events message");
        }
        return;
    }

    let result = match msg.body.event_type {
        EventType::PrOpened | EventType::PrUpdated => reviewer::run(services, &msg.body).await,
        EventType::PrClosed | EventType::PrReopened => Ok(()),
    };

    match result {
        Ok(()) => {
            if let Err(e) = queue.delete(msg.msg_id).await {
                tracing::error!(msg_id = msg.msg_id, error = %e, "failed to delete completed webhook_events message");
            }
        }
        Err(e) => log_job_failure("webhook_events", msg.msg_id, &e),
    }
}

/// Non-retryable failures (`AdmissionDenied`, `Unauthorized`,
/// `AgentResponse*`) are swallowed by the job functions themselves, which
/// return `Ok(())` in those cases. Anything that reaches here is either
/// `Transient` or `SandboxFailure` and is left for redelivery, or a
/// genuine bug surfaced as some other variant — logged either way.
fn log_job_failure(queue_name: &str, msg_id: i64, error: &JobError) {
    if error.is_retryable() {
        tracing::warn!(queue = queue_name, msg_id, error = %error, "job failed, leaving message for redelivery");
    } else {
        tracing::error!(queue = queue_name, msg_id, error = %error, "job failed with a non-retryable error");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn visibility_windows_match_spec() {
        assert_eq!(REPO_ANALYSIS_VISIBILITY_SECS, 60);
        assert_eq!(WEBHOOK_EVENTS_VISIBILITY_SECS, 300);
    }

    #[test]
    fn max_read_count_gives_up_after_three() {
        assert_eq!(MAX_READ_COUNT, 3);
    }
}
