use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{info, warn};

/// Sleep for `duration`; true if the token fired first
pub async fn sleep_or_cancel(token: &CancellationToken, duration: Duration) -> bool {
    tokio::select! {
        _ = token.cancelled() => true,
        _ = tokio::time::sleep(duration) => false,
    }
}

/// Wait for tracked tasks to finish, up to `grace`. Returns false on timeout.
pub async fn drain(tasks: &TaskTracker, grace: Duration) -> bool {
    tasks.close();
    if tasks.is_empty() {
        return true;
    }

    info!(pending = tasks.len(), "Waiting for in-flight scrapes to finish...");
    match tokio::time::timeout(grace, tasks.wait()).await {
        Ok(()) => true,
        Err(_) => {
            warn!(pending = tasks.len(), "Grace period elapsed with scrapes still running");
            false
        }
    }
}
