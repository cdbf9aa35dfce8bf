//! Best-effort progress reporting on the failover task

use kube::ResourceExt;
use tracing::{debug, warn};

use crate::crd::{FailoverPhase, Pgtask};
use crate::platform::Platform;

/// Re-read the task, set its phase and message, and persist the status.
///
/// Failures are logged and swallowed; the failover carries on regardless.
pub async fn update_failover_status(
    platform: &dyn Platform,
    task: &Pgtask,
    namespace: &str,
    phase: FailoverPhase,
    message: &str,
) {
    let name = task.name_any();
    let namespace = task.namespace().unwrap_or_else(|| namespace.to_string());

    debug!(
        "updateFailoverStatus namespace=[{}] taskName=[{}] phase=[{}] message=[{}]",
        namespace, name, phase, message
    );

    let mut current = match platform.get_task(&name, &namespace).await {
        Ok(Some(task)) => task,
        Ok(None) => {
            warn!("task {} not found, status not updated", name);
            return;
        }
        Err(e) => {
            warn!("could not get task {} for status update: {}", name, e);
            return;
        }
    };

    current.set_progress(phase, message);

    if let Err(e) = platform.update_task_status(&current, &namespace).await {
        warn!("could not update status of task {}: {}", name, e);
    }
}
