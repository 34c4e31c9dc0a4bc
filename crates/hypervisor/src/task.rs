//! Bounded, cancellable task polling.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::{HypervisorError, HypervisorResult};
use crate::model::{ManagedObjectRef, TaskInfo, TaskState};
use crate::session::HypervisorSession;

/// Poll `task` until it reaches a terminal state.
///
/// Returns the final info on success. Fails with
/// [`HypervisorError::TaskFailed`] on the error state,
/// [`HypervisorError::Timeout`] once `timeout` elapses and
/// [`HypervisorError::Cancelled`] when `cancel` fires. The task itself is
/// not cancelled on the endpoint in the last two cases.
pub async fn wait_for_task(
    session: &dyn HypervisorSession,
    task: &ManagedObjectRef,
    description: &str,
    timeout: Duration,
    poll_interval: Duration,
    cancel: &CancellationToken,
) -> HypervisorResult<TaskInfo> {
    tracing::info!(task = %task, description, "Waiting for hypervisor task");

    let deadline = tokio::time::sleep(timeout);
    tokio::pin!(deadline);

    loop {
        let info = session.task_info(task).await?;
        match info.state {
            TaskState::Success => {
                tracing::info!(task = %task, description, "Hypervisor task succeeded");
                return Ok(info);
            }
            TaskState::Error => {
                let message = info
                    .error
                    .unwrap_or_else(|| "unknown task error".to_string());
                tracing::error!(task = %task, description, error = %message, "Hypervisor task failed");
                return Err(HypervisorError::TaskFailed {
                    task: description.to_string(),
                    message,
                });
            }
            TaskState::Queued | TaskState::Running => {}
        }

        tokio::select! {
            _ = &mut deadline => {
                tracing::warn!(task = %task, description, ?timeout, "Hypervisor task wait timed out");
                return Err(HypervisorError::Timeout {
                    task: description.to_string(),
                    after: timeout,
                });
            }
            _ = cancel.cancelled() => {
                return Err(HypervisorError::Cancelled(description.to_string()));
            }
            _ = tokio::time::sleep(poll_interval) => {}
        }
    }
}

/// Timeout, poll interval and cancellation shared by every wait of a client.
#[derive(Debug, Clone)]
pub struct TaskWaiter {
    pub timeout: Duration,
    pub poll_interval: Duration,
    pub cancel: CancellationToken,
}

impl TaskWaiter {
    pub async fn wait(
        &self,
        session: &dyn HypervisorSession,
        task: &ManagedObjectRef,
        description: &str,
    ) -> HypervisorResult<TaskInfo> {
        wait_for_task(
            session,
            task,
            description,
            self.timeout,
            self.poll_interval,
            &self.cancel,
        )
        .await
    }
}
