//! Declarative retry policy and the attempt loop that applies it.

use std::panic::AssertUnwindSafe;
use std::time::Duration;

use futures::FutureExt;

use crate::error::TaskError;
use crate::runner::state::{TaskRun, TaskState};
use crate::runner::task::Task;

/// Bounded retry count with a fixed delay between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Extra attempts after the first one.
    pub retries: u32,
    /// Pause before each retry.
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(retries: u32, delay: Duration) -> Self {
        Self { retries, delay }
    }

    /// Single attempt, no retries.
    pub fn none() -> Self {
        Self::new(0, Duration::ZERO)
    }

    pub fn max_attempts(&self) -> u32 {
        self.retries.saturating_add(1)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::none()
    }
}

/// Run `task` until it succeeds, fails terminally, or exhausts its policy.
///
/// Every attempt is recorded on `run`. Non-retryable errors end the run on
/// the attempt that produced them, without waiting out the delay.
pub async fn run_with_retry(task: &dyn Task, run: &mut TaskRun) -> Result<String, TaskError> {
    let policy = task.retry_policy();

    loop {
        let _ = run.transition_to(TaskState::Running, None);

        let attempt = AssertUnwindSafe(task.run()).catch_unwind().await;
        let error = match attempt {
            Ok(Ok(value)) => {
                let _ = run.transition_to(TaskState::Completed, None);
                tracing::debug!(task = %run.name, attempts = run.attempts, "Task completed");
                return Ok(value);
            }
            Ok(Err(e)) => e,
            Err(panic) => TaskError::Panicked {
                name: run.name.clone(),
                reason: panic_message(panic.as_ref()),
            },
        };

        if error.is_retryable() && run.attempts < policy.max_attempts() {
            tracing::warn!(
                task = %run.name,
                attempt = run.attempts,
                max_attempts = policy.max_attempts(),
                delay_secs = policy.delay.as_secs_f64(),
                "Task attempt failed, retrying: {}",
                error
            );
            let _ = run.transition_to(TaskState::Retrying, Some(error.to_string()));
            tokio::time::sleep(policy.delay).await;
            continue;
        }

        tracing::error!(
            task = %run.name,
            attempts = run.attempts,
            "Task failed: {}",
            error
        );
        let _ = run.transition_to(TaskState::Failed, Some(error.to_string()));
        return Err(error);
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
