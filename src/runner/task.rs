//! Units of work and the handles the runner returns for them.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use async_trait::async_trait;
use tokio::task::JoinHandle;

use crate::error::TaskError;
use crate::runner::retry::RetryPolicy;
use crate::runner::state::{TaskRun, TaskState};

/// A unit of work the runner can execute, possibly several times.
///
/// Implementations must be safe to retry: a later attempt may observe the
/// partial effects of an earlier one.
#[async_trait]
pub trait Task: Send + Sync {
    /// Run name used in logs and run records.
    fn name(&self) -> String;

    /// Retry policy applied by the runner.
    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::none()
    }

    /// Execute one attempt. Returns a location string on success.
    async fn run(&self) -> Result<String, TaskError>;
}

/// Final state of a retired task.
#[derive(Debug)]
pub struct TaskOutcome {
    pub run: TaskRun,
    pub result: Result<String, TaskError>,
}

impl TaskOutcome {
    pub fn name(&self) -> &str {
        &self.run.name
    }

    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Handle to a submitted task.
///
/// Awaiting the handle yields the task's [`TaskOutcome`] once every attempt
/// has finished. Dropping it does not cancel the task.
#[derive(Debug)]
pub struct TaskHandle {
    name: String,
    inner: JoinHandle<TaskOutcome>,
}

impl TaskHandle {
    pub(crate) fn new(name: String, inner: JoinHandle<TaskOutcome>) -> Self {
        Self { name, inner }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the task has reached a terminal state.
    pub fn is_finished(&self) -> bool {
        self.inner.is_finished()
    }

    /// Wait for the task and return its result.
    pub async fn result(self) -> Result<String, TaskError> {
        self.await.result
    }
}

impl Future for TaskHandle {
    type Output = TaskOutcome;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.inner).poll(cx) {
            Poll::Ready(Ok(outcome)) => Poll::Ready(outcome),
            Poll::Ready(Err(join_error)) => {
                // Panics are caught inside the attempt loop, so this is an
                // abort or a runtime shutdown.
                let mut run = TaskRun::new(self.name.clone());
                let error = TaskError::Panicked {
                    name: self.name.clone(),
                    reason: join_error.to_string(),
                };
                let _ = run.transition_to(TaskState::Failed, Some(error.to_string()));
                Poll::Ready(TaskOutcome {
                    run,
                    result: Err(error),
                })
            }
            Poll::Pending => Poll::Pending,
        }
    }
}
