//! In-process task runner backed by the tokio runtime.

use std::sync::Arc;

use futures::future::select_all;
use tokio::sync::Semaphore;

use crate::error::TaskError;
use crate::runner::TaskRunner;
use crate::runner::retry::run_with_retry;
use crate::runner::state::{TaskRun, TaskState};
use crate::runner::task::{Task, TaskHandle, TaskOutcome};

/// Runs tasks on the current tokio runtime with a fixed number of workers.
///
/// Submission never blocks: tasks beyond the worker count stay `Pending`
/// until a worker frees up. A task keeps its worker while it waits out a
/// retry delay.
#[derive(Debug, Clone)]
pub struct LocalTaskRunner {
    workers: Arc<Semaphore>,
    worker_count: usize,
}

impl LocalTaskRunner {
    /// Create a runner with `workers` execution slots (at least one).
    pub fn new(workers: usize) -> Self {
        let worker_count = workers.max(1);
        Self {
            workers: Arc::new(Semaphore::new(worker_count)),
            worker_count,
        }
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }
}

impl TaskRunner for LocalTaskRunner {
    fn submit(&self, task: Arc<dyn Task>) -> TaskHandle {
        let name = task.name();
        let workers = Arc::clone(&self.workers);
        let mut run = TaskRun::new(name.clone());

        tracing::debug!(task = %name, run_id = %run.run_id, "Submitted task");

        let inner = tokio::spawn(async move {
            let _permit = match workers.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    let error = TaskError::Io("worker pool closed".to_string());
                    let _ = run.transition_to(TaskState::Failed, Some(error.to_string()));
                    return TaskOutcome {
                        run,
                        result: Err(error),
                    };
                }
            };
            let result = run_with_retry(task.as_ref(), &mut run).await;
            TaskOutcome { run, result }
        });

        TaskHandle::new(name, inner)
    }
}

/// Block until at least one handle completes.
///
/// Returns the outcome of exactly one completed handle together with the
/// handles still outstanding, or `None` when `handles` is empty. When several
/// handles are ready at once, which one is returned is unspecified.
pub async fn wait_any(handles: Vec<TaskHandle>) -> Option<(TaskOutcome, Vec<TaskHandle>)> {
    if handles.is_empty() {
        return None;
    }
    let (outcome, _index, remaining) = select_all(handles).await;
    Some((outcome, remaining))
}
