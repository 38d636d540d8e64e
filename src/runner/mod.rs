//! Task-execution layer — submission, retries, and completion handles.
//!
//! Core components:
//! - `task` — the `Task` trait, `TaskHandle`, `TaskOutcome`
//! - `state` — task run state machine (Pending → Running → Retrying → Completed/Failed)
//! - `retry` — `RetryPolicy` and the attempt loop
//! - `local` — `LocalTaskRunner`, a tokio-backed worker pool, and `wait_any`

pub mod local;
pub mod retry;
pub mod state;
pub mod task;

use std::sync::Arc;

pub use local::{LocalTaskRunner, wait_any};
pub use retry::RetryPolicy;
pub use state::{TaskRun, TaskState};
pub use task::{Task, TaskHandle, TaskOutcome};

/// Accepts tasks for asynchronous execution.
pub trait TaskRunner: Send + Sync {
    /// Hand `task` to the runner. Returns immediately.
    fn submit(&self, task: Arc<dyn Task>) -> TaskHandle;
}
