//! Bounded-concurrency dispatcher.
//!
//! Submits tasks to a [`TaskRunner`] while keeping at most `capacity` of them
//! outstanding. After each submission that fills the window, it blocks until
//! one task finishes, retires exactly that one, and only then admits the next.
//! Once the input is exhausted the remaining handles are drained.

use std::sync::Arc;

use crate::error::{ConfigError, FlowError};
use crate::runner::{Task, TaskHandle, TaskOutcome, TaskRunner, wait_any};

/// Result of one dispatcher run.
#[derive(Debug, Default)]
pub struct DispatchReport {
    /// Outcomes in retirement order.
    pub outcomes: Vec<TaskOutcome>,
    /// Number of tasks handed to the runner.
    pub submitted: usize,
    /// Number of blocking waits taken to free a slot before the drain.
    pub refill_waits: usize,
    /// Number of handles retired by the final drain.
    pub drained: usize,
    /// Largest in-flight set observed.
    pub peak_in_flight: usize,
}

impl DispatchReport {
    pub fn succeeded(&self) -> impl Iterator<Item = &TaskOutcome> {
        self.outcomes.iter().filter(|o| o.is_success())
    }

    pub fn failed(&self) -> impl Iterator<Item = &TaskOutcome> {
        self.outcomes.iter().filter(|o| !o.is_success())
    }

    /// Successful results, or an error naming every failed task.
    pub fn into_result(self) -> Result<Vec<String>, FlowError> {
        let total = self.outcomes.len();
        let mut values = Vec::with_capacity(total);
        let mut failures = Vec::new();
        for outcome in self.outcomes {
            match outcome.result {
                Ok(value) => values.push(value),
                Err(e) => failures.push(format!("{}: {}", outcome.run.name, e)),
            }
        }
        if failures.is_empty() {
            Ok(values)
        } else {
            Err(FlowError::TasksFailed {
                failed: failures.len(),
                total,
                summary: failures.join("; "),
            })
        }
    }
}

/// Sliding-window admission control over a task runner.
pub struct Dispatcher {
    runner: Arc<dyn TaskRunner>,
    capacity: usize,
}

impl Dispatcher {
    /// Create a dispatcher admitting at most `capacity` tasks at a time.
    pub fn new(runner: Arc<dyn TaskRunner>, capacity: usize) -> Result<Self, ConfigError> {
        if capacity == 0 {
            return Err(ConfigError::invalid("capacity", "must be at least 1"));
        }
        Ok(Self { runner, capacity })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Run every task and collect all outcomes.
    ///
    /// A failing task never cancels its siblings; its error is recorded in
    /// its own outcome.
    pub async fn run<I>(&self, tasks: I) -> DispatchReport
    where
        I: IntoIterator<Item = Arc<dyn Task>>,
    {
        let mut report = DispatchReport::default();
        let mut in_flight: Vec<TaskHandle> = Vec::with_capacity(self.capacity);

        for task in tasks {
            in_flight.push(self.runner.submit(task));
            report.submitted += 1;
            report.peak_in_flight = report.peak_in_flight.max(in_flight.len());

            if in_flight.len() >= self.capacity
                && let Some((outcome, remaining)) = wait_any(std::mem::take(&mut in_flight)).await
            {
                in_flight = remaining;
                report.refill_waits += 1;
                self.retire(&mut report, outcome);
            }
        }

        tracing::debug!(remaining = in_flight.len(), "Draining in-flight tasks");
        for handle in in_flight {
            let outcome = handle.await;
            report.drained += 1;
            self.retire(&mut report, outcome);
        }

        tracing::info!(
            submitted = report.submitted,
            succeeded = report.succeeded().count(),
            failed = report.failed().count(),
            peak_in_flight = report.peak_in_flight,
            "Dispatch finished"
        );
        report
    }

    fn retire(&self, report: &mut DispatchReport, outcome: TaskOutcome) {
        let elapsed_ms = outcome.run.elapsed().map(|d| d.as_millis() as u64);
        match &outcome.result {
            Ok(value) => tracing::info!(
                task = %outcome.name(),
                attempts = outcome.run.attempts,
                elapsed_ms,
                result = %value,
                "Task finished"
            ),
            Err(e) => tracing::error!(
                task = %outcome.name(),
                attempts = outcome.run.attempts,
                elapsed_ms,
                "Task failed terminally: {}",
                e
            ),
        }
        report.outcomes.push(outcome);
    }
}
