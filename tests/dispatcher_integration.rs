//! Integration tests for the bounded-concurrency dispatcher.
//!
//! Tasks here are stubs that sleep and count how many of them are running,
//! so the tests observe the in-flight bound from the worker side as well as
//! through the dispatch report.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::timeout;

use sonar_zarr::dispatcher::Dispatcher;
use sonar_zarr::error::TaskError;
use sonar_zarr::runner::{LocalTaskRunner, RetryPolicy, Task, TaskRunner, TaskState};

/// Maximum time any test is allowed to run before we consider it hung.
const TEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Default)]
struct Gauge {
    active: AtomicUsize,
    peak: AtomicUsize,
    started: AtomicUsize,
}

impl Gauge {
    fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

/// Sleeps for `delay`, then succeeds or fails with `error`.
struct StubTask {
    name: String,
    delay: Duration,
    error: Option<TaskError>,
    gauge: Arc<Gauge>,
}

#[async_trait]
impl Task for StubTask {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(2, Duration::from_millis(1))
    }

    async fn run(&self) -> Result<String, TaskError> {
        self.gauge.started.fetch_add(1, Ordering::SeqCst);
        let now = self.gauge.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.gauge.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.gauge.active.fetch_sub(1, Ordering::SeqCst);
        match &self.error {
            Some(e) => Err(e.clone()),
            None => Ok(format!("s3://demo/{}.zarr", self.name)),
        }
    }
}

fn tasks(gauge: &Arc<Gauge>, delays_ms: &[u64]) -> Vec<Arc<dyn Task>> {
    delays_ms
        .iter()
        .enumerate()
        .map(|(i, ms)| {
            Arc::new(StubTask {
                name: format!("job-{i}"),
                delay: Duration::from_millis(*ms),
                error: None,
                gauge: Arc::clone(gauge),
            }) as Arc<dyn Task>
        })
        .collect()
}

/// Runner with more workers than any test's capacity, so only the
/// dispatcher limits concurrency.
fn runner() -> Arc<dyn TaskRunner> {
    Arc::new(LocalTaskRunner::new(16))
}

#[tokio::test]
async fn five_jobs_capacity_two() {
    timeout(TEST_TIMEOUT, async {
        let gauge = Arc::new(Gauge::default());
        let dispatcher = Dispatcher::new(runner(), 2).unwrap();

        let report = dispatcher.run(tasks(&gauge, &[40, 40, 40, 40, 40])).await;

        assert_eq!(report.submitted, 5);
        assert_eq!(report.refill_waits, 4);
        assert_eq!(report.drained, 1);
        assert_eq!(report.peak_in_flight, 2);
        assert_eq!(gauge.peak(), 2);
        assert_eq!(report.outcomes.len(), 5);
        assert!(report.outcomes.iter().all(|o| o.is_success()));
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn capacity_at_least_job_count_never_blocks() {
    timeout(TEST_TIMEOUT, async {
        let gauge = Arc::new(Gauge::default());
        let dispatcher = Dispatcher::new(runner(), 8).unwrap();

        let report = dispatcher.run(tasks(&gauge, &[30, 30, 30, 30])).await;

        assert_eq!(report.submitted, 4);
        assert_eq!(report.refill_waits, 0);
        assert_eq!(report.drained, 4);
        assert_eq!(gauge.peak(), 4);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn capacity_one_runs_sequentially() {
    timeout(TEST_TIMEOUT, async {
        let gauge = Arc::new(Gauge::default());
        let dispatcher = Dispatcher::new(runner(), 1).unwrap();

        let report = dispatcher.run(tasks(&gauge, &[10, 10, 10])).await;

        assert_eq!(report.submitted, 3);
        assert_eq!(report.refill_waits, 3);
        assert_eq!(report.drained, 0);
        assert_eq!(report.peak_in_flight, 1);
        assert_eq!(gauge.peak(), 1);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn in_flight_bound_holds_for_many_capacities() {
    timeout(TEST_TIMEOUT, async {
        for capacity in 1..=4 {
            for count in [0usize, 1, 3, 7] {
                let gauge = Arc::new(Gauge::default());
                let delays: Vec<u64> = (0..count).map(|i| 5 + (i as u64 * 7) % 20).collect();
                let dispatcher = Dispatcher::new(runner(), capacity).unwrap();

                let report = dispatcher.run(tasks(&gauge, &delays)).await;

                assert_eq!(report.submitted, count);
                assert_eq!(report.outcomes.len(), count);
                assert!(report.peak_in_flight <= capacity);
                assert!(gauge.peak() <= capacity, "C={capacity} N={count}");
                assert_eq!(report.refill_waits + report.drained, count);
            }
        }
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn completion_order_need_not_match_submission() {
    timeout(TEST_TIMEOUT, async {
        let gauge = Arc::new(Gauge::default());
        let dispatcher = Dispatcher::new(runner(), 2).unwrap();

        // job-0 is slow; job-1 finishes first and frees the slot.
        let report = dispatcher.run(tasks(&gauge, &[200, 10, 10])).await;

        let order: Vec<&str> = report.outcomes.iter().map(|o| o.name()).collect();
        assert_eq!(order[0], "job-1");
        assert_eq!(report.outcomes.len(), 3);
        assert!(order.contains(&"job-0"));
        assert!(order.contains(&"job-2"));
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn failure_does_not_affect_siblings() {
    timeout(TEST_TIMEOUT, async {
        let gauge = Arc::new(Gauge::default());
        let mut jobs = tasks(&gauge, &[20, 20]);
        jobs.insert(
            1,
            Arc::new(StubTask {
                name: "broken".to_string(),
                delay: Duration::from_millis(5),
                error: Some(TaskError::Store("503 Slow Down".to_string())),
                gauge: Arc::clone(&gauge),
            }),
        );
        let dispatcher = Dispatcher::new(runner(), 2).unwrap();

        let report = dispatcher.run(jobs).await;

        assert_eq!(report.succeeded().count(), 2);
        let failed: Vec<_> = report.failed().collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].name(), "broken");
        // Retryable error: first attempt plus two retries.
        assert_eq!(failed[0].run.attempts, 3);
        assert_eq!(failed[0].run.state, TaskState::Failed);
        for outcome in report.succeeded() {
            assert_eq!(outcome.run.attempts, 1);
        }

        let err = report.into_result().unwrap_err();
        let message = err.to_string();
        assert!(message.contains("1 of 3 tasks failed"), "{message}");
        assert!(message.contains("broken"), "{message}");
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn invalid_input_is_not_retried() {
    timeout(TEST_TIMEOUT, async {
        let gauge = Arc::new(Gauge::default());
        let job: Arc<dyn Task> = Arc::new(StubTask {
            name: "missing".to_string(),
            delay: Duration::ZERO,
            error: Some(TaskError::InvalidInput("Input RAW file not found: x.raw".into())),
            gauge: Arc::clone(&gauge),
        });
        let dispatcher = Dispatcher::new(runner(), 2).unwrap();

        let report = dispatcher.run(vec![job]).await;

        assert_eq!(gauge.started.load(Ordering::SeqCst), 1);
        assert_eq!(report.outcomes[0].run.attempts, 1);
        assert!(matches!(
            report.outcomes[0].result,
            Err(TaskError::InvalidInput(_))
        ));
    })
    .await
    .expect("test timed out");
}
