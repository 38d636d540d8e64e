//! Raw-to-Zarr conversion flow.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use crate::config::ConvertConfig;
use crate::dispatcher::{DispatchReport, Dispatcher};
use crate::error::{Error, TaskError};
use crate::job::{ConversionJob, discover_inputs, plan_jobs};
use crate::runner::{LocalTaskRunner, RetryPolicy, Task, TaskRunner};
use crate::store::ObjectStore;
use crate::zarr::ZarrWriter;

/// Converts one raw file into a Zarr store.
pub struct ConvertTask {
    job: ConversionJob,
    store: Arc<dyn ObjectStore>,
    retry: RetryPolicy,
}

impl ConvertTask {
    pub fn new(job: ConversionJob, store: Arc<dyn ObjectStore>, retry: RetryPolicy) -> Self {
        Self { job, store, retry }
    }
}

#[async_trait]
impl Task for ConvertTask {
    fn name(&self) -> String {
        self.job.run_name()
    }

    fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    async fn run(&self) -> Result<String, TaskError> {
        let job = &self.job;
        if !tokio::fs::try_exists(&job.source).await.unwrap_or(false) {
            return Err(TaskError::InvalidInput(format!(
                "Input RAW file not found: {}",
                job.source.display()
            )));
        }

        let uri = job.target.uri();
        let writer = ZarrWriter::new(self.store.as_ref(), &job.target);
        // Leftovers of an interrupted attempt are always replaced.
        if !job.params.overwrite && writer.is_complete().await? {
            return Err(TaskError::AlreadyExists(uri));
        }
        if writer.exists().await? {
            let removed = writer.clear().await?;
            tracing::debug!(store = %uri, removed, "Cleared existing store");
        }

        let data = tokio::fs::read(&job.source).await?;
        writer
            .write_bytes(&data, job.params.chunk_size, store_attributes(job))
            .await?;

        tracing::info!(source = %job.source.display(), store = %uri, "Converted raw file");
        Ok(uri)
    }
}

/// Group attributes recorded with every converted store.
fn store_attributes(job: &ConversionJob) -> serde_json::Value {
    let source_file = job
        .source
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    json!({
        "sonar_model": job.params.sonar_model,
        "source_file": source_file,
        "converter": env!("CARGO_PKG_NAME"),
        "converter_version": env!("CARGO_PKG_VERSION"),
    })
}

/// Discover inputs and run one conversion per file through `runner`.
///
/// Returns the full dispatch report; per-file failures are recorded there
/// rather than returned as an error.
pub async fn run_conversions(
    config: &ConvertConfig,
    store: Arc<dyn ObjectStore>,
    runner: Arc<dyn TaskRunner>,
) -> Result<DispatchReport, Error> {
    config.validate()?;

    let inputs = discover_inputs(&config.input_dir, &config.glob_pattern)?;
    if inputs.is_empty() {
        tracing::info!(
            "No files matching '{}' found in {}.",
            config.glob_pattern,
            config.input_dir.display()
        );
        return Ok(DispatchReport::default());
    }

    tracing::info!(
        files = inputs.len(),
        capacity = config.capacity,
        bucket = %config.bucket,
        prefix = %config.prefix,
        "Starting conversion"
    );

    let tasks = plan_jobs(config, inputs).into_iter().map(|job| {
        Arc::new(ConvertTask::new(job, Arc::clone(&store), config.retry)) as Arc<dyn Task>
    });

    let dispatcher = Dispatcher::new(runner, config.capacity)?;
    Ok(dispatcher.run(tasks).await)
}

/// Convert every matching raw file and return the store URIs.
///
/// Fails after all conversions have finished if any of them failed.
/// Stores written by successful conversions are kept.
pub async fn convert_raw_to_zarr(
    config: &ConvertConfig,
    store: Arc<dyn ObjectStore>,
) -> Result<Vec<String>, Error> {
    let runner: Arc<dyn TaskRunner> = Arc::new(LocalTaskRunner::new(config.workers));
    let report = run_conversions(config, store, runner).await?;
    Ok(report.into_result()?)
}
