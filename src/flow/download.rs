//! Raw file download flow.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

use crate::config::DownloadConfig;
use crate::error::{ConfigError, Error, FlowError, TaskError};
use crate::runner::{LocalTaskRunner, RetryPolicy, Task, TaskRunner};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Streams one file from a URL into a local directory.
pub struct DownloadTask {
    client: reqwest::Client,
    url: String,
    dest_dir: PathBuf,
    file_name: String,
    retry: RetryPolicy,
}

impl DownloadTask {
    pub fn new(
        client: reqwest::Client,
        url: impl Into<String>,
        dest_dir: impl Into<PathBuf>,
        file_name: impl Into<String>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            client,
            url: url.into(),
            dest_dir: dest_dir.into(),
            file_name: file_name.into(),
            retry,
        }
    }

    /// Local path the file is written to: the last URL segment inside `dest_dir`.
    pub fn destination(&self) -> PathBuf {
        let last = self.url.rsplit('/').next().unwrap_or(&self.file_name);
        self.dest_dir.join(last)
    }

    /// Write the response body to `path`. Returns the number of bytes written.
    async fn stream_to(
        &self,
        response: &mut reqwest::Response,
        path: &Path,
    ) -> Result<u64, TaskError> {
        let mut file = tokio::fs::File::create(path).await?;
        let mut written: u64 = 0;
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| self.http_error(e.to_string(), true))?
        {
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;
        Ok(written)
    }

    fn http_error(&self, reason: impl Into<String>, retryable: bool) -> TaskError {
        TaskError::Http {
            url: self.url.clone(),
            reason: reason.into(),
            retryable,
        }
    }
}

#[async_trait]
impl Task for DownloadTask {
    fn name(&self) -> String {
        format!("download-file-{}", self.file_name)
    }

    fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    async fn run(&self) -> Result<String, TaskError> {
        tracing::info!("Starting download of {} from {}...", self.file_name, self.url);
        let dest = self.destination();
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| self.http_error(e.to_string(), true))?;

        let status = response.status();
        if !status.is_success() {
            let retryable = status.is_server_error() || status.as_u16() == 429;
            return Err(self.http_error(format!("HTTP {status}"), retryable));
        }

        // Stream into a sibling file and rename, so a failed attempt never
        // leaves a truncated file under the final name.
        let partial = partial_path(&dest);
        let written = match self.stream_to(&mut response, &partial).await {
            Ok(written) => written,
            Err(e) => {
                let _ = tokio::fs::remove_file(&partial).await;
                return Err(e);
            }
        };
        tokio::fs::rename(&partial, &dest).await?;

        tracing::info!(
            bytes = written,
            "Finished download of {} to {}",
            self.file_name,
            dest.display()
        );
        Ok(dest.display().to_string())
    }
}

fn partial_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    dest.with_file_name(name)
}

/// HTTP client shared by all download tasks of a run.
pub fn http_client() -> Result<reqwest::Client, ConfigError> {
    reqwest::Client::builder()
        .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
        .connect_timeout(CONNECT_TIMEOUT)
        .build()
        .map_err(|e| ConfigError::invalid("http_client", e.to_string()))
}

/// Download every configured file, `config.workers` at a time.
///
/// All downloads are submitted up front and then awaited in order. Every
/// download runs to completion before a failure is reported.
pub async fn download_raw_data(config: &DownloadConfig) -> Result<Vec<PathBuf>, Error> {
    config.validate()?;
    let client = http_client()?;
    let runner = LocalTaskRunner::new(config.workers);

    let handles: Vec<_> = config
        .filenames
        .iter()
        .map(|file_name| {
            let task = DownloadTask::new(
                client.clone(),
                config.file_url(file_name),
                config.dest_dir.clone(),
                file_name.clone(),
                config.retry,
            );
            runner.submit(Arc::new(task))
        })
        .collect();

    let total = handles.len();
    let mut paths = Vec::with_capacity(total);
    let mut failures = Vec::new();
    for handle in handles {
        let name = handle.name().to_string();
        match handle.result().await {
            Ok(path) => paths.push(PathBuf::from(path)),
            Err(e) => failures.push(format!("{name}: {e}")),
        }
    }

    if !failures.is_empty() {
        return Err(FlowError::TasksFailed {
            failed: failures.len(),
            total,
            summary: failures.join("; "),
        }
        .into());
    }

    tracing::info!("All files have been downloaded.");
    Ok(paths)
}
