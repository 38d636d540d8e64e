//! Error types for the sonar-zarr pipeline.

use std::path::PathBuf;

/// Top-level error type for the pipeline.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Task error: {0}")]
    Task(#[from] TaskError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Flow error: {0}")]
    Flow(#[from] FlowError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),
}

impl ConfigError {
    pub(crate) fn invalid(key: &str, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            key: key.to_string(),
            message: message.into(),
        }
    }
}

/// Failure of a single task attempt or of a task run as a whole.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TaskError {
    /// The task's input is structurally invalid. Never retried.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Destination already holds data and overwriting was not requested. Never retried.
    #[error("Destination already exists: {0}")]
    AlreadyExists(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("HTTP request to {url} failed: {reason}")]
    Http {
        url: String,
        reason: String,
        retryable: bool,
    },

    #[error("Store error: {0}")]
    Store(String),

    #[error("Task {name} panicked: {reason}")]
    Panicked { name: String, reason: String },
}

impl TaskError {
    /// Whether another attempt could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::InvalidInput(_) | Self::AlreadyExists(_) | Self::Panicked { .. } => false,
            Self::Http { retryable, .. } => *retryable,
            Self::Io(_) | Self::Store(_) => true,
        }
    }
}

impl From<std::io::Error> for TaskError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

impl From<StoreError> for TaskError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::InvalidUri(uri) => Self::InvalidInput(format!("invalid store URI: {uri}")),
            other => Self::Store(other.to_string()),
        }
    }
}

/// Object store errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Invalid store URI: {0}")]
    InvalidUri(String),

    #[error("Object {key} not found in bucket {bucket}")]
    NotFound { bucket: String, key: String },

    #[error("Request to bucket {bucket} failed: {reason}")]
    Request { bucket: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Flow-level errors, raised after every task has been retired.
#[derive(Debug, thiserror::Error)]
pub enum FlowError {
    #[error("Input directory not found: {}", .0.display())]
    InputDirNotFound(PathBuf),

    #[error("Invalid glob pattern {pattern}: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("{failed} of {total} tasks failed: {summary}")]
    TasksFailed {
        failed: usize,
        total: usize,
        summary: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for the pipeline.
pub type Result<T> = std::result::Result<T, Error>;
