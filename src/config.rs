//! Configuration types.
//!
//! Every flow takes its parameters from an explicit config struct. Defaults
//! match the public NOAA EK60 sample and the demo bucket; `from_env()` layers
//! `SONAR_ZARR_*` variables on top of them.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;
use crate::runner::RetryPolicy;

/// Default directory raw files are downloaded to and converted from.
pub const DEFAULT_RAW_DIR: &str = "../raw_data";

/// Where converted stores are written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreBackend {
    /// Mirror `s3://bucket/key` under a local directory.
    Local { root: PathBuf },
    /// Write to S3 through the AWS default credential chain.
    S3,
}

impl FromStr for StoreBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "s3" => Ok(Self::S3),
            "local" => Ok(Self::Local {
                root: PathBuf::from("./object-store"),
            }),
            other => Err(ConfigError::invalid(
                "store",
                format!("expected 'local' or 's3', got '{other}'"),
            )),
        }
    }
}

/// Conversion flow configuration.
#[derive(Debug, Clone)]
pub struct ConvertConfig {
    /// Directory scanned for raw files.
    pub input_dir: PathBuf,
    /// Destination bucket.
    pub bucket: String,
    /// Key prefix inside the bucket.
    pub prefix: String,
    /// Instrument model recorded with every converted store.
    pub sonar_model: String,
    /// Replace existing stores instead of failing.
    pub overwrite: bool,
    /// Shell glob applied to file names in `input_dir`.
    pub glob_pattern: String,
    /// Options passed through to the object store (endpoint, region, ...).
    pub storage_options: BTreeMap<String, String>,
    /// Maximum number of conversion jobs in flight.
    pub capacity: usize,
    /// Number of workers executing jobs.
    pub workers: usize,
    /// Bytes per array chunk.
    pub chunk_size: usize,
    pub store: StoreBackend,
    pub retry: RetryPolicy,
}

impl Default for ConvertConfig {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from(DEFAULT_RAW_DIR),
            bucket: "xarray-zarr-demo".to_string(),
            prefix: "echodata".to_string(),
            sonar_model: "EK60".to_string(),
            overwrite: true,
            glob_pattern: "*.raw".to_string(),
            storage_options: BTreeMap::new(),
            capacity: 2,
            workers: 2,
            chunk_size: 1024 * 1024, // 1 MiB
            store: StoreBackend::S3,
            retry: RetryPolicy::new(3, Duration::from_secs(60)),
        }
    }
}

impl ConvertConfig {
    /// Defaults overridden by `SONAR_ZARR_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(dir) = env_var("SONAR_ZARR_INPUT_DIR") {
            config.input_dir = PathBuf::from(dir);
        }
        if let Some(bucket) = env_var("SONAR_ZARR_BUCKET") {
            config.bucket = bucket;
        }
        if let Some(prefix) = env_var("SONAR_ZARR_PREFIX") {
            config.prefix = prefix;
        }
        if let Some(model) = env_var("SONAR_ZARR_SONAR_MODEL") {
            config.sonar_model = model;
        }
        if let Some(pattern) = env_var("SONAR_ZARR_GLOB") {
            config.glob_pattern = pattern;
        }
        if let Some(overwrite) = env_parse("SONAR_ZARR_OVERWRITE")? {
            config.overwrite = overwrite;
        }
        if let Some(capacity) = env_parse("SONAR_ZARR_CAPACITY")? {
            config.capacity = capacity;
        }
        if let Some(workers) = env_parse("SONAR_ZARR_WORKERS")? {
            config.workers = workers;
        }
        if let Some(chunk_size) = env_parse("SONAR_ZARR_CHUNK_SIZE")? {
            config.chunk_size = chunk_size;
        }
        if let Some(store) = env_parse::<StoreBackend>("SONAR_ZARR_STORE")? {
            config.store = store;
        }
        if let (StoreBackend::Local { root }, Some(dir)) =
            (&mut config.store, env_var("SONAR_ZARR_LOCAL_ROOT"))
        {
            *root = PathBuf::from(dir);
        }
        config.validate()?;
        Ok(config)
    }

    /// Reject values the flow cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.capacity == 0 {
            return Err(ConfigError::invalid("capacity", "must be at least 1"));
        }
        if self.workers == 0 {
            return Err(ConfigError::invalid("workers", "must be at least 1"));
        }
        if self.chunk_size == 0 {
            return Err(ConfigError::invalid("chunk_size", "must be at least 1"));
        }
        if self.bucket.trim().is_empty() {
            return Err(ConfigError::invalid("bucket", "must not be empty"));
        }
        if self.glob_pattern.is_empty() {
            return Err(ConfigError::invalid("glob_pattern", "must not be empty"));
        }
        Ok(())
    }
}

/// Download flow configuration.
#[derive(Debug, Clone)]
pub struct DownloadConfig {
    /// Local directory files are written to.
    pub dest_dir: PathBuf,
    /// Base URL of the public bucket.
    pub bucket_url: String,
    /// Path between the bucket URL and the file names.
    pub prefix: String,
    pub filenames: Vec<String>,
    /// Number of concurrent downloads.
    pub workers: usize,
    pub retry: RetryPolicy,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            dest_dir: PathBuf::from(DEFAULT_RAW_DIR),
            bucket_url: "https://noaa-wcsd-pds.s3.amazonaws.com".to_string(),
            prefix: "data/raw/Henry_B._Bigelow/HB1907/EK60".to_string(),
            filenames: [
                "D20190727-T035511.raw",
                "D20190727-T042803.raw",
                "D20190727-T050056.raw",
                "D20190727-T053138.raw",
                "D20190727-T060130.raw",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            workers: 2,
            retry: RetryPolicy::new(5, Duration::from_secs(30)),
        }
    }
}

impl DownloadConfig {
    /// Defaults overridden by `SONAR_ZARR_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(dir) = env_var("SONAR_ZARR_DOWNLOAD_DIR") {
            config.dest_dir = PathBuf::from(dir);
        }
        if let Some(url) = env_var("SONAR_ZARR_BUCKET_URL") {
            config.bucket_url = url;
        }
        if let Some(prefix) = env_var("SONAR_ZARR_SOURCE_PREFIX") {
            config.prefix = prefix;
        }
        if let Some(files) = env_var("SONAR_ZARR_FILES") {
            config.filenames = files
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
        if let Some(workers) = env_parse("SONAR_ZARR_DOWNLOAD_WORKERS")? {
            config.workers = workers;
        }
        config.validate()?;
        Ok(config)
    }

    /// URL of a single file in the source bucket.
    pub fn file_url(&self, file_name: &str) -> String {
        let base = self.bucket_url.trim_end_matches('/');
        let prefix = self.prefix.trim_matches('/');
        if prefix.is_empty() {
            format!("{base}/{file_name}")
        } else {
            format!("{base}/{prefix}/{file_name}")
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::invalid("workers", "must be at least 1"));
        }
        if self.bucket_url.trim().is_empty() {
            return Err(ConfigError::invalid("bucket_url", "must not be empty"));
        }
        Ok(())
    }
}

/// Parse `key=value` pairs as given on the command line.
pub fn parse_storage_option(raw: &str) -> Result<(String, String), ConfigError> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.trim().to_string()))
        }
        _ => Err(ConfigError::ParseError(format!(
            "storage option '{raw}' is not of the form key=value"
        ))),
    }
}

fn env_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn env_parse<T>(key: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    env_var(key)
        .map(|raw| {
            raw.parse::<T>()
                .map_err(|e| ConfigError::invalid(key, format!("'{raw}': {e}")))
        })
        .transpose()
}
