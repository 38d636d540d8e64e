//! Conversion job descriptors and input discovery.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use regex::Regex;
use serde::Serialize;

use crate::config::ConvertConfig;
use crate::error::FlowError;

/// Destination of one converted store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ZarrTarget {
    pub bucket: String,
    /// Object key of the store root, e.g. `echodata/D20190727-T035511.zarr`.
    pub key: String,
}

impl ZarrTarget {
    /// Derive the target for `source` under `prefix`.
    ///
    /// Leading and trailing slashes on the prefix are ignored; an empty
    /// prefix puts the store at the bucket root.
    pub fn for_source(bucket: &str, prefix: &str, source: &Path) -> Self {
        let stem = source
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let prefix = prefix.trim_matches('/');
        let key = if prefix.is_empty() {
            format!("{stem}.zarr")
        } else {
            format!("{prefix}/{stem}.zarr")
        };
        Self {
            bucket: bucket.to_string(),
            key,
        }
    }

    /// Fully qualified store URI.
    pub fn uri(&self) -> String {
        format!("s3://{}/{}", self.bucket, self.key)
    }
}

/// Format parameters shared by every job of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FormatParams {
    pub sonar_model: String,
    pub overwrite: bool,
    pub chunk_size: usize,
    pub storage_options: BTreeMap<String, String>,
}

impl FormatParams {
    pub fn from_config(config: &ConvertConfig) -> Self {
        Self {
            sonar_model: config.sonar_model.clone(),
            overwrite: config.overwrite,
            chunk_size: config.chunk_size,
            storage_options: config.storage_options.clone(),
        }
    }
}

/// One conversion unit. Identified by its source path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConversionJob {
    pub source: PathBuf,
    pub target: ZarrTarget,
    pub params: FormatParams,
}

impl ConversionJob {
    pub fn new(source: PathBuf, bucket: &str, prefix: &str, params: FormatParams) -> Self {
        let target = ZarrTarget::for_source(bucket, prefix, &source);
        Self {
            source,
            target,
            params,
        }
    }

    /// Run name, as shown in logs and run records.
    pub fn run_name(&self) -> String {
        format!("convert-to-zarr-{}", self.source.display())
    }
}

/// Build one job per input file.
pub fn plan_jobs(config: &ConvertConfig, inputs: Vec<PathBuf>) -> Vec<ConversionJob> {
    let params = FormatParams::from_config(config);
    inputs
        .into_iter()
        .map(|source| ConversionJob::new(source, &config.bucket, &config.prefix, params.clone()))
        .collect()
}

/// Translate a shell glob (`*`, `?`) into an anchored regex.
pub fn glob_to_regex(pattern: &str) -> Result<Regex, FlowError> {
    let mut re = String::with_capacity(pattern.len() + 8);
    re.push('^');
    for c in pattern.chars() {
        match c {
            '*' => re.push_str("[^/]*"),
            '?' => re.push_str("[^/]"),
            other => re.push_str(&regex::escape(&other.to_string())),
        }
    }
    re.push('$');
    Regex::new(&re).map_err(|e| FlowError::InvalidPattern {
        pattern: pattern.to_string(),
        reason: e.to_string(),
    })
}

/// Files directly inside `dir` whose names match `pattern`, sorted by path.
pub fn discover_inputs(dir: &Path, pattern: &str) -> Result<Vec<PathBuf>, FlowError> {
    if !dir.is_dir() {
        return Err(FlowError::InputDirNotFound(dir.to_path_buf()));
    }
    let matcher = glob_to_regex(pattern)?;

    let mut found = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        if matcher.is_match(&entry.file_name().to_string_lossy()) {
            found.push(entry.path());
        }
    }
    found.sort();
    Ok(found)
}
