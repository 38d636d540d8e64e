//! Object storage abstraction.
//!
//! Keys are `/`-separated strings inside a bucket. Listing is by plain string
//! prefix, so callers that mean "everything under a directory" pass a prefix
//! ending in `/`.

pub mod local;
pub mod s3;

use async_trait::async_trait;

use crate::error::StoreError;

pub use local::LocalObjectStore;
pub use s3::S3ObjectStore;

/// Minimal object store used by the array writer.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Write `body` at `key`, replacing any existing object.
    async fn put(&self, bucket: &str, key: &str, body: Vec<u8>) -> Result<(), StoreError>;

    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StoreError>;

    /// Keys starting with `prefix`, in no particular order.
    async fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<String>, StoreError>;

    /// Remove `key`. Missing keys are not an error.
    async fn delete(&self, bucket: &str, key: &str) -> Result<(), StoreError>;

    /// Whether any object starts with `prefix`.
    async fn exists(&self, bucket: &str, prefix: &str) -> Result<bool, StoreError> {
        Ok(!self.list(bucket, prefix).await?.is_empty())
    }

    /// Remove every object starting with `prefix`. Returns how many were removed.
    async fn delete_prefix(&self, bucket: &str, prefix: &str) -> Result<usize, StoreError> {
        let keys = self.list(bucket, prefix).await?;
        for key in &keys {
            self.delete(bucket, key).await?;
        }
        Ok(keys.len())
    }
}
