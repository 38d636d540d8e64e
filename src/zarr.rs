//! Zarr v2 store writer.
//!
//! A converted file becomes a group with one 1-D `uint8` array, `raw`, split
//! into fixed-size chunks. Edge chunks are padded with the fill value to the
//! full chunk length, as Zarr v2 readers expect. Consolidated metadata is
//! written last so a reader that sees `.zmetadata` sees a complete store.

use futures::future::BoxFuture;
use futures::{StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::error::StoreError;
use crate::job::ZarrTarget;
use crate::store::ObjectStore;

/// Name of the byte array inside the group.
pub const ARRAY_NAME: &str = "raw";

const FILL_VALUE: u8 = 0;

/// Number of chunk uploads in flight per store.
const UPLOAD_CONCURRENCY: usize = 4;

/// `.zarray` document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArrayMetadata {
    pub zarr_format: u8,
    pub shape: Vec<u64>,
    pub chunks: Vec<u64>,
    pub dtype: String,
    pub compressor: Option<Value>,
    pub fill_value: u8,
    pub order: String,
    pub filters: Option<Value>,
    pub dimension_separator: String,
}

impl ArrayMetadata {
    pub fn bytes(len: usize, chunk_size: usize) -> Self {
        Self {
            zarr_format: 2,
            shape: vec![len as u64],
            chunks: vec![chunk_size as u64],
            dtype: "|u1".to_string(),
            compressor: None,
            fill_value: FILL_VALUE,
            order: "C".to_string(),
            filters: None,
            dimension_separator: ".".to_string(),
        }
    }

    pub fn chunk_count(&self) -> u64 {
        match (self.shape.first(), self.chunks.first()) {
            (Some(&len), Some(&chunk)) if chunk > 0 => len.div_ceil(chunk),
            _ => 0,
        }
    }
}

/// Writes one store rooted at a [`ZarrTarget`].
pub struct ZarrWriter<'a> {
    store: &'a dyn ObjectStore,
    target: &'a ZarrTarget,
}

impl<'a> ZarrWriter<'a> {
    pub fn new(store: &'a dyn ObjectStore, target: &'a ZarrTarget) -> Self {
        Self { store, target }
    }

    fn key(&self, relative: &str) -> String {
        format!("{}/{}", self.target.key, relative)
    }

    fn root_prefix(&self) -> String {
        format!("{}/", self.target.key)
    }

    /// Whether any object already lives under the store root.
    pub async fn exists(&self) -> Result<bool, StoreError> {
        self.store
            .exists(&self.target.bucket, &self.root_prefix())
            .await
    }

    /// Whether a finished store lives at the root, i.e. `.zmetadata` is present.
    pub async fn is_complete(&self) -> Result<bool, StoreError> {
        match self.store.get(&self.target.bucket, &self.key(".zmetadata")).await {
            Ok(_) => Ok(true),
            Err(StoreError::NotFound { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Delete everything under the store root.
    pub async fn clear(&self) -> Result<usize, StoreError> {
        self.store
            .delete_prefix(&self.target.bucket, &self.root_prefix())
            .await
    }

    /// Write `data` as the `raw` array with group attributes `attrs`.
    pub async fn write_bytes(
        &self,
        data: &[u8],
        chunk_size: usize,
        attrs: Value,
    ) -> Result<ArrayMetadata, StoreError> {
        let chunk_size = chunk_size.max(1);
        let meta = ArrayMetadata::bytes(data.len(), chunk_size);
        let store = self.store;
        let bucket = self.target.bucket.as_str();

        let mut uploads: Vec<BoxFuture<'_, Result<(), StoreError>>> = Vec::new();
        for (index, chunk) in data.chunks(chunk_size).enumerate() {
            let mut body = chunk.to_vec();
            body.resize(chunk_size, FILL_VALUE);
            let key = self.key(&format!("{ARRAY_NAME}/{index}"));
            uploads.push(Box::pin(async move { store.put(bucket, &key, body).await }));
        }
        futures::stream::iter(uploads)
            .buffer_unordered(UPLOAD_CONCURRENCY)
            .try_collect::<Vec<()>>()
            .await?;

        let array_meta = serde_json::to_value(&meta).map_err(json_error)?;

        let documents = [
            (".zgroup".to_string(), json!({ "zarr_format": 2 })),
            (".zattrs".to_string(), attrs),
            (format!("{ARRAY_NAME}/.zarray"), array_meta),
            (
                format!("{ARRAY_NAME}/.zattrs"),
                json!({ "_ARRAY_DIMENSIONS": ["byte"] }),
            ),
        ];
        let mut metadata = serde_json::Map::new();
        for (relative, document) in documents {
            self.put_json(&relative, &document).await?;
            metadata.insert(relative, document);
        }

        let consolidated = json!({
            "zarr_consolidated_format": 1,
            "metadata": metadata,
        });
        self.put_json(".zmetadata", &consolidated).await?;

        tracing::debug!(
            store = %self.target.uri(),
            bytes = data.len(),
            chunks = meta.chunk_count(),
            "Wrote zarr store"
        );
        Ok(meta)
    }

    async fn put_json(&self, relative: &str, document: &Value) -> Result<(), StoreError> {
        let body = serde_json::to_vec_pretty(document).map_err(json_error)?;
        self.store
            .put(&self.target.bucket, &self.key(relative), body)
            .await
    }
}

/// Read the `raw` array of a store back into memory.
pub async fn read_bytes(store: &dyn ObjectStore, target: &ZarrTarget) -> Result<Vec<u8>, StoreError> {
    let meta_key = format!("{}/{ARRAY_NAME}/.zarray", target.key);
    let raw_meta = store.get(&target.bucket, &meta_key).await?;
    let meta: ArrayMetadata = serde_json::from_slice(&raw_meta).map_err(json_error)?;

    let len = meta.shape.first().copied().unwrap_or(0) as usize;
    let mut data = Vec::with_capacity(len);
    for index in 0..meta.chunk_count() {
        let key = format!("{}/{ARRAY_NAME}/{index}", target.key);
        match store.get(&target.bucket, &key).await {
            Ok(chunk) => data.extend_from_slice(&chunk),
            // Missing chunks read as fill value.
            Err(StoreError::NotFound { .. }) => {
                let chunk = meta.chunks.first().copied().unwrap_or(0) as usize;
                data.resize(data.len() + chunk, meta.fill_value);
            }
            Err(e) => return Err(e),
        }
    }
    data.truncate(len);
    Ok(data)
}

fn json_error(e: serde_json::Error) -> StoreError {
    StoreError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e))
}
