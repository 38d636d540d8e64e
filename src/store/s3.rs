//! S3 object store backed by the AWS SDK.
//!
//! Credentials come from the SDK's default provider chain. Storage options
//! only tune where requests go: `region`, `endpoint_url`, and
//! `force_path_style` (for S3-compatible servers such as MinIO).

use std::collections::BTreeMap;

use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;

use crate::error::StoreError;
use crate::store::ObjectStore;

#[derive(Debug, Clone)]
pub struct S3ObjectStore {
    client: Client,
}

impl S3ObjectStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Build a client from the environment plus `options`.
    pub async fn from_options(options: &BTreeMap<String, String>) -> Self {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
        if let Some(region) = options.get("region") {
            loader = loader.region(Region::new(region.clone()));
        }
        if let Some(endpoint) = options.get("endpoint_url") {
            loader = loader.endpoint_url(endpoint.clone());
        }
        let shared = loader.load().await;

        let force_path_style = options
            .get("force_path_style")
            .is_some_and(|v| v.eq_ignore_ascii_case("true"));
        let config = aws_sdk_s3::config::Builder::from(&shared)
            .force_path_style(force_path_style)
            .build();

        tracing::debug!(
            region = ?shared.region(),
            endpoint = options.get("endpoint_url").map(String::as_str),
            "S3 client configured"
        );
        Self::new(Client::from_conf(config))
    }
}

fn request_error<E>(bucket: &str, error: E) -> StoreError
where
    E: std::error::Error,
{
    StoreError::Request {
        bucket: bucket.to_string(),
        reason: DisplayErrorContext(error).to_string(),
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn put(&self, bucket: &str, key: &str, body: Vec<u8>) -> Result<(), StoreError> {
        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|e| request_error(bucket, e))?;
        Ok(())
    }

    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StoreError> {
        let output = match self.client.get_object().bucket(bucket).key(key).send().await {
            Ok(output) => output,
            Err(e) if e.as_service_error().is_some_and(|se| se.is_no_such_key()) => {
                return Err(StoreError::NotFound {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                });
            }
            Err(e) => return Err(request_error(bucket, e)),
        };
        let body = output
            .body
            .collect()
            .await
            .map_err(|e| request_error(bucket, e))?;
        Ok(body.into_bytes().to_vec())
    }

    async fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<String>, StoreError> {
        let mut keys = Vec::new();
        let mut continuation: Option<String> = None;
        loop {
            let page = self
                .client
                .list_objects_v2()
                .bucket(bucket)
                .prefix(prefix)
                .set_continuation_token(continuation.take())
                .send()
                .await
                .map_err(|e| request_error(bucket, e))?;

            keys.extend(
                page.contents()
                    .iter()
                    .filter_map(|object| object.key().map(str::to_string)),
            );

            match page.next_continuation_token() {
                Some(token) if page.is_truncated().unwrap_or(false) => {
                    continuation = Some(token.to_string());
                }
                _ => break,
            }
        }
        Ok(keys)
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<(), StoreError> {
        self.client
            .delete_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| request_error(bucket, e))?;
        Ok(())
    }
}
