use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use bytes::Bytes;
use std::sync::Arc;
use std::time::Instant;

use super::{ObjectStore, StoreError, StoreMetrics, StoreOp, object_uri};
use crate::config::StoreConfig;

/// Wrapper around AWS S3 client
#[derive(Clone)]
pub struct S3Client {
    client: Client,
    region: String,
    metrics: Option<Arc<StoreMetrics>>,
}

impl S3Client {
    /// Create a client from the default AWS environment plus any endpoint,
    /// addressing and credential overrides in `config`
    pub async fn from_config(config: &StoreConfig) -> Self {
        let mut sdk_config = aws_config::defaults(aws_config::BehaviorVersion::latest());

        // Handle anonymous access
        if config.anonymous {
            sdk_config = sdk_config.no_credentials();
        }

        if let Some(region) = &config.region {
            sdk_config = sdk_config.region(aws_sdk_s3::config::Region::new(region.clone()));
        }

        let base_config = sdk_config.load().await;

        let region = base_config
            .region()
            .map(|r| r.as_ref().to_string())
            .unwrap_or_else(|| "us-east-1".to_string());

        // Build S3-specific config
        let mut s3_config_builder = aws_sdk_s3::config::Builder::from(&base_config);

        if let Some(endpoint) = &config.endpoint_url {
            s3_config_builder = s3_config_builder.endpoint_url(endpoint);
        }

        if config.force_path_style {
            s3_config_builder = s3_config_builder.force_path_style(true);
        }

        let client = Client::from_conf(s3_config_builder.build());
        Self::from_client(client, region)
    }

    /// Wrap an already configured SDK client
    pub fn from_client(client: Client, region: String) -> Self {
        S3Client {
            client,
            region,
            metrics: None,
        }
    }

    /// Attach a metrics collector that records every request
    pub fn with_metrics(mut self, metrics: Arc<StoreMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    fn record(&self, op: StoreOp, bytes: u64, started: Instant) {
        if let Some(metrics) = &self.metrics {
            metrics.record(op, bytes, started.elapsed());
        }
    }
}

#[async_trait]
impl ObjectStore for S3Client {
    async fn get(&self, bucket: &str, key: &str) -> Result<Bytes, StoreError> {
        let started = Instant::now();
        let resp = match self.client.get_object().bucket(bucket).key(key).send().await {
            Ok(resp) => resp,
            Err(err) => {
                let not_found = err
                    .as_service_error()
                    .map(|e| e.is_no_such_key())
                    .unwrap_or(false);
                if not_found {
                    return Err(StoreError::NotFound {
                        bucket: bucket.to_string(),
                        key: key.to_string(),
                    });
                }
                return Err(StoreError::request(
                    StoreOp::Get,
                    bucket,
                    key,
                    DisplayErrorContext(&err).to_string(),
                ));
            }
        };

        let bytes = resp
            .body
            .collect()
            .await
            .map_err(|e| {
                StoreError::request(StoreOp::Get, bucket, key, format!("failed to read object body: {e}"))
            })?
            .into_bytes();

        self.record(StoreOp::Get, bytes.len() as u64, started);
        Ok(bytes)
    }

    async fn put(&self, bucket: &str, key: &str, body: Bytes) -> Result<String, StoreError> {
        let started = Instant::now();
        let len = body.len() as u64;

        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|err| {
                StoreError::request(StoreOp::Put, bucket, key, DisplayErrorContext(&err).to_string())
            })?;

        self.record(StoreOp::Put, len, started);
        Ok(object_uri(bucket, key))
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<(), StoreError> {
        let started = Instant::now();

        self.client
            .delete_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|err| {
                StoreError::request(
                    StoreOp::Delete,
                    bucket,
                    key,
                    DisplayErrorContext(&err).to_string(),
                )
            })?;

        self.record(StoreOp::Delete, 0, started);
        Ok(())
    }
}
