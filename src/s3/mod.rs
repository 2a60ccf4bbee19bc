pub mod client;
pub mod memory;
pub mod metrics;

pub use client::S3Client;
pub use memory::{MemoryStore, StoreCall};
pub use metrics::{StoreMetrics, StoreOp};

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

/// Errors returned by an [`ObjectStore`]
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("object not found: s3://{bucket}/{key}")]
    NotFound { bucket: String, key: String },

    #[error("{op} s3://{bucket}/{key} failed: {message}")]
    Request {
        op: StoreOp,
        bucket: String,
        key: String,
        message: String,
    },
}

impl StoreError {
    pub fn request(op: StoreOp, bucket: &str, key: &str, message: impl Into<String>) -> Self {
        StoreError::Request {
            op,
            bucket: bucket.to_string(),
            key: key.to_string(),
            message: message.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}

/// The three object operations the decompress pipeline needs.
///
/// Implemented by [`S3Client`] for real buckets and by [`MemoryStore`] for tests.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch an entire object's contents
    async fn get(&self, bucket: &str, key: &str) -> Result<Bytes, StoreError>;

    /// Store `body` under `key`, returning the object's location
    async fn put(&self, bucket: &str, key: &str, body: Bytes) -> Result<String, StoreError>;

    /// Remove an object
    async fn delete(&self, bucket: &str, key: &str) -> Result<(), StoreError>;
}

/// Format an object location as an `s3://` URI
pub fn object_uri(bucket: &str, key: &str) -> String {
    format!("s3://{}/{}", bucket, key)
}
