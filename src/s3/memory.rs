use async_trait::async_trait;
use bytes::Bytes;
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::{ObjectStore, StoreError, StoreOp, object_uri};

/// One call made against a [`MemoryStore`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreCall {
    pub op: StoreOp,
    pub bucket: String,
    pub key: String,
}

#[derive(Debug, Default)]
struct Inner {
    objects: BTreeMap<(String, String), Bytes>,
    calls: Vec<StoreCall>,
    failing_puts: HashSet<String>,
    fail_gets: bool,
    fail_deletes: bool,
}

/// In-process object store.
///
/// Records every call in order and can be told to fail specific operations,
/// which is what the pipeline tests use in place of a real bucket. Clones
/// share the same contents.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Seed an object without recording a call
    pub fn insert(&self, bucket: &str, key: &str, body: impl Into<Bytes>) {
        self.write()
            .objects
            .insert((bucket.to_string(), key.to_string()), body.into());
    }

    /// Read an object without recording a call
    pub fn object(&self, bucket: &str, key: &str) -> Option<Bytes> {
        self.read()
            .objects
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
    }

    pub fn contains(&self, bucket: &str, key: &str) -> bool {
        self.object(bucket, key).is_some()
    }

    /// Keys currently stored in `bucket`, sorted
    pub fn keys(&self, bucket: &str) -> Vec<String> {
        self.read()
            .objects
            .keys()
            .filter(|(b, _)| b == bucket)
            .map(|(_, k)| k.clone())
            .collect()
    }

    /// Every call made so far, in order
    pub fn calls(&self) -> Vec<StoreCall> {
        self.read().calls.clone()
    }

    /// Keys passed to `put`, in call order (including failed puts)
    pub fn put_keys(&self) -> Vec<String> {
        self.read()
            .calls
            .iter()
            .filter(|c| c.op == StoreOp::Put)
            .map(|c| c.key.clone())
            .collect()
    }

    /// Make every `put` of `key` fail
    pub fn fail_put(&self, key: &str) {
        self.write().failing_puts.insert(key.to_string());
    }

    /// Make every `get` fail with a request error
    pub fn fail_gets(&self) {
        self.write().fail_gets = true;
    }

    /// Make every `delete` fail
    pub fn fail_deletes(&self) {
        self.write().fail_deletes = true;
    }

    fn log(inner: &mut Inner, op: StoreOp, bucket: &str, key: &str) {
        inner.calls.push(StoreCall {
            op,
            bucket: bucket.to_string(),
            key: key.to_string(),
        });
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn get(&self, bucket: &str, key: &str) -> Result<Bytes, StoreError> {
        let mut inner = self.write();
        Self::log(&mut inner, StoreOp::Get, bucket, key);

        if inner.fail_gets {
            return Err(StoreError::request(StoreOp::Get, bucket, key, "injected failure"));
        }

        inner
            .objects
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            })
    }

    async fn put(&self, bucket: &str, key: &str, body: Bytes) -> Result<String, StoreError> {
        let mut inner = self.write();
        Self::log(&mut inner, StoreOp::Put, bucket, key);

        if inner.failing_puts.contains(key) {
            return Err(StoreError::request(StoreOp::Put, bucket, key, "injected failure"));
        }

        inner
            .objects
            .insert((bucket.to_string(), key.to_string()), body);
        Ok(object_uri(bucket, key))
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<(), StoreError> {
        let mut inner = self.write();
        Self::log(&mut inner, StoreOp::Delete, bucket, key);

        if inner.fail_deletes {
            return Err(StoreError::request(StoreOp::Delete, bucket, key, "injected failure"));
        }

        // S3 deletes are idempotent
        inner.objects.remove(&(bucket.to_string(), key.to_string()));
        Ok(())
    }
}
