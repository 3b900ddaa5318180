//! Bucket-specific storage wrappers.
//!
//! [`BucketStore`] is the single-writer view used by the ingestion worker;
//! [`BucketStoreRead`] is the read-only view handed to the query side. Both
//! wrap the shared list storage and translate bucket ids to storage keys.

use std::sync::Arc;

use bytes::Bytes;
use common::{ListStorage, ListStorageRead};

use crate::error::{Error, Result};
use crate::model::BucketId;

fn bucket_key(bucket: BucketId) -> Bytes {
    Bytes::from(bucket.to_string())
}

fn decode_record(bucket: BucketId, raw: Bytes) -> Result<String> {
    String::from_utf8(raw.to_vec())
        .map_err(|e| Error::Decode(format!("bucket {} holds a non UTF-8 record: {}", bucket, e)))
}

/// Read-only bucket storage operations.
#[derive(Clone)]
pub struct BucketStoreRead {
    storage: Arc<dyn ListStorageRead>,
}

impl BucketStoreRead {
    /// Creates a new read-only bucket storage wrapper.
    pub fn new(storage: Arc<dyn ListStorageRead>) -> Self {
        Self { storage }
    }

    /// Reads the inclusive record range `[start, end]` of a bucket.
    ///
    /// `end = -1` reads to the last record. Out-of-range indices and absent
    /// buckets yield an empty vector.
    pub async fn range_read(&self, bucket: BucketId, start: i64, end: i64) -> Result<Vec<String>> {
        let raw = self.storage.range(&bucket_key(bucket), start, end).await?;
        raw.into_iter()
            .map(|value| decode_record(bucket, value))
            .collect()
    }

    /// Reads every record of a bucket in append order.
    pub async fn read_all(&self, bucket: BucketId) -> Result<Vec<String>> {
        self.range_read(bucket, 0, -1).await
    }

    /// Returns the first and last record of a bucket, or `None` when it is empty.
    ///
    /// For a single-record bucket both endpoints are the same record.
    pub async fn endpoints(&self, bucket: BucketId) -> Result<Option<(String, String)>> {
        let first = self.range_read(bucket, 0, 0).await?.pop();
        let last = self.range_read(bucket, -1, -1).await?.pop();
        Ok(first.zip(last))
    }

    /// Returns the number of records in a bucket.
    pub async fn len(&self, bucket: BucketId) -> Result<usize> {
        Ok(self.storage.len(&bucket_key(bucket)).await?)
    }

    /// Lists bucket ids in ascending order.
    ///
    /// Keys that are not decimal integers are ignored.
    pub async fn list_keys(&self) -> Result<Vec<BucketId>> {
        let mut ids: Vec<BucketId> = self
            .storage
            .keys()
            .await?
            .iter()
            .filter_map(|key| std::str::from_utf8(key).ok()?.parse::<BucketId>().ok())
            .collect();
        ids.sort_unstable();
        Ok(ids)
    }
}

/// Read-write bucket storage operations.
///
/// Exactly one writer exists per process; see
/// [`IngestionWorker`](crate::worker::IngestionWorker).
#[derive(Clone)]
pub struct BucketStore {
    storage: Arc<dyn ListStorage>,
}

impl BucketStore {
    /// Creates a new bucket storage wrapper.
    pub fn new(storage: Arc<dyn ListStorage>) -> Self {
        Self { storage }
    }

    /// Creates a bucket store with an in-memory backend.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(common::storage::in_memory::InMemoryStorage::new()))
    }

    /// Returns a read-only view of this storage.
    pub fn as_read(&self) -> BucketStoreRead {
        BucketStoreRead::new(Arc::clone(&self.storage) as Arc<dyn ListStorageRead>)
    }

    /// Appends a record to the end of a bucket, creating the bucket if needed.
    pub async fn append(&self, bucket: BucketId, record: &str) -> Result<()> {
        self.storage
            .push(bucket_key(bucket), Bytes::from(record.to_string()))
            .await?;
        Ok(())
    }

    /// Persists the entire store.
    pub async fn snapshot(&self) -> Result<()> {
        self.storage.save().await?;
        Ok(())
    }

    /// Irreversibly deletes all buckets.
    pub async fn clear_all(&self) -> Result<()> {
        self.storage.flush_all().await?;
        Ok(())
    }
}
