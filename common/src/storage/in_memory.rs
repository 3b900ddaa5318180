//! In-memory list storage.

use std::collections::BTreeMap;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::RwLock;

use super::{ListStorage, ListStorageRead, StorageResult, resolve_range};

/// Lists keyed by raw bytes.
type Lists = BTreeMap<Bytes, Vec<Bytes>>;

/// List storage held entirely in memory.
///
/// `save` is a no-op, so contents are lost when the process exits. Useful
/// for tests and for deployments that accept losing data on restart.
#[derive(Default)]
pub struct InMemoryStorage {
    lists: RwLock<Lists>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ListStorageRead for InMemoryStorage {
    async fn range(&self, key: &Bytes, start: i64, end: i64) -> StorageResult<Vec<Bytes>> {
        let lists = self.lists.read().await;
        let Some(list) = lists.get(key) else {
            return Ok(Vec::new());
        };
        Ok(match resolve_range(list.len(), start, end) {
            Some(range) => list[range].to_vec(),
            None => Vec::new(),
        })
    }

    async fn len(&self, key: &Bytes) -> StorageResult<usize> {
        Ok(self.lists.read().await.get(key).map_or(0, Vec::len))
    }

    async fn keys(&self) -> StorageResult<Vec<Bytes>> {
        Ok(self.lists.read().await.keys().cloned().collect())
    }
}

#[async_trait]
impl ListStorage for InMemoryStorage {
    async fn push(&self, key: Bytes, value: Bytes) -> StorageResult<()> {
        self.lists.write().await.entry(key).or_default().push(value);
        Ok(())
    }

    async fn save(&self) -> StorageResult<()> {
        Ok(())
    }

    async fn flush_all(&self) -> StorageResult<()> {
        self.lists.write().await.clear();
        Ok(())
    }
}
