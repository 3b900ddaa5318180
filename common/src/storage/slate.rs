//! SlateDB-backed list storage.
//!
//! Every list element is stored as its own record, keyed by the list key and
//! the element's position:
//!
//! ```text
//! | tag (u8=0x01) | key_len (u16 BE) | key bytes | sequence (u64 BE) |
//! ```
//!
//! The length prefix keeps one list's records from sharing a prefix with a
//! longer key, and the big-endian sequence makes a list's records sort in
//! push order, so a slice of a list is a single contiguous scan.

use std::collections::BTreeMap;
use std::ops::Range;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use slatedb::config::WriteOptions;
use slatedb::{Db, WriteBatch};
use tokio::sync::RwLock;

use super::{ListStorage, ListStorageRead, StorageError, StorageResult, resolve_range};

const LIST_ENTRY_TAG: u8 = 0x01;

/// Storage key of a single list element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ListEntryKey {
    pub key: Bytes,
    pub sequence: u64,
}

impl ListEntryKey {
    pub fn new(key: Bytes, sequence: u64) -> Self {
        Self { key, sequence }
    }

    pub fn serialize(&self) -> StorageResult<Bytes> {
        let key_len = u16::try_from(self.key.len()).map_err(|_| {
            StorageError::Internal(format!("list key too long: {} bytes", self.key.len()))
        })?;
        let mut buf = BytesMut::with_capacity(1 + 2 + self.key.len() + 8);
        buf.put_u8(LIST_ENTRY_TAG);
        buf.put_u16(key_len);
        buf.put_slice(&self.key);
        buf.put_u64(self.sequence);
        Ok(buf.freeze())
    }

    pub fn deserialize(data: &[u8]) -> StorageResult<Self> {
        let mut buf = data;
        if buf.remaining() < 3 || buf.get_u8() != LIST_ENTRY_TAG {
            return Err(StorageError::Internal(format!(
                "invalid list entry key: {:?}",
                data
            )));
        }
        let key_len = buf.get_u16() as usize;
        if buf.remaining() != key_len + 8 {
            return Err(StorageError::Internal(format!(
                "invalid list entry key length: expected {} key bytes, got {} trailing bytes",
                key_len,
                buf.remaining()
            )));
        }
        let key = Bytes::copy_from_slice(&buf[..key_len]);
        buf.advance(key_len);
        let sequence = buf.get_u64();
        Ok(Self { key, sequence })
    }

    /// Range covering the elements `[from, to)` of the list under `key`.
    pub fn scan_range(key: &Bytes, from: u64, to: u64) -> StorageResult<Range<Bytes>> {
        let start = Self::new(key.clone(), from).serialize()?;
        let end = Self::new(key.clone(), to).serialize()?;
        Ok(start..end)
    }

    /// Range covering every list element in the database.
    pub fn all() -> Range<Bytes> {
        Bytes::from_static(&[LIST_ENTRY_TAG])..Bytes::from_static(&[LIST_ENTRY_TAG + 1])
    }
}

/// List storage persisted in SlateDB.
///
/// List lengths are tracked in memory so `push` can assign the next sequence
/// without a read. They are rebuilt by scanning on [`SlateDbStorage::open`],
/// which assumes this instance is the database's only writer.
///
/// Pushes are written without waiting for durability; [`ListStorage::save`]
/// flushes everything written so far to the object store.
pub struct SlateDbStorage {
    db: Arc<Db>,
    lengths: RwLock<BTreeMap<Bytes, u64>>,
}

impl SlateDbStorage {
    /// Wraps an open database, recovering list lengths from existing records.
    pub async fn open(db: Arc<Db>) -> StorageResult<Self> {
        let mut lengths = BTreeMap::new();
        let mut iter = db
            .scan(ListEntryKey::all())
            .await
            .map_err(StorageError::from_storage)?;
        while let Some(entry) = iter.next().await.map_err(StorageError::from_storage)? {
            let entry_key = ListEntryKey::deserialize(&entry.key)?;
            let len = lengths.entry(entry_key.key).or_insert(0);
            *len = (*len).max(entry_key.sequence + 1);
        }
        tracing::debug!(lists = lengths.len(), "recovered list lengths");
        Ok(Self {
            db,
            lengths: RwLock::new(lengths),
        })
    }

    /// Flushes pending writes and closes the underlying database.
    pub async fn close(&self) -> StorageResult<()> {
        self.db.close().await.map_err(StorageError::from_storage)
    }
}

#[async_trait]
impl ListStorageRead for SlateDbStorage {
    #[tracing::instrument(level = "trace", skip_all)]
    async fn range(&self, key: &Bytes, start: i64, end: i64) -> StorageResult<Vec<Bytes>> {
        let len = self.len(key).await?;
        let Some(range) = resolve_range(len, start, end) else {
            return Ok(Vec::new());
        };
        let (first, last) = (*range.start(), *range.end());
        let scan = ListEntryKey::scan_range(key, first as u64, last as u64 + 1)?;
        let mut iter = self
            .db
            .scan(scan)
            .await
            .map_err(StorageError::from_storage)?;
        let mut values = Vec::with_capacity(last - first + 1);
        while let Some(entry) = iter.next().await.map_err(StorageError::from_storage)? {
            values.push(entry.value);
        }
        Ok(values)
    }

    async fn len(&self, key: &Bytes) -> StorageResult<usize> {
        Ok(self.lengths.read().await.get(key).map_or(0, |len| *len as usize))
    }

    async fn keys(&self) -> StorageResult<Vec<Bytes>> {
        Ok(self.lengths.read().await.keys().cloned().collect())
    }
}

#[async_trait]
impl ListStorage for SlateDbStorage {
    #[tracing::instrument(level = "trace", skip_all)]
    async fn push(&self, key: Bytes, value: Bytes) -> StorageResult<()> {
        let mut lengths = self.lengths.write().await;
        let sequence = lengths.get(&key).copied().unwrap_or(0);
        let entry_key = ListEntryKey::new(key.clone(), sequence).serialize()?;
        let mut batch = WriteBatch::new();
        batch.put(entry_key, value);
        self.db
            .write_with_options(
                batch,
                &WriteOptions {
                    await_durable: false,
                },
            )
            .await
            .map_err(StorageError::from_storage)?;
        lengths.insert(key, sequence + 1);
        Ok(())
    }

    #[tracing::instrument(level = "debug", skip_all)]
    async fn save(&self) -> StorageResult<()> {
        self.db.flush().await.map_err(StorageError::from_storage)?;
        Ok(())
    }

    #[tracing::instrument(level = "debug", skip_all)]
    async fn flush_all(&self) -> StorageResult<()> {
        let mut lengths = self.lengths.write().await;
        let mut batch = WriteBatch::new();
        let mut iter = self
            .db
            .scan(ListEntryKey::all())
            .await
            .map_err(StorageError::from_storage)?;
        while let Some(entry) = iter.next().await.map_err(StorageError::from_storage)? {
            batch.delete(entry.key);
        }
        self.db
            .write(batch)
            .await
            .map_err(StorageError::from_storage)?;
        lengths.clear();
        Ok(())
    }
}
