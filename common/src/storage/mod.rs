//! Keyed append-only list storage.
//!
//! Every key names an ordered list of values. Values are only ever pushed to
//! the tail of a list, so a reader observing a list mid-ingestion always sees
//! a prefix of its eventual contents. Range reads use inclusive indices where
//! negative values count back from the tail (`-1` is the last element).

pub mod config;
pub mod factory;
pub mod in_memory;
pub mod slate;

use async_trait::async_trait;
use bytes::Bytes;

/// Errors raised by a storage backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// The backend failed to read, write, or persist data.
    Storage(String),
    /// Internal invariant violation.
    Internal(String),
}

impl std::error::Error for StorageError {}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageError::Storage(msg) => write!(f, "Storage error: {}", msg),
            StorageError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl StorageError {
    /// Wraps any backend error as a [`StorageError::Storage`].
    pub fn from_storage(err: impl std::fmt::Display) -> Self {
        StorageError::Storage(err.to_string())
    }
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::Storage(err.to_string())
    }
}

pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Read operations on a list store.
#[async_trait]
pub trait ListStorageRead: Send + Sync {
    /// Returns the inclusive slice `[start, end]` of the list under `key`.
    ///
    /// Negative indices count from the tail. Indices past either end are
    /// clamped; a range that selects nothing, or an absent key, yields an
    /// empty vector rather than an error.
    async fn range(&self, key: &Bytes, start: i64, end: i64) -> StorageResult<Vec<Bytes>>;

    /// Returns the number of values stored under `key` (0 when absent).
    async fn len(&self, key: &Bytes) -> StorageResult<usize>;

    /// Returns every key currently holding at least one value.
    async fn keys(&self) -> StorageResult<Vec<Bytes>>;
}

/// Read-write operations on a list store.
#[async_trait]
pub trait ListStorage: ListStorageRead {
    /// Appends `value` to the tail of the list under `key`, creating it if needed.
    async fn push(&self, key: Bytes, value: Bytes) -> StorageResult<()>;

    /// Persists the entire store. Coarse-grained; there is no incremental mode.
    async fn save(&self) -> StorageResult<()>;

    /// Irreversibly removes every key.
    async fn flush_all(&self) -> StorageResult<()>;
}

/// Resolves an inclusive, possibly negative, index pair against a list of
/// length `len`. Returns `None` when the range selects nothing.
pub fn resolve_range(len: usize, start: i64, end: i64) -> Option<std::ops::RangeInclusive<usize>> {
    if len == 0 {
        return None;
    }
    let len = len as i64;
    let start = if start < 0 { (len + start).max(0) } else { start };
    let end = if end < 0 { len + end } else { end.min(len - 1) };
    if start > end || start >= len || end < 0 {
        return None;
    }
    Some(start as usize..=end as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_resolve_full_range_with_negative_end() {
        // given/when
        let range = resolve_range(5, 0, -1);

        // then
        assert_eq!(range, Some(0..=4));
    }

    #[test]
    fn should_clamp_end_past_tail() {
        // given/when
        let range = resolve_range(3, 1, 100);

        // then
        assert_eq!(range, Some(1..=2));
    }

    #[test]
    fn should_select_last_element_with_minus_one_pair() {
        // given/when
        let range = resolve_range(4, -1, -1);

        // then
        assert_eq!(range, Some(3..=3));
    }

    #[test]
    fn should_return_none_for_out_of_range_or_inverted_indices() {
        // given/when/then
        assert_eq!(resolve_range(3, 5, 10), None);
        assert_eq!(resolve_range(3, 2, 1), None);
        assert_eq!(resolve_range(0, 0, -1), None);
        assert_eq!(resolve_range(3, 0, -10), None);
    }

    #[test]
    fn should_clamp_negative_start_to_head() {
        // given/when
        let range = resolve_range(3, -10, 1);

        // then
        assert_eq!(range, Some(0..=1));
    }
}
