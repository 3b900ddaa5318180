//! Storage factory for creating storage instances from configuration.

use std::sync::Arc;

use slatedb::DbBuilder;
use slatedb::config::Settings;
use slatedb::object_store;

use super::config::{ObjectStoreConfig, SlateDbStorageConfig, StorageConfig};
use super::in_memory::InMemoryStorage;
use super::slate::SlateDbStorage;
use super::{ListStorage, StorageError, StorageResult};

/// Creates a storage instance based on the provided configuration.
///
/// # Examples
///
/// ```rust,ignore
/// use common::storage::config::StorageConfig;
/// use common::storage::factory::create_storage;
///
/// let storage = create_storage(&StorageConfig::InMemory).await?;
/// ```
pub async fn create_storage(config: &StorageConfig) -> StorageResult<Arc<dyn ListStorage>> {
    match config {
        StorageConfig::InMemory => Ok(Arc::new(InMemoryStorage::new())),
        StorageConfig::SlateDb(slate_config) => {
            let storage = create_slatedb_storage(slate_config).await?;
            Ok(Arc::new(storage))
        }
    }
}

async fn create_slatedb_storage(config: &SlateDbStorageConfig) -> StorageResult<SlateDbStorage> {
    let object_store: Arc<dyn object_store::ObjectStore> = match &config.object_store {
        ObjectStoreConfig::InMemory => Arc::new(object_store::memory::InMemory::new()),
        ObjectStoreConfig::Aws(aws_config) => {
            let store = object_store::aws::AmazonS3Builder::new()
                .with_region(&aws_config.region)
                .with_bucket_name(&aws_config.bucket)
                .build()
                .map_err(|e| {
                    StorageError::Storage(format!("Failed to create AWS S3 store: {}", e))
                })?;
            Arc::new(store)
        }
        ObjectStoreConfig::Local(local_config) => {
            std::fs::create_dir_all(&local_config.path).map_err(|e| {
                StorageError::Storage(format!(
                    "Failed to create storage directory '{}': {}",
                    local_config.path, e
                ))
            })?;
            let store = object_store::local::LocalFileSystem::new_with_prefix(&local_config.path)
                .map_err(|e| {
                StorageError::Storage(format!("Failed to create local filesystem store: {}", e))
            })?;
            Arc::new(store)
        }
    };

    let settings = match &config.settings_path {
        Some(path) => Settings::from_file(path).map_err(|e| {
            StorageError::Storage(format!(
                "Failed to load SlateDB settings from {}: {}",
                path, e
            ))
        })?,
        None => Settings::load().unwrap_or_default(),
    };

    let db = DbBuilder::new(config.path.clone(), object_store)
        .with_settings(settings)
        .build()
        .await
        .map_err(|e| StorageError::Storage(format!("Failed to create SlateDB: {}", e)))?;

    tracing::info!(path = %config.path, "opened SlateDB storage");
    SlateDbStorage::open(Arc::new(db)).await
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;
    use crate::storage::config::LocalObjectStoreConfig;

    #[tokio::test]
    async fn should_create_in_memory_storage() {
        // given
        let storage = create_storage(&StorageConfig::InMemory).await.unwrap();

        // when
        storage
            .push(Bytes::from("1"), Bytes::from("a"))
            .await
            .unwrap();

        // then
        assert_eq!(storage.len(&Bytes::from("1")).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn should_create_slatedb_storage_on_in_memory_object_store() {
        // given
        let config = StorageConfig::SlateDb(SlateDbStorageConfig {
            path: "test-buckets".to_string(),
            object_store: ObjectStoreConfig::InMemory,
            settings_path: None,
        });

        // when
        let storage = create_storage(&config).await.unwrap();
        storage
            .push(Bytes::from("7"), Bytes::from("a"))
            .await
            .unwrap();
        storage.save().await.unwrap();

        // then
        assert_eq!(
            storage.range(&Bytes::from("7"), 0, -1).await.unwrap(),
            vec![Bytes::from("a")]
        );
    }

    #[tokio::test]
    async fn should_create_local_object_store_directory_when_missing() {
        // given
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("nested");
        let config = StorageConfig::SlateDb(SlateDbStorageConfig {
            path: "buckets".to_string(),
            object_store: ObjectStoreConfig::Local(LocalObjectStoreConfig {
                path: root.to_string_lossy().into_owned(),
            }),
            settings_path: None,
        });

        // when
        let storage = create_storage(&config).await.unwrap();
        storage
            .push(Bytes::from("7"), Bytes::from("a"))
            .await
            .unwrap();
        storage.save().await.unwrap();

        // then
        assert!(root.is_dir());
        assert_eq!(storage.len(&Bytes::from("7")).await.unwrap(), 1);
    }
}
