//! End-to-end tests driving the pipeline over loopback sockets.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use bucketlog::{BucketStore, Config, IngestPipeline, ListenerConfig, WatcherConfig, client};
use common::storage::in_memory::InMemoryStorage;
use common::{ListStorage, ListStorageRead, MockClock, StorageConfig, StorageResult};

/// In-memory storage that counts whole-store saves.
#[derive(Default)]
struct CountingStorage {
    inner: InMemoryStorage,
    saves: AtomicUsize,
}

#[async_trait]
impl ListStorageRead for CountingStorage {
    async fn range(&self, key: &Bytes, start: i64, end: i64) -> StorageResult<Vec<Bytes>> {
        self.inner.range(key, start, end).await
    }

    async fn len(&self, key: &Bytes) -> StorageResult<usize> {
        self.inner.len(key).await
    }

    async fn keys(&self) -> StorageResult<Vec<Bytes>> {
        self.inner.keys().await
    }
}

#[async_trait]
impl ListStorage for CountingStorage {
    async fn push(&self, key: Bytes, value: Bytes) -> StorageResult<()> {
        self.inner.push(key, value).await
    }

    async fn save(&self) -> StorageResult<()> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn flush_all(&self) -> StorageResult<()> {
        self.inner.flush_all().await
    }
}

fn loopback_config() -> Config {
    Config {
        storage: StorageConfig::InMemory,
        listener: ListenerConfig {
            stream_addr: "127.0.0.1:0".to_string(),
            frame_addr: Some("127.0.0.1:0".to_string()),
            ..Default::default()
        },
        ..Default::default()
    }
}

async fn start(config: &Config, storage: Arc<CountingStorage>, epoch_secs: u64) -> IngestPipeline {
    let clock = Arc::new(MockClock::at_epoch_secs(epoch_secs));
    IngestPipeline::start_with(config, BucketStore::new(storage), clock)
        .await
        .unwrap()
}

#[tokio::test]
async fn should_bucket_records_by_arrival_time_in_order() {
    // given
    let storage = Arc::new(CountingStorage::default());
    let pipeline = start(&loopback_config(), storage, 1_234).await;
    let frames = pipeline.frame_addr().unwrap().to_string();

    // when
    for record in ["1`abcd`a", "2`abcd`b", "3`abcd`c"] {
        assert_eq!(client::send_frame(&frames, record).await.unwrap(), "ack");
    }
    client::send_frame(&frames, "kill").await.unwrap();
    let query = pipeline.query_engine();
    pipeline.wait().await.unwrap();

    // then
    let listing = query.list_buckets(None).await;
    assert_eq!(listing.payload.len(), 1);
    assert_eq!(listing.payload[0].id, 12);
    let records = query.tag_data_range("abcd", 12, 0, -1, false).await;
    let indices: Vec<usize> = records.payload.iter().map(|r| r.index).collect();
    assert_eq!(indices, vec![0, 1, 2]);
}

#[tokio::test]
async fn should_empty_listing_after_flush() {
    // given
    let storage = Arc::new(CountingStorage::default());
    let pipeline = start(&loopback_config(), storage, 500).await;
    let frames = pipeline.frame_addr().unwrap().to_string();
    client::send_frame(&frames, "1`abcd`a").await.unwrap();
    client::send_frame(&frames, "v`Header`b").await.unwrap();

    // when
    client::send_frame(&frames, "flush").await.unwrap();
    client::send_frame(&frames, "kill").await.unwrap();
    let query = pipeline.query_engine();
    pipeline.wait().await.unwrap();

    // then
    let listing = query.list_buckets(None).await;
    assert!(listing.payload.is_empty());
    assert!(listing.errors.is_empty());
}

#[tokio::test]
async fn should_snapshot_once_and_stop_appending_after_kill() {
    // given
    let storage = Arc::new(CountingStorage::default());
    let pipeline = start(&loopback_config(), storage.clone(), 700).await;
    let frames = pipeline.frame_addr().unwrap().to_string();
    client::send_frame(&frames, "before").await.unwrap();

    // when
    client::send_frame(&frames, "kill").await.unwrap();
    // the listener may already be gone
    let _ = client::send_frame(&frames, "after").await;
    let query = pipeline.query_engine();
    let stats = pipeline.wait().await.unwrap();

    // then
    assert_eq!(storage.saves.load(Ordering::SeqCst), 1);
    assert_eq!(stats.snapshots, 1);
    assert_eq!(stats.records_appended, 1);
    let metadata = query.bucket_metadata(7).await;
    assert_eq!(metadata.payload, vec!["before"]);
}

#[tokio::test]
async fn should_ingest_stream_message_read_to_eof() {
    // given
    let storage = Arc::new(CountingStorage::default());
    let pipeline = start(&loopback_config(), storage, 900).await;
    let stream = pipeline.stream_addr().to_string();

    // when
    client::send_message(&stream, "  5`wxyz`{\"hp\":10}\n").await.unwrap();

    // then
    let query = pipeline.query_engine();
    let mut decoded = Vec::new();
    for _ in 0..100 {
        decoded = query.tag_data_range("wxyz", 9, 0, -1, true).await.payload;
        if !decoded.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(decoded.len(), 1);
    assert_eq!(decoded[0].fields[2], serde_json::json!({"hp": 10}));
    assert_eq!(decoded[0].json, vec![2]);

    pipeline.shutdown();
    pipeline.wait().await.unwrap();
}

#[tokio::test]
async fn should_count_new_tags_on_watch_lane() {
    // given
    let config = Config {
        watcher: WatcherConfig {
            enabled: true,
            notify_command: None,
        },
        ..loopback_config()
    };
    let storage = Arc::new(CountingStorage::default());
    let pipeline = start(&config, storage, 100).await;
    let frames = pipeline.frame_addr().unwrap().to_string();

    // when
    for record in ["1`abcd`a", "2`abcd`b", "3`wxyz`c", "v`Meta`d"] {
        client::send_frame(&frames, record).await.unwrap();
    }

    // then
    let metrics = pipeline.metrics().clone();
    for _ in 0..100 {
        if metrics.tags_discovered_total.get() == 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(metrics.tags_discovered_total.get(), 2);
    assert_eq!(metrics.messages_total.get(), 4);

    pipeline.shutdown();
    pipeline.wait().await.unwrap();
}

#[tokio::test]
async fn should_reject_zero_bucket_width() {
    // given
    let config = Config {
        bucket_width_secs: 0,
        ..loopback_config()
    };

    // when
    let result = IngestPipeline::start(&config).await;

    // then
    assert!(matches!(result, Err(bucketlog::Error::InvalidInput(_))));
}
