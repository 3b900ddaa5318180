//! The single writer of the bucket store.
//!
//! [`IngestionWorker`] drains the ingest lane, intercepts control commands,
//! and appends everything else to the bucket covering the message's arrival
//! time. It exits when it reads the stop command or when the shared
//! cancellation token fires, taking exactly one final snapshot either way.

use std::sync::Arc;

use common::Clock;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::metrics::IngestMetrics;
use crate::model::{ControlCommand, bucket_for};
use crate::storage::BucketStore;

/// Summary of a worker run, returned when the worker exits.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestStats {
    pub records_appended: u64,
    pub snapshots: u64,
    pub commands: u64,
    pub errors: u64,
}

/// Tunables for [`IngestionWorker`].
#[derive(Debug, Clone, Copy)]
pub struct WorkerOptions {
    pub bucket_width_secs: u64,
    pub snapshot_threshold: u64,
}

/// Whether the worker keeps running after a message.
enum Flow {
    Continue,
    Stop,
}

pub struct IngestionWorker {
    store: BucketStore,
    clock: Arc<dyn Clock>,
    receiver: UnboundedReceiver<String>,
    cancel: CancellationToken,
    options: WorkerOptions,
    metrics: IngestMetrics,
    stats: IngestStats,
    appended_since_snapshot: u64,
}

impl IngestionWorker {
    pub fn new(
        store: BucketStore,
        clock: Arc<dyn Clock>,
        receiver: UnboundedReceiver<String>,
        cancel: CancellationToken,
        options: WorkerOptions,
        metrics: IngestMetrics,
    ) -> Self {
        Self {
            store,
            clock,
            receiver,
            cancel,
            options,
            metrics,
            stats: IngestStats::default(),
            appended_since_snapshot: 0,
        }
    }

    /// Runs until stopped, then takes the final snapshot.
    pub async fn run(mut self) -> IngestStats {
        tracing::info!(
            bucket_width_secs = self.options.bucket_width_secs,
            snapshot_threshold = self.options.snapshot_threshold,
            "ingestion worker started"
        );

        loop {
            let message = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                message = self.receiver.recv() => match message {
                    Some(message) => message,
                    None => break,
                },
            };

            if let Flow::Stop = self.handle(&message).await {
                self.cancel.cancel();
                break;
            }
        }

        if let Err(e) = self.snapshot().await {
            tracing::error!(error = %e, "final snapshot failed");
            self.record_error();
        }

        tracing::info!(
            records_appended = self.stats.records_appended,
            snapshots = self.stats.snapshots,
            errors = self.stats.errors,
            "ingestion worker stopped"
        );
        self.stats
    }

    async fn handle(&mut self, message: &str) -> Flow {
        let Some(command) = ControlCommand::parse(message) else {
            if let Err(e) = self.append(message).await {
                tracing::warn!(error = %e, "dropping message");
                self.record_error();
            }
            return Flow::Continue;
        };

        tracing::info!(%command, "control command received");
        self.stats.commands += 1;
        let result = match command {
            ControlCommand::Stop => return Flow::Stop,
            ControlCommand::Snapshot => self.snapshot().await,
            ControlCommand::Flush => self.store.clear_all().await,
            ControlCommand::Test => Ok(()),
        };
        if let Err(e) = result {
            tracing::warn!(%command, error = %e, "control command failed");
            self.record_error();
        }
        if matches!(command, ControlCommand::Snapshot | ControlCommand::Flush) {
            self.appended_since_snapshot = 0;
        }
        Flow::Continue
    }

    async fn append(&mut self, record: &str) -> Result<()> {
        let bucket = bucket_for(self.clock.epoch_secs(), self.options.bucket_width_secs);
        self.store.append(bucket, record).await?;
        tracing::debug!(bucket, len = record.len(), "record appended");

        self.stats.records_appended += 1;
        self.metrics.records_appended_total.inc();
        self.appended_since_snapshot += 1;

        if self.appended_since_snapshot > self.options.snapshot_threshold {
            self.appended_since_snapshot = 0;
            if let Err(e) = self.snapshot().await {
                tracing::error!(error = %e, "periodic snapshot failed");
                self.record_error();
            }
        }
        Ok(())
    }

    async fn snapshot(&mut self) -> Result<()> {
        self.store.snapshot().await?;
        self.stats.snapshots += 1;
        self.metrics.snapshots_total.inc();
        Ok(())
    }

    fn record_error(&mut self) {
        self.stats.errors += 1;
        self.metrics.errors_total.inc();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use bytes::Bytes;
    use common::storage::in_memory::InMemoryStorage;
    use common::{ListStorage, ListStorageRead, MockClock, StorageError, StorageResult};
    use tokio::sync::mpsc::{UnboundedSender, unbounded_channel};

    use super::*;

    /// In-memory storage that counts saves and can be told to fail them.
    #[derive(Default)]
    struct CountingStorage {
        inner: InMemoryStorage,
        saves: AtomicUsize,
        fail_saves: bool,
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
            if self.fail_saves {
                return Err(StorageError::Storage("disk full".to_string()));
            }
            Ok(())
        }

        async fn flush_all(&self) -> StorageResult<()> {
            self.inner.flush_all().await
        }
    }

    struct Harness {
        storage: Arc<CountingStorage>,
        store: BucketStore,
        clock: Arc<MockClock>,
        sender: UnboundedSender<String>,
        cancel: CancellationToken,
        worker: IngestionWorker,
    }

    fn harness(storage: CountingStorage, snapshot_threshold: u64) -> Harness {
        let storage = Arc::new(storage);
        let store = BucketStore::new(storage.clone());
        let clock = Arc::new(MockClock::at_epoch_secs(750));
        let (sender, receiver) = unbounded_channel();
        let cancel = CancellationToken::new();
        let worker = IngestionWorker::new(
            store.clone(),
            clock.clone(),
            receiver,
            cancel.clone(),
            WorkerOptions {
                bucket_width_secs: 100,
                snapshot_threshold,
            },
            IngestMetrics::new(),
        );
        Harness {
            storage,
            store,
            clock,
            sender,
            cancel,
            worker,
        }
    }

    #[tokio::test]
    async fn should_append_to_arrival_bucket_in_order() {
        // given
        let h = harness(CountingStorage::default(), 100);
        for record in ["1`abcd`a", "2`abcd`b", "3`abcd`c"] {
            h.sender.send(record.to_string()).unwrap();
        }
        h.sender.send("kill".to_string()).unwrap();

        // when
        let stats = h.worker.run().await;

        // then
        assert_eq!(stats.records_appended, 3);
        let records = h.store.as_read().read_all(7).await.unwrap();
        assert_eq!(records, vec!["1`abcd`a", "2`abcd`b", "3`abcd`c"]);
    }

    #[tokio::test]
    async fn should_take_exactly_one_final_snapshot_on_stop() {
        // given
        let h = harness(CountingStorage::default(), 100);
        h.sender.send("before".to_string()).unwrap();
        h.sender.send("kill".to_string()).unwrap();
        h.sender.send("after".to_string()).unwrap();
        h.sender.send("snapshot".to_string()).unwrap();

        // when
        let stats = h.worker.run().await;

        // then
        assert_eq!(h.storage.saves.load(Ordering::SeqCst), 1);
        assert_eq!(stats.snapshots, 1);
        assert_eq!(h.store.as_read().read_all(7).await.unwrap(), vec!["before"]);
        assert!(h.cancel.is_cancelled());
    }

    #[tokio::test]
    async fn should_snapshot_once_on_external_cancel() {
        // given
        let h = harness(CountingStorage::default(), 100);
        let handle = tokio::spawn(h.worker.run());

        // when
        h.cancel.cancel();
        let stats = handle.await.unwrap();

        // then
        assert_eq!(h.storage.saves.load(Ordering::SeqCst), 1);
        assert_eq!(stats.records_appended, 0);
    }

    #[tokio::test]
    async fn should_snapshot_when_counter_exceeds_threshold() {
        // given
        let h = harness(CountingStorage::default(), 2);
        for i in 0..3 {
            h.sender.send(format!("record-{}", i)).unwrap();
        }
        h.sender.send("kill".to_string()).unwrap();

        // when
        let stats = h.worker.run().await;

        // then
        // one periodic snapshot after the third append, one final
        assert_eq!(stats.snapshots, 2);
        assert_eq!(h.storage.saves.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn should_reset_counter_on_explicit_snapshot() {
        // given
        let h = harness(CountingStorage::default(), 2);
        for message in ["a", "b", "snapshot", "c", "d", "kill"] {
            h.sender.send(message.to_string()).unwrap();
        }

        // when
        let stats = h.worker.run().await;

        // then
        // explicit snapshot plus final; the counter never exceeded 2
        assert_eq!(stats.snapshots, 2);
        assert_eq!(stats.commands, 2);
    }

    #[tokio::test]
    async fn should_clear_all_buckets_on_flush() {
        // given
        let h = harness(CountingStorage::default(), 100);
        h.sender.send("old".to_string()).unwrap();
        h.sender.send("flush".to_string()).unwrap();
        h.sender.send("kill".to_string()).unwrap();

        // when
        h.worker.run().await;

        // then
        assert!(h.store.as_read().list_keys().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn should_follow_clock_across_buckets() {
        // given
        let h = harness(CountingStorage::default(), 100);
        let handle = tokio::spawn(h.worker.run());
        h.sender.send("first".to_string()).unwrap();
        tokio::task::yield_now().await;
        while h.store.as_read().len(7).await.unwrap() == 0 {
            tokio::task::yield_now().await;
        }

        // when
        h.clock.set_epoch_secs(920);
        h.sender.send("second".to_string()).unwrap();
        h.sender.send("kill".to_string()).unwrap();
        handle.await.unwrap();

        // then
        let read = h.store.as_read();
        assert_eq!(read.list_keys().await.unwrap(), vec![7, 9]);
        assert_eq!(read.read_all(9).await.unwrap(), vec!["second"]);
    }

    #[tokio::test]
    async fn should_treat_test_command_as_noop() {
        // given
        let h = harness(CountingStorage::default(), 100);
        h.sender.send("test".to_string()).unwrap();
        h.sender.send("kill".to_string()).unwrap();

        // when
        let stats = h.worker.run().await;

        // then
        assert_eq!(stats.records_appended, 0);
        assert!(h.store.as_read().list_keys().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn should_match_control_tokens_against_message_as_received() {
        // given
        let h = harness(CountingStorage::default(), 100);
        h.sender.send(" kill\n".to_string()).unwrap();
        h.sender.send("kill".to_string()).unwrap();

        // when
        let stats = h.worker.run().await;

        // then
        assert_eq!(stats.records_appended, 1);
        assert_eq!(stats.commands, 1);
        assert_eq!(h.store.as_read().read_all(7).await.unwrap(), vec![" kill\n"]);
    }

    #[tokio::test]
    async fn should_log_and_survive_failed_snapshot() {
        // given
        let storage = CountingStorage {
            fail_saves: true,
            ..Default::default()
        };
        let h = harness(storage, 100);
        h.sender.send("snapshot".to_string()).unwrap();
        h.sender.send("kept".to_string()).unwrap();
        h.sender.send("kill".to_string()).unwrap();

        // when
        let stats = h.worker.run().await;

        // then
        assert_eq!(stats.errors, 2);
        assert_eq!(stats.records_appended, 1);
        assert_eq!(h.storage.saves.load(Ordering::SeqCst), 2);
    }
}
