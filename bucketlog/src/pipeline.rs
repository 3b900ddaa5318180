//! Assembly of the ingestion pipeline.
//!
//! connection -> listener -> dispatcher -> {worker, watcher} -> bucket store

use std::net::SocketAddr;
use std::sync::Arc;

use common::{Clock, SystemClock, create_storage};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::dispatch::{Dispatcher, INGEST_LANE, WATCH_LANE};
use crate::error::{Error, Result};
use crate::listener::{FrameListener, StreamListener};
use crate::metrics::IngestMetrics;
use crate::query::QueryEngine;
use crate::storage::BucketStore;
use crate::watcher::{CommandNotifier, LogNotifier, Notifier, TagWatcher};
use crate::worker::{IngestStats, IngestionWorker, WorkerOptions};

/// A running pipeline.
///
/// Stops when the stop command is ingested or when [`shutdown`] is called.
///
/// [`shutdown`]: IngestPipeline::shutdown
pub struct IngestPipeline {
    store: BucketStore,
    metrics: IngestMetrics,
    cancel: CancellationToken,
    bucket_width_secs: u64,
    delimiter: char,
    stream_addr: SocketAddr,
    frame_addr: Option<SocketAddr>,
    worker: JoinHandle<IngestStats>,
    tasks: Vec<JoinHandle<()>>,
}

impl IngestPipeline {
    /// Starts a pipeline over the storage named in `config`.
    pub async fn start(config: &Config) -> Result<Self> {
        let storage = create_storage(&config.storage).await?;
        Self::start_with(config, BucketStore::new(storage), Arc::new(SystemClock)).await
    }

    /// Starts a pipeline over an existing store and clock.
    pub async fn start_with(
        config: &Config,
        store: BucketStore,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;
        let cancel = CancellationToken::new();
        let metrics = IngestMetrics::new();

        let mut dispatcher = Dispatcher::new();
        let ingest = dispatcher.add_lane(INGEST_LANE);
        let watch = config
            .watcher
            .enabled
            .then(|| dispatcher.add_lane(WATCH_LANE));
        let dispatcher = Arc::new(dispatcher);

        let max = config.listener.max_message_bytes;
        let stream = StreamListener::bind(
            &config.listener.stream_addr,
            dispatcher.clone(),
            metrics.clone(),
            max,
        )
        .await?;
        let frame = match &config.listener.frame_addr {
            Some(addr) => {
                Some(FrameListener::bind(addr, dispatcher.clone(), metrics.clone(), max).await?)
            }
            None => None,
        };

        let worker = IngestionWorker::new(
            store.clone(),
            clock,
            ingest,
            cancel.clone(),
            WorkerOptions {
                bucket_width_secs: config.bucket_width_secs,
                snapshot_threshold: config.snapshot_threshold,
            },
            metrics.clone(),
        );

        let watcher = match watch {
            Some(watch) => {
                let notifier: Box<dyn Notifier> = match &config.watcher.notify_command {
                    Some(argv) => Box::new(CommandNotifier::from_argv(argv)?),
                    None => Box::new(LogNotifier),
                };
                Some(TagWatcher::new(
                    watch,
                    cancel.clone(),
                    config.delimiter,
                    notifier,
                    metrics.clone(),
                ))
            }
            None => None,
        };

        let stream_addr = stream.local_addr()?;
        let frame_addr = frame.as_ref().map(FrameListener::local_addr).transpose()?;

        let mut tasks = vec![tokio::spawn(stream.run(cancel.clone()))];
        if let Some(frame) = frame {
            tasks.push(tokio::spawn(frame.run(cancel.clone())));
        }
        if let Some(watcher) = watcher {
            tasks.push(tokio::spawn(async move {
                watcher.run().await;
            }));
        }
        let worker = tokio::spawn(worker.run());

        tracing::info!(%stream_addr, frame_addr = ?frame_addr, "ingestion pipeline started");
        Ok(Self {
            store,
            metrics,
            cancel,
            bucket_width_secs: config.bucket_width_secs,
            delimiter: config.delimiter,
            stream_addr,
            frame_addr,
            worker,
            tasks,
        })
    }

    /// Address of the byte-stream listener.
    pub fn stream_addr(&self) -> SocketAddr {
        self.stream_addr
    }

    /// Address of the frame listener, when enabled.
    pub fn frame_addr(&self) -> Option<SocketAddr> {
        self.frame_addr
    }

    pub fn metrics(&self) -> &IngestMetrics {
        &self.metrics
    }

    /// Query engine reading the pipeline's store.
    pub fn query_engine(&self) -> QueryEngine {
        QueryEngine::new(self.store.as_read(), self.bucket_width_secs, self.delimiter)
    }

    /// Token that fires when the pipeline stops, for whatever reason.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Asks every component to stop. The worker still takes its final snapshot.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Waits for every component to exit and returns the worker's summary.
    pub async fn wait(self) -> Result<IngestStats> {
        let stats = self
            .worker
            .await
            .map_err(|e| Error::Internal(format!("ingestion worker panicked: {}", e)))?;
        for task in self.tasks {
            task.await
                .map_err(|e| Error::Internal(format!("pipeline task panicked: {}", e)))?;
        }
        Ok(stats)
    }
}
