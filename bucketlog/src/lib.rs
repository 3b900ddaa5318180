//! Time-bucketed telemetry ingestion with tag-indexed queries.
//!
//! Records arrive as delimited text over TCP and are appended to fixed-width
//! time buckets by arrival time. A record whose second field is four
//! lowercase letters belongs to the stream named by that tag; anything else
//! is bucket metadata.
//!
//! # Components
//!
//! - [`StreamListener`] and [`FrameListener`] accept messages and hand them
//!   to the [`Dispatcher`], which copies each one onto every lane.
//! - [`IngestionWorker`] is the only writer of the [`BucketStore`]. It
//!   intercepts the control commands (`kill`, `snapshot`, `flush`, `test`).
//! - [`TagWatcher`] fires a [`Notifier`] the first time a tag appears.
//! - [`TagIndexEngine`] finds each tag's earliest bucket by sampling bucket
//!   endpoints and scanning only buckets whose endpoints disagree.
//! - [`QueryEngine`] serves bucket listings, bucket metadata, and tag-scoped
//!   ranged reads, wrapped in a [`QueryResponse`].
//!
//! [`IngestPipeline`] wires all of it together from a [`Config`].

pub mod client;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod listener;
pub mod metrics;
pub mod model;
pub mod pipeline;
pub mod query;
#[cfg(feature = "http-server")]
pub mod server;
pub mod storage;
pub mod tags;
pub mod watcher;
pub mod worker;

pub use config::{Config, HttpConfig, ListenerConfig, WatcherConfig, load_config};
pub use dispatch::Dispatcher;
pub use error::{Error, Result};
pub use listener::{FrameListener, StreamListener};
pub use metrics::IngestMetrics;
pub use model::{BucketId, ControlCommand, Tag};
pub use pipeline::IngestPipeline;
pub use query::{BucketInfo, QueryEngine, QueryResponse, TagRecord};
pub use storage::{BucketStore, BucketStoreRead};
pub use tags::{TagIndex, TagIndexEngine, TagStart};
pub use watcher::{CommandNotifier, LogNotifier, Notifier, TagWatcher};
pub use worker::{IngestStats, IngestionWorker, WorkerOptions};
