//! Configuration for the ingestion pipeline and query surface.
//!
//! Every field carries a serde default, so a YAML file only needs to name
//! the settings it changes.

use std::path::Path;

use common::StorageConfig;
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::model::{DEFAULT_BUCKET_WIDTH_SECS, DEFAULT_DELIMITER};

/// Configuration for a bucketlog instance.
///
/// # Example
///
/// ```ignore
/// use bucketlog::Config;
/// use common::StorageConfig;
///
/// let config = Config {
///     storage: StorageConfig::InMemory,
///     ..Default::default()
/// };
/// let pipeline = IngestPipeline::start(config).await?;
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Storage backend holding the buckets.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Width of each time bucket in seconds.
    #[serde(default = "default_bucket_width_secs")]
    pub bucket_width_secs: u64,

    /// Number of appends after which the worker takes a snapshot.
    ///
    /// A snapshot is taken once the counter exceeds this value.
    #[serde(default = "default_snapshot_threshold")]
    pub snapshot_threshold: u64,

    /// Field delimiter used to split records.
    #[serde(default = "default_delimiter")]
    pub delimiter: char,

    #[serde(default)]
    pub listener: ListenerConfig,

    #[serde(default)]
    pub watcher: WatcherConfig,

    #[serde(default)]
    pub http: HttpConfig,
}

fn default_bucket_width_secs() -> u64 {
    DEFAULT_BUCKET_WIDTH_SECS
}

fn default_snapshot_threshold() -> u64 {
    100
}

fn default_delimiter() -> char {
    DEFAULT_DELIMITER
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage: StorageConfig::default(),
            bucket_width_secs: default_bucket_width_secs(),
            snapshot_threshold: default_snapshot_threshold(),
            delimiter: default_delimiter(),
            listener: ListenerConfig::default(),
            watcher: WatcherConfig::default(),
            http: HttpConfig::default(),
        }
    }
}

impl Config {
    /// Rejects settings the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.bucket_width_secs == 0 {
            return Err(Error::InvalidInput(
                "bucket_width_secs must be greater than zero".to_string(),
            ));
        }
        if self.listener.max_message_bytes == 0 {
            return Err(Error::InvalidInput(
                "listener.max_message_bytes must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Inbound transport settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ListenerConfig {
    /// Address of the byte-stream listener (read to EOF, one message per connection).
    #[serde(default = "default_stream_addr")]
    pub stream_addr: String,

    /// Address of the frame listener (length-delimited frames, acked per frame).
    ///
    /// Disabled when unset.
    #[serde(default)]
    pub frame_addr: Option<String>,

    /// Largest message accepted on either transport.
    #[serde(default = "default_max_message_bytes")]
    pub max_message_bytes: usize,
}

fn default_stream_addr() -> String {
    "127.0.0.1:5000".to_string()
}

fn default_max_message_bytes() -> usize {
    16 * 1024 * 1024
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            stream_addr: default_stream_addr(),
            frame_addr: None,
            max_message_bytes: default_max_message_bytes(),
        }
    }
}

/// Tag-watch lane settings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WatcherConfig {
    /// Whether the tag-watch lane is started at all.
    #[serde(default)]
    pub enabled: bool,

    /// Program (and leading arguments) run when a new tag is first seen.
    ///
    /// The tag is appended as the final argument. When unset, new tags are
    /// only logged.
    #[serde(default)]
    pub notify_command: Option<Vec<String>>,
}

/// HTTP query surface settings.
#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_http_port")]
    pub port: u16,
}

fn default_http_port() -> u16 {
    9090
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            port: default_http_port(),
        }
    }
}

/// Load configuration from a YAML file.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let contents = std::fs::read_to_string(path.as_ref())
        .map_err(|e| Error::InvalidInput(format!("Failed to read config file: {}", e)))?;

    let config: Config = serde_yaml::from_str(&contents)
        .map_err(|e| Error::InvalidInput(format!("Failed to parse config file: {}", e)))?;
    config.validate()?;
    Ok(config)
}
