//! Shared building blocks for the bucketlog workspace.
//!
//! The storage module exposes a keyed append-only list store, the shape the
//! ingestion pipeline writes bucket contents into and the query side reads
//! back from. The clock module lets time-dependent code be driven by tests.

pub mod clock;
pub mod storage;

pub use clock::{Clock, MockClock, SystemClock};
pub use storage::config::{
    AwsObjectStoreConfig, LocalObjectStoreConfig, ObjectStoreConfig, SlateDbStorageConfig,
    StorageConfig,
};
pub use storage::factory::create_storage;
pub use storage::{ListStorage, ListStorageRead, StorageError, StorageResult};
