//! Earliest-bucket index of stream tags.
//!
//! Reading every record of every bucket is too slow for a long-running
//! capture, so the index samples only the first and last record of each
//! bucket. A bucket whose two endpoints disagree about the tag had a stream
//! start (or end) inside it, and only those buckets are scanned in full.
//!
//! The build runs in two passes over an ascending list of bucket ids:
//!
//! 1. sample the endpoints of every bucket, registering their tags and
//!    collecting the heterogeneous buckets;
//! 2. scan each heterogeneous bucket record by record.
//!
//! Registration keeps the smallest bucket seen for a tag, so the earliest
//! bucket wins regardless of pass or visiting order.

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

use serde::Serialize;

use crate::model::{BucketId, Tag, bucket_time_label, first_bucket_after, record_tag};
use crate::storage::BucketStoreRead;

/// Where a tag's stream begins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TagStart {
    pub bucket: BucketId,
    pub time: String,
}

/// Result of an index build.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TagIndex {
    pub tags: BTreeMap<Tag, TagStart>,
    /// Buckets that could not be read, one annotation each.
    pub errors: Vec<String>,
}

pub struct TagIndexEngine {
    store: BucketStoreRead,
    bucket_width_secs: u64,
    delimiter: char,
}

impl TagIndexEngine {
    pub fn new(store: BucketStoreRead, bucket_width_secs: u64, delimiter: char) -> Self {
        Self {
            store,
            bucket_width_secs,
            delimiter,
        }
    }

    /// Builds the index over every bucket starting at or after `after_epoch`.
    ///
    /// Unreadable buckets are skipped and reported in [`TagIndex::errors`].
    pub async fn build(&self, after_epoch: Option<u64>) -> TagIndex {
        let mut index = TagIndex::default();
        let mut starts: BTreeMap<Tag, BucketId> = BTreeMap::new();

        let buckets = match self.store.list_keys().await {
            Ok(buckets) => buckets,
            Err(e) => {
                index.errors.push(format!("listing buckets: {}", e));
                return index;
            }
        };
        let lower = after_epoch.map(|epoch| first_bucket_after(epoch, self.bucket_width_secs));
        let buckets: Vec<BucketId> = buckets
            .into_iter()
            .filter(|bucket| lower.is_none_or(|lower| *bucket >= lower))
            .collect();

        let mut heterogeneous = Vec::new();
        for &bucket in &buckets {
            let (first, last) = match self.store.endpoints(bucket).await {
                Ok(Some(endpoints)) => endpoints,
                Ok(None) => continue,
                Err(e) => {
                    tracing::warn!(bucket, error = %e, "skipping unreadable bucket");
                    index.errors.push(format!("bucket {}: {}", bucket, e));
                    continue;
                }
            };
            let first = record_tag(&first, self.delimiter);
            let last = record_tag(&last, self.delimiter);
            if first != last {
                heterogeneous.push(bucket);
            }
            for tag in first.into_iter().chain(last) {
                register(&mut starts, tag, bucket);
            }
        }

        for bucket in heterogeneous {
            let records = match self.store.read_all(bucket).await {
                Ok(records) => records,
                Err(e) => {
                    tracing::warn!(bucket, error = %e, "skipping unreadable bucket");
                    index.errors.push(format!("bucket {}: {}", bucket, e));
                    continue;
                }
            };
            tracing::debug!(bucket, records = records.len(), "scanning heterogeneous bucket");
            for record in &records {
                if let Some(tag) = record_tag(record, self.delimiter) {
                    register(&mut starts, tag, bucket);
                }
            }
        }

        index.tags = starts
            .into_iter()
            .map(|(tag, bucket)| {
                let time = bucket_time_label(bucket, self.bucket_width_secs);
                (tag, TagStart { bucket, time })
            })
            .collect();
        index
    }
}

/// Records `bucket` as the start of `tag` unless an earlier one is known.
fn register(starts: &mut BTreeMap<Tag, BucketId>, tag: Tag, bucket: BucketId) {
    match starts.entry(tag) {
        Entry::Vacant(entry) => {
            entry.insert(bucket);
        }
        Entry::Occupied(mut entry) => {
            if bucket < *entry.get() {
                entry.insert(bucket);
            }
        }
    }
}
