//! Read-only queries over the bucket store.
//!
//! Every query answers with a [`QueryResponse`]. Errors never replace the
//! payload: whatever could be computed is returned, and the problems are
//! listed alongside it.

use std::collections::BTreeMap;

use common::storage::resolve_range;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::Result;
use crate::model::{BucketId, Tag, bucket_time_label, first_bucket_after, record_tag, split_fields};
use crate::storage::BucketStoreRead;
use crate::tags::{TagIndexEngine, TagStart};

/// Envelope returned by every query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResponse<T> {
    pub payload: T,
    pub errors: Vec<String>,
    pub meta: Map<String, Value>,
}

impl<T: Default> QueryResponse<T> {
    fn empty() -> Self {
        Self {
            payload: T::default(),
            errors: Vec::new(),
            meta: Map::new(),
        }
    }

    fn failed(error: impl ToString) -> Self {
        let mut response = Self::empty();
        response.errors.push(error.to_string());
        response
    }
}

impl<T> QueryResponse<T> {
    fn with_meta(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.meta.insert(key.to_string(), value.into());
        self
    }
}

/// A bucket id with the start time of its window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BucketInfo {
    pub id: BucketId,
    pub time: String,
}

/// One record of a tag-scoped read.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TagRecord {
    /// Position of the record within its bucket.
    pub index: usize,
    /// The record's fields, with structured fields decoded when requested.
    pub fields: Vec<Value>,
    /// Indices into `fields` that were decoded from JSON.
    pub json: Vec<usize>,
}

#[derive(Clone)]
pub struct QueryEngine {
    store: BucketStoreRead,
    bucket_width_secs: u64,
    delimiter: char,
}

impl QueryEngine {
    pub fn new(store: BucketStoreRead, bucket_width_secs: u64, delimiter: char) -> Self {
        Self {
            store,
            bucket_width_secs,
            delimiter,
        }
    }

    /// Lists bucket ids in ascending order, optionally only those starting
    /// at or after `after_epoch`.
    pub async fn list_buckets(&self, after_epoch: Option<u64>) -> QueryResponse<Vec<BucketInfo>> {
        let buckets = match self.store.list_keys().await {
            Ok(buckets) => buckets,
            Err(e) => return QueryResponse::failed(e).with_meta("count", 0),
        };
        let lower = after_epoch.map(|epoch| first_bucket_after(epoch, self.bucket_width_secs));
        let payload: Vec<BucketInfo> = buckets
            .into_iter()
            .filter(|bucket| lower.is_none_or(|lower| *bucket >= lower))
            .map(|id| BucketInfo {
                id,
                time: bucket_time_label(id, self.bucket_width_secs),
            })
            .collect();
        let count = payload.len();
        QueryResponse {
            payload,
            ..QueryResponse::empty()
        }
        .with_meta("count", count)
    }

    /// Returns the untagged records of a bucket in storage order.
    ///
    /// An absent bucket yields an empty payload.
    pub async fn bucket_metadata(&self, bucket: BucketId) -> QueryResponse<Vec<String>> {
        let time = bucket_time_label(bucket, self.bucket_width_secs);
        let records = match self.store.read_all(bucket).await {
            Ok(records) => records,
            Err(e) => {
                return QueryResponse::failed(e)
                    .with_meta("count", 0)
                    .with_meta("time", time);
            }
        };
        let payload: Vec<String> = records
            .into_iter()
            .filter(|record| record_tag(record, self.delimiter).is_none())
            .collect();
        let count = payload.len();
        QueryResponse {
            payload,
            ..QueryResponse::empty()
        }
        .with_meta("count", count)
        .with_meta("time", time)
    }

    /// Reads records `start..=end` of a bucket that carry `tag`.
    ///
    /// `end = -1` reads to the last record. With `auto_json`, fields that
    /// look like JSON objects or arrays are decoded; a field that fails to
    /// decode stays as text and adds a warning to the errors.
    ///
    /// `meta.next` names the next bucket id after this one, when one exists.
    pub async fn tag_data_range(
        &self,
        tag: &str,
        bucket: BucketId,
        start: i64,
        end: i64,
        auto_json: bool,
    ) -> QueryResponse<Vec<TagRecord>> {
        let mut response = QueryResponse::<Vec<TagRecord>>::empty()
            .with_meta("bucket", bucket)
            .with_meta("time", bucket_time_label(bucket, self.bucket_width_secs));

        let buckets = match self.store.list_keys().await {
            Ok(buckets) => buckets,
            Err(e) => {
                response.errors.push(e.to_string());
                return response.with_meta("count", 0);
            }
        };
        if let Some(next) = buckets.iter().find(|id| **id > bucket) {
            response = response.with_meta("next", *next);
        }
        if buckets.binary_search(&bucket).is_err() {
            response.errors.push(format!("unknown bucket: {}", bucket));
            return response.with_meta("count", 0);
        }
        let Some(tag) = Tag::parse(tag) else {
            response.errors.push(format!("invalid tag: {}", tag));
            return response.with_meta("count", 0);
        };

        match self.read_tagged(&tag, bucket, start, end).await {
            Ok(records) => {
                for (index, record) in records {
                    let decoded =
                        self.to_tag_record(index, &record, auto_json, &mut response.errors);
                    response.payload.push(decoded);
                }
            }
            Err(e) => response.errors.push(e.to_string()),
        }
        let count = response.payload.len();
        response.with_meta("count", count)
    }

    /// Builds the earliest-bucket index of every tag.
    pub async fn tags(&self, after_epoch: Option<u64>) -> QueryResponse<BTreeMap<Tag, TagStart>> {
        let engine = TagIndexEngine::new(self.store.clone(), self.bucket_width_secs, self.delimiter);
        let index = engine.build(after_epoch).await;
        let count = index.tags.len();
        QueryResponse {
            payload: index.tags,
            errors: index.errors,
            meta: Map::new(),
        }
        .with_meta("count", count)
    }

    /// Reads the resolved range and keeps records carrying `tag`, paired
    /// with their position in the bucket.
    async fn read_tagged(
        &self,
        tag: &Tag,
        bucket: BucketId,
        start: i64,
        end: i64,
    ) -> Result<Vec<(usize, String)>> {
        let len = self.store.len(bucket).await?;
        let Some(range) = resolve_range(len, start, end) else {
            return Ok(Vec::new());
        };
        let first = *range.start();
        let records = self
            .store
            .range_read(bucket, first as i64, *range.end() as i64)
            .await?;
        Ok(records
            .into_iter()
            .enumerate()
            .filter(|(_, record)| record_tag(record, self.delimiter).as_ref() == Some(tag))
            .map(|(offset, record)| (first + offset, record))
            .collect())
    }

    fn to_tag_record(
        &self,
        index: usize,
        record: &str,
        auto_json: bool,
        warnings: &mut Vec<String>,
    ) -> TagRecord {
        let mut json = Vec::new();
        let fields = split_fields(record, self.delimiter)
            .into_iter()
            .enumerate()
            .map(|(position, field)| {
                if !auto_json || !looks_structured(field) {
                    return Value::String(field.to_string());
                }
                match serde_json::from_str::<Value>(field.trim()) {
                    Ok(value) => {
                        json.push(position);
                        value
                    }
                    Err(e) => {
                        warnings.push(format!(
                            "record {} field {}: malformed JSON kept as text: {}",
                            index, position, e
                        ));
                        Value::String(field.to_string())
                    }
                }
            })
            .collect();
        TagRecord {
            index,
            fields,
            json,
        }
    }
}

fn looks_structured(field: &str) -> bool {
    let trimmed = field.trim_start();
    trimmed.starts_with('{') || trimmed.starts_with('[')
}
