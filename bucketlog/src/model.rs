//! Core data types for bucketlog.
//!
//! Records arrive as delimited text. They are grouped into fixed-width time
//! buckets by arrival time, and the second field of a record, when it has
//! the right shape, names the stream ("tag") the record belongs to.

use std::fmt;

use chrono::DateTime;
use serde::Serialize;

/// Identifier of a fixed-width time bucket: `floor(epoch_secs / width)`.
pub type BucketId = i64;

/// Default bucket width in seconds.
pub const DEFAULT_BUCKET_WIDTH_SECS: u64 = 100;

/// Default field delimiter for records.
pub const DEFAULT_DELIMITER: char = '`';

/// Format used for human-readable bucket start times.
const TIME_LABEL_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Returns the bucket containing `epoch_secs` for buckets of `width` seconds.
///
/// Saturates at [`BucketId::MAX`] for times past the representable range.
pub fn bucket_for(epoch_secs: u64, width: u64) -> BucketId {
    BucketId::try_from(epoch_secs / width).unwrap_or(BucketId::MAX)
}

/// Returns the first bucket whose start is at or after `epoch_secs`.
///
/// Saturates at [`BucketId::MAX`] like [`bucket_for`].
pub fn first_bucket_after(epoch_secs: u64, width: u64) -> BucketId {
    BucketId::try_from(epoch_secs.div_ceil(width)).unwrap_or(BucketId::MAX)
}

/// Formats the start time of `bucket` in UTC.
///
/// Buckets whose start falls outside the representable date range are
/// rendered as their raw epoch seconds.
pub fn bucket_time_label(bucket: BucketId, width: u64) -> String {
    let start = bucket.saturating_mul(width as i64);
    match DateTime::from_timestamp(start, 0) {
        Some(time) => time.format(TIME_LABEL_FORMAT).to_string(),
        None => start.to_string(),
    }
}

/// A stream tag: exactly four ASCII lowercase letters.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Tag(String);

impl Tag {
    /// Returns the tag if `candidate` has the tag shape.
    pub fn parse(candidate: &str) -> Option<Tag> {
        if is_valid_tag(candidate) {
            Some(Tag(candidate.to_string()))
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Whether `candidate` is exactly four ASCII lowercase letters.
pub fn is_valid_tag(candidate: &str) -> bool {
    candidate.len() == 4 && candidate.bytes().all(|b| b.is_ascii_lowercase())
}

/// Splits a record into its fields.
pub fn split_fields(record: &str, delimiter: char) -> Vec<&str> {
    record.split(delimiter).collect()
}

/// Returns the tag carried by a record, or `None` for untagged records.
///
/// Only the second field is consulted.
pub fn record_tag(record: &str, delimiter: char) -> Option<Tag> {
    record.split(delimiter).nth(1).and_then(Tag::parse)
}

/// Reserved messages intercepted before storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    /// Graceful stop followed by a final snapshot.
    Stop,
    /// Force a snapshot.
    Snapshot,
    /// Delete all stored data.
    Flush,
    /// Reserved no-op.
    Test,
}

impl ControlCommand {
    pub const ALL: [ControlCommand; 4] = [
        ControlCommand::Stop,
        ControlCommand::Snapshot,
        ControlCommand::Flush,
        ControlCommand::Test,
    ];

    /// Matches a whole message against the reserved tokens.
    pub fn parse(message: &str) -> Option<ControlCommand> {
        Self::ALL.into_iter().find(|cmd| cmd.token() == message)
    }

    /// The exact wire token.
    pub fn token(&self) -> &'static str {
        match self {
            ControlCommand::Stop => "kill",
            ControlCommand::Snapshot => "snapshot",
            ControlCommand::Flush => "flush",
            ControlCommand::Test => "test",
        }
    }
}

impl fmt::Display for ControlCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}
