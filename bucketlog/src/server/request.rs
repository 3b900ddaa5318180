//! Query parameters accepted by the HTTP routes.

use serde::Deserialize;

/// Optional epoch lower bound for listings.
#[derive(Debug, Default, Deserialize)]
pub struct AfterParams {
    /// Only include buckets starting at or after this epoch second.
    pub after: Option<u64>,
}

/// Inclusive record range within a bucket.
#[derive(Debug, Default, Deserialize)]
pub struct RangeParams {
    /// First record index (inclusive). Defaults to 0.
    pub start: Option<i64>,
    /// Last record index (inclusive); -1 is the last record. Defaults to -1.
    pub end: Option<i64>,
}

impl RangeParams {
    /// Get the range as `(start, end)`.
    pub fn bounds(&self) -> (i64, i64) {
        (self.start.unwrap_or(0), self.end.unwrap_or(-1))
    }
}
