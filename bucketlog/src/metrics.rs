//! Prometheus counters for the ingestion pipeline.

use prometheus_client::metrics::counter::Counter;
use prometheus_client::registry::Registry;

/// Counters updated by the listeners, worker, and watcher.
///
/// Counters are cheap to clone and share their underlying value, so each
/// component holds its own copy.
#[derive(Clone, Debug, Default)]
pub struct IngestMetrics {
    /// Messages accepted by a listener and handed to the dispatcher.
    pub messages_total: Counter,
    /// Records appended to a bucket.
    pub records_appended_total: Counter,
    /// Snapshots taken, whatever triggered them.
    pub snapshots_total: Counter,
    /// Messages dropped or failed anywhere in the ingestion path.
    pub errors_total: Counter,
    /// Tags seen for the first time by the watcher.
    pub tags_discovered_total: Counter,
}

impl IngestMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers every counter with `registry`.
    pub fn register(&self, registry: &mut Registry) {
        registry.register(
            "ingest_messages",
            "Total number of messages accepted by the listeners",
            self.messages_total.clone(),
        );
        registry.register(
            "ingest_records_appended",
            "Total number of records appended to buckets",
            self.records_appended_total.clone(),
        );
        registry.register(
            "ingest_snapshots",
            "Total number of whole-store snapshots taken",
            self.snapshots_total.clone(),
        );
        registry.register(
            "ingest_errors",
            "Total number of messages dropped or failed during ingestion",
            self.errors_total.clone(),
        );
        registry.register(
            "watch_tags_discovered",
            "Total number of stream tags seen for the first time",
            self.tags_discovered_total.clone(),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_register_counters_with_total_suffix() {
        // given
        let metrics = IngestMetrics::new();
        let mut registry = Registry::default();
        metrics.register(&mut registry);
        metrics.records_appended_total.inc_by(3);

        // when
        let mut encoded = String::new();
        prometheus_client::encoding::text::encode(&mut encoded, &registry).unwrap();

        // then
        assert!(encoded.contains("ingest_messages_total 0"));
        assert!(encoded.contains("ingest_records_appended_total 3"));
        assert!(encoded.contains("ingest_snapshots_total 0"));
        assert!(encoded.contains("watch_tags_discovered_total 0"));
    }

    #[test]
    fn should_share_values_between_clones() {
        // given
        let metrics = IngestMetrics::new();
        let clone = metrics.clone();

        // when
        clone.snapshots_total.inc();

        // then
        assert_eq!(metrics.snapshots_total.get(), 1);
    }
}
