//! Runtime counters for parsing and querying
//!
//! Thread-safe via atomic operations; cheap enough to record on every
//! fetch.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for one engine instance.
#[derive(Debug, Default)]
pub struct EsiMetrics {
    pages_parsed: AtomicU64,
    tags_found: AtomicU64,
    parse_errors: AtomicU64,
    queries: AtomicU64,
    entities_queried: AtomicU64,
    resource_fetches: AtomicU64,
    failed_fetches: AtomicU64,
    on_error_fallbacks: AtomicU64,
    canceled_queries: AtomicU64,
    bytes_fetched: AtomicU64,
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub pages_parsed: u64,
    pub tags_found: u64,
    pub parse_errors: u64,
    pub queries: u64,
    pub entities_queried: u64,
    pub resource_fetches: u64,
    pub failed_fetches: u64,
    pub on_error_fallbacks: u64,
    pub canceled_queries: u64,
    pub bytes_fetched: u64,
}

impl EsiMetrics {
    pub fn new() -> Self {
        EsiMetrics::default()
    }

    pub fn record_page_parsed(&self) {
        self.pages_parsed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_tags_found(&self, count: usize) {
        self.tags_found.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn record_parse_error(&self) {
        self.parse_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_query(&self, entity_count: usize) {
        self.queries.fetch_add(1, Ordering::Relaxed);
        self.entities_queried
            .fetch_add(entity_count as u64, Ordering::Relaxed);
    }

    pub fn record_fetch(&self, bytes: usize) {
        self.resource_fetches.fetch_add(1, Ordering::Relaxed);
        self.bytes_fetched.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn record_failed_fetch(&self) {
        self.failed_fetches.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_on_error_fallback(&self) {
        self.on_error_fallbacks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_canceled_query(&self) {
        self.canceled_queries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            pages_parsed: self.pages_parsed.load(Ordering::Relaxed),
            tags_found: self.tags_found.load(Ordering::Relaxed),
            parse_errors: self.parse_errors.load(Ordering::Relaxed),
            queries: self.queries.load(Ordering::Relaxed),
            entities_queried: self.entities_queried.load(Ordering::Relaxed),
            resource_fetches: self.resource_fetches.load(Ordering::Relaxed),
            failed_fetches: self.failed_fetches.load(Ordering::Relaxed),
            on_error_fallbacks: self.on_error_fallbacks.load(Ordering::Relaxed),
            canceled_queries: self.canceled_queries.load(Ordering::Relaxed),
            bytes_fetched: self.bytes_fetched.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let metrics = EsiMetrics::new();
        metrics.record_query(3);
        metrics.record_fetch(1024);
        metrics.record_fetch(512);
        metrics.record_failed_fetch();
        metrics.record_on_error_fallback();

        let snap = metrics.snapshot();
        assert_eq!(snap.queries, 1);
        assert_eq!(snap.entities_queried, 3);
        assert_eq!(snap.resource_fetches, 2);
        assert_eq!(snap.bytes_fetched, 1536);
        assert_eq!(snap.failed_fetches, 1);
        assert_eq!(snap.on_error_fallbacks, 1);
        assert_eq!(snap.canceled_queries, 0);
    }

    #[test]
    fn test_page_counters_accumulate() {
        let metrics = EsiMetrics::new();
        metrics.record_page_parsed();
        metrics.record_tags_found(3);
        metrics.record_page_parsed();
        metrics.record_tags_found(1);
        metrics.record_parse_error();

        let snap = metrics.snapshot();
        assert_eq!(snap.pages_parsed, 2);
        assert_eq!(snap.tags_found, 4);
        assert_eq!(snap.parse_errors, 1);
    }
}
