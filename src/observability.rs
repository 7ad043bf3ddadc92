//! Run counters

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters shared by every worker of a sync run
#[derive(Debug, Default)]
pub struct Metrics {
    enqueued: AtomicU64,
    cache_hits: AtomicU64,
    downloads_completed: AtomicU64,
    bytes_downloaded: AtomicU64,
    resolve_failures: AtomicU64,
    download_failures: AtomicU64,
    publish_failures: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_enqueued(&self) {
        self.enqueued.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "enqueued", "Metric incremented");
    }

    pub fn cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "cache_hits", "Metric incremented");
    }

    pub fn download_completed(&self, bytes: u64) {
        self.downloads_completed.fetch_add(1, Ordering::Relaxed);
        self.bytes_downloaded.fetch_add(bytes, Ordering::Relaxed);
        tracing::debug!(counter = "downloads_completed", bytes, "Metric incremented");
    }

    pub fn resolve_failed(&self) {
        self.resolve_failures.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "resolve_failures", "Metric incremented");
    }

    pub fn download_failed(&self) {
        self.download_failures.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "download_failures", "Metric incremented");
    }

    pub fn publish_failed(&self) {
        self.publish_failures.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "publish_failures", "Metric incremented");
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            enqueued: self.enqueued.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            downloads_completed: self.downloads_completed.load(Ordering::Relaxed),
            bytes_downloaded: self.bytes_downloaded.load(Ordering::Relaxed),
            resolve_failures: self.resolve_failures.load(Ordering::Relaxed),
            download_failures: self.download_failures.load(Ordering::Relaxed),
            publish_failures: self.publish_failures.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub enqueued: u64,
    pub cache_hits: u64,
    pub downloads_completed: u64,
    pub bytes_downloaded: u64,
    pub resolve_failures: u64,
    pub download_failures: u64,
    pub publish_failures: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_reflects_counters() {
        let metrics = Metrics::new();
        metrics.request_enqueued();
        metrics.request_enqueued();
        metrics.cache_hit();
        metrics.download_completed(1000);
        metrics.publish_failed();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.enqueued, 2);
        assert_eq!(snapshot.cache_hits, 1);
        assert_eq!(snapshot.downloads_completed, 1);
        assert_eq!(snapshot.bytes_downloaded, 1000);
        assert_eq!(snapshot.publish_failures, 1);
        assert_eq!(snapshot.resolve_failures, 0);
    }
}
