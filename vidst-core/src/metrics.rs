//! # Metrics and Monitoring
//!
//! Lock-free counters shared by the storage, pool, monitor and cache.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Metrics collector. Cheap to clone; clones share counters.
#[derive(Clone, Default)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

#[derive(Default)]
struct MetricsInner {
    // Vector metrics
    vectors_added: AtomicU64,
    vectors_removed: AtomicU64,
    searches: AtomicU64,
    search_errors: AtomicU64,

    // Cache metrics
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    cache_writes: AtomicU64,
    cache_evictions: AtomicU64,

    // Pool metrics
    pool_acquisitions: AtomicU64,
    pool_timeouts: AtomicU64,

    // Resource metrics
    quota_rejections: AtomicU64,
    tracked_operations: AtomicU64,
    failed_operations: AtomicU64,
    operation_micros: AtomicU64,
}

impl Metrics {
    /// Create new metrics collector
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_vectors_added(&self, count: u64) {
        self.inner.vectors_added.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_vectors_removed(&self, count: u64) {
        self.inner.vectors_removed.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_search(&self, queries: u64) {
        self.inner.searches.fetch_add(queries, Ordering::Relaxed);
    }

    pub fn record_search_error(&self) {
        self.inner.search_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_hit(&self) {
        self.inner.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_miss(&self) {
        self.inner.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_write(&self) {
        self.inner.cache_writes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_eviction(&self, count: u64) {
        self.inner.cache_evictions.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_pool_acquire(&self) {
        self.inner.pool_acquisitions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_pool_timeout(&self) {
        self.inner.pool_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_quota_rejection(&self) {
        self.inner.quota_rejections.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a monitored operation and how long it took
    pub fn record_operation(&self, duration: Duration, success: bool) {
        self.inner.tracked_operations.fetch_add(1, Ordering::Relaxed);
        self.inner
            .operation_micros
            .fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
        if !success {
            self.inner.failed_operations.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Get current metrics snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        let inner = &self.inner;
        MetricsSnapshot {
            vectors_added: inner.vectors_added.load(Ordering::Relaxed),
            vectors_removed: inner.vectors_removed.load(Ordering::Relaxed),
            searches: inner.searches.load(Ordering::Relaxed),
            search_errors: inner.search_errors.load(Ordering::Relaxed),
            cache_hits: inner.cache_hits.load(Ordering::Relaxed),
            cache_misses: inner.cache_misses.load(Ordering::Relaxed),
            cache_writes: inner.cache_writes.load(Ordering::Relaxed),
            cache_evictions: inner.cache_evictions.load(Ordering::Relaxed),
            pool_acquisitions: inner.pool_acquisitions.load(Ordering::Relaxed),
            pool_timeouts: inner.pool_timeouts.load(Ordering::Relaxed),
            quota_rejections: inner.quota_rejections.load(Ordering::Relaxed),
            tracked_operations: inner.tracked_operations.load(Ordering::Relaxed),
            failed_operations: inner.failed_operations.load(Ordering::Relaxed),
            operation_micros: inner.operation_micros.load(Ordering::Relaxed),
        }
    }
}

/// Metrics snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub vectors_added: u64,
    pub vectors_removed: u64,
    pub searches: u64,
    pub search_errors: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub cache_writes: u64,
    pub cache_evictions: u64,
    pub pool_acquisitions: u64,
    pub pool_timeouts: u64,
    pub quota_rejections: u64,
    pub tracked_operations: u64,
    pub failed_operations: u64,
    pub operation_micros: u64,
}

impl MetricsSnapshot {
    pub fn cache_hit_rate(&self) -> f64 {
        let total = self.cache_hits + self.cache_misses;
        if total == 0 {
            0.0
        } else {
            self.cache_hits as f64 / total as f64
        }
    }
}

/// Timer for measuring operation duration
pub struct Timer {
    start: Instant,
    name: String,
}

impl Timer {
    /// Start new timer
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            start: Instant::now(),
            name: name.into(),
        }
    }

    /// Get elapsed time
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Stop timer, log and return the duration
    pub fn stop(self) -> Duration {
        let duration = self.elapsed();
        tracing::debug!(
            name = %self.name,
            duration_ms = duration.as_millis() as u64,
            "Operation completed"
        );
        duration
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_counters() {
        let metrics = Metrics::new();
        let clone = metrics.clone();

        clone.record_cache_hit();
        clone.record_cache_hit();
        metrics.record_cache_miss();
        metrics.record_operation(Duration::from_micros(250), false);

        let snap = metrics.snapshot();
        assert_eq!(snap.cache_hits, 2);
        assert_eq!(snap.cache_misses, 1);
        assert_eq!(snap.tracked_operations, 1);
        assert_eq!(snap.failed_operations, 1);
        assert_eq!(snap.operation_micros, 250);
        assert!((snap.cache_hit_rate() - 2.0 / 3.0).abs() < 1e-9);
    }
}
