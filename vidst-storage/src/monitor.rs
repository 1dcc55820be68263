//! # Resource Monitor
//!
//! Tracks memory and vector-count usage against a [`ResourceQuota`].
//!
//! Work that will grow usage first takes a [`ResourceGuard`]. The reservation
//! counts against the quota immediately; it becomes permanent on
//! [`ResourceGuard::commit`] and is rolled back if the guard is dropped.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use vidst_core::error::{Error, Result};
use vidst_core::metrics::Metrics;
use vidst_core::utils::format_bytes;
use vidst_core::ResourceQuota;

/// Current usage relative to the quota
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResourceUsage {
    pub memory_bytes: u64,
    pub vectors: u64,
    /// `memory_bytes / max_memory_bytes`
    pub memory_ratio: f64,
    /// `vectors / max_vectors`
    pub vector_ratio: f64,
}

#[derive(Debug, Default, Clone, Copy)]
struct Usage {
    memory_bytes: u64,
    vectors: u64,
}

struct MonitorInner {
    quota: ResourceQuota,
    usage: Mutex<Usage>,
    metrics: Metrics,
}

impl MonitorInner {
    fn rollback(&self, memory_bytes: u64, vectors: u64) {
        let mut usage = self.usage.lock();
        usage.memory_bytes = usage.memory_bytes.saturating_sub(memory_bytes);
        usage.vectors = usage.vectors.saturating_sub(vectors);
    }
}

/// Quota-enforcing usage tracker. Clones share state.
#[derive(Clone)]
pub struct ResourceMonitor {
    inner: Arc<MonitorInner>,
}

impl ResourceMonitor {
    pub fn new(quota: ResourceQuota) -> Result<Self> {
        Self::with_metrics(quota, Metrics::new())
    }

    pub fn with_metrics(quota: ResourceQuota, metrics: Metrics) -> Result<Self> {
        quota.validate()?;
        info!(
            "Resource monitor initialized: max_memory={}, max_vectors={}",
            format_bytes(quota.max_memory_bytes),
            quota.max_vectors
        );
        Ok(Self {
            inner: Arc::new(MonitorInner {
                quota,
                usage: Mutex::new(Usage::default()),
                metrics,
            }),
        })
    }

    pub fn quota(&self) -> &ResourceQuota {
        &self.inner.quota
    }

    /// Reserve resources, failing if either limit would be exceeded
    pub fn reserve(&self, memory_bytes: u64, vectors: u64) -> Result<ResourceGuard> {
        let quota = &self.inner.quota;
        let mut usage = self.inner.usage.lock();

        let rejected = if usage.memory_bytes.saturating_add(memory_bytes) > quota.max_memory_bytes {
            Some(("memory_bytes", usage.memory_bytes, memory_bytes, quota.max_memory_bytes))
        } else if usage.vectors.saturating_add(vectors) > quota.max_vectors {
            Some(("vectors", usage.vectors, vectors, quota.max_vectors))
        } else {
            None
        };

        if let Some((resource, used, requested, limit)) = rejected {
            drop(usage);
            self.inner.metrics.record_quota_rejection();
            warn!(
                "Quota rejected: resource={}, used={}, requested={}, limit={}",
                resource, used, requested, limit
            );
            return Err(Error::ResourceExhausted {
                resource: resource.to_string(),
                used,
                requested,
                limit,
            });
        }

        usage.memory_bytes += memory_bytes;
        usage.vectors += vectors;
        Ok(ResourceGuard {
            inner: Arc::clone(&self.inner),
            memory_bytes,
            vectors,
            committed: false,
        })
    }

    /// Give back committed usage, e.g. after vectors are removed
    pub fn release(&self, memory_bytes: u64, vectors: u64) {
        self.inner.rollback(memory_bytes, vectors);
    }

    /// Run `f` under a reservation: committed on `Ok`, rolled back on `Err`.
    /// Duration and outcome go to the metrics.
    pub fn track<T, F>(&self, name: &str, memory_bytes: u64, vectors: u64, f: F) -> Result<T>
    where
        F: FnOnce() -> Result<T>,
    {
        let guard = self.reserve(memory_bytes, vectors)?;
        let started = Instant::now();
        let result = f();
        self.finish(name, guard, started, result)
    }

    /// Async form of [`track`](Self::track)
    pub async fn track_async<T, F, Fut>(
        &self,
        name: &str,
        memory_bytes: u64,
        vectors: u64,
        f: F,
    ) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let guard = self.reserve(memory_bytes, vectors)?;
        let started = Instant::now();
        let result = f().await;
        self.finish(name, guard, started, result)
    }

    fn finish<T>(
        &self,
        name: &str,
        guard: ResourceGuard,
        started: Instant,
        result: Result<T>,
    ) -> Result<T> {
        let elapsed = started.elapsed();
        self.inner.metrics.record_operation(elapsed, result.is_ok());

        match &result {
            Ok(_) => {
                debug!(
                    operation = name,
                    memory_bytes = guard.memory_bytes,
                    vectors = guard.vectors,
                    duration_ms = elapsed.as_millis() as u64,
                    "Tracked operation committed"
                );
                guard.commit();
            }
            Err(e) => {
                warn!(
                    operation = name,
                    error_code = e.error_code(),
                    "Tracked operation failed, reservation rolled back: {}",
                    e
                );
                drop(guard);
            }
        }
        result
    }

    pub fn usage(&self) -> ResourceUsage {
        let usage = *self.inner.usage.lock();
        let quota = &self.inner.quota;
        ResourceUsage {
            memory_bytes: usage.memory_bytes,
            vectors: usage.vectors,
            memory_ratio: usage.memory_bytes as f64 / quota.max_memory_bytes as f64,
            vector_ratio: usage.vectors as f64 / quota.max_vectors as f64,
        }
    }

    /// Both ratios are below `max_ratio`
    pub fn is_healthy(&self, max_ratio: f64) -> bool {
        let usage = self.usage();
        usage.memory_ratio < max_ratio && usage.vector_ratio < max_ratio
    }
}

/// A pending reservation
#[must_use = "dropping a ResourceGuard rolls the reservation back"]
pub struct ResourceGuard {
    inner: Arc<MonitorInner>,
    memory_bytes: u64,
    vectors: u64,
    committed: bool,
}

impl ResourceGuard {
    pub fn memory_bytes(&self) -> u64 {
        self.memory_bytes
    }

    pub fn vectors(&self) -> u64 {
        self.vectors
    }

    /// Keep the reserved usage
    pub fn commit(mut self) {
        self.committed = true;
    }
}

impl Drop for ResourceGuard {
    fn drop(&mut self) {
        if !self.committed {
            self.inner.rollback(self.memory_bytes, self.vectors);
        }
    }
}
