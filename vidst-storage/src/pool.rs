//! # Storage Pool
//!
//! Bounded pool of independent [`VectorStorage`] instances.
//!
//! A tokio semaphore with `max_size` permits bounds how many instances can be
//! checked out at once. Holding a permit guarantees that either an idle
//! instance exists or the pool is below `max_size` and may grow, so callers
//! past the limit simply wait for a permit until `acquire_timeout` expires.
//!
//! ```text
//!  acquire ──► permit? ──► idle instance? ──► PooledStorage
//!                 │              │ no
//!                 │ timeout      └──► create (total < max_size)
//!                 ▼
//!           PoolExhausted                drop / release ──► idle
//! ```

use std::ops::Deref;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};
use tracing::{debug, info, warn};

use vidst_core::error::{Error, Result};
use vidst_core::metrics::Metrics;
use vidst_core::{PoolConfig, VectorStorageConfig};

use crate::vector_storage::VectorStorage;

/// Pool statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Instances alive, idle or checked out
    pub total: usize,
    pub idle: usize,
    pub in_use: usize,
    /// Successful acquisitions since creation
    pub acquired: u64,
    pub timeouts: u64,
    /// Instances constructed since creation
    pub created: u64,
}

struct PoolInner {
    pool_config: PoolConfig,
    storage_config: VectorStorageConfig,
    idle: Mutex<Vec<VectorStorage>>,
    permits: Arc<Semaphore>,
    closed: AtomicBool,
    total: AtomicUsize,
    acquired: AtomicU64,
    timeouts: AtomicU64,
    created: AtomicU64,
    metrics: Metrics,
}

impl PoolInner {
    fn create_storage(&self) -> Result<VectorStorage> {
        let storage =
            VectorStorage::with_metrics(self.storage_config.clone(), self.metrics.clone())?;
        self.total.fetch_add(1, Ordering::AcqRel);
        self.created.fetch_add(1, Ordering::Relaxed);
        Ok(storage)
    }

    fn checkout(self: &Arc<Self>, permit: OwnedSemaphorePermit) -> Result<PooledStorage> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::PoolClosed);
        }

        let reused = self.idle.lock().pop();
        let storage = match reused {
            Some(storage) => storage,
            None => {
                let storage = self.create_storage()?;
                debug!(
                    "Storage pool grew to {} instances",
                    self.total.load(Ordering::Acquire)
                );
                storage
            }
        };

        self.acquired.fetch_add(1, Ordering::Relaxed);
        self.metrics.record_pool_acquire();
        Ok(PooledStorage {
            storage: Some(storage),
            pool: Arc::clone(self),
            _permit: permit,
        })
    }

    fn give_back(&self, storage: VectorStorage) {
        // Checked under the idle lock so close() cannot miss this instance
        let mut idle = self.idle.lock();
        if self.closed.load(Ordering::Acquire) {
            self.total.fetch_sub(1, Ordering::AcqRel);
            return;
        }
        idle.push(storage);
    }
}

/// Pool of vector storages sharing one configuration
#[derive(Clone)]
pub struct VectorStoragePool {
    inner: Arc<PoolInner>,
}

impl VectorStoragePool {
    /// Create a pool and eagerly build `min_size` instances
    pub fn new(pool_config: PoolConfig, storage_config: VectorStorageConfig) -> Result<Self> {
        Self::with_metrics(pool_config, storage_config, Metrics::new())
    }

    pub fn with_metrics(
        pool_config: PoolConfig,
        storage_config: VectorStorageConfig,
        metrics: Metrics,
    ) -> Result<Self> {
        pool_config.validate()?;
        storage_config.validate()?;

        let inner = Arc::new(PoolInner {
            permits: Arc::new(Semaphore::new(pool_config.max_size)),
            idle: Mutex::new(Vec::with_capacity(pool_config.max_size)),
            closed: AtomicBool::new(false),
            total: AtomicUsize::new(0),
            acquired: AtomicU64::new(0),
            timeouts: AtomicU64::new(0),
            created: AtomicU64::new(0),
            pool_config,
            storage_config,
            metrics,
        });

        {
            let mut idle = inner.idle.lock();
            for _ in 0..inner.pool_config.min_size {
                idle.push(inner.create_storage()?);
            }
        }

        info!(
            "Storage pool initialized: min={}, max={}, dimension={}",
            inner.pool_config.min_size, inner.pool_config.max_size, inner.storage_config.dimension
        );
        Ok(Self { inner })
    }

    pub fn config(&self) -> &PoolConfig {
        &self.inner.pool_config
    }

    /// Check out an instance, waiting up to `acquire_timeout` when all
    /// `max_size` instances are in use
    pub async fn acquire(&self) -> Result<PooledStorage> {
        if self.is_closed() {
            return Err(Error::PoolClosed);
        }

        let timeout = self.inner.pool_config.acquire_timeout();
        let started = Instant::now();
        let permits = Arc::clone(&self.inner.permits);

        let permit = match tokio::time::timeout(timeout, permits.acquire_owned()).await {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => return Err(Error::PoolClosed),
            Err(_) => {
                self.inner.timeouts.fetch_add(1, Ordering::Relaxed);
                self.inner.metrics.record_pool_timeout();
                let waited_ms = started.elapsed().as_millis() as u64;
                warn!(
                    "Storage pool exhausted: max={}, waited_ms={}",
                    self.inner.pool_config.max_size, waited_ms
                );
                return Err(Error::PoolExhausted {
                    max_size: self.inner.pool_config.max_size,
                    waited_ms,
                });
            }
        };

        self.inner.checkout(permit)
    }

    /// Check out an instance without waiting
    pub fn try_acquire(&self) -> Result<PooledStorage> {
        let permit = match Arc::clone(&self.inner.permits).try_acquire_owned() {
            Ok(permit) => permit,
            Err(TryAcquireError::Closed) => return Err(Error::PoolClosed),
            Err(TryAcquireError::NoPermits) => {
                return Err(Error::PoolExhausted {
                    max_size: self.inner.pool_config.max_size,
                    waited_ms: 0,
                })
            }
        };
        self.inner.checkout(permit)
    }

    /// Return an instance. Dropping the guard does the same.
    pub fn release(&self, storage: PooledStorage) {
        drop(storage);
    }

    /// Refuse new acquisitions and drop idle instances. Checked-out
    /// instances are dropped when their guards are.
    pub fn close(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.inner.permits.close();
        let dropped = {
            let mut idle = self.inner.idle.lock();
            let n = idle.len();
            idle.clear();
            n
        };
        self.inner.total.fetch_sub(dropped, Ordering::AcqRel);
        info!("Storage pool closed: dropped {} idle instances", dropped);
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> PoolStats {
        let idle = self.inner.idle.lock().len();
        let total = self.inner.total.load(Ordering::Acquire);
        PoolStats {
            total,
            idle,
            in_use: total.saturating_sub(idle),
            acquired: self.inner.acquired.load(Ordering::Relaxed),
            timeouts: self.inner.timeouts.load(Ordering::Relaxed),
            created: self.inner.created.load(Ordering::Relaxed),
        }
    }
}

/// A checked-out storage. Goes back to the pool on drop.
pub struct PooledStorage {
    storage: Option<VectorStorage>,
    pool: Arc<PoolInner>,
    // Released after the storage is back in the idle list
    _permit: OwnedSemaphorePermit,
}

impl Deref for PooledStorage {
    type Target = VectorStorage;

    fn deref(&self) -> &VectorStorage {
        // Only taken in Drop
        self.storage.as_ref().unwrap_or_else(|| unreachable!())
    }
}

impl Drop for PooledStorage {
    fn drop(&mut self) {
        if let Some(storage) = self.storage.take() {
            self.pool.give_back(storage);
        }
    }
}
