//! # Vidst Storage
//!
//! Connection-pooled access to vector storage plus the file-backed cache.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Vector Path                             │
//! │                                                              │
//! │  Config ──> VectorStoragePool ──> PooledStorage              │
//! │                  │                     │                     │
//! │                  ▼                     ▼                     │
//! │            bounded by             ResourceMonitor            │
//! │            semaphore              track(add_batch)           │
//! │                                        │                     │
//! │                                        ▼                     │
//! │                   VectorStorage ──> VectorIndex (flat / IVF) │
//! └─────────────────────────────────────────────────────────────┘
//!
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Cache Path                              │
//! │                                                              │
//! │  set ──> temp file ──> rename ──> <cache_dir>/<key>.cache   │
//! │  get ──> read JSON ──> expired? ──> delete, miss            │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod async_storage;
pub mod file_cache;
pub mod monitor;
pub mod pool;
pub mod vector_storage;

pub use async_storage::AsyncVectorStorage;
pub use file_cache::{CacheStats, FileCache};
pub use monitor::{ResourceGuard, ResourceMonitor, ResourceUsage};
pub use pool::{PoolStats, PooledStorage, VectorStoragePool};
pub use vector_storage::VectorStorage;
