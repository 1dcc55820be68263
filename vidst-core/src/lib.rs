//! # Vidst Core
//!
//! Fundamental building blocks for the Vidst storage layer:
//! - Core data structures (videos, scenes, cache entries, vector records)
//! - Configuration with YAML loading
//! - Error types
//! - Metrics counters and common utilities
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                   vidst-core                    │
//! ├─────────────────────────────────────────────────┤
//! │  • types   - Core data structures              │
//! │  • traits  - Async vector store interface      │
//! │  • config  - Storage, pool, quota, cache config│
//! │  • error   - Error handling                    │
//! │  • metrics - Atomic counters and timers        │
//! │  • utils   - Common utilities                  │
//! └─────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod error;
pub mod metrics;
pub mod traits;
pub mod types;
pub mod utils;

// Re-export commonly used types
pub use config::{CacheConfig, Config, IvfParams, PoolConfig, ResourceQuota, VectorStorageConfig};
pub use error::{Error, Result, ResultExt};
pub use metrics::{Metrics, MetricsSnapshot, Timer};
pub use traits::{SearchHit, StoreStats, VectorStore};
pub use types::{
    CacheEntry, DistanceMetric, IndexType, Metadata, ProcessingStatus, Scene, Timestamp,
    VectorMetadata, VectorRecord, Video, VideoFormat, VideoId,
};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
