//! # Core Traits
//!
//! The async interface that vector storage front ends implement.
//!
//! 1. **Async-First**: Callers on a runtime never block on index work
//! 2. **Error Propagation**: All operations return Result
//! 3. **Testability**: Pool and monitor code can run against any implementation

use async_trait::async_trait;

use crate::types::{VectorMetadata, VectorRecord};
use crate::Result;

/// Vector similarity search hit. Higher `score` is more similar.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub id: String,
    pub score: f32,
    pub metadata: VectorMetadata,
}

/// Async vector store
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Add or replace one record
    async fn add(&self, record: VectorRecord) -> Result<()>;

    /// Add records, all-or-nothing on validation and capacity
    async fn add_batch(&self, records: Vec<VectorRecord>) -> Result<usize>;

    /// Top-k hits for a query, best first
    async fn search(&self, query: Vec<f32>, k: usize) -> Result<Vec<SearchHit>>;

    /// Top-k hits for each query, in query order
    async fn search_batch(&self, queries: Vec<Vec<f32>>, k: usize) -> Result<Vec<Vec<SearchHit>>>;

    /// Remove a record, returning whether it existed
    async fn remove(&self, id: &str) -> Result<bool>;

    /// Number of stored records
    async fn len(&self) -> Result<usize>;

    /// Store statistics
    async fn stats(&self) -> Result<StoreStats>;
}

/// Vector store statistics
#[derive(Debug, Clone, PartialEq)]
pub struct StoreStats {
    pub vector_count: usize,
    pub dimension: usize,
    pub memory_bytes: u64,
    pub trained: bool,
}
