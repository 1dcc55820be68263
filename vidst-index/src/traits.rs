//! # Vector Index Traits
//!
//! Common interface for all vector index implementations.

use std::path::Path;

use vidst_core::error::{Error, Result};
use vidst_core::types::MAX_DIMENSION;
use vidst_core::DistanceMetric;

/// Search result with ID and distance
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    pub id: u64,
    pub distance: f32,
}

impl Eq for SearchResult {}

impl PartialOrd for SearchResult {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SearchResult {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // BinaryHeap is a max-heap: the worst (largest) distance sits on top
        // and is popped first when the heap grows past k. Ties break on id.
        self.distance
            .total_cmp(&other.distance)
            .then_with(|| self.id.cmp(&other.id))
    }
}

/// Vector index trait, implemented by the flat and IVF indexes
pub trait VectorIndex: Send + Sync {
    /// Insert a vector with given ID. An existing ID is replaced.
    fn insert(&self, id: u64, vector: &[f32]) -> Result<()>;

    /// Remove a vector, returning whether it was present
    fn remove(&self, id: u64) -> bool;

    /// Search for k nearest neighbors, closest first
    fn search(&self, query: &[f32], k: usize) -> Vec<SearchResult>;

    /// Get stored vector by ID. Cosine indexes return the normalized copy.
    fn get(&self, id: u64) -> Option<Vec<f32>>;

    /// Number of vectors in index
    fn len(&self) -> usize;

    /// Check if empty
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Vector dimension
    fn dimension(&self) -> usize;

    /// Distance metric
    fn metric(&self) -> DistanceMetric;

    /// Whether the index is ready for its intended search strategy
    fn is_trained(&self) -> bool {
        true
    }

    /// Build whatever search structure the index needs from its current
    /// contents. Indexes without a training phase do nothing.
    fn train(&self) -> Result<()> {
        Ok(())
    }

    /// Estimated heap bytes held by the index
    fn memory_usage(&self) -> u64;

    /// Drop every vector (trained state is kept)
    fn clear(&self);

    /// Save index to disk
    fn save(&self, path: &Path) -> Result<()>;
}

/// Flat index configuration
#[derive(Debug, Clone)]
pub struct IndexConfig {
    /// Vector dimension
    pub dimension: usize,
    /// Distance metric
    pub metric: DistanceMetric,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            dimension: 512,
            metric: DistanceMetric::Cosine,
        }
    }
}

/// Collect the `k` closest results from a stream of candidates
pub(crate) fn top_k<I>(candidates: I, k: usize) -> Vec<SearchResult>
where
    I: IntoIterator<Item = SearchResult>,
{
    if k == 0 {
        return Vec::new();
    }

    let mut heap = std::collections::BinaryHeap::with_capacity(k + 1);
    for candidate in candidates {
        heap.push(candidate);
        if heap.len() > k {
            heap.pop();
        }
    }
    heap.into_sorted_vec()
}

/// Reject a header dimension no storage could have written
pub(crate) fn check_dimension_header(dimension: usize) -> Result<()> {
    if dimension == 0 || dimension > MAX_DIMENSION {
        return Err(Error::VectorIndex {
            message: format!("Corrupt index header: dimension {}", dimension),
        });
    }
    Ok(())
}

/// Check that `count` records of `record_bytes` each fit in the `remaining`
/// bytes of an index file, so a corrupt count cannot drive an allocation.
pub(crate) fn check_payload(remaining: u64, count: u64, record_bytes: u64, what: &str) -> Result<usize> {
    let needed = count.checked_mul(record_bytes).ok_or_else(|| Error::VectorIndex {
        message: format!("Corrupt index header: {} count {} overflows", what, count),
    })?;
    if needed > remaining {
        return Err(Error::VectorIndex {
            message: format!(
                "Corrupt index file: {} {} need {} bytes, {} left",
                count, what, needed, remaining
            ),
        });
    }
    usize::try_from(count).map_err(|_| Error::VectorIndex {
        message: format!("Corrupt index header: {} count {} too large", what, count),
    })
}
