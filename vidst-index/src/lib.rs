//! # Vidst Vector Index
//!
//! Nearest-neighbour indexes for video embeddings.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Vector Index Layer                        │
//! ├─────────────────────────────────────────────────────────────┤
//! │                                                              │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐     │
//! │  │  Distance   │    │    Flat     │    │     IVF     │     │
//! │  │  Kernels    │    │   Index     │    │   Index     │     │
//! │  │             │    │  (Exact)    │    │  (k-means)  │     │
//! │  └─────────────┘    └─────────────┘    └─────────────┘     │
//! │         │                  │                  │              │
//! │         └──────────────────┴──────────────────┘              │
//! │                           │                                  │
//! │                    VectorIndex Trait                         │
//! │                                                              │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - `distance`: distance kernels and score conversion
//! - `traits`: Common VectorIndex trait
//! - `flat`: Brute-force exact search (ground truth)
//! - `ivf`: Inverted-file index over a k-means coarse quantizer

pub mod distance;
pub mod flat;
pub mod ivf;
pub mod traits;

pub use distance::{
    cosine_similarity, dot_product, l2_distance, l2_distance_squared, normalize, normalized,
    score_from_distance,
};

pub use flat::FlatIndex;
pub use ivf::{IvfConfig, IvfIndex};
pub use traits::{IndexConfig, SearchResult, VectorIndex};
pub use vidst_core::DistanceMetric;
