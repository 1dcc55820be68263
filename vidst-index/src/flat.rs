//! # Flat Index (Brute-Force Exact Search)
//!
//! The index that searches everything. Used for:
//! 1. Small collections where clustering overhead isn't worth it
//! 2. Ground truth when measuring IVF recall
//!
//! ## Architecture
//! - Vectors stored in one contiguous buffer (cache-friendly)
//! - Removal swaps the last vector into the hole
//! - Search: O(n) distance calculations, keep top-K in a heap

use std::collections::HashMap;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use parking_lot::RwLock;

use vidst_core::error::{Error, Result};
use vidst_core::DistanceMetric;

use crate::distance::{distance, metric_from_byte, metric_to_byte, prepare};
use crate::traits::{
    check_dimension_header, check_payload, top_k, IndexConfig, SearchResult, VectorIndex,
};

const FLAT_INDEX_MAGIC: &[u8; 8] = b"VIDSFLAT";
const FLAT_INDEX_VERSION: u32 = 1;
/// magic + version + dimension + metric + count
const FLAT_HEADER_BYTES: u64 = 8 + 4 + 4 + 1 + 8;

#[derive(Default)]
struct FlatData {
    /// Contiguous vector storage: [v0_d0, v0_d1, ..., v0_dn, v1_d0, ...]
    vectors: Vec<f32>,
    /// Vector IDs, parallel to `vectors`
    ids: Vec<u64>,
    /// ID -> slot
    slots: HashMap<u64, usize>,
}

/// Flat index for exact nearest neighbor search
pub struct FlatIndex {
    config: IndexConfig,
    data: RwLock<FlatData>,
}

impl FlatIndex {
    /// Create new flat index
    pub fn new(config: IndexConfig) -> Self {
        Self {
            config,
            data: RwLock::new(FlatData::default()),
        }
    }

    /// Create with pre-allocated capacity
    pub fn with_capacity(config: IndexConfig, capacity: usize) -> Self {
        let dim = config.dimension;
        Self {
            config,
            data: RwLock::new(FlatData {
                vectors: Vec::with_capacity(capacity * dim),
                ids: Vec::with_capacity(capacity),
                slots: HashMap::with_capacity(capacity),
            }),
        }
    }

    fn check_dimension(&self, vector: &[f32]) -> Result<()> {
        if vector.len() != self.config.dimension {
            return Err(Error::DimensionMismatch {
                expected: self.config.dimension,
                actual: vector.len(),
            });
        }
        Ok(())
    }

    /// Load index from disk
    pub fn load(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        let file_len = file.metadata()?.len();
        let mut file = BufReader::new(file);

        let mut magic = [0u8; 8];
        file.read_exact(&mut magic)?;
        if &magic != FLAT_INDEX_MAGIC {
            return Err(Error::VectorIndex {
                message: "Invalid flat index magic".to_string(),
            });
        }

        let version = file.read_u32::<LittleEndian>()?;
        if version != FLAT_INDEX_VERSION {
            return Err(Error::VectorIndex {
                message: format!("Unsupported flat index version: {}", version),
            });
        }

        let dimension = file.read_u32::<LittleEndian>()? as usize;
        check_dimension_header(dimension)?;
        let metric = metric_from_byte(file.read_u8()?).ok_or_else(|| Error::VectorIndex {
            message: "Invalid metric".to_string(),
        })?;
        let n = check_payload(
            file_len.saturating_sub(FLAT_HEADER_BYTES),
            file.read_u64::<LittleEndian>()?,
            8 + 4 * dimension as u64,
            "vectors",
        )?;

        let mut ids = Vec::with_capacity(n);
        for _ in 0..n {
            ids.push(file.read_u64::<LittleEndian>()?);
        }

        let mut vectors = vec![0.0f32; n * dimension];
        file.read_f32_into::<LittleEndian>(&mut vectors)?;

        let slots = ids.iter().enumerate().map(|(slot, &id)| (id, slot)).collect();

        Ok(Self {
            config: IndexConfig { dimension, metric },
            data: RwLock::new(FlatData { vectors, ids, slots }),
        })
    }
}

impl VectorIndex for FlatIndex {
    fn insert(&self, id: u64, vector: &[f32]) -> Result<()> {
        self.check_dimension(vector)?;
        let prepared = prepare(self.config.metric, vector);
        let dim = self.config.dimension;

        let mut data = self.data.write();
        if let Some(&slot) = data.slots.get(&id) {
            data.vectors[slot * dim..(slot + 1) * dim].copy_from_slice(&prepared);
            return Ok(());
        }

        let slot = data.ids.len();
        data.vectors.extend_from_slice(&prepared);
        data.ids.push(id);
        data.slots.insert(id, slot);
        Ok(())
    }

    fn remove(&self, id: u64) -> bool {
        let dim = self.config.dimension;
        let mut data = self.data.write();

        let Some(slot) = data.slots.remove(&id) else {
            return false;
        };

        let last = data.ids.len() - 1;
        if slot != last {
            let moved_id = data.ids[last];
            data.vectors.copy_within(last * dim..(last + 1) * dim, slot * dim);
            data.ids[slot] = moved_id;
            data.slots.insert(moved_id, slot);
        }
        data.ids.truncate(last);
        data.vectors.truncate(last * dim);
        true
    }

    fn search(&self, query: &[f32], k: usize) -> Vec<SearchResult> {
        if query.len() != self.config.dimension {
            return Vec::new();
        }

        let metric = self.config.metric;
        let query = prepare(metric, query);
        let data = self.data.read();

        let candidates = data
            .vectors
            .chunks_exact(self.config.dimension)
            .zip(data.ids.iter())
            .map(|(vec, &id)| SearchResult {
                id,
                distance: distance(metric, &query, vec),
            });

        top_k(candidates, k)
    }

    fn get(&self, id: u64) -> Option<Vec<f32>> {
        let data = self.data.read();
        let dim = self.config.dimension;
        data.slots
            .get(&id)
            .map(|&slot| data.vectors[slot * dim..(slot + 1) * dim].to_vec())
    }

    fn len(&self) -> usize {
        self.data.read().ids.len()
    }

    fn dimension(&self) -> usize {
        self.config.dimension
    }

    fn metric(&self) -> DistanceMetric {
        self.config.metric
    }

    fn memory_usage(&self) -> u64 {
        let data = self.data.read();
        (data.vectors.capacity() * std::mem::size_of::<f32>()
            + data.ids.capacity() * std::mem::size_of::<u64>()
            + data.slots.capacity() * (std::mem::size_of::<u64>() + std::mem::size_of::<usize>()))
            as u64
    }

    fn clear(&self) {
        let mut data = self.data.write();
        data.vectors.clear();
        data.ids.clear();
        data.slots.clear();
    }

    fn save(&self, path: &Path) -> Result<()> {
        let mut file = BufWriter::new(std::fs::File::create(path)?);
        let data = self.data.read();

        // Header
        file.write_all(FLAT_INDEX_MAGIC)?;
        file.write_u32::<LittleEndian>(FLAT_INDEX_VERSION)?;
        file.write_u32::<LittleEndian>(self.config.dimension as u32)?;
        file.write_u8(metric_to_byte(self.config.metric))?;
        file.write_u64::<LittleEndian>(data.ids.len() as u64)?;

        for &id in data.ids.iter() {
            file.write_u64::<LittleEndian>(id)?;
        }
        for &v in data.vectors.iter() {
            file.write_f32::<LittleEndian>(v)?;
        }

        file.flush()?;
        Ok(())
    }
}
