//! # IVF Index (Inverted File)
//!
//! Approximate search over vectors partitioned by a k-means coarse quantizer.
//!
//! ## Lifecycle
//!
//! ```text
//!  insert ──> pending buffer ──(train_size reached / train())──> k-means
//!                  │                                                │
//!                  ▼                                                ▼
//!            exact search                         nlist inverted lists
//!          while untrained                   search scans nprobe closest
//! ```
//!
//! Until the quantizer is trained every vector lives in the pending buffer
//! and search is exact. Training assigns the buffer to lists; later inserts
//! go straight to the list of their nearest centroid.

use std::collections::HashMap;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use parking_lot::RwLock;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tracing::{debug, info};

use vidst_core::error::{Error, Result};
use vidst_core::{DistanceMetric, IvfParams};

use crate::distance::{distance, l2_distance_squared, metric_from_byte, metric_to_byte, prepare};
use crate::traits::{check_dimension_header, check_payload, top_k, SearchResult, VectorIndex};

const IVF_INDEX_MAGIC: &[u8; 8] = b"VIDSIVF\0";
const IVF_INDEX_VERSION: u32 = 1;
/// magic + version + dimension + metric + params + seed + centroid count
const IVF_HEADER_BYTES: u64 = 8 + 4 + 4 + 1 + (4 + 4 + 8 + 4) + 8 + 4;

/// IVF index configuration
#[derive(Debug, Clone)]
pub struct IvfConfig {
    pub dimension: usize,
    pub metric: DistanceMetric,
    pub params: IvfParams,
    /// Seed for centroid initialisation, so training is reproducible
    pub seed: u64,
}

impl IvfConfig {
    pub fn new(dimension: usize, metric: DistanceMetric, params: IvfParams) -> Self {
        Self {
            dimension,
            metric,
            params,
            seed: 0x5eed,
        }
    }
}

/// Where a vector currently lives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Pending(usize),
    List(usize, usize),
}

#[derive(Default)]
struct Postings {
    ids: Vec<u64>,
    vectors: Vec<f32>,
}

impl Postings {
    fn push(&mut self, id: u64, vector: &[f32]) -> usize {
        self.ids.push(id);
        self.vectors.extend_from_slice(vector);
        self.ids.len() - 1
    }

    /// Swap-remove `pos`, returning the id that moved into it
    fn swap_remove(&mut self, pos: usize, dim: usize) -> Option<u64> {
        let last = self.ids.len() - 1;
        let moved = if pos != last {
            self.vectors.copy_within(last * dim..(last + 1) * dim, pos * dim);
            self.ids[pos] = self.ids[last];
            Some(self.ids[pos])
        } else {
            None
        };
        self.ids.truncate(last);
        self.vectors.truncate(last * dim);
        moved
    }

    fn vector(&self, pos: usize, dim: usize) -> &[f32] {
        &self.vectors[pos * dim..(pos + 1) * dim]
    }

    fn iter<'a>(&'a self, dim: usize) -> impl Iterator<Item = (u64, &'a [f32])> + 'a {
        self.ids.iter().copied().zip(self.vectors.chunks_exact(dim))
    }

    fn len(&self) -> usize {
        self.ids.len()
    }
}

#[derive(Default)]
struct IvfState {
    centroids: Vec<Vec<f32>>,
    lists: Vec<Postings>,
    pending: Postings,
    slots: HashMap<u64, Slot>,
}

impl IvfState {
    fn is_trained(&self) -> bool {
        !self.centroids.is_empty()
    }

    fn nearest_centroid(&self, vector: &[f32]) -> usize {
        nearest(&self.centroids, vector)
    }

    fn detach(&mut self, id: u64, dim: usize) -> bool {
        let Some(slot) = self.slots.remove(&id) else {
            return false;
        };
        match slot {
            Slot::Pending(pos) => {
                if let Some(moved) = self.pending.swap_remove(pos, dim) {
                    self.slots.insert(moved, Slot::Pending(pos));
                }
            }
            Slot::List(list, pos) => {
                if let Some(moved) = self.lists[list].swap_remove(pos, dim) {
                    self.slots.insert(moved, Slot::List(list, pos));
                }
            }
        }
        true
    }

    fn attach(&mut self, id: u64, vector: &[f32]) {
        let slot = if self.is_trained() {
            let list = self.nearest_centroid(vector);
            Slot::List(list, self.lists[list].push(id, vector))
        } else {
            Slot::Pending(self.pending.push(id, vector))
        };
        self.slots.insert(id, slot);
    }

    fn len(&self) -> usize {
        self.slots.len()
    }
}

/// Inverted-file index with a k-means coarse quantizer
pub struct IvfIndex {
    config: IvfConfig,
    state: RwLock<IvfState>,
}

impl IvfIndex {
    pub fn new(config: IvfConfig) -> Self {
        Self {
            config,
            state: RwLock::new(IvfState::default()),
        }
    }

    pub fn config(&self) -> &IvfConfig {
        &self.config
    }

    /// Number of vectors waiting for the quantizer to be trained
    pub fn pending_len(&self) -> usize {
        self.state.read().pending.len()
    }

    /// Sizes of the inverted lists (empty until trained)
    pub fn list_sizes(&self) -> Vec<usize> {
        self.state.read().lists.iter().map(Postings::len).collect()
    }

    fn train_locked(&self, state: &mut IvfState) -> Result<()> {
        if state.is_trained() {
            return Ok(());
        }

        let dim = self.config.dimension;
        let nlist = self.config.params.nlist;
        let n = state.pending.len();
        if n < nlist {
            return Err(Error::VectorIndex {
                message: format!("IVF training needs at least {} vectors, have {}", nlist, n),
            });
        }

        let samples: Vec<&[f32]> = state.pending.vectors.chunks_exact(dim).collect();
        let centroids = kmeans(
            &samples,
            nlist,
            self.config.params.iterations,
            self.config.seed,
        );
        drop(samples);

        state.centroids = centroids;
        state.lists = (0..nlist).map(|_| Postings::default()).collect();

        let pending = std::mem::take(&mut state.pending);
        for (id, vector) in pending.iter(dim) {
            let list = state.nearest_centroid(vector);
            let pos = state.lists[list].push(id, vector);
            state.slots.insert(id, Slot::List(list, pos));
        }

        info!(
            "IVF quantizer trained: vectors={}, nlist={}, largest_list={}",
            n,
            nlist,
            state.lists.iter().map(Postings::len).max().unwrap_or(0)
        );
        Ok(())
    }

    /// Swap in new search parameters, e.g. a different `nprobe` from the
    /// current config. `nlist` is fixed once the index exists.
    pub fn with_params(mut self, params: IvfParams) -> Result<Self> {
        if params.nlist != self.config.params.nlist {
            return Err(Error::VectorIndex {
                message: format!(
                    "IVF index has nlist {}, cannot switch to {}",
                    self.config.params.nlist, params.nlist
                ),
            });
        }
        params.validate()?;
        self.config.params = params;
        Ok(self)
    }

    /// Load index from disk
    pub fn load(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        let file_len = file.metadata()?.len();
        let mut file = BufReader::new(file);

        let mut magic = [0u8; 8];
        file.read_exact(&mut magic)?;
        if &magic != IVF_INDEX_MAGIC {
            return Err(Error::VectorIndex {
                message: "Invalid IVF index magic".to_string(),
            });
        }
        let version = file.read_u32::<LittleEndian>()?;
        if version != IVF_INDEX_VERSION {
            return Err(Error::VectorIndex {
                message: format!("Unsupported IVF index version: {}", version),
            });
        }

        let dimension = file.read_u32::<LittleEndian>()? as usize;
        check_dimension_header(dimension)?;
        let metric = metric_from_byte(file.read_u8()?).ok_or_else(|| Error::VectorIndex {
            message: "Invalid metric".to_string(),
        })?;
        let params = IvfParams {
            nlist: file.read_u32::<LittleEndian>()? as usize,
            nprobe: file.read_u32::<LittleEndian>()? as usize,
            train_size: file.read_u64::<LittleEndian>()? as usize,
            iterations: file.read_u32::<LittleEndian>()? as usize,
        };
        params.validate().map_err(|e| Error::VectorIndex {
            message: format!("Corrupt IVF parameters: {}", e),
        })?;
        let seed = file.read_u64::<LittleEndian>()?;

        let vector_bytes = 4 * dimension as u64;
        let mut consumed = IVF_HEADER_BYTES;
        let centroid_count = check_payload(
            file_len.saturating_sub(consumed),
            file.read_u32::<LittleEndian>()? as u64,
            vector_bytes,
            "centroids",
        )?;
        if centroid_count != 0 && centroid_count != params.nlist {
            return Err(Error::VectorIndex {
                message: format!(
                    "Corrupt IVF index: {} centroids for nlist {}",
                    centroid_count, params.nlist
                ),
            });
        }
        let mut centroids = Vec::with_capacity(centroid_count);
        for _ in 0..centroid_count {
            let mut c = vec![0.0f32; dimension];
            file.read_f32_into::<LittleEndian>(&mut c)?;
            centroids.push(c);
        }
        consumed += centroid_count as u64 * vector_bytes + 8;

        let index = Self::new(IvfConfig { dimension, metric, params, seed });
        {
            let mut state = index.state.write();
            if !centroids.is_empty() {
                state.lists = (0..centroids.len()).map(|_| Postings::default()).collect();
                state.centroids = centroids;
            }

            let n = check_payload(
                file_len.saturating_sub(consumed),
                file.read_u64::<LittleEndian>()?,
                8 + vector_bytes,
                "vectors",
            )?;
            let mut vector = vec![0.0f32; dimension];
            for _ in 0..n {
                let id = file.read_u64::<LittleEndian>()?;
                file.read_f32_into::<LittleEndian>(&mut vector)?;
                // Already prepared when saved
                state.attach(id, &vector);
            }
        }

        debug!("Loaded IVF index from {:?}", path);
        Ok(index)
    }
}

impl VectorIndex for IvfIndex {
    fn insert(&self, id: u64, vector: &[f32]) -> Result<()> {
        if vector.len() != self.config.dimension {
            return Err(Error::DimensionMismatch {
                expected: self.config.dimension,
                actual: vector.len(),
            });
        }

        let prepared = prepare(self.config.metric, vector);
        let mut state = self.state.write();
        state.detach(id, self.config.dimension);
        state.attach(id, &prepared);

        if !state.is_trained() && state.pending.len() >= self.config.params.train_size {
            self.train_locked(&mut state)?;
        }
        Ok(())
    }

    fn remove(&self, id: u64) -> bool {
        self.state.write().detach(id, self.config.dimension)
    }

    fn search(&self, query: &[f32], k: usize) -> Vec<SearchResult> {
        let dim = self.config.dimension;
        if query.len() != dim || k == 0 {
            return Vec::new();
        }

        let metric = self.config.metric;
        let query = prepare(metric, query);
        let state = self.state.read();

        let score = |(id, vec): (u64, &[f32])| SearchResult {
            id,
            distance: distance(metric, &query, vec),
        };

        if !state.is_trained() {
            return top_k(state.pending.iter(dim).map(score), k);
        }

        // Rank clusters by centroid proximity and scan the closest nprobe
        let mut nearest_lists: Vec<(f32, usize)> = state
            .centroids
            .iter()
            .enumerate()
            .map(|(i, c)| (l2_distance_squared(&query, c), i))
            .collect();
        nearest_lists.sort_by(|a, b| a.0.total_cmp(&b.0));
        nearest_lists.truncate(self.config.params.nprobe);

        let candidates = nearest_lists
            .iter()
            .flat_map(|&(_, list)| state.lists[list].iter(dim))
            .map(score);
        top_k(candidates, k)
    }

    fn get(&self, id: u64) -> Option<Vec<f32>> {
        let dim = self.config.dimension;
        let state = self.state.read();
        match *state.slots.get(&id)? {
            Slot::Pending(pos) => Some(state.pending.vector(pos, dim).to_vec()),
            Slot::List(list, pos) => Some(state.lists[list].vector(pos, dim).to_vec()),
        }
    }

    fn len(&self) -> usize {
        self.state.read().len()
    }

    fn dimension(&self) -> usize {
        self.config.dimension
    }

    fn metric(&self) -> DistanceMetric {
        self.config.metric
    }

    fn is_trained(&self) -> bool {
        self.state.read().is_trained()
    }

    /// Train the quantizer on the pending buffer now.
    ///
    /// Needs at least `nlist` buffered vectors. Training an already trained
    /// index is a no-op.
    fn train(&self) -> Result<()> {
        let mut state = self.state.write();
        self.train_locked(&mut state)
    }

    fn memory_usage(&self) -> u64 {
        let state = self.state.read();
        let dim = self.config.dimension;
        let float = std::mem::size_of::<f32>();
        let vectors = state.len() * dim * float;
        let ids = state.len() * (std::mem::size_of::<u64>() * 2 + std::mem::size_of::<Slot>());
        let centroids = state.centroids.len() * dim * float;
        (vectors + ids + centroids) as u64
    }

    fn clear(&self) {
        let mut state = self.state.write();
        state.pending = Postings::default();
        for list in state.lists.iter_mut() {
            *list = Postings::default();
        }
        state.slots.clear();
    }

    fn save(&self, path: &Path) -> Result<()> {
        let mut file = BufWriter::new(std::fs::File::create(path)?);
        let state = self.state.read();
        let params = &self.config.params;
        let dim = self.config.dimension;

        file.write_all(IVF_INDEX_MAGIC)?;
        file.write_u32::<LittleEndian>(IVF_INDEX_VERSION)?;
        file.write_u32::<LittleEndian>(dim as u32)?;
        file.write_u8(metric_to_byte(self.config.metric))?;
        file.write_u32::<LittleEndian>(params.nlist as u32)?;
        file.write_u32::<LittleEndian>(params.nprobe as u32)?;
        file.write_u64::<LittleEndian>(params.train_size as u64)?;
        file.write_u32::<LittleEndian>(params.iterations as u32)?;
        file.write_u64::<LittleEndian>(self.config.seed)?;

        file.write_u32::<LittleEndian>(state.centroids.len() as u32)?;
        for centroid in &state.centroids {
            for &v in centroid {
                file.write_f32::<LittleEndian>(v)?;
            }
        }

        file.write_u64::<LittleEndian>(state.len() as u64)?;
        let entries = state
            .pending
            .iter(dim)
            .chain(state.lists.iter().flat_map(|l| l.iter(dim)));
        for (id, vector) in entries {
            file.write_u64::<LittleEndian>(id)?;
            for &v in vector {
                file.write_f32::<LittleEndian>(v)?;
            }
        }

        file.flush()?;
        Ok(())
    }
}

fn nearest(centroids: &[Vec<f32>], vector: &[f32]) -> usize {
    let mut best = 0;
    let mut best_dist = f32::MAX;
    for (idx, centroid) in centroids.iter().enumerate() {
        let dist = l2_distance_squared(vector, centroid);
        if dist < best_dist {
            best_dist = dist;
            best = idx;
        }
    }
    best
}

/// Lloyd's k-means with random (seeded) initial centroids
fn kmeans(vectors: &[&[f32]], k: usize, iterations: usize, seed: u64) -> Vec<Vec<f32>> {
    if vectors.is_empty() || k == 0 {
        return Vec::new();
    }

    let dim = vectors[0].len();
    let mut rng = StdRng::seed_from_u64(seed);
    let mut indices: Vec<usize> = (0..vectors.len()).collect();
    indices.shuffle(&mut rng);

    let mut centroids: Vec<Vec<f32>> = indices
        .into_iter()
        .take(k)
        .map(|i| vectors[i].to_vec())
        .collect();

    for _ in 0..iterations {
        let mut sums = vec![vec![0.0f32; dim]; k];
        let mut counts = vec![0usize; k];

        for vector in vectors {
            let c = nearest(&centroids, vector);
            counts[c] += 1;
            for (acc, v) in sums[c].iter_mut().zip(vector.iter()) {
                *acc += v;
            }
        }

        let mut moved = false;
        for (c, (sum, count)) in sums.into_iter().zip(counts).enumerate() {
            // Empty clusters keep their previous centroid
            if count == 0 {
                continue;
            }
            let updated: Vec<f32> = sum.into_iter().map(|s| s / count as f32).collect();
            if updated != centroids[c] {
                moved = true;
                centroids[c] = updated;
            }
        }

        if !moved {
            break;
        }
    }

    centroids
}
