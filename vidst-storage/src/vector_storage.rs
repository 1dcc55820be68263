//! # Vector Storage
//!
//! Configuration-driven wrapper around a [`VectorIndex`]. The index only
//! knows `u64` keys; this layer owns the string ids, the per-vector metadata,
//! the capacity limit and the similarity threshold.
//!
//! ## On-disk layout
//!
//! ```text
//! <dir>/
//!   index.bin      binary index (flat or IVF format)
//!   records.json   [{ id, key, metadata }] plus the next free key
//! ```

use std::collections::HashMap;
use std::path::Path;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use vidst_core::error::{Error, Result};
use vidst_core::metrics::{Metrics, Timer};
use vidst_core::{
    IndexType, SearchHit, StoreStats, VectorMetadata, VectorRecord, VectorStorageConfig,
};
use vidst_index::{
    score_from_distance, FlatIndex, IndexConfig, IvfConfig, IvfIndex, VectorIndex,
};

const INDEX_FILE: &str = "index.bin";
const RECORDS_FILE: &str = "records.json";

/// Rough per-record bookkeeping overhead on top of the strings
const RECORD_OVERHEAD: u64 = 96;

#[derive(Debug, Clone)]
struct RecordEntry {
    key: u64,
    metadata: VectorMetadata,
}

#[derive(Default)]
struct RecordTable {
    by_id: HashMap<String, RecordEntry>,
    by_key: HashMap<u64, String>,
    next_key: u64,
}

impl RecordTable {
    fn key_for(&mut self, id: &str) -> u64 {
        match self.by_id.get(id) {
            Some(entry) => entry.key,
            None => {
                let key = self.next_key;
                self.next_key += 1;
                key
            }
        }
    }

    fn upsert(&mut self, id: String, key: u64, metadata: VectorMetadata) {
        self.by_key.insert(key, id.clone());
        self.by_id.insert(id, RecordEntry { key, metadata });
    }

    fn len(&self) -> usize {
        self.by_id.len()
    }
}

#[derive(Serialize, Deserialize)]
struct PersistedRecord {
    id: String,
    key: u64,
    metadata: VectorMetadata,
}

#[derive(Serialize, Deserialize)]
struct PersistedRecords {
    next_key: u64,
    records: Vec<PersistedRecord>,
}

/// Synchronous vector storage
pub struct VectorStorage {
    config: VectorStorageConfig,
    index: Box<dyn VectorIndex>,
    records: RwLock<RecordTable>,
    metrics: Metrics,
}

impl VectorStorage {
    /// Create an empty storage
    pub fn new(config: VectorStorageConfig) -> Result<Self> {
        Self::with_metrics(config, Metrics::new())
    }

    /// Create an empty storage reporting into shared metrics
    pub fn with_metrics(config: VectorStorageConfig, metrics: Metrics) -> Result<Self> {
        config.validate()?;
        let index = build_index(&config);
        debug!(
            "Vector storage created: dimension={}, index={:?}, metric={:?}",
            config.dimension, config.index_type, config.metric
        );
        Ok(Self {
            config,
            index,
            records: RwLock::new(RecordTable::default()),
            metrics,
        })
    }

    pub fn config(&self) -> &VectorStorageConfig {
        &self.config
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub fn dimension(&self) -> usize {
        self.config.dimension
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, id: &str) -> bool {
        self.records.read().by_id.contains_key(id)
    }

    /// Whether the backing index has finished training
    pub fn is_trained(&self) -> bool {
        self.index.is_trained()
    }

    /// Force index training with what has been added so far
    pub fn train(&self) -> Result<()> {
        self.index.train()
    }

    /// Add or replace a single record
    pub fn add(&self, record: VectorRecord) -> Result<()> {
        record.validate(self.config.dimension)?;

        let mut records = self.records.write();
        if !records.by_id.contains_key(&record.id) && records.len() >= self.config.max_vectors {
            return Err(Error::CapacityExceeded {
                current: records.len(),
                requested: 1,
                limit: self.config.max_vectors,
            });
        }

        let key = records.key_for(&record.id);
        self.index.insert(key, &record.vector)?;
        records.upsert(record.id, key, record.metadata);
        drop(records);

        self.metrics.record_vectors_added(1);
        Ok(())
    }

    /// Add many records.
    ///
    /// Every record is validated and the capacity is checked before anything
    /// is inserted, so a rejected batch leaves the storage untouched.
    /// Returns the number of records written.
    pub fn add_batch(&self, batch: Vec<VectorRecord>) -> Result<usize> {
        if batch.is_empty() {
            return Ok(0);
        }

        let timer = Timer::new("vector_storage.add_batch");
        for record in &batch {
            record.validate(self.config.dimension)?;
        }

        let mut records = self.records.write();
        let new_ids = {
            let mut seen = std::collections::HashSet::new();
            batch
                .iter()
                .filter(|r| !records.by_id.contains_key(&r.id) && seen.insert(r.id.as_str()))
                .count()
        };
        if records.len() + new_ids > self.config.max_vectors {
            return Err(Error::CapacityExceeded {
                current: records.len(),
                requested: new_ids,
                limit: self.config.max_vectors,
            });
        }

        let total = batch.len();
        let mut chunks = 0usize;
        let mut pending = batch.into_iter().peekable();
        while pending.peek().is_some() {
            for record in pending.by_ref().take(self.config.batch_size) {
                let key = records.key_for(&record.id);
                self.index.insert(key, &record.vector)?;
                records.upsert(record.id, key, record.metadata);
            }
            chunks += 1;
        }
        drop(records);

        self.metrics.record_vectors_added(total as u64);
        debug!(
            "Added batch: records={}, new={}, chunks={}, elapsed_ms={}",
            total,
            new_ids,
            chunks,
            timer.stop().as_millis()
        );
        Ok(total)
    }

    /// Top-k most similar records, best first.
    ///
    /// Hits scoring below the configured threshold are dropped, so fewer
    /// than `k` hits may come back.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>> {
        self.check_query(query)?;
        self.metrics.record_search(1);
        if k == 0 {
            return Ok(Vec::new());
        }

        let results = self.index.search(query, k);
        let metric = self.config.metric;
        let threshold = self.config.similarity_threshold;

        let records = self.records.read();
        let hits = results
            .into_iter()
            .filter_map(|r| {
                let score = score_from_distance(metric, r.distance);
                if threshold.map_or(false, |t| score < t) {
                    return None;
                }
                // Removed between index search and lookup
                let id = records.by_key.get(&r.id)?;
                let entry = records.by_id.get(id)?;
                Some(SearchHit {
                    id: id.clone(),
                    score,
                    metadata: entry.metadata.clone(),
                })
            })
            .collect();
        Ok(hits)
    }

    /// Run [`search`](Self::search) for every query, preserving order
    pub fn search_batch(&self, queries: &[Vec<f32>], k: usize) -> Result<Vec<Vec<SearchHit>>> {
        let timer = Timer::new("vector_storage.search_batch");
        let results = queries
            .iter()
            .map(|q| self.search(q, k))
            .collect::<Result<Vec<_>>>();
        if results.is_err() {
            self.metrics.record_search_error();
        }
        timer.stop();
        results
    }

    /// Fetch a stored record. Cosine storages hold unit-length vectors.
    pub fn get(&self, id: &str) -> Option<VectorRecord> {
        let records = self.records.read();
        let entry = records.by_id.get(id)?;
        let vector = self.index.get(entry.key)?;
        Some(VectorRecord {
            id: id.to_string(),
            vector,
            metadata: entry.metadata.clone(),
        })
    }

    /// Remove a record, returning whether it existed
    pub fn remove(&self, id: &str) -> bool {
        let mut records = self.records.write();
        let Some(entry) = records.by_id.remove(id) else {
            return false;
        };
        records.by_key.remove(&entry.key);
        self.index.remove(entry.key);
        drop(records);

        self.metrics.record_vectors_removed(1);
        true
    }

    /// Remove every record
    pub fn clear(&self) {
        let mut records = self.records.write();
        let removed = records.len() as u64;
        records.by_id.clear();
        records.by_key.clear();
        self.index.clear();
        drop(records);

        self.metrics.record_vectors_removed(removed);
    }

    /// Estimated bytes held by vectors, index structures and metadata
    pub fn memory_usage(&self) -> u64 {
        let records = self.records.read();
        let metadata: u64 = records
            .by_id
            .iter()
            .map(|(id, e)| {
                RECORD_OVERHEAD
                    + 2 * id.len() as u64
                    + e.metadata.kind.len() as u64
                    + e.metadata.model_version.len() as u64
                    + e.metadata.extra.len() as u64 * 32
            })
            .sum();
        self.index.memory_usage() + metadata
    }

    pub fn stats(&self) -> StoreStats {
        StoreStats {
            vector_count: self.len(),
            dimension: self.config.dimension,
            memory_bytes: self.memory_usage(),
            trained: self.is_trained(),
        }
    }

    /// Persist index and records under `dir`
    pub fn save(&self, dir: impl AsRef<Path>) -> Result<()> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;

        // Hold the record lock so the index and table are saved consistently
        let records = self.records.read();
        let index_tmp = dir.join(format!("{}.tmp", INDEX_FILE));
        self.index.save(&index_tmp)?;
        std::fs::rename(&index_tmp, dir.join(INDEX_FILE))?;

        let persisted = PersistedRecords {
            next_key: records.next_key,
            records: records
                .by_id
                .iter()
                .map(|(id, e)| PersistedRecord {
                    id: id.clone(),
                    key: e.key,
                    metadata: e.metadata.clone(),
                })
                .collect(),
        };
        let tmp = dir.join(format!("{}.tmp", RECORDS_FILE));
        std::fs::write(&tmp, serde_json::to_vec(&persisted)?)?;
        std::fs::rename(&tmp, dir.join(RECORDS_FILE))?;

        info!("Saved vector storage: dir={:?}, records={}", dir, records.len());
        Ok(())
    }

    /// Load a storage saved with [`save`](Self::save)
    pub fn load(dir: impl AsRef<Path>, config: VectorStorageConfig) -> Result<Self> {
        config.validate()?;
        let dir = dir.as_ref();

        let index_path = dir.join(INDEX_FILE);
        let index: Box<dyn VectorIndex> = match config.index_type {
            IndexType::Flat => Box::new(FlatIndex::load(&index_path)?),
            // nlist must match what was trained; nprobe and friends follow the config
            IndexType::Ivf => Box::new(IvfIndex::load(&index_path)?.with_params(config.ivf.clone())?),
        };
        if index.dimension() != config.dimension || index.metric() != config.metric {
            return Err(Error::config(format!(
                "saved index has dimension {} / {:?}, config asks for {} / {:?}",
                index.dimension(),
                index.metric(),
                config.dimension,
                config.metric
            )));
        }

        let text = std::fs::read(dir.join(RECORDS_FILE))?;
        let persisted: PersistedRecords = serde_json::from_slice(&text)?;

        let mut table = RecordTable {
            next_key: persisted.next_key,
            ..Default::default()
        };
        for record in persisted.records {
            table.upsert(record.id, record.key, record.metadata);
        }

        let missing = table
            .by_id
            .values()
            .filter(|e| index.get(e.key).is_none() || e.key >= table.next_key)
            .count();
        if table.len() != index.len() || table.by_key.len() != table.len() || missing > 0 {
            warn!(
                "Record table ({}) and index ({}) disagree in {:?}: {} records without a vector",
                table.len(),
                index.len(),
                dir,
                missing
            );
            return Err(Error::Internal {
                message: format!(
                    "vector storage in {:?} is inconsistent: {} records, {} vectors, {} unmatched",
                    dir,
                    table.len(),
                    index.len(),
                    missing
                ),
            });
        }

        info!("Loaded vector storage: dir={:?}, records={}", dir, table.len());
        Ok(Self {
            config,
            index,
            records: RwLock::new(table),
            metrics: Metrics::new(),
        })
    }

    fn check_query(&self, query: &[f32]) -> Result<()> {
        if query.len() != self.config.dimension {
            return Err(Error::DimensionMismatch {
                expected: self.config.dimension,
                actual: query.len(),
            });
        }
        if query.iter().any(|v| !v.is_finite()) {
            return Err(Error::InvalidVector {
                message: "query contains non-finite values".to_string(),
            });
        }
        Ok(())
    }
}

fn build_index(config: &VectorStorageConfig) -> Box<dyn VectorIndex> {
    match config.index_type {
        IndexType::Flat => Box::new(FlatIndex::new(IndexConfig {
            dimension: config.dimension,
            metric: config.metric,
        })),
        IndexType::Ivf => Box::new(IvfIndex::new(IvfConfig::new(
            config.dimension,
            config.metric,
            config.ivf.clone(),
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vidst_core::DistanceMetric;

    fn record(id: &str, vector: Vec<f32>) -> VectorRecord {
        VectorRecord::new(id, vector, VectorMetadata::new("frame", "test-model"))
    }

    fn storage(dim: usize) -> VectorStorage {
        VectorStorage::new(VectorStorageConfig::with_dimension(dim)).unwrap()
    }

    #[test]
    fn test_add_and_search() {
        let store = storage(4);
        store.add(record("a", vec![1.0, 0.0, 0.0, 0.0])).unwrap();
        store.add(record("b", vec![0.9, 0.1, 0.0, 0.0])).unwrap();
        store.add(record("c", vec![0.0, 0.0, 1.0, 0.0])).unwrap();

        let hits = store.search(&[1.0, 0.0, 0.0, 0.0], 2).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, "a");
        assert_eq!(hits[1].id, "b");
        assert!((hits[0].score - 1.0).abs() < 1e-6);
        assert!(hits[0].score > hits[1].score);
        assert_eq!(hits[0].metadata.kind, "frame");
    }

    #[test]
    fn test_readd_replaces() {
        let store = storage(2);
        store.add(record("a", vec![1.0, 0.0])).unwrap();
        store
            .add(VectorRecord::new("a", vec![0.0, 1.0], VectorMetadata::new("scene", "v2")))
            .unwrap();

        assert_eq!(store.len(), 1);
        let got = store.get("a").unwrap();
        assert_eq!(got.vector, vec![0.0, 1.0]);
        assert_eq!(got.metadata.kind, "scene");
        assert_eq!(store.search(&[0.0, 1.0], 1).unwrap()[0].id, "a");
    }

    #[test]
    fn test_threshold_filters_hits() {
        let config = VectorStorageConfig {
            dimension: 2,
            similarity_threshold: Some(0.5),
            ..Default::default()
        };
        let store = VectorStorage::new(config).unwrap();
        store.add(record("same", vec![1.0, 0.0])).unwrap();
        store.add(record("orthogonal", vec![0.0, 1.0])).unwrap();

        let hits = store.search(&[1.0, 0.0], 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "same");
    }

    #[test]
    fn test_l2_scores_are_negative_distances() {
        let config = VectorStorageConfig {
            dimension: 2,
            metric: DistanceMetric::L2,
            ..Default::default()
        };
        let store = VectorStorage::new(config).unwrap();
        store.add(record("p", vec![3.0, 4.0])).unwrap();
        let hit = &store.search(&[0.0, 0.0], 1).unwrap()[0];
        assert!((hit.score + 5.0).abs() < 1e-5);
    }

    #[test]
    fn test_query_validation() {
        let store = storage(3);
        assert!(matches!(
            store.search(&[1.0], 1),
            Err(Error::DimensionMismatch { expected: 3, actual: 1 })
        ));
        assert!(matches!(
            store.search(&[f32::INFINITY, 0.0, 0.0], 1),
            Err(Error::InvalidVector { .. })
        ));
        assert!(store.search(&[1.0, 0.0, 0.0], 0).unwrap().is_empty());
    }

    #[test]
    fn test_remove_and_clear() {
        let store = storage(2);
        store.add(record("a", vec![1.0, 0.0])).unwrap();
        store.add(record("b", vec![0.0, 1.0])).unwrap();

        assert!(store.remove("a"));
        assert!(!store.remove("a"));
        assert!(store.get("a").is_none());
        assert_eq!(store.search(&[1.0, 0.0], 5).unwrap().len(), 1);

        store.clear();
        assert!(store.is_empty());
        assert_eq!(store.metrics().snapshot().vectors_removed, 2);
    }
}
