//! # Vector Storage Tests
//!
//! Behaviour of the synchronous storage over both index types.

use std::sync::Arc;
use std::thread;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tempfile::TempDir;

use vidst_core::{
    DistanceMetric, Error, IndexType, IvfParams, VectorMetadata, VectorRecord,
    VectorStorageConfig,
};
use vidst_storage::VectorStorage;

fn flat_config(dim: usize) -> VectorStorageConfig {
    VectorStorageConfig::with_dimension(dim)
}

fn ivf_config(dim: usize) -> VectorStorageConfig {
    VectorStorageConfig {
        dimension: dim,
        index_type: IndexType::Ivf,
        metric: DistanceMetric::L2,
        ivf: IvfParams {
            nlist: 4,
            nprobe: 4,
            train_size: 64,
            iterations: 10,
        },
        ..Default::default()
    }
}

fn random_records(rng: &mut StdRng, n: usize, dim: usize, prefix: &str) -> Vec<VectorRecord> {
    (0..n)
        .map(|i| {
            let vector = (0..dim).map(|_| rng.gen_range(-1.0..1.0)).collect();
            VectorRecord::new(
                format!("{}-{}", prefix, i),
                vector,
                VectorMetadata::new("frame", "clip-v1").with_extra("frame", i as u64),
            )
        })
        .collect()
}

// ============================================================================
// Basic Operations
// ============================================================================

#[test]
fn test_create_empty_storage() {
    let store = VectorStorage::new(flat_config(128)).unwrap();
    assert_eq!(store.len(), 0);
    assert!(store.is_empty());
    assert_eq!(store.dimension(), 128);
    assert!(store.search(&vec![0.5; 128], 5).unwrap().is_empty());
}

#[test]
fn test_invalid_config_rejected() {
    assert!(matches!(
        VectorStorage::new(flat_config(0)),
        Err(Error::Configuration { .. })
    ));
}

#[test]
fn test_batch_and_search_returns_self() {
    let mut rng = StdRng::seed_from_u64(7);
    let store = VectorStorage::new(flat_config(16)).unwrap();
    let records = random_records(&mut rng, 200, 16, "f");
    let target = records[42].clone();

    assert_eq!(store.add_batch(records).unwrap(), 200);
    assert_eq!(store.len(), 200);

    let hits = store.search(&target.vector, 3).unwrap();
    assert_eq!(hits.len(), 3);
    assert_eq!(hits[0].id, "f-42");
    assert!((hits[0].score - 1.0).abs() < 1e-5);
    assert_eq!(hits[0].metadata.extra["frame"], 42);
    assert!(hits.windows(2).all(|w| w[0].score >= w[1].score));
}

#[test]
fn test_search_batch_preserves_order() {
    let mut rng = StdRng::seed_from_u64(8);
    let store = VectorStorage::new(flat_config(8)).unwrap();
    let records = random_records(&mut rng, 50, 8, "s");
    let queries: Vec<Vec<f32>> = [3, 17, 29].iter().map(|&i| records[i].vector.clone()).collect();
    store.add_batch(records).unwrap();

    let results = store.search_batch(&queries, 1).unwrap();
    let top: Vec<&str> = results.iter().map(|hits| hits[0].id.as_str()).collect();
    assert_eq!(top, vec!["s-3", "s-17", "s-29"]);
}

// ============================================================================
// Validation and Capacity
// ============================================================================

#[test]
fn test_batch_is_all_or_nothing() {
    let mut rng = StdRng::seed_from_u64(9);
    let store = VectorStorage::new(flat_config(4)).unwrap();

    let mut batch = random_records(&mut rng, 10, 4, "b");
    batch[7].vector = vec![1.0, f32::NAN, 0.0, 0.0];
    assert!(matches!(store.add_batch(batch), Err(Error::InvalidVector { .. })));
    assert!(store.is_empty());

    let mut batch = random_records(&mut rng, 10, 4, "b");
    batch[3].vector.push(0.0);
    assert!(matches!(
        store.add_batch(batch),
        Err(Error::DimensionMismatch { expected: 4, actual: 5 })
    ));
    assert!(store.is_empty());
}

#[test]
fn test_capacity_limit() {
    let mut rng = StdRng::seed_from_u64(10);
    let config = VectorStorageConfig {
        max_vectors: 10,
        batch_size: 3,
        ..flat_config(4)
    };
    let store = VectorStorage::new(config).unwrap();

    store.add_batch(random_records(&mut rng, 8, 4, "c")).unwrap();
    let err = store
        .add_batch(random_records(&mut rng, 3, 4, "more"))
        .unwrap_err();
    assert!(matches!(
        err,
        Error::CapacityExceeded { current: 8, requested: 3, limit: 10 }
    ));
    assert_eq!(store.len(), 8);

    // Replacing existing ids needs no extra room
    store.add_batch(random_records(&mut rng, 8, 4, "c")).unwrap();
    store.add_batch(random_records(&mut rng, 2, 4, "d")).unwrap();
    assert_eq!(store.len(), 10);
    assert!(matches!(
        store.add(random_records(&mut rng, 1, 4, "e").remove(0)),
        Err(Error::CapacityExceeded { .. })
    ));
}

// ============================================================================
// IVF-backed storage
// ============================================================================

#[test]
fn test_ivf_storage_trains_and_finds() {
    let mut rng = StdRng::seed_from_u64(11);
    let store = VectorStorage::new(ivf_config(8)).unwrap();
    let records = random_records(&mut rng, 200, 8, "i");
    let target = records[150].clone();

    store.add_batch(records).unwrap();
    assert!(store.is_trained());
    assert_eq!(store.stats().vector_count, 200);

    // nprobe == nlist, so search is exhaustive
    let hits = store.search(&target.vector, 1).unwrap();
    assert_eq!(hits[0].id, "i-150");
    assert!(hits[0].score.abs() < 1e-4);
}

// ============================================================================
// Persistence
// ============================================================================

#[test]
fn test_save_and_load() {
    let tmp = TempDir::new().unwrap();
    let mut rng = StdRng::seed_from_u64(12);

    for config in [flat_config(12), ivf_config(12)] {
        let dir = tmp.path().join(format!("{:?}", config.index_type));
        let store = VectorStorage::new(config.clone()).unwrap();
        let records = random_records(&mut rng, 100, 12, "p");
        let target = records[10].clone();
        store.add_batch(records).unwrap();
        store.remove("p-99");
        store.save(&dir).unwrap();

        let loaded = VectorStorage::load(&dir, config.clone()).unwrap();
        assert_eq!(loaded.len(), 99);
        assert!(loaded.get("p-99").is_none());
        assert_eq!(loaded.get("p-10").unwrap().metadata, target.metadata);
        assert_eq!(loaded.search(&target.vector, 1).unwrap()[0].id, "p-10");

        // New ids must not collide with persisted keys
        loaded
            .add(VectorRecord::new("fresh", target.vector.clone(), target.metadata.clone()))
            .unwrap();
        assert_eq!(loaded.len(), 100);
        assert!(loaded.get("p-10").is_some());

        let wrong_dim = VectorStorageConfig { dimension: 6, ..config };
        assert!(VectorStorage::load(&dir, wrong_dim).is_err());
    }
}

#[test]
fn test_load_rejects_records_without_vectors() {
    let tmp = TempDir::new().unwrap();
    let mut rng = StdRng::seed_from_u64(13);
    let store = VectorStorage::new(flat_config(4)).unwrap();
    store.add_batch(random_records(&mut rng, 10, 4, "r")).unwrap();
    store.remove("r-9");
    store.save(tmp.path()).unwrap();

    // Point r-0 at the key r-9 used to have; counts still agree
    let path = tmp.path().join("records.json");
    let mut raw: serde_json::Value =
        serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
    let freed = raw["next_key"].as_u64().unwrap() - 1;
    for record in raw["records"].as_array_mut().unwrap() {
        if record["id"] == "r-0" {
            record["key"] = serde_json::json!(freed);
        }
    }
    std::fs::write(&path, serde_json::to_vec(&raw).unwrap()).unwrap();

    assert!(matches!(
        VectorStorage::load(tmp.path(), flat_config(4)),
        Err(Error::Internal { .. })
    ));
}

#[test]
fn test_load_applies_ivf_params() {
    let tmp = TempDir::new().unwrap();
    let mut rng = StdRng::seed_from_u64(14);
    let store = VectorStorage::new(ivf_config(8)).unwrap();
    let records = random_records(&mut rng, 120, 8, "q");
    let query = records[7].vector.clone();
    store.add_batch(records).unwrap();
    store.save(tmp.path()).unwrap();

    // Search-time knobs follow the new config
    let mut narrower = ivf_config(8);
    narrower.ivf.nprobe = 1;
    narrower.ivf.train_size = 32;
    let loaded = VectorStorage::load(tmp.path(), narrower).unwrap();
    assert!(loaded.is_trained());
    assert_eq!(loaded.search(&query, 1).unwrap()[0].id, "q-7");

    // A different cluster count cannot reuse the trained quantizer
    let mut regrouped = ivf_config(8);
    regrouped.ivf.nlist = 8;
    regrouped.ivf.nprobe = 8;
    assert!(matches!(
        VectorStorage::load(tmp.path(), regrouped),
        Err(Error::VectorIndex { .. })
    ));
}

#[test]
fn test_repeated_save_leaves_no_temp_files() {
    let tmp = TempDir::new().unwrap();
    let mut rng = StdRng::seed_from_u64(15);
    let store = VectorStorage::new(flat_config(4)).unwrap();
    store.add_batch(random_records(&mut rng, 20, 4, "s")).unwrap();
    store.save(tmp.path()).unwrap();
    store.add_batch(random_records(&mut rng, 5, 4, "t")).unwrap();
    store.save(tmp.path()).unwrap();

    let mut names: Vec<String> = std::fs::read_dir(tmp.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    assert_eq!(names, vec!["index.bin", "records.json"]);
    assert_eq!(VectorStorage::load(tmp.path(), flat_config(4)).unwrap().len(), 25);
}

// ============================================================================
// Concurrency
// ============================================================================

#[test]
fn test_concurrent_writers_and_readers() {
    let store = Arc::new(VectorStorage::new(flat_config(8)).unwrap());
    let mut handles = Vec::new();

    for t in 0..4u64 {
        let store = Arc::clone(&store);
        handles.push(thread::spawn(move || {
            let mut rng = StdRng::seed_from_u64(100 + t);
            for record in random_records(&mut rng, 50, 8, &format!("t{}", t)) {
                store.add(record).unwrap();
                store.search(&[0.1; 8], 5).unwrap();
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(store.len(), 200);
    assert_eq!(store.metrics().snapshot().vectors_added, 200);
}
