//! Index behaviour shared by every VectorIndex implementation

use std::sync::Arc;
use std::thread;

use tempfile::TempDir;
use vidst_core::{Error, IvfParams};
use vidst_index::{
    cosine_similarity, score_from_distance, DistanceMetric, FlatIndex, IndexConfig, IvfConfig,
    IvfIndex, VectorIndex,
};

fn indexes(dim: usize, metric: DistanceMetric) -> Vec<Box<dyn VectorIndex>> {
    vec![
        Box::new(FlatIndex::new(IndexConfig { dimension: dim, metric })),
        Box::new(IvfIndex::new(IvfConfig::new(
            dim,
            metric,
            IvfParams { nlist: 2, nprobe: 2, train_size: 8, iterations: 5 },
        ))),
    ]
}

#[test]
fn test_empty_and_zero_k() {
    for idx in indexes(3, DistanceMetric::Cosine) {
        assert!(idx.is_empty());
        assert!(idx.search(&[1.0, 0.0, 0.0], 5).is_empty());

        idx.insert(1, &[1.0, 0.0, 0.0]).unwrap();
        assert!(idx.search(&[1.0, 0.0, 0.0], 0).is_empty());
    }
}

#[test]
fn test_cosine_scores() {
    for idx in indexes(2, DistanceMetric::Cosine) {
        idx.insert(1, &[3.0, 0.0]).unwrap();
        idx.insert(2, &[1.0, 1.0]).unwrap();
        idx.insert(3, &[-1.0, 0.0]).unwrap();

        let results = idx.search(&[1.0, 0.0], 3);
        let ids: Vec<u64> = results.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);

        let score = score_from_distance(DistanceMetric::Cosine, results[1].distance);
        assert!((score - cosine_similarity(&[1.0, 0.0], &[1.0, 1.0])).abs() < 1e-5);

        // Stored copies are normalized
        let stored = idx.get(1).unwrap();
        assert!((stored[0] - 1.0).abs() < 1e-6);
    }
}

#[test]
fn test_dimension_mismatch_for_all() {
    for idx in indexes(4, DistanceMetric::L2) {
        assert!(matches!(
            idx.insert(1, &[0.0; 3]),
            Err(Error::DimensionMismatch { expected: 4, actual: 3 })
        ));
    }
}

#[test]
fn test_clear_keeps_dimension() {
    for idx in indexes(2, DistanceMetric::L2) {
        for i in 0..10u64 {
            idx.insert(i, &[i as f32, 0.0]).unwrap();
        }
        let trained = idx.is_trained();
        idx.clear();
        assert_eq!(idx.len(), 0);
        assert_eq!(idx.dimension(), 2);
        assert_eq!(idx.is_trained(), trained);
        idx.insert(99, &[1.0, 1.0]).unwrap();
        assert_eq!(idx.search(&[1.0, 1.0], 1)[0].id, 99);
    }
}

#[test]
fn test_memory_usage_grows() {
    for idx in indexes(64, DistanceMetric::L2) {
        let before = idx.memory_usage();
        for i in 0..32u64 {
            idx.insert(i, &vec![i as f32; 64]).unwrap();
        }
        assert!(idx.memory_usage() >= before + 32 * 64 * 4);
    }
}

#[test]
fn test_concurrent_insert_and_search() {
    for idx in indexes(8, DistanceMetric::L2) {
        let idx: Arc<dyn VectorIndex> = Arc::from(idx);
        let writers: Vec<_> = (0..4u64)
            .map(|t| {
                let idx = Arc::clone(&idx);
                thread::spawn(move || {
                    for i in 0..250u64 {
                        let id = t * 1000 + i;
                        idx.insert(id, &vec![id as f32; 8]).unwrap();
                        let _ = idx.search(&vec![id as f32; 8], 3);
                    }
                })
            })
            .collect();
        for w in writers {
            w.join().unwrap();
        }
        assert_eq!(idx.len(), 1000);
    }
}

#[test]
fn test_save_load_both_formats() {
    let tmp = TempDir::new().unwrap();

    let flat = FlatIndex::new(IndexConfig { dimension: 2, metric: DistanceMetric::L2 });
    flat.insert(5, &[1.0, 2.0]).unwrap();
    flat.save(&tmp.path().join("flat.idx")).unwrap();

    // Loading with the wrong reader fails on the magic
    assert!(IvfIndex::load(&tmp.path().join("flat.idx")).is_err());
    let loaded = FlatIndex::load(&tmp.path().join("flat.idx")).unwrap();
    assert_eq!(loaded.get(5), Some(vec![1.0, 2.0]));
}
