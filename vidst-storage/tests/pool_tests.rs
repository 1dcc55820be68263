//! # Pool and Monitor Integration Tests
//!
//! Configuration -> pooled storage -> monitored batch -> release.

use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use vidst_core::utils::vector_bytes;
use vidst_core::{
    Config, Error, Metrics, PoolConfig, ResourceQuota, VectorMetadata, VectorRecord,
    VectorStorageConfig, VectorStore,
};
use vidst_storage::{AsyncVectorStorage, ResourceMonitor, VectorStoragePool};

fn records(seed: u64, n: usize, dim: usize) -> Vec<VectorRecord> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n)
        .map(|i| {
            VectorRecord::new(
                format!("v{}-{}", seed, i),
                (0..dim).map(|_| rng.gen::<f32>()).collect(),
                VectorMetadata::new("scene", "m1"),
            )
        })
        .collect()
}

#[tokio::test]
async fn test_monitored_batch_on_pooled_storage() {
    let config = Config::from_yaml_str(
        r#"
storage:
  dimension: 16
pool:
  min_size: 1
  max_size: 2
  acquire_timeout_ms: 200
resources:
  max_memory_bytes: 1000000
  max_vectors: 150
"#,
    )
    .unwrap();

    let metrics = Metrics::new();
    let pool =
        VectorStoragePool::with_metrics(config.pool.clone(), config.storage.clone(), metrics.clone())
            .unwrap();
    let monitor = ResourceMonitor::with_metrics(config.resources.clone(), metrics.clone()).unwrap();

    let storage = pool.acquire().await.unwrap();
    let batch = records(1, 100, 16);
    let bytes = vector_bytes(batch.len(), 16);
    let added = monitor
        .track("add_batch", bytes, batch.len() as u64, || storage.add_batch(batch))
        .unwrap();
    assert_eq!(added, 100);
    assert_eq!(monitor.usage().vectors, 100);

    // Second batch would break the vector quota; nothing is written
    let batch = records(2, 100, 16);
    let err = monitor
        .track("add_batch", vector_bytes(100, 16), 100, || storage.add_batch(batch))
        .unwrap_err();
    assert!(matches!(err, Error::ResourceExhausted { .. }));
    assert_eq!(storage.len(), 100);
    assert_eq!(monitor.usage().vectors, 100);

    // A failing operation rolls its reservation back
    let mut bad = records(3, 10, 16);
    bad[0].vector.truncate(3);
    assert!(monitor
        .track("add_batch", vector_bytes(10, 16), 10, || storage.add_batch(bad))
        .is_err());
    assert_eq!(monitor.usage().vectors, 100);

    pool.release(storage);
    let stats = pool.stats();
    assert_eq!((stats.total, stats.idle, stats.in_use), (1, 1, 0));

    let snap = metrics.snapshot();
    assert_eq!(snap.vectors_added, 100);
    assert_eq!(snap.pool_acquisitions, 1);
    assert_eq!(snap.quota_rejections, 1);
    assert_eq!(snap.tracked_operations, 2);
    assert_eq!(snap.failed_operations, 1);
}

#[tokio::test]
async fn test_concurrent_acquires_never_exceed_max() {
    let pool = VectorStoragePool::new(
        PoolConfig {
            min_size: 0,
            max_size: 3,
            acquire_timeout_ms: 5_000,
        },
        VectorStorageConfig::with_dimension(8),
    )
    .unwrap();

    let mut tasks = Vec::new();
    for t in 0..12u64 {
        let pool = pool.clone();
        tasks.push(tokio::spawn(async move {
            let storage = pool.acquire().await?;
            assert!(pool.stats().in_use <= 3);
            storage.add_batch(records(t, 5, 8))?;
            tokio::time::sleep(Duration::from_millis(10)).await;
            Ok::<_, Error>(())
        }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    let stats = pool.stats();
    assert!(stats.total <= 3);
    assert_eq!(stats.in_use, 0);
    assert_eq!(stats.acquired, 12);
    assert_eq!(stats.timeouts, 0);
}

#[tokio::test]
async fn test_async_storage_through_trait_object() {
    let store: Box<dyn VectorStore> =
        Box::new(AsyncVectorStorage::new(VectorStorageConfig::with_dimension(4)).unwrap());

    store.add_batch(records(5, 20, 4)).await.unwrap();
    let queries = vec![vec![0.5; 4], vec![0.1, 0.9, 0.1, 0.9]];
    let results = store.search_batch(queries, 3).await.unwrap();
    assert_eq!(results.len(), 2);
    assert!(results.iter().all(|hits| hits.len() == 3));

    assert!(matches!(
        store.search(vec![1.0; 5], 3).await,
        Err(Error::DimensionMismatch { .. })
    ));
    assert_eq!(store.stats().await.unwrap().vector_count, 20);
    assert_eq!(store.len().await.unwrap(), 20);
}

#[tokio::test]
async fn test_quota_config_validation() {
    assert!(ResourceMonitor::new(ResourceQuota {
        max_memory_bytes: 0,
        max_vectors: 1,
    })
    .is_err());
    assert!(VectorStoragePool::new(
        PoolConfig {
            min_size: 4,
            max_size: 2,
            acquire_timeout_ms: 10,
        },
        VectorStorageConfig::default(),
    )
    .is_err());
}
