//! # Async Vector Storage
//!
//! Runs [`VectorStorage`] operations on tokio's blocking pool so that index
//! work never stalls the async workers.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::task;

use vidst_core::error::{Error, Result};
use vidst_core::{SearchHit, StoreStats, VectorRecord, VectorStorageConfig, VectorStore};

use crate::vector_storage::VectorStorage;

/// Cloneable async handle; clones share one storage
#[derive(Clone)]
pub struct AsyncVectorStorage {
    inner: Arc<VectorStorage>,
}

impl AsyncVectorStorage {
    pub fn new(config: VectorStorageConfig) -> Result<Self> {
        Ok(Self::from_storage(VectorStorage::new(config)?))
    }

    pub fn from_storage(storage: VectorStorage) -> Self {
        Self {
            inner: Arc::new(storage),
        }
    }

    /// Borrow the synchronous storage
    pub fn storage(&self) -> &VectorStorage {
        &self.inner
    }

    pub async fn get(&self, id: &str) -> Result<Option<VectorRecord>> {
        let id = id.to_string();
        self.run(move |s| Ok(s.get(&id))).await
    }

    pub async fn clear(&self) -> Result<()> {
        self.run(|s| {
            s.clear();
            Ok(())
        })
        .await
    }

    pub async fn train(&self) -> Result<()> {
        self.run(|s| s.train()).await
    }

    pub async fn save(&self, dir: impl Into<PathBuf>) -> Result<()> {
        let dir = dir.into();
        self.run(move |s| s.save(&dir)).await
    }

    pub async fn load(dir: impl Into<PathBuf>, config: VectorStorageConfig) -> Result<Self> {
        let dir = dir.into();
        let storage = task::spawn_blocking(move || VectorStorage::load(&dir, config))
            .await
            .map_err(join_error)??;
        Ok(Self::from_storage(storage))
    }

    async fn run<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&VectorStorage) -> Result<T> + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        task::spawn_blocking(move || f(&inner))
            .await
            .map_err(join_error)?
    }
}

fn join_error(err: task::JoinError) -> Error {
    Error::Internal {
        message: format!("blocking storage task failed: {}", err),
    }
}

#[async_trait]
impl VectorStore for AsyncVectorStorage {
    async fn add(&self, record: VectorRecord) -> Result<()> {
        self.run(move |s| s.add(record)).await
    }

    async fn add_batch(&self, records: Vec<VectorRecord>) -> Result<usize> {
        self.run(move |s| s.add_batch(records)).await
    }

    async fn search(&self, query: Vec<f32>, k: usize) -> Result<Vec<SearchHit>> {
        self.run(move |s| s.search(&query, k)).await
    }

    async fn search_batch(&self, queries: Vec<Vec<f32>>, k: usize) -> Result<Vec<Vec<SearchHit>>> {
        self.run(move |s| s.search_batch(&queries, k)).await
    }

    async fn remove(&self, id: &str) -> Result<bool> {
        let id = id.to_string();
        self.run(move |s| Ok(s.remove(&id))).await
    }

    async fn len(&self) -> Result<usize> {
        self.run(|s| Ok(s.len())).await
    }

    async fn stats(&self) -> Result<StoreStats> {
        self.run(|s| Ok(s.stats())).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vidst_core::VectorMetadata;

    #[tokio::test]
    async fn test_async_roundtrip() {
        let store = AsyncVectorStorage::new(VectorStorageConfig::with_dimension(3)).unwrap();
        let meta = VectorMetadata::new("frame", "m1");

        store
            .add(VectorRecord::new("x", vec![1.0, 0.0, 0.0], meta.clone()))
            .await
            .unwrap();
        let added = store
            .add_batch(vec![
                VectorRecord::new("y", vec![0.0, 1.0, 0.0], meta.clone()),
                VectorRecord::new("z", vec![0.0, 0.0, 1.0], meta),
            ])
            .await
            .unwrap();
        assert_eq!(added, 2);
        assert_eq!(store.len().await.unwrap(), 3);

        let hits = store.search(vec![0.0, 1.0, 0.0], 1).await.unwrap();
        assert_eq!(hits[0].id, "y");

        assert!(store.remove("y").await.unwrap());
        assert!(store.get("y").await.unwrap().is_none());
        assert_eq!(store.stats().await.unwrap().vector_count, 2);
    }

    #[tokio::test]
    async fn test_clones_share_storage() {
        let store = AsyncVectorStorage::new(VectorStorageConfig::with_dimension(2)).unwrap();
        let clone = store.clone();
        clone
            .add(VectorRecord::new("a", vec![1.0, 1.0], VectorMetadata::new("frame", "m1")))
            .await
            .unwrap();
        assert_eq!(store.len().await.unwrap(), 1);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_counts_while_writers_run() {
        let store = AsyncVectorStorage::new(VectorStorageConfig::with_dimension(4)).unwrap();
        let mut writers = Vec::new();
        for t in 0..4 {
            let store = store.clone();
            writers.push(tokio::spawn(async move {
                for i in 0..50 {
                    let vector = vec![t as f32, i as f32, 1.0, 0.5];
                    let meta = VectorMetadata::new("frame", "m1");
                    store
                        .add(VectorRecord::new(format!("{}-{}", t, i), vector, meta))
                        .await?;
                }
                Ok::<_, Error>(())
            }));
        }

        let mut last = 0;
        for _ in 0..20 {
            let len = store.len().await.unwrap();
            assert!(len >= last && len <= 200);
            last = len;
            tokio::task::yield_now().await;
        }
        for writer in writers {
            writer.await.unwrap().unwrap();
        }

        assert_eq!(store.len().await.unwrap(), 200);
        let stats = store.stats().await.unwrap();
        assert_eq!(stats.vector_count, 200);
        assert!(stats.memory_bytes > 0);
    }
}
