//! # Configuration Management
//!
//! Handles all configuration for the Vidst storage components. Every section
//! has a `Default` and can be overridden from a YAML file:
//!
//! ```yaml
//! storage:
//!   dimension: 512
//!   index_type: ivf
//!   metric: cosine
//! pool:
//!   min_size: 2
//!   max_size: 8
//! cache:
//!   cache_dir: ./cache
//!   default_ttl_secs: 3600
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::types::{DistanceMetric, IndexType, MAX_DIMENSION};

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub storage: VectorStorageConfig,
    pub pool: PoolConfig,
    pub resources: ResourceQuota,
    pub cache: CacheConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Parse a YAML document, filling unspecified fields with defaults
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a YAML configuration file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| Error::Io {
            message: format!("Failed to read config {}: {}", path.display(), e),
            source: e,
        })?;
        Self::from_yaml_str(&text)
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn validate(&self) -> Result<()> {
        self.storage.validate()?;
        self.pool.validate()?;
        self.resources.validate()?;
        self.cache.validate()?;
        Ok(())
    }
}

/// Vector storage configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorStorageConfig {
    pub dimension: usize,
    pub index_type: IndexType,
    pub metric: DistanceMetric,
    /// Hits scoring below this are dropped from search results
    pub similarity_threshold: Option<f32>,
    pub max_vectors: usize,
    pub batch_size: usize,
    pub ivf: IvfParams,
}

impl Default for VectorStorageConfig {
    fn default() -> Self {
        Self {
            dimension: 512,
            index_type: IndexType::Flat,
            metric: DistanceMetric::Cosine,
            similarity_threshold: None,
            max_vectors: 1_000_000,
            batch_size: 1000,
            ivf: IvfParams::default(),
        }
    }
}

impl VectorStorageConfig {
    pub fn with_dimension(dimension: usize) -> Self {
        Self { dimension, ..Default::default() }
    }

    pub fn validate(&self) -> Result<()> {
        if self.dimension == 0 || self.dimension > MAX_DIMENSION {
            return Err(Error::config(format!(
                "dimension must be within 1..={}, got {}",
                MAX_DIMENSION, self.dimension
            )));
        }
        if self.batch_size == 0 {
            return Err(Error::config("batch_size must be positive"));
        }
        if self.max_vectors == 0 {
            return Err(Error::config("max_vectors must be positive"));
        }
        if let Some(threshold) = self.similarity_threshold {
            if !threshold.is_finite() {
                return Err(Error::config("similarity_threshold must be finite"));
            }
            if self.metric == DistanceMetric::Cosine && !(-1.0..=1.0).contains(&threshold) {
                return Err(Error::config(format!(
                    "cosine similarity_threshold must be within [-1, 1], got {}",
                    threshold
                )));
            }
        }
        if self.index_type == IndexType::Ivf {
            self.ivf.validate()?;
        }
        Ok(())
    }
}

/// Inverted-file index parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IvfParams {
    /// Number of coarse clusters
    pub nlist: usize,
    /// Clusters scanned per query
    pub nprobe: usize,
    /// Vectors buffered before the quantizer is trained
    pub train_size: usize,
    /// k-means iterations
    pub iterations: usize,
}

impl Default for IvfParams {
    fn default() -> Self {
        Self {
            nlist: 64,
            nprobe: 8,
            train_size: 4096,
            iterations: 10,
        }
    }
}

impl IvfParams {
    pub fn validate(&self) -> Result<()> {
        if self.nlist == 0 {
            return Err(Error::config("ivf.nlist must be positive"));
        }
        if self.nprobe == 0 || self.nprobe > self.nlist {
            return Err(Error::config(format!(
                "ivf.nprobe must be within 1..={}, got {}",
                self.nlist, self.nprobe
            )));
        }
        if self.train_size < self.nlist {
            return Err(Error::config(format!(
                "ivf.train_size ({}) must be at least nlist ({})",
                self.train_size, self.nlist
            )));
        }
        Ok(())
    }
}

/// Storage pool sizing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    pub min_size: usize,
    pub max_size: usize,
    pub acquire_timeout_ms: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_size: 1,
            max_size: 4,
            acquire_timeout_ms: 5_000,
        }
    }
}

impl PoolConfig {
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_size == 0 {
            return Err(Error::config("pool.max_size must be positive"));
        }
        if self.min_size > self.max_size {
            return Err(Error::config(format!(
                "pool.min_size ({}) exceeds pool.max_size ({})",
                self.min_size, self.max_size
            )));
        }
        Ok(())
    }
}

/// Quotas enforced by the resource monitor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceQuota {
    pub max_memory_bytes: u64,
    pub max_vectors: u64,
}

impl Default for ResourceQuota {
    fn default() -> Self {
        Self {
            max_memory_bytes: 2 * 1024 * 1024 * 1024, // 2GB
            max_vectors: 1_000_000,
        }
    }
}

impl ResourceQuota {
    pub fn validate(&self) -> Result<()> {
        if self.max_memory_bytes == 0 || self.max_vectors == 0 {
            return Err(Error::config("resource quotas must be positive"));
        }
        Ok(())
    }
}

/// File-backed cache configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub cache_dir: PathBuf,
    /// TTL applied when `set` is called without one; `None` never expires
    pub default_ttl_secs: Option<u64>,
    /// Oldest entry is evicted when a new key would exceed this
    pub max_entries: Option<usize>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from("./cache"),
            default_ttl_secs: Some(24 * 3600),
            max_entries: None,
        }
    }
}

impl CacheConfig {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self { cache_dir: cache_dir.into(), ..Default::default() }
    }

    pub fn default_ttl(&self) -> Option<Duration> {
        self.default_ttl_secs.map(Duration::from_secs)
    }

    pub fn validate(&self) -> Result<()> {
        if self.cache_dir.as_os_str().is_empty() {
            return Err(Error::config("cache.cache_dir must not be empty"));
        }
        if self.max_entries == Some(0) {
            return Err(Error::config("cache.max_entries must be positive"));
        }
        if let Some(ttl) = self.default_ttl() {
            if chrono::Duration::from_std(ttl).is_err() {
                return Err(Error::config(format!(
                    "cache.default_ttl_secs {} is out of range",
                    ttl.as_secs()
                )));
            }
        }
        Ok(())
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: LogLevel,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            format: LogFormat::Text,
        }
    }
}

/// Log levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Log formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn test_partial_yaml() {
        let config = Config::from_yaml_str(
            r#"
storage:
  dimension: 8
  index_type: ivf
  ivf:
    nlist: 4
    nprobe: 2
    train_size: 16
pool:
  max_size: 2
  min_size: 0
logging:
  format: json
"#,
        )
        .unwrap();

        assert_eq!(config.storage.dimension, 8);
        assert_eq!(config.storage.index_type, IndexType::Ivf);
        assert_eq!(config.storage.metric, DistanceMetric::Cosine);
        assert_eq!(config.storage.ivf.iterations, 10);
        assert_eq!(config.pool.max_size, 2);
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.cache, CacheConfig::default());
    }

    #[test]
    fn test_invalid_configs() {
        assert!(Config::from_yaml_str("storage:\n  dimension: 0\n").is_err());
        assert!(Config::from_yaml_str("pool:\n  min_size: 5\n  max_size: 2\n").is_err());
        assert!(Config::from_yaml_str("storage:\n  similarity_threshold: 1.5\n").is_err());
        assert!(Config::from_yaml_str(
            "storage:\n  index_type: ivf\n  ivf:\n    nlist: 4\n    nprobe: 5\n"
        )
        .is_err());
        assert!(Config::from_yaml_str("cache:\n  max_entries: 0\n").is_err());
        assert!(Config::from_yaml_str(&format!("cache:\n  default_ttl_secs: {}\n", u64::MAX)).is_err());
    }

    #[test]
    fn test_cache_config_validation() {
        let mut cache = CacheConfig::new("/tmp/vidst-cache");
        cache.validate().unwrap();

        cache.max_entries = Some(1);
        cache.default_ttl_secs = Some(0);
        cache.validate().unwrap();

        cache.max_entries = Some(0);
        assert!(matches!(cache.validate(), Err(Error::Configuration { .. })));

        cache.max_entries = None;
        cache.default_ttl_secs = Some(u64::MAX);
        assert!(matches!(cache.validate(), Err(Error::Configuration { .. })));
    }

    #[test]
    fn test_yaml_roundtrip_file() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("vidst.yaml");

        let mut config = Config::default();
        config.storage.dimension = 16;
        config.cache.max_entries = Some(10);
        std::fs::write(&path, config.to_yaml().unwrap()).unwrap();

        let loaded = Config::from_yaml_file(&path).unwrap();
        assert_eq!(loaded, config);
    }
}
