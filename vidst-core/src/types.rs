//! # Core Types
//!
//! Data structures shared across the Vidst storage layer.
//!
//! ## Type Design Philosophy
//!
//! 1. **Type Safety**: Identifiers are newtypes, statuses are enums
//! 2. **Serialization**: All types round-trip through serde JSON
//! 3. **Validation**: Constructors check their invariants

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::error::{Error, Result};

/// Timestamp type used throughout the system
pub type Timestamp = DateTime<Utc>;

/// Free-form JSON metadata
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// Maximum supported vector dimension
pub const MAX_DIMENSION: usize = 4096;

/// Unique identifier for videos
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VideoId(pub Uuid);

impl VideoId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for VideoId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for VideoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Container formats accepted on upload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum VideoFormat {
    Mp4,
    Avi,
    Mov,
    Mkv,
    Other(String),
}

impl VideoFormat {
    /// Derive the format from a file extension (case-insensitive)
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();

        match ext.as_str() {
            "mp4" => VideoFormat::Mp4,
            "avi" => VideoFormat::Avi,
            "mov" => VideoFormat::Mov,
            "mkv" => VideoFormat::Mkv,
            _ => VideoFormat::Other(ext),
        }
    }
}

/// Processing status of an uploaded video
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ProcessingStatus {
    Pending,
    Processing,
    Completed,
    Failed { reason: String },
}

impl ProcessingStatus {
    pub fn name(&self) -> &'static str {
        match self {
            ProcessingStatus::Pending => "pending",
            ProcessingStatus::Processing => "processing",
            ProcessingStatus::Completed => "completed",
            ProcessingStatus::Failed { .. } => "failed",
        }
    }

    /// Whether moving from `self` to `next` is allowed.
    /// `Failed -> Pending` is a retry.
    pub fn can_transition_to(&self, next: &ProcessingStatus) -> bool {
        matches!(
            (self, next),
            (ProcessingStatus::Pending, ProcessingStatus::Processing)
                | (ProcessingStatus::Processing, ProcessingStatus::Completed)
                | (ProcessingStatus::Processing, ProcessingStatus::Failed { .. })
                | (ProcessingStatus::Failed { .. }, ProcessingStatus::Pending)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ProcessingStatus::Completed)
    }
}

impl fmt::Display for ProcessingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// An uploaded video and its processing state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Video {
    pub id: VideoId,
    pub file_name: String,
    pub file_path: PathBuf,
    pub format: VideoFormat,
    pub size_bytes: u64,
    pub status: ProcessingStatus,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Video {
    pub fn new(file_path: impl Into<PathBuf>, size_bytes: u64) -> Self {
        let file_path = file_path.into();
        let file_name = file_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let now = Utc::now();

        Self {
            id: VideoId::new(),
            format: VideoFormat::from_path(&file_path),
            file_name,
            file_path,
            size_bytes,
            status: ProcessingStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }

    /// Move to `next`, rejecting transitions the pipeline does not allow
    pub fn transition(&mut self, next: ProcessingStatus) -> Result<()> {
        if !self.status.can_transition_to(&next) {
            return Err(Error::InvalidStateTransition {
                from: self.status.name().to_string(),
                to: next.name().to_string(),
            });
        }
        self.status = next;
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn start_processing(&mut self) -> Result<()> {
        self.transition(ProcessingStatus::Processing)
    }

    pub fn complete(&mut self) -> Result<()> {
        self.transition(ProcessingStatus::Completed)
    }

    pub fn fail(&mut self, reason: impl Into<String>) -> Result<()> {
        self.transition(ProcessingStatus::Failed { reason: reason.into() })
    }
}

/// A time range within a video produced by scene detection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scene {
    pub video_id: VideoId,
    pub start_secs: f64,
    pub end_secs: f64,
    pub confidence: f32,
}

impl Scene {
    pub fn new(video_id: VideoId, start_secs: f64, end_secs: f64, confidence: f32) -> Result<Self> {
        if !(start_secs >= 0.0 && start_secs < end_secs) {
            return Err(Error::validation(format!(
                "scene range must satisfy 0 <= start < end, got {}..{}",
                start_secs, end_secs
            )));
        }
        if !(0.0..=1.0).contains(&confidence) {
            return Err(Error::validation(format!(
                "scene confidence must be within [0, 1], got {}",
                confidence
            )));
        }
        Ok(Self { video_id, start_secs, end_secs, confidence })
    }

    pub fn duration_secs(&self) -> f64 {
        self.end_secs - self.start_secs
    }

    /// Half-open: the end timestamp belongs to the next scene
    pub fn contains(&self, t_secs: f64) -> bool {
        t_secs >= self.start_secs && t_secs < self.end_secs
    }
}

/// A single cached key/value record. Persisted as one `.cache` file per key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub value: serde_json::Value,
    pub created_at: Timestamp,
    pub expires_at: Option<Timestamp>,
    #[serde(default)]
    pub metadata: Metadata,
}

impl CacheEntry {
    pub fn new(key: impl Into<String>, value: serde_json::Value, ttl: Option<chrono::Duration>) -> Self {
        let created_at = Utc::now();
        Self {
            key: key.into(),
            value,
            created_at,
            expires_at: ttl.map(|ttl| created_at + ttl),
            metadata: Metadata::new(),
        }
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn is_expired(&self, now: Timestamp) -> bool {
        self.expires_at.map_or(false, |at| now >= at)
    }
}

/// Similarity metric used by a vector storage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMetric {
    Cosine,
    L2,
    DotProduct,
}

/// Index structure backing a vector storage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexType {
    Flat,
    Ivf,
}

/// Metadata attached to every stored embedding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorMetadata {
    /// Kind of embedding, e.g. "frame", "scene", "transcript"
    pub kind: String,
    pub timestamp: Timestamp,
    pub model_version: String,
    #[serde(default)]
    pub extra: Metadata,
}

impl VectorMetadata {
    pub fn new(kind: impl Into<String>, model_version: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            timestamp: Utc::now(),
            model_version: model_version.into(),
            extra: Metadata::new(),
        }
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }
}

/// An embedding plus its metadata, keyed by a unique string id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorRecord {
    pub id: String,
    pub vector: Vec<f32>,
    pub metadata: VectorMetadata,
}

impl VectorRecord {
    pub fn new(id: impl Into<String>, vector: Vec<f32>, metadata: VectorMetadata) -> Self {
        Self { id: id.into(), vector, metadata }
    }

    /// Check the vector against a storage dimension
    pub fn validate(&self, dimension: usize) -> Result<()> {
        if self.id.is_empty() {
            return Err(Error::validation("vector record id must not be empty"));
        }
        if self.vector.len() != dimension {
            return Err(Error::DimensionMismatch {
                expected: dimension,
                actual: self.vector.len(),
            });
        }
        if let Some(pos) = self.vector.iter().position(|v| !v.is_finite()) {
            return Err(Error::InvalidVector {
                message: format!("record {} has a non-finite value at position {}", self.id, pos),
            });
        }
        Ok(())
    }
}
