//! # Error Handling
//!
//! Error types shared by every Vidst storage crate.
//!
//! ## Design Principles
//!
//! 1. **Actionable**: Every error should tell the caller what limit or input was wrong
//! 2. **Contextual**: Errors carry the offending values (dimensions, keys, quotas)
//! 3. **Recoverable**: Distinguish between transient pressure and hard failures

use thiserror::Error;

/// Result type alias for Vidst operations
pub type Result<T> = std::result::Result<T, Error>;

/// Primary error type for the Vidst storage layer
#[derive(Error, Debug)]
pub enum Error {
    // Vector Errors
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Invalid vector: {message}")]
    InvalidVector { message: String },

    #[error("Capacity exceeded: {current} + {requested} > {limit} vectors")]
    CapacityExceeded { current: usize, requested: usize, limit: usize },

    #[error("Vector index error: {message}")]
    VectorIndex { message: String },

    // Resource Errors
    #[error("Resource exhausted: {resource} (used {used}, requested {requested}, limit {limit})")]
    ResourceExhausted { resource: String, used: u64, requested: u64, limit: u64 },

    #[error("Storage pool exhausted after waiting {waited_ms}ms (max size {max_size})")]
    PoolExhausted { max_size: usize, waited_ms: u64 },

    #[error("Storage pool is closed")]
    PoolClosed,

    // Domain Errors
    #[error("Not found: {what}")]
    NotFound { what: String },

    #[error("Invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Validation error: {message}")]
    Validation { message: String },

    // System Errors
    #[error("IO error: {message}")]
    Io { message: String, source: std::io::Error },

    #[error("Serialization error: {message}")]
    Serialization { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl Error {
    /// Check if error is recoverable
    pub fn is_recoverable(&self) -> bool {
        match self {
            Error::PoolExhausted { .. } => true,
            Error::ResourceExhausted { .. } => true,
            Error::CapacityExceeded { .. } => false,
            Error::PoolClosed => false,
            Error::Io { .. } => false,
            Error::Serialization { .. } => false,
            Error::Configuration { .. } => false,
            _ => true,
        }
    }

    /// Get error code for monitoring
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::DimensionMismatch { .. } => "DIMENSION_MISMATCH",
            Error::InvalidVector { .. } => "INVALID_VECTOR",
            Error::CapacityExceeded { .. } => "CAPACITY_EXCEEDED",
            Error::VectorIndex { .. } => "VECTOR_INDEX_ERROR",
            Error::ResourceExhausted { .. } => "RESOURCE_EXHAUSTED",
            Error::PoolExhausted { .. } => "POOL_EXHAUSTED",
            Error::PoolClosed => "POOL_CLOSED",
            Error::NotFound { .. } => "NOT_FOUND",
            Error::InvalidStateTransition { .. } => "INVALID_STATE_TRANSITION",
            Error::Validation { .. } => "VALIDATION_ERROR",
            Error::Io { .. } => "IO_ERROR",
            Error::Serialization { .. } => "SERIALIZATION_ERROR",
            Error::Configuration { .. } => "CONFIG_ERROR",
            Error::Internal { .. } => "INTERNAL_ERROR",
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Error::Validation { message: message.into() }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Error::Configuration { message: message.into() }
    }
}

// Conversion from std::io::Error
impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io {
            message: err.to_string(),
            source: err,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Error::Configuration {
            message: err.to_string(),
        }
    }
}

/// Extension trait for adding context to results
pub trait ResultExt<T> {
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T> {
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| match e {
            Error::Io { message, source } => Error::Io {
                message: format!("{}: {}", f(), message),
                source,
            },
            other => Error::Internal {
                message: format!("{}: {}", f(), other),
            },
        })
    }
}
