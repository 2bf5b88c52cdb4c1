use thiserror::Error;

/// Main error type for RuleBench
#[derive(Error, Debug)]
pub enum BenchError {
    /// `retrieve` was called before `build_index`
    #[error("Index not built for retriever '{0}': call build_index first")]
    IndexNotBuilt(String),

    /// Entry point not supported by this retriever
    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// Cached vectors do not match the current corpus or configuration.
    /// Recovered internally by rebuilding the index.
    #[error("Cache mismatch: {0}")]
    CacheMismatch(String),

    /// Cache file is unreadable (bad magic, unknown version, truncated)
    #[error("Cache format error: {0}")]
    CacheFormat(String),

    /// A required backend (embedding provider, sparse index) is unavailable
    #[error("Missing dependency: {0}")]
    MissingDependency(String),

    /// Embedding backend errors
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// File system I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Vector store errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
}

/// Convenient Result type using BenchError
pub type Result<T> = std::result::Result<T, BenchError>;
