//! Error types for memory operations.

/// Errors returned by the memory store and its storage backends.
#[derive(Debug, thiserror::Error)]
pub enum MemoryError {
    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// Serialization error.
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    /// Persisting or loading records failed.
    #[error("storage error: {0}")]
    Storage(String),
    /// Vectors of different lengths were compared or stored together.
    #[error("dimension mismatch (expected={expected}, actual={actual})")]
    DimensionMismatch { expected: usize, actual: usize },
    /// Saved text was empty or whitespace only.
    #[error("memory text is empty")]
    EmptyText,
    /// An embedding with no components was supplied.
    #[error("embedding is empty")]
    EmptyEmbedding,
}
