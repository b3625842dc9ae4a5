//! Error types for the core assistant crate.

use glimpse_rs_memory::MemoryError;
use thiserror::Error;

/// Errors returned by assistant operations and remote clients.
#[derive(Debug, Error)]
pub enum GlimpseCoreError {
    /// Missing or unusable configuration, such as an unset API key.
    #[error("{0}")]
    Configuration(String),
    /// A remote endpoint answered with a non-success status.
    #[error("{}", render_network(*status, message))]
    Network { status: u16, message: String },
    /// The request could not be sent or the stream broke mid-way.
    #[error("transport error: {0}")]
    Transport(String),
    /// The model phase exceeded the configured deadline.
    #[error("request timed out after {0}s")]
    Timeout(u64),
    /// Memory store error.
    #[error("storage error: {0}")]
    Storage(String),
    /// Caller supplied an unusable request.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    /// Background task failure.
    #[error("executor error: {0}")]
    Executor(String),
    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

fn render_network(status: u16, message: &str) -> String {
    if message.is_empty() {
        format!("API call failed with status {status}")
    } else {
        format!("API call failed with status {status}: {message}")
    }
}

impl From<MemoryError> for GlimpseCoreError {
    fn from(err: MemoryError) -> Self {
        match err {
            MemoryError::EmptyText => GlimpseCoreError::InvalidRequest(err.to_string()),
            other => GlimpseCoreError::Storage(other.to_string()),
        }
    }
}

impl From<reqwest::Error> for GlimpseCoreError {
    fn from(err: reqwest::Error) -> Self {
        GlimpseCoreError::Transport(err.to_string())
    }
}
