//! Personal memory store for Glimpse: saved snippets with embeddings and
//! similarity recall.

pub mod error;
pub mod model;
pub mod recall;
pub mod storage;
pub mod store;
pub mod vector;

/// Memory error type.
pub use error::MemoryError;
/// Memory record model.
pub use model::{MemoryId, MemoryRecord, ScoredMemory};
/// Recall options.
pub use recall::RecallOptions;
/// Storage backends for persisted records.
pub use storage::{FileRecordStorage, InMemoryRecordStorage, RecordStorage};
/// Similarity-searchable record store.
pub use store::MemoryStore;
/// Vector similarity helpers.
pub use vector::cosine_similarity;
