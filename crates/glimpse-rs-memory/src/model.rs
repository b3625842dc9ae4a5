//! Memory record model used by the store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier assigned to a saved memory.
pub type MemoryId = u64;

/// Persisted memory record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MemoryRecord {
    /// Record identifier, time based and strictly increasing within a store.
    pub id: MemoryId,
    /// Saved snippet.
    pub text: String,
    /// Embedding of `text`.
    pub embedding: Vec<f32>,
    /// Page the snippet was saved from.
    pub source_url: String,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// A record paired with its similarity to a query.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredMemory {
    pub record: MemoryRecord,
    pub score: f32,
}

/// Next id after `last`: the current time in milliseconds, bumped past `last`
/// when the clock has not advanced.
pub(crate) fn next_memory_id(last: MemoryId, now: DateTime<Utc>) -> MemoryId {
    let millis = u64::try_from(now.timestamp_millis()).unwrap_or(0);
    millis.max(last.saturating_add(1))
}
