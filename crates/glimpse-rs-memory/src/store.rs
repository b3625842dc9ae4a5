//! Similarity-searchable memory store.

use crate::error::MemoryError;
use crate::model::{MemoryId, MemoryRecord, ScoredMemory, next_memory_id};
use crate::recall::RecallOptions;
use crate::storage::{FileRecordStorage, InMemoryRecordStorage, RecordStorage};
use crate::vector::cosine_similarity;
use chrono::Utc;
use log::{debug, info, warn};
use parking_lot::RwLock;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

type RecordMap = BTreeMap<MemoryId, MemoryRecord>;

/// Memory store caching records from an injected storage backend.
///
/// Writers serialize on an async mutex, persist first, and only then publish
/// into the cache, so readers always see a consistent snapshot of persisted
/// records.
pub struct MemoryStore {
    storage: Arc<dyn RecordStorage>,
    cache: RwLock<Option<RecordMap>>,
    /// Last issued id; held for the duration of every write.
    writer: Mutex<MemoryId>,
}

impl MemoryStore {
    /// Create a store over the given backend. Records load lazily.
    pub fn new(storage: Arc<dyn RecordStorage>) -> Self {
        Self {
            storage,
            cache: RwLock::new(None),
            writer: Mutex::new(0),
        }
    }

    /// Create a store persisting to a JSONL file under `root`.
    pub fn open(root: impl AsRef<Path>) -> Result<Self, MemoryError> {
        let storage = FileRecordStorage::new(root)?;
        Ok(Self::new(Arc::new(storage)))
    }

    /// Create a store that keeps records in process memory only.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryRecordStorage::new()))
    }

    /// Save a snippet with its embedding and return the new record id.
    pub async fn insert(
        &self,
        text: &str,
        embedding: Vec<f32>,
        source_url: &str,
    ) -> Result<MemoryId, MemoryError> {
        if text.trim().is_empty() {
            return Err(MemoryError::EmptyText);
        }
        if embedding.is_empty() {
            return Err(MemoryError::EmptyEmbedding);
        }
        let mut last_id = self.writer.lock().await;
        self.ensure_loaded().await?;

        let highest_known = {
            let cache = self.cache.read();
            let records = cache.as_ref();
            if let Some(expected) = records.and_then(dimension_of)
                && expected != embedding.len()
            {
                return Err(MemoryError::DimensionMismatch {
                    expected,
                    actual: embedding.len(),
                });
            }
            records
                .and_then(|records| records.keys().next_back().copied())
                .unwrap_or(0)
        };

        let created_at = Utc::now();
        let id = next_memory_id((*last_id).max(highest_known), created_at);
        let record = MemoryRecord {
            id,
            text: text.to_string(),
            embedding,
            source_url: source_url.to_string(),
            created_at,
        };
        self.storage.put(&record).await.map_err(into_storage)?;
        *last_id = id;
        self.cache
            .write()
            .get_or_insert_with(RecordMap::new)
            .insert(id, record);
        info!("memory saved (id={}, text_len={})", id, text.len());
        Ok(id)
    }

    /// Every record, newest first. Read failures yield an empty list.
    pub async fn list_all(&self) -> Vec<MemoryRecord> {
        let mut records: Vec<_> = self
            .snapshot()
            .await
            .map(|records| records.into_values().collect())
            .unwrap_or_default();
        records.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        records
    }

    /// Remove a record. Unknown ids are a successful no-op returning `false`.
    pub async fn delete(&self, id: MemoryId) -> Result<bool, MemoryError> {
        let _guard = self.writer.lock().await;
        self.ensure_loaded().await?;
        let removed = self.storage.remove(id).await.map_err(into_storage)?;
        if removed && let Some(records) = self.cache.write().as_mut() {
            records.remove(&id);
        }
        debug!("memory delete (id={}, removed={})", id, removed);
        Ok(removed)
    }

    /// Records most similar to `query`, best first.
    ///
    /// Only scores strictly above `options.min_score` qualify; records whose
    /// similarity is undefined or whose dimensionality differs are skipped.
    /// Ties are broken by ascending id.
    pub async fn query_by_embedding(
        &self,
        query: &[f32],
        options: RecallOptions,
    ) -> Vec<ScoredMemory> {
        if options.k == 0 {
            return Vec::new();
        }
        let Some(records) = self.snapshot().await else {
            return Vec::new();
        };
        let mut scored: Vec<ScoredMemory> = records
            .into_values()
            .filter_map(|record| match cosine_similarity(query, &record.embedding) {
                Ok(score) if !score.is_nan() && score > options.min_score => {
                    Some(ScoredMemory { record, score })
                }
                Ok(_) => None,
                Err(err) => {
                    debug!("skipping memory during recall (id={}, err={})", record.id, err);
                    None
                }
            })
            .collect();
        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.record.id.cmp(&b.record.id))
        });
        scored.truncate(options.k);
        debug!(
            "memory recall (k={}, min_score={}, matched={})",
            options.k,
            options.min_score,
            scored.len()
        );
        scored
    }

    /// Number of stored records.
    pub async fn len(&self) -> usize {
        self.snapshot().await.map(|records| records.len()).unwrap_or(0)
    }

    /// Whether the store holds no records.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Embedding dimensionality shared by stored records, if any exist.
    pub async fn dimension(&self) -> Option<usize> {
        self.snapshot().await.as_ref().and_then(dimension_of)
    }

    /// Load records into the cache if they are not there yet.
    async fn ensure_loaded(&self) -> Result<(), MemoryError> {
        if self.cache.read().is_some() {
            return Ok(());
        }
        let loaded = self.storage.load_all().await.map_err(into_storage)?;
        let mut cache = self.cache.write();
        if cache.is_none() {
            debug!("memory cache loaded (count={})", loaded.len());
            *cache = Some(loaded.into_iter().map(|record| (record.id, record)).collect());
        }
        Ok(())
    }

    async fn snapshot(&self) -> Option<RecordMap> {
        if let Err(err) = self.ensure_loaded().await {
            warn!("memory read failed, treating store as empty (err={})", err);
            return None;
        }
        self.cache.read().clone()
    }
}

fn dimension_of(records: &RecordMap) -> Option<usize> {
    records.values().next().map(|record| record.embedding.len())
}

fn into_storage(err: MemoryError) -> MemoryError {
    match err {
        MemoryError::Storage(_) => err,
        other => MemoryError::Storage(other.to_string()),
    }
}
