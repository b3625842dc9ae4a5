//! Storage backends for persisted memory records.

use crate::error::MemoryError;
use crate::model::{MemoryId, MemoryRecord};
use async_trait::async_trait;
use log::{debug, info, warn};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

/// File name of the JSONL record log under the storage root.
const RECORDS_FILE: &str = "memories.jsonl";

#[async_trait]
/// Key-value persistence for memory records, keyed by record id.
pub trait RecordStorage: Send + Sync {
    /// Load every persisted record.
    async fn load_all(&self) -> Result<Vec<MemoryRecord>, MemoryError>;

    /// Persist a record, replacing any record with the same id.
    async fn put(&self, record: &MemoryRecord) -> Result<(), MemoryError>;

    /// Remove a record; returns whether it existed.
    async fn remove(&self, id: MemoryId) -> Result<bool, MemoryError>;
}

/// File-backed storage keeping all records in one JSONL file.
#[derive(Debug, Clone)]
pub struct FileRecordStorage {
    root: PathBuf,
}

impl FileRecordStorage {
    /// Create storage under the given root, creating the directory if needed.
    pub fn new(root: impl AsRef<Path>) -> Result<Self, MemoryError> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)?;
        info!("initialized file record storage (root={})", root.display());
        Ok(Self { root })
    }

    /// Root directory holding the record file.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn records_path(&self) -> PathBuf {
        self.root.join(RECORDS_FILE)
    }

    fn temp_path(&self) -> PathBuf {
        self.root.join(format!("{RECORDS_FILE}.tmp"))
    }

    fn read_records(&self) -> Result<Vec<MemoryRecord>, MemoryError> {
        let path = self.records_path();
        if !path.exists() {
            return Ok(Vec::new());
        }
        let file = OpenOptions::new().read(true).open(path)?;
        let mut records = Vec::new();
        for (index, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(&line) {
                Ok(record) => records.push(record),
                Err(err) => warn!(
                    "skipping malformed memory record (line={}, err={})",
                    index + 1,
                    err
                ),
            }
        }
        Ok(records)
    }

    /// Rewrite the record file atomically: write a temp file, then rename.
    fn write_records(&self, records: &[MemoryRecord]) -> Result<(), MemoryError> {
        let temp_path = self.temp_path();
        {
            let mut file = OpenOptions::new()
                .create(true)
                .truncate(true)
                .write(true)
                .open(&temp_path)?;
            for record in records {
                let line = serde_json::to_string(record)?;
                writeln!(file, "{line}")?;
            }
            file.sync_all()?;
        }
        std::fs::rename(temp_path, self.records_path())?;
        Ok(())
    }
}

#[async_trait]
impl RecordStorage for FileRecordStorage {
    async fn load_all(&self) -> Result<Vec<MemoryRecord>, MemoryError> {
        let records = self.read_records()?;
        debug!("loaded memory records (count={})", records.len());
        Ok(records)
    }

    async fn put(&self, record: &MemoryRecord) -> Result<(), MemoryError> {
        let mut records = self.read_records()?;
        records.retain(|existing| existing.id != record.id);
        records.push(record.clone());
        self.write_records(&records)?;
        debug!(
            "persisted memory record (id={}, total={})",
            record.id,
            records.len()
        );
        Ok(())
    }

    async fn remove(&self, id: MemoryId) -> Result<bool, MemoryError> {
        let mut records = self.read_records()?;
        let before = records.len();
        records.retain(|record| record.id != id);
        if records.len() == before {
            return Ok(false);
        }
        self.write_records(&records)?;
        Ok(true)
    }
}

/// Process-local storage for tests and ephemeral runs.
#[derive(Debug, Default)]
pub struct InMemoryRecordStorage {
    records: Mutex<BTreeMap<MemoryId, MemoryRecord>>,
    fail_writes: AtomicBool,
    fail_reads: AtomicBool,
}

impl InMemoryRecordStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent `put`/`remove` calls fail.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Make subsequent `load_all` calls fail.
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    fn check_writes(&self) -> Result<(), MemoryError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(MemoryError::Storage("writes disabled".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl RecordStorage for InMemoryRecordStorage {
    async fn load_all(&self) -> Result<Vec<MemoryRecord>, MemoryError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(MemoryError::Storage("reads disabled".to_string()));
        }
        Ok(self.records.lock().values().cloned().collect())
    }

    async fn put(&self, record: &MemoryRecord) -> Result<(), MemoryError> {
        self.check_writes()?;
        self.records.lock().insert(record.id, record.clone());
        Ok(())
    }

    async fn remove(&self, id: MemoryId) -> Result<bool, MemoryError> {
        self.check_writes()?;
        Ok(self.records.lock().remove(&id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::{FileRecordStorage, RECORDS_FILE, RecordStorage};
    use crate::MemoryRecord;
    use chrono::Utc;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    fn record(id: u64, text: &str) -> MemoryRecord {
        MemoryRecord {
            id,
            text: text.to_string(),
            embedding: vec![1.0, 0.0],
            source_url: "https://example.com".to_string(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn file_storage_persists_across_instances() {
        let temp = tempdir().expect("tempdir");
        let storage = FileRecordStorage::new(temp.path()).expect("storage");
        storage.put(&record(1, "first")).await.expect("put");
        storage.put(&record(2, "second")).await.expect("put");

        let reopened = FileRecordStorage::new(temp.path()).expect("storage");
        let mut records = reopened.load_all().await.expect("load");
        records.sort_by_key(|record| record.id);
        let texts: Vec<_> = records.iter().map(|record| record.text.as_str()).collect();
        assert_eq!(texts, vec!["first", "second"]);
        assert!(!temp.path().join(format!("{RECORDS_FILE}.tmp")).exists());
    }

    #[tokio::test]
    async fn file_storage_remove_reports_presence() {
        let temp = tempdir().expect("tempdir");
        let storage = FileRecordStorage::new(temp.path()).expect("storage");
        storage.put(&record(7, "note")).await.expect("put");
        assert!(storage.remove(7).await.expect("remove"));
        assert!(!storage.remove(7).await.expect("remove"));
        assert!(storage.load_all().await.expect("load").is_empty());
    }

    #[tokio::test]
    async fn file_storage_skips_blank_lines() {
        let temp = tempdir().expect("tempdir");
        let line = serde_json::to_string(&record(3, "kept")).expect("json");
        std::fs::write(temp.path().join(RECORDS_FILE), format!("\n{line}\n\n")).expect("write");
        let storage = FileRecordStorage::new(temp.path()).expect("storage");
        let records = storage.load_all().await.expect("load");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].text, "kept");
    }

    #[tokio::test]
    async fn file_storage_skips_malformed_lines_and_keeps_writing() {
        let temp = tempdir().expect("tempdir");
        let storage = FileRecordStorage::new(temp.path()).expect("storage");
        storage.put(&record(1, "good")).await.expect("put");
        let path = temp.path().join(RECORDS_FILE);
        let mut contents = std::fs::read_to_string(&path).expect("read");
        contents.push_str("{not json\n");
        std::fs::write(&path, contents).expect("write");

        let reopened = FileRecordStorage::new(temp.path()).expect("storage");
        let records = reopened.load_all().await.expect("load");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].text, "good");

        reopened.put(&record(2, "after")).await.expect("put");
        let mut ids: Vec<_> = reopened
            .load_all()
            .await
            .expect("load")
            .iter()
            .map(|record| record.id)
            .collect();
        ids.sort_unstable();
        assert_eq!(ids, vec![1, 2]);
    }
}
