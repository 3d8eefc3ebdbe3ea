//! Journal and snapshot persistence for the record store

use crate::core::{CommentId, CommentRecord, Result, SweepError};
use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

const SNAPSHOT_VERSION: u32 = 1;
const JOURNAL_FILE: &str = "commentsweep.journal";
const SNAPSHOT_FILE: &str = "commentsweep.snapshot";

// ============================================================================
// Journal Entry Types
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum JournalEntry {
    Upsert(Vec<CommentRecord>),
    Delete(Vec<CommentId>),
    MarkDeleteFailed {
        id: CommentId,
        reason: String,
        at: DateTime<Utc>,
    },
}

impl JournalEntry {
    /// Apply this entry to a record map
    pub fn apply(self, records: &mut HashMap<CommentId, CommentRecord>) {
        match self {
            JournalEntry::Upsert(batch) => {
                for record in batch {
                    records.insert(record.id.clone(), record);
                }
            }
            JournalEntry::Delete(ids) => {
                for id in ids {
                    records.remove(&id);
                }
            }
            JournalEntry::MarkDeleteFailed { id, reason, at } => {
                if let Some(record) = records.get_mut(&id) {
                    record.record_delete_failure(reason, at);
                }
            }
        }
    }
}

// ============================================================================
// Store Snapshot
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct StoreSnapshot {
    pub version: u32,
    pub records: Vec<CommentRecord>,
    pub created_at: DateTime<Utc>,
}

impl StoreSnapshot {
    pub fn new(records: Vec<CommentRecord>) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            records,
            created_at: Utc::now(),
        }
    }
}

// ============================================================================
// Durability Configuration
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DurabilityMode {
    /// fsync after every journal append
    Sync,
    #[default]
    Async,
    /// Nothing is written
    None,
}

// ============================================================================
// Journal Manager
// ============================================================================

pub struct JournalManager {
    path: PathBuf,
    file: Option<BufWriter<File>>,
    durability_mode: DurabilityMode,
    entries_since_checkpoint: usize,
    checkpoint_threshold: usize,
}

impl JournalManager {
    pub fn new<P: AsRef<Path>>(path: P, durability_mode: DurabilityMode) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = if durability_mode != DurabilityMode::None {
            let file = OpenOptions::new().create(true).append(true).open(&path)?;
            Some(BufWriter::new(file))
        } else {
            None
        };

        Ok(Self {
            path,
            file,
            durability_mode,
            entries_since_checkpoint: 0,
            checkpoint_threshold: 1000,
        })
    }

    pub fn append(&mut self, entry: &JournalEntry) -> Result<()> {
        if self.durability_mode == DurabilityMode::None {
            return Ok(());
        }
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| SweepError::StoreError("Journal file not initialized".to_string()))?;
        let serialized = rmp_serde::to_vec_named(entry).map_err(|e| {
            SweepError::SerializationError(format!("Failed to serialize journal entry: {}", e))
        })?;
        let len = serialized.len() as u32;
        file.write_all(&len.to_le_bytes())?;
        file.write_all(&serialized)?;
        file.flush()?;
        if self.durability_mode == DurabilityMode::Sync {
            file.get_mut().sync_all()?;
        }
        self.entries_since_checkpoint += 1;
        Ok(())
    }

    /// Read every intact entry. A torn tail (crash mid-append) is dropped.
    pub fn read_all(&self) -> Result<Vec<JournalEntry>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let file = File::open(&self.path)?;
        let file_len = file.metadata()?.len();
        let mut reader = BufReader::new(file);
        let mut entries = Vec::new();
        let mut offset: u64 = 0;
        loop {
            let mut len_bytes = [0u8; 4];
            match reader.read_exact(&mut len_bytes) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e.into()),
            }
            offset += 4;
            let len = u32::from_le_bytes(len_bytes) as u64;
            // a length past the end of the file is a torn or corrupt prefix
            if len > file_len.saturating_sub(offset) {
                warn!("Dropping truncated journal entry in {}", self.path.display());
                break;
            }
            offset += len;
            let mut data = vec![0u8; len as usize];
            if let Err(e) = reader.read_exact(&mut data) {
                if e.kind() == std::io::ErrorKind::UnexpectedEof {
                    warn!("Dropping truncated journal entry in {}", self.path.display());
                    break;
                }
                return Err(e.into());
            }
            let entry: JournalEntry = rmp_serde::from_slice(&data).map_err(|e| {
                SweepError::SerializationError(format!("Failed to deserialize journal entry: {}", e))
            })?;
            entries.push(entry);
        }
        Ok(entries)
    }

    pub fn clear(&mut self) -> Result<()> {
        if self.durability_mode == DurabilityMode::None {
            return Ok(());
        }
        self.file = None;
        let file = OpenOptions::new().write(true).truncate(true).open(&self.path)?;
        self.file = Some(BufWriter::new(file));
        self.entries_since_checkpoint = 0;
        Ok(())
    }

    pub fn needs_checkpoint(&self) -> bool {
        self.entries_since_checkpoint >= self.checkpoint_threshold
    }

    pub fn entries_since_checkpoint(&self) -> usize {
        self.entries_since_checkpoint
    }

    pub fn set_checkpoint_threshold(&mut self, threshold: usize) {
        self.checkpoint_threshold = threshold.max(1);
    }
}

// ============================================================================
// Snapshot Manager
// ============================================================================

pub struct SnapshotManager {
    path: PathBuf,
}

impl SnapshotManager {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Write to a temp file in the same directory, then rename over the old snapshot
    pub fn save(&self, snapshot: &StoreSnapshot) -> Result<()> {
        let dir = self
            .path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        fs::create_dir_all(&dir)?;

        let serialized = rmp_serde::to_vec_named(snapshot).map_err(|e| {
            SweepError::SerializationError(format!("Failed to serialize snapshot: {}", e))
        })?;
        let mut temp = NamedTempFile::new_in(&dir)?;
        temp.write_all(&serialized)?;
        temp.as_file().sync_all()?;
        temp.persist(&self.path)
            .map_err(|e| SweepError::IoError(format!("Failed to replace snapshot: {}", e)))?;
        Ok(())
    }

    pub fn load(&self) -> Result<Option<StoreSnapshot>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let mut data = Vec::new();
        File::open(&self.path)?.read_to_end(&mut data)?;
        let snapshot: StoreSnapshot = rmp_serde::from_slice(&data).map_err(|e| {
            SweepError::SerializationError(format!("Failed to deserialize snapshot: {}", e))
        })?;
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(SweepError::StoreError(format!(
                "Unsupported snapshot version {}",
                snapshot.version
            )));
        }
        Ok(Some(snapshot))
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }
}

// ============================================================================
// Persistence Manager
// ============================================================================

pub struct PersistenceManager {
    journal: JournalManager,
    snapshot: SnapshotManager,
    durability_mode: DurabilityMode,
}

impl PersistenceManager {
    pub fn new<P: AsRef<Path>>(data_dir: P, durability_mode: DurabilityMode) -> Result<Self> {
        let data_dir = data_dir.as_ref();
        let journal = JournalManager::new(data_dir.join(JOURNAL_FILE), durability_mode)?;
        let snapshot = SnapshotManager::new(data_dir.join(SNAPSHOT_FILE));
        Ok(Self {
            journal,
            snapshot,
            durability_mode,
        })
    }

    pub fn log(&mut self, entry: &JournalEntry) -> Result<()> {
        self.journal.append(entry)
    }

    pub fn checkpoint(&mut self, records: &HashMap<CommentId, CommentRecord>) -> Result<()> {
        if self.durability_mode == DurabilityMode::None {
            return Ok(());
        }
        let snapshot = StoreSnapshot::new(records.values().cloned().collect());
        self.snapshot.save(&snapshot)?;
        self.journal.clear()?;
        debug!("Checkpointed {} records", records.len());
        Ok(())
    }

    pub fn needs_checkpoint(&self) -> bool {
        self.journal.needs_checkpoint()
    }

    /// Snapshot plus journal replay. `None` when nothing was ever written.
    pub fn recover(&self) -> Result<Option<HashMap<CommentId, CommentRecord>>> {
        let mut records: HashMap<CommentId, CommentRecord> = match self.snapshot.load()? {
            Some(snapshot) => snapshot
                .records
                .into_iter()
                .map(|record| (record.id.clone(), record))
                .collect(),
            None => HashMap::new(),
        };

        let entries = self.journal.read_all()?;
        if !self.snapshot.exists() && entries.is_empty() {
            return Ok(None);
        }

        for entry in entries {
            entry.apply(&mut records);
        }
        Ok(Some(records))
    }

    pub fn journal(&self) -> &JournalManager {
        &self.journal
    }

    pub fn journal_mut(&mut self) -> &mut JournalManager {
        &mut self.journal
    }

    pub fn durability_mode(&self) -> DurabilityMode {
        self.durability_mode
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(id: &str) -> CommentRecord {
        CommentRecord::new(id, "v1", format!("comment {}", id), Utc::now())
    }

    #[test]
    fn test_journal_append_and_read() {
        let temp_dir = TempDir::new().unwrap();
        let mut journal =
            JournalManager::new(temp_dir.path().join("test.journal"), DurabilityMode::Sync).unwrap();
        journal.append(&JournalEntry::Upsert(vec![record("a"), record("b")])).unwrap();
        journal.append(&JournalEntry::Delete(vec!["a".into()])).unwrap();

        let entries = journal.read_all().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(journal.entries_since_checkpoint(), 2);
    }

    #[test]
    fn test_torn_journal_tail_is_ignored() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("test.journal");
        let mut journal = JournalManager::new(&path, DurabilityMode::Sync).unwrap();
        journal.append(&JournalEntry::Delete(vec!["a".into()])).unwrap();
        drop(journal);

        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(&100u32.to_le_bytes()).unwrap();
        file.write_all(&[1, 2, 3]).unwrap();

        let journal = JournalManager::new(&path, DurabilityMode::Sync).unwrap();
        assert_eq!(journal.read_all().unwrap().len(), 1);
    }

    #[test]
    fn test_oversized_length_prefix_is_treated_as_torn() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("test.journal");
        let mut journal = JournalManager::new(&path, DurabilityMode::Sync).unwrap();
        journal.append(&JournalEntry::Delete(vec!["a".into()])).unwrap();
        journal.append(&JournalEntry::Delete(vec!["b".into()])).unwrap();
        drop(journal);

        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(&u32::MAX.to_le_bytes()).unwrap();
        file.write_all(&[0xff; 16]).unwrap();

        let journal = JournalManager::new(&path, DurabilityMode::Sync).unwrap();
        let entries = journal.read_all().unwrap();
        assert_eq!(entries.len(), 2);
    }

    #[test]
    fn test_snapshot_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let manager = SnapshotManager::new(temp_dir.path().join("test.snapshot"));
        manager.save(&StoreSnapshot::new(vec![record("a")])).unwrap();
        assert!(manager.exists());

        let loaded = manager.load().unwrap().unwrap();
        assert_eq!(loaded.records.len(), 1);
        assert_eq!(loaded.records[0].id, "a");
    }

    #[test]
    fn test_recovery_replays_journal_over_snapshot() {
        let temp_dir = TempDir::new().unwrap();
        let mut persistence = PersistenceManager::new(temp_dir.path(), DurabilityMode::Sync).unwrap();

        let mut records = HashMap::new();
        records.insert("a".to_string(), record("a"));
        records.insert("b".to_string(), record("b"));
        persistence.checkpoint(&records).unwrap();
        assert_eq!(persistence.journal().entries_since_checkpoint(), 0);

        persistence.log(&JournalEntry::Delete(vec!["a".into()])).unwrap();
        persistence
            .log(&JournalEntry::MarkDeleteFailed {
                id: "b".into(),
                reason: "forbidden".into(),
                at: Utc::now(),
            })
            .unwrap();

        let recovered = persistence.recover().unwrap().unwrap();
        assert_eq!(recovered.len(), 1);
        assert_eq!(recovered["b"].last_error.as_deref(), Some("forbidden"));
    }

    #[test]
    fn test_recover_on_empty_dir_is_none() {
        let temp_dir = TempDir::new().unwrap();
        let persistence = PersistenceManager::new(temp_dir.path(), DurabilityMode::Async).unwrap();
        assert!(persistence.recover().unwrap().is_none());
    }
}
