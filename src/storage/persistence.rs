//! Commit journal and snapshot persistence for the assignment store

use crate::core::{DeskError, Result};
use crate::storage::InMemoryStorage;
use crate::transaction::Change;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use tracing::{Level, event};

pub const SNAPSHOT_FILE: &str = "snapshot.bin";
pub const JOURNAL_FILE: &str = "journal.log";
const SNAPSHOT_FORMAT_VERSION: u32 = 2;

// ============================================================================
// Journal Entry
// ============================================================================

/// One committed write transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalEntry {
    pub commit_version: u64,
    pub txn_id: u64,
    pub committed_at: DateTime<Utc>,
    pub changes: Vec<Change>,
}

// ============================================================================
// Store Snapshot
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct StoreSnapshot {
    pub format_version: u32,
    pub storage: InMemoryStorage,
    pub metadata: SnapshotMetadata,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SnapshotMetadata {
    pub created_at: DateTime<Utc>,
    pub commit_version: u64,
    pub consultant_count: usize,
    pub request_count: usize,
}

impl StoreSnapshot {
    pub fn new(storage: InMemoryStorage) -> Self {
        let metadata = SnapshotMetadata {
            created_at: Utc::now(),
            commit_version: storage.commit_version(),
            consultant_count: storage.consultants().len(),
            request_count: storage.requests().len(),
        };
        Self {
            format_version: SNAPSHOT_FORMAT_VERSION,
            storage,
            metadata,
        }
    }
}

// ============================================================================
// Durability Configuration
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DurabilityMode {
    /// fsync after every journal append
    Sync,
    /// flush to the OS, no fsync
    #[default]
    Async,
    /// keep nothing on disk
    None,
}

// ============================================================================
// Journal Manager
// ============================================================================

pub struct JournalManager {
    journal_path: PathBuf,
    journal_file: Option<BufWriter<File>>,
    durability_mode: DurabilityMode,
    /// Byte length of the journal up to the last complete entry
    committed_len: u64,
    /// Set when a failed append could not be rolled back
    poisoned: bool,
    entries_since_checkpoint: usize,
    checkpoint_threshold: usize,
}

/// Result of scanning the journal from the start.
struct JournalScan {
    entries: Vec<JournalEntry>,
    valid_len: u64,
    file_len: u64,
}

impl JournalManager {
    pub fn new<P: AsRef<Path>>(
        journal_path: P,
        durability_mode: DurabilityMode,
        checkpoint_threshold: usize,
    ) -> Result<Self> {
        let journal_path = journal_path.as_ref().to_path_buf();
        if let Some(parent) = journal_path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                DeskError::Persistence(format!("Failed to create journal directory: {}", e))
            })?;
        }

        let mut manager = Self {
            journal_path,
            journal_file: None,
            durability_mode,
            committed_len: 0,
            poisoned: false,
            entries_since_checkpoint: 0,
            checkpoint_threshold: checkpoint_threshold.max(1),
        };
        manager.reopen()?;
        Ok(manager)
    }

    fn reopen(&mut self) -> Result<()> {
        self.journal_file = None;
        if self.durability_mode == DurabilityMode::None {
            return Ok(());
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.journal_path)
            .map_err(|e| DeskError::Persistence(format!("Failed to open journal: {}", e)))?;
        self.committed_len = file.metadata()?.len();
        self.journal_file = Some(BufWriter::new(file));
        Ok(())
    }

    pub fn append(&mut self, entry: &JournalEntry) -> Result<()> {
        if self.durability_mode == DurabilityMode::None {
            return Ok(());
        }
        if self.poisoned {
            return Err(DeskError::Persistence(
                "Journal is unusable after a failed append".to_string(),
            ));
        }
        let serialized = rmp_serde::to_vec(entry).map_err(|e| {
            DeskError::Persistence(format!("Failed to serialize journal entry: {}", e))
        })?;
        let mut frame = Vec::with_capacity(serialized.len() + 4);
        frame.extend_from_slice(&(serialized.len() as u32).to_le_bytes());
        frame.extend_from_slice(&serialized);

        if let Err(err) = self.write_frame(&frame) {
            self.discard_partial_frame();
            return Err(err);
        }
        self.committed_len += frame.len() as u64;
        self.entries_since_checkpoint += 1;
        Ok(())
    }

    fn write_frame(&mut self, frame: &[u8]) -> Result<()> {
        let file = self
            .journal_file
            .as_mut()
            .ok_or_else(|| DeskError::Persistence("Journal file not initialized".to_string()))?;
        file.write_all(frame)?;
        file.flush()?;
        if self.durability_mode == DurabilityMode::Sync {
            file.get_mut().sync_all()?;
        }
        Ok(())
    }

    /// Cut the file back to the last complete entry after a failed append.
    /// If that fails too, refuse further appends.
    fn discard_partial_frame(&mut self) {
        let Some(writer) = self.journal_file.take() else {
            return;
        };
        // into_parts drops buffered bytes instead of flushing them
        let (file, _) = writer.into_parts();
        match file.set_len(self.committed_len) {
            Ok(()) => {
                event!(
                    Level::WARN,
                    committed_len = self.committed_len,
                    "journal append failed, partial entry removed"
                );
                self.journal_file = Some(BufWriter::new(file));
            }
            Err(e) => {
                event!(
                    Level::ERROR,
                    error = %e,
                    "journal append failed and could not be rolled back"
                );
                self.poisoned = true;
            }
        }
    }

    /// Read every complete entry. A torn frame at the tail (crash mid-append)
    /// ends the log.
    pub fn read_all(&self) -> Result<Vec<JournalEntry>> {
        Ok(self.scan()?.entries)
    }

    /// Read every complete entry and truncate a torn tail, so the next append
    /// starts on a frame boundary.
    pub fn recover_entries(&mut self) -> Result<Vec<JournalEntry>> {
        let scan = self.scan()?;
        if scan.valid_len < scan.file_len {
            self.journal_file = None;
            let file = OpenOptions::new()
                .write(true)
                .open(&self.journal_path)
                .map_err(|e| {
                    DeskError::Persistence(format!("Failed to open journal for repair: {}", e))
                })?;
            file.set_len(scan.valid_len)?;
            file.sync_all()?;
            event!(
                Level::WARN,
                recovered = scan.entries.len(),
                dropped_bytes = scan.file_len - scan.valid_len,
                "journal ended with a torn entry, truncated"
            );
            self.reopen()?;
        }
        Ok(scan.entries)
    }

    fn scan(&self) -> Result<JournalScan> {
        if !self.journal_path.exists() {
            return Ok(JournalScan {
                entries: Vec::new(),
                valid_len: 0,
                file_len: 0,
            });
        }
        let file = File::open(&self.journal_path).map_err(|e| {
            DeskError::Persistence(format!("Failed to open journal for reading: {}", e))
        })?;
        let file_len = file.metadata()?.len();
        let mut reader = BufReader::new(file);
        let mut entries = Vec::new();
        let mut valid_len = 0u64;
        loop {
            let mut len_bytes = [0u8; 4];
            match reader.read_exact(&mut len_bytes) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e.into()),
            }
            let len = u32::from_le_bytes(len_bytes) as usize;
            if valid_len + 4 + len as u64 > file_len {
                break;
            }
            let mut data = vec![0u8; len];
            reader.read_exact(&mut data)?;
            let entry: JournalEntry = rmp_serde::from_slice(&data).map_err(|e| {
                DeskError::Persistence(format!("Failed to deserialize journal entry: {}", e))
            })?;
            entries.push(entry);
            valid_len += 4 + len as u64;
        }
        Ok(JournalScan {
            entries,
            valid_len,
            file_len,
        })
    }

    pub fn clear(&mut self) -> Result<()> {
        if self.durability_mode == DurabilityMode::None {
            return Ok(());
        }
        self.journal_file = None;
        let file = OpenOptions::new()
            .write(true)
            .truncate(true)
            .open(&self.journal_path)
            .map_err(|e| DeskError::Persistence(format!("Failed to truncate journal: {}", e)))?;
        drop(file);
        self.reopen()?;
        self.poisoned = false;
        self.entries_since_checkpoint = 0;
        Ok(())
    }

    pub fn needs_checkpoint(&self) -> bool {
        self.entries_since_checkpoint >= self.checkpoint_threshold
    }
}

// ============================================================================
// Snapshot Manager
// ============================================================================

pub struct SnapshotManager {
    snapshot_path: PathBuf,
}

impl SnapshotManager {
    pub fn new<P: AsRef<Path>>(snapshot_path: P) -> Self {
        Self {
            snapshot_path: snapshot_path.as_ref().to_path_buf(),
        }
    }

    /// Write to a temp file in the same directory, then rename over the old
    /// snapshot.
    pub fn save(&self, snapshot: &StoreSnapshot) -> Result<()> {
        let dir = self
            .snapshot_path
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(dir).map_err(|e| {
            DeskError::Persistence(format!("Failed to create snapshot directory: {}", e))
        })?;
        let serialized = rmp_serde::to_vec(snapshot)
            .map_err(|e| DeskError::Persistence(format!("Failed to serialize snapshot: {}", e)))?;

        let mut temp = tempfile::NamedTempFile::new_in(dir)?;
        temp.write_all(&serialized)?;
        temp.as_file().sync_all()?;
        temp.persist(&self.snapshot_path)
            .map_err(|e| DeskError::Persistence(format!("Failed to replace snapshot: {}", e)))?;
        Ok(())
    }

    pub fn load(&self) -> Result<Option<StoreSnapshot>> {
        if !self.snapshot_path.exists() {
            return Ok(None);
        }
        let data = fs::read(&self.snapshot_path)?;
        let snapshot: StoreSnapshot = rmp_serde::from_slice(&data).map_err(|e| {
            DeskError::Persistence(format!("Failed to deserialize snapshot: {}", e))
        })?;
        if snapshot.format_version != SNAPSHOT_FORMAT_VERSION {
            return Err(DeskError::Persistence(format!(
                "Unsupported snapshot format {}",
                snapshot.format_version
            )));
        }
        Ok(Some(snapshot))
    }
}

// ============================================================================
// Persistence Manager
// ============================================================================

pub struct PersistenceManager {
    journal: JournalManager,
    snapshots: SnapshotManager,
}

impl PersistenceManager {
    pub fn new<P: AsRef<Path>>(
        data_dir: P,
        durability_mode: DurabilityMode,
        checkpoint_threshold: usize,
    ) -> Result<Self> {
        let data_dir = data_dir.as_ref();
        Ok(Self {
            journal: JournalManager::new(
                data_dir.join(JOURNAL_FILE),
                durability_mode,
                checkpoint_threshold,
            )?,
            snapshots: SnapshotManager::new(data_dir.join(SNAPSHOT_FILE)),
        })
    }

    /// Load the last snapshot and replay every newer journal entry.
    pub fn recover(&mut self) -> Result<InMemoryStorage> {
        let mut storage = match self.snapshots.load()? {
            Some(snapshot) => snapshot.storage,
            None => InMemoryStorage::new(),
        };
        let base_version = storage.commit_version();

        let mut replayed = 0usize;
        for entry in self.journal.recover_entries()? {
            if entry.commit_version <= storage.commit_version() {
                continue;
            }
            for change in &entry.changes {
                change.apply_to(&mut storage);
            }
            storage.set_commit_version(entry.commit_version);
            replayed += 1;
        }
        storage.rebuild_sequences();

        event!(
            Level::INFO,
            base_version,
            replayed,
            commit_version = storage.commit_version(),
            "store recovered"
        );
        Ok(storage)
    }

    pub fn log_commit(&mut self, entry: &JournalEntry) -> Result<()> {
        self.journal.append(entry)
    }

    pub fn needs_checkpoint(&self) -> bool {
        self.journal.needs_checkpoint()
    }

    /// Snapshot the store and truncate the journal.
    pub fn checkpoint(&mut self, storage: &InMemoryStorage) -> Result<()> {
        self.snapshots.save(&StoreSnapshot::new(storage.clone()))?;
        self.journal.clear()?;
        event!(
            Level::DEBUG,
            commit_version = storage.commit_version(),
            "checkpoint written"
        );
        Ok(())
    }
}
