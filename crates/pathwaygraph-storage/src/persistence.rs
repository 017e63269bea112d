//! Write-ahead log, transactions and snapshots for the target store.
//!
//! Every commit is written to the log as
//!
//! ```text
//!   BeginTx ─► Upsert(entity) … ─► CommitTx(record)
//! ```
//!
//! with one length-prefixed bincode frame per entry, each synced to disk
//! before the next is written. Only transactions whose `CommitTx` frame made
//! it to disk are replayed on recovery; anything else is discarded. A
//! checkpoint folds the current state into `snapshot.bin` and truncates the
//! log.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use pathwaygraph_model::{Entity, EntityKey};

use crate::{CommitRecord, StoreError, StoreResult};

pub const WAL_FILE: &str = "store.wal";
pub const SNAPSHOT_FILE: &str = "snapshot.bin";

// ============================================================================
// Write-Ahead Log
// ============================================================================

pub struct WriteAheadLog {
    file: Mutex<File>,
    path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum WalEntry {
    BeginTx { tx_id: u64, timestamp: i64 },
    Upsert { tx_id: u64, entity: Entity },
    CommitTx { tx_id: u64, record: CommitRecord },
    RollbackTx { tx_id: u64 },
    Checkpoint { last_tx_id: u64 },
}

impl WalEntry {
    fn tx_id(&self) -> Option<u64> {
        match self {
            WalEntry::BeginTx { tx_id, .. }
            | WalEntry::Upsert { tx_id, .. }
            | WalEntry::CommitTx { tx_id, .. }
            | WalEntry::RollbackTx { tx_id } => Some(*tx_id),
            WalEntry::Checkpoint { .. } => None,
        }
    }
}

impl WriteAheadLog {
    pub fn open(path: &Path) -> StoreResult<Self> {
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(path)?;

        Ok(Self {
            file: Mutex::new(file),
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one frame and sync it. Returns the bytes written. A frame that
    /// fails partway is cut off again so the log stays frame-aligned.
    pub fn append(&self, entry: &WalEntry) -> StoreResult<u64> {
        let data = bincode::serialize(entry)?;
        let len = u32::try_from(data.len()).map_err(|_| {
            StoreError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "WAL frame larger than 4 GiB",
            ))
        })?;

        let mut file = self.file.lock();
        let start = file.metadata()?.len();
        if let Err(err) = write_frame(&mut *file, len, &data) {
            if let Err(trim_err) = file.set_len(start) {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %trim_err,
                    "partial WAL frame could not be cut off"
                );
            }
            return Err(err.into());
        }

        Ok(u64::from(len) + 4)
    }

    /// Feed every complete frame to `handler`, in log order. A torn final
    /// frame (crash mid-write) ends the replay. Returns the offset just past
    /// the last complete frame.
    pub fn replay<F: FnMut(WalEntry) -> StoreResult<()>>(&self, mut handler: F) -> StoreResult<u64> {
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(0))?;
        let mut end = 0u64;

        loop {
            let mut len_bytes = [0u8; 4];
            match file.read_exact(&mut len_bytes) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e.into()),
            }

            let len = u32::from_le_bytes(len_bytes) as usize;
            let mut data = vec![0u8; len];
            match file.read_exact(&mut data) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    tracing::warn!(path = %self.path.display(), "torn WAL frame ignored");
                    break;
                }
                Err(e) => return Err(e.into()),
            }

            let entry: WalEntry = bincode::deserialize(&data)?;
            handler(entry)?;
            end += 4 + len as u64;
        }

        Ok(end)
    }

    /// Cut the log back to `len` bytes. Returns how many bytes were dropped.
    pub fn truncate_to(&self, len: u64) -> StoreResult<u64> {
        let file = self.file.lock();
        let current = file.metadata()?.len();
        if current <= len {
            return Ok(0);
        }
        file.set_len(len)?;
        file.sync_all()?;
        Ok(current - len)
    }

    pub fn truncate(&self) -> StoreResult<()> {
        let mut file = self.file.lock();
        file.set_len(0)?;
        file.seek(SeekFrom::Start(0))?;
        file.sync_all()?;
        Ok(())
    }
}

fn write_frame(file: &mut File, len: u32, data: &[u8]) -> std::io::Result<()> {
    file.write_all(&len.to_le_bytes())?;
    file.write_all(data)?;
    file.sync_data()
}

// ============================================================================
// Transaction
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxState {
    Active,
    Committed,
    RolledBack,
}

/// Buffered writes of one commit. Nothing becomes visible until the commit
/// marker has been logged.
#[derive(Debug, Clone)]
pub struct Transaction {
    pub id: u64,
    pub state: TxState,
    writes: Vec<Entity>,
}

impl Transaction {
    pub fn new(id: u64) -> Self {
        Self {
            id,
            state: TxState::Active,
            writes: Vec::new(),
        }
    }

    pub fn upsert(&mut self, entity: Entity) {
        self.writes.push(entity);
    }

    pub fn writes(&self) -> &[Entity] {
        &self.writes
    }

    pub fn into_writes(self) -> Vec<Entity> {
        self.writes
    }

    /// Log the whole transaction. If any frame fails, a rollback marker is
    /// attempted and the transaction is reported as aborted.
    pub fn log(&mut self, wal: &WriteAheadLog, record: &CommitRecord) -> StoreResult<()> {
        let result = self.log_frames(wal, record);
        match result {
            Ok(()) => {
                self.state = TxState::Committed;
                Ok(())
            }
            Err(err) => {
                self.state = TxState::RolledBack;
                if let Err(rollback_err) = wal.append(&WalEntry::RollbackTx { tx_id: self.id }) {
                    tracing::warn!(tx_id = self.id, error = %rollback_err, "rollback marker not written");
                }
                Err(StoreError::TransactionAborted {
                    tx_id: self.id,
                    reason: err.to_string(),
                })
            }
        }
    }

    fn log_frames(&self, wal: &WriteAheadLog, record: &CommitRecord) -> StoreResult<()> {
        wal.append(&WalEntry::BeginTx {
            tx_id: self.id,
            timestamp: record.timestamp.timestamp(),
        })?;
        for entity in &self.writes {
            wal.append(&WalEntry::Upsert {
                tx_id: self.id,
                entity: entity.clone(),
            })?;
        }
        wal.append(&WalEntry::CommitTx {
            tx_id: self.id,
            record: record.clone(),
        })?;
        Ok(())
    }
}

// ============================================================================
// Snapshot and recovery
// ============================================================================

/// Durable state as of the last checkpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Snapshot {
    pub last_tx_id: u64,
    pub entities: Vec<Entity>,
    pub changelog: Vec<CommitRecord>,
}

impl Snapshot {
    pub fn read(path: &Path) -> StoreResult<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let bytes = std::fs::read(path)?;
        Ok(Some(bincode::deserialize(&bytes)?))
    }

    /// Write to a sibling temp file, then rename over `path`.
    pub fn write(&self, path: &Path) -> StoreResult<()> {
        let tmp = path.with_extension("bin.tmp");
        let data = bincode::serialize(self)?;
        {
            let mut file = File::create(&tmp)?;
            file.write_all(&data)?;
            file.sync_all()?;
        }
        std::fs::rename(&tmp, path)?;
        Ok(())
    }
}

/// State rebuilt from snapshot + log.
#[derive(Debug, Default)]
pub struct Recovered {
    pub entities: BTreeMap<EntityKey, Entity>,
    pub changelog: Vec<CommitRecord>,
    pub last_tx_id: u64,
    pub replayed: usize,
    pub discarded: usize,
    /// Bytes of a torn tail frame cut off the log.
    pub trimmed_bytes: u64,
}

pub fn recover(snapshot: Option<Snapshot>, wal: &WriteAheadLog) -> StoreResult<Recovered> {
    let mut state = Recovered::default();
    if let Some(snapshot) = snapshot {
        state.last_tx_id = snapshot.last_tx_id;
        state.changelog = snapshot.changelog;
        for entity in snapshot.entities {
            state.entities.insert(entity.key().clone(), entity);
        }
    }

    let mut pending: HashMap<u64, Vec<Entity>> = HashMap::new();
    let mut commits: Vec<(u64, CommitRecord)> = Vec::new();
    let end = wal.replay(|entry| {
        if let Some(tx_id) = entry.tx_id() {
            state.last_tx_id = state.last_tx_id.max(tx_id);
        }
        match entry {
            WalEntry::BeginTx { tx_id, .. } => {
                pending.entry(tx_id).or_default();
            }
            WalEntry::Upsert { tx_id, entity } => {
                pending.entry(tx_id).or_default().push(entity);
            }
            WalEntry::CommitTx { tx_id, record } => commits.push((tx_id, record)),
            WalEntry::RollbackTx { tx_id } => {
                pending.remove(&tx_id);
            }
            WalEntry::Checkpoint { last_tx_id } => {
                state.last_tx_id = state.last_tx_id.max(last_tx_id);
            }
        }
        Ok(())
    })?;

    // Later appends must start on a frame boundary.
    state.trimmed_bytes = wal.truncate_to(end)?;
    if state.trimmed_bytes > 0 {
        tracing::warn!(
            path = %wal.path().display(),
            bytes = state.trimmed_bytes,
            "torn WAL tail cut off"
        );
    }

    // Commit order is log order.
    for (tx_id, record) in commits {
        let Some(writes) = pending.remove(&tx_id) else {
            continue;
        };
        for entity in writes {
            state.entities.insert(entity.key().clone(), entity);
        }
        state.changelog.push(record);
        state.replayed += 1;
    }
    state.discarded = pending.len();
    if state.discarded > 0 {
        tracing::warn!(
            transactions = state.discarded,
            "uncommitted transactions discarded during recovery"
        );
    }

    Ok(state)
}
