//! Pathwaygraph storage layer
//!
//! Two collaborators of the merge engine live here:
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────┐
//! │                                                                   │
//! │   ┌──────────────┐  get / canonical copy   ┌───────────────────┐  │
//! │   │  Warehouse   │ ──────────────────────► │                   │  │
//! │   │ (read-only)  │                         │   merge engine    │  │
//! │   └──────────────┘                         │                   │  │
//! │                                            └─────────┬─────────┘  │
//! │                         contains / get / merge_graph │            │
//! │                                                      ▼            │
//! │   ┌──────────────┐     replay      ┌────────────────────────────┐ │
//! │   │  store.wal   │ ◄─────────────► │  GraphStore (target store) │ │
//! │   │ snapshot.bin │    checkpoint   │  in-memory view + changelog│ │
//! │   └──────────────┘                 └────────────────────────────┘ │
//! │                                                                   │
//! └───────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Key Features
//!
//! - **Read-only warehouse**: canonical copies are independent clones; the
//!   warehouse's own instances are never handed out mutably.
//! - **Merge by identity key**: absent entities are inserted, present ones
//!   updated in place; the store never holds two entities with one key.
//! - **Transactional**: a commit is logged in full before any of it becomes
//!   visible, and recovery replays only committed transactions.
//! - **Audited**: every commit leaves a changelog record with a digest of
//!   the committed graph.

pub mod persistence;
pub mod warehouse;


use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use pathwaygraph_model::{Entity, EntityKey, EntityKind, Graph, GraphDocument};

use persistence::{Recovered, Snapshot, Transaction, WalEntry, WriteAheadLog};

pub use warehouse::InMemoryWarehouse;

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("codec error: {0}")]
    Codec(#[from] bincode::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("transaction {tx_id} aborted: {reason}")]
    TransactionAborted { tx_id: u64, reason: String },
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

// ============================================================================
// Collaborator contracts
// ============================================================================

/// Read-only store of canonical reference entities.
pub trait Warehouse: Send + Sync {
    /// The warehouse's entity for `key`, if it exists with the given kind.
    fn get_by_canonical_key(&self, key: &EntityKey, kind: EntityKind)
        -> anyhow::Result<Option<Entity>>;

    /// A fresh, independently owned copy of the canonical entity together
    /// with everything it references, ready for merge-time mutation.
    fn create_canonical_copy(&self, key: &EntityKey, kind: EntityKind)
        -> anyhow::Result<Option<Graph>>;

    fn contains(&self, key: &EntityKey, kind: EntityKind) -> anyhow::Result<bool> {
        Ok(self.get_by_canonical_key(key, kind)?.is_some())
    }
}

/// Persistent graph that merges are committed into.
pub trait TargetStore: Send + Sync {
    fn contains_key(&self, key: &EntityKey) -> bool;

    fn get_by_key(&self, key: &EntityKey) -> Option<Entity>;

    /// Merge a normalized graph by identity key, all or nothing.
    fn merge_graph(&self, graph: &Graph, dataset: &str) -> StoreResult<CommitRecord>;
}

// ============================================================================
// Changelog
// ============================================================================

pub type CommitId = Uuid;

/// One committed source graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitRecord {
    pub id: CommitId,
    pub tx_id: u64,
    pub timestamp: DateTime<Utc>,
    pub dataset: String,
    /// `sha256:<hex>` of the committed graph document.
    pub digest: String,
    pub inserted: usize,
    pub updated: usize,
}

impl CommitRecord {
    pub fn new(tx_id: u64, dataset: &str, digest: String, inserted: usize, updated: usize) -> Self {
        Self {
            id: Uuid::new_v4(),
            tx_id,
            timestamp: Utc::now(),
            dataset: dataset.to_string(),
            digest,
            inserted,
            updated,
        }
    }
}

pub fn graph_digest(graph: &Graph) -> StoreResult<String> {
    let bytes = serde_json::to_vec(&graph.to_document())?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    let hash: [u8; 32] = hasher.finalize().into();
    let hex: String = hash.iter().map(|b| format!("{b:02x}")).collect();
    Ok(format!("sha256:{hex}"))
}

// ============================================================================
// Store Configuration
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Directory holding `store.wal` and `snapshot.bin`
    pub data_dir: PathBuf,
    /// Checkpoint after this many commits (0 disables automatic checkpoints)
    pub checkpoint_every: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./pathwaygraph-store"),
            checkpoint_every: 16,
        }
    }
}

impl StoreConfig {
    pub fn from_json_file(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }
}

// ============================================================================
// Graph Store
// ============================================================================

struct Durability {
    wal: WriteAheadLog,
    snapshot_path: PathBuf,
    checkpoint_every: usize,
}

/// The persistent target graph.
///
/// Readers see the in-memory view; `merge_graph` serializes writers, logs
/// the transaction and only then applies it to the view.
pub struct GraphStore {
    durability: Option<Durability>,
    entities: RwLock<BTreeMap<EntityKey, Entity>>,
    changelog: RwLock<Vec<CommitRecord>>,
    /// Held for the whole of a commit: last tx id and commits since the
    /// last checkpoint.
    writer: Mutex<WriterState>,
}

#[derive(Debug, Default)]
struct WriterState {
    last_tx_id: u64,
    since_checkpoint: usize,
}

impl GraphStore {
    /// A store without a log; commits are still all-or-nothing in memory.
    pub fn in_memory() -> Self {
        Self {
            durability: None,
            entities: RwLock::new(BTreeMap::new()),
            changelog: RwLock::new(Vec::new()),
            writer: Mutex::new(WriterState::default()),
        }
    }

    /// Open (or create) a store under `config.data_dir`, recovering from the
    /// last snapshot plus every committed transaction in the log.
    pub fn open(config: StoreConfig) -> StoreResult<Self> {
        std::fs::create_dir_all(&config.data_dir)?;
        let snapshot_path = config.data_dir.join(persistence::SNAPSHOT_FILE);
        let wal = WriteAheadLog::open(&config.data_dir.join(persistence::WAL_FILE))?;

        let Recovered {
            entities,
            changelog,
            last_tx_id,
            replayed,
            discarded,
            trimmed_bytes,
        } = persistence::recover(Snapshot::read(&snapshot_path)?, &wal)?;

        tracing::info!(
            data_dir = %config.data_dir.display(),
            entities = entities.len(),
            replayed,
            discarded,
            trimmed_bytes,
            "target store opened"
        );

        Ok(Self {
            durability: Some(Durability {
                wal,
                snapshot_path,
                checkpoint_every: config.checkpoint_every,
            }),
            entities: RwLock::new(entities),
            changelog: RwLock::new(changelog),
            writer: Mutex::new(WriterState {
                last_tx_id,
                since_checkpoint: replayed,
            }),
        })
    }

    pub fn len(&self) -> usize {
        self.entities.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.read().is_empty()
    }

    pub fn keys(&self) -> Vec<EntityKey> {
        self.entities.read().keys().cloned().collect()
    }

    pub fn changelog(&self) -> Vec<CommitRecord> {
        self.changelog.read().clone()
    }

    /// Independent copy of the whole store as a graph.
    pub fn to_graph(&self) -> Graph {
        let entities = self.entities.read();
        let mut graph = Graph::new();
        for entity in entities.values() {
            graph.upsert(entity.clone());
        }
        graph
    }

    pub fn export_json(&self, path: &Path) -> StoreResult<()> {
        let doc = GraphDocument {
            base: None,
            entities: self.entities.read().values().cloned().collect(),
        };
        std::fs::write(path, serde_json::to_string_pretty(&doc)?)?;
        Ok(())
    }

    /// Fold the current state into the snapshot and truncate the log.
    pub fn checkpoint(&self) -> StoreResult<()> {
        let mut writer = self.writer.lock();
        self.checkpoint_locked(&mut writer)
    }

    fn checkpoint_locked(&self, writer: &mut WriterState) -> StoreResult<()> {
        let Some(durability) = &self.durability else {
            return Ok(());
        };
        let snapshot = Snapshot {
            last_tx_id: writer.last_tx_id,
            entities: self.entities.read().values().cloned().collect(),
            changelog: self.changelog.read().clone(),
        };
        snapshot.write(&durability.snapshot_path)?;
        durability.wal.append(&WalEntry::Checkpoint {
            last_tx_id: writer.last_tx_id,
        })?;
        durability.wal.truncate()?;
        writer.since_checkpoint = 0;
        tracing::info!(
            entities = snapshot.entities.len(),
            last_tx_id = writer.last_tx_id,
            "checkpoint written"
        );
        Ok(())
    }
}

impl TargetStore for GraphStore {
    fn contains_key(&self, key: &EntityKey) -> bool {
        self.entities.read().contains_key(key)
    }

    fn get_by_key(&self, key: &EntityKey) -> Option<Entity> {
        self.entities.read().get(key).cloned()
    }

    fn merge_graph(&self, graph: &Graph, dataset: &str) -> StoreResult<CommitRecord> {
        let mut writer = self.writer.lock();
        let tx_id = writer.last_tx_id + 1;
        let mut tx = Transaction::new(tx_id);

        let (mut inserted, mut updated) = (0, 0);
        {
            let current = self.entities.read();
            for incoming in graph.iter() {
                match current.get(incoming.key()) {
                    Some(stored) => {
                        let mut merged = stored.clone();
                        merged.absorb(incoming);
                        tx.upsert(merged);
                        updated += 1;
                    }
                    None => {
                        tx.upsert(incoming.clone());
                        inserted += 1;
                    }
                }
            }
        }

        let record = CommitRecord::new(tx_id, dataset, graph_digest(graph)?, inserted, updated);
        // Burn the id even if logging fails so a half-logged transaction is
        // never mistaken for a later one.
        writer.last_tx_id = tx_id;
        if let Some(durability) = &self.durability {
            tx.log(&durability.wal, &record)?;
        }

        {
            let mut entities = self.entities.write();
            for entity in tx.into_writes() {
                entities.insert(entity.key().clone(), entity);
            }
        }
        self.changelog.write().push(record.clone());

        tracing::info!(
            dataset,
            tx_id,
            inserted,
            updated,
            digest = %record.digest,
            "graph committed"
        );

        writer.since_checkpoint += 1;
        let checkpoint_due = self
            .durability
            .as_ref()
            .is_some_and(|d| d.checkpoint_every > 0 && writer.since_checkpoint >= d.checkpoint_every);
        if checkpoint_due {
            // The commit is already durable in the log.
            if let Err(err) = self.checkpoint_locked(&mut writer) {
                tracing::warn!(error = %err, "automatic checkpoint failed");
            }
        }

        Ok(record)
    }
}
