//! Storage layer for softaudit
//!
//! The unit of work only talks to storage through `StorageEngine` and
//! `StorageTransaction`. `Store` is the bundled engine: committed tables held
//! in memory, made durable by an append-only journal that is periodically
//! compacted into an atomic snapshot.

pub mod file_io;
pub mod journal;
pub mod tables;
pub mod transaction;

pub use journal::{CommitBatch, Journal};
pub use tables::{RowWrite, Tables};
pub use transaction::StoreTransaction;

use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{AuditError, AuditResult};
use crate::models::Row;

use file_io::{read_json_optional, write_json_atomic};

/// Engine the unit of work commits through
pub trait StorageEngine: Send + Sync {
    /// Open a transaction; its writes become visible only on commit
    fn begin(&self) -> AuditResult<Box<dyn StorageTransaction + '_>>;

    /// Fold durable history into a compact form, if the engine has one
    fn compact(&self) -> AuditResult<()> {
        Ok(())
    }
}

/// Permission to read raw rows, soft-deleted ones included
///
/// Only the query pipeline can create one. Engines receive it with each
/// read and may hand it on to an engine they wrap, but code outside the
/// crate cannot read storage without going through the pipeline.
///
/// ```compile_fail
/// let read = softaudit::storage::RawRead(());
/// ```
#[derive(Debug, Clone, Copy)]
pub struct RawRead(());

impl RawRead {
    pub(crate) fn grant() -> Self {
        Self(())
    }
}

/// One storage transaction
///
/// Rows are only ever inserted or updated; there is no delete.
pub trait StorageTransaction {
    /// All rows of a kind, ordered by row id
    fn scan(&self, kind: &str, read: RawRead) -> AuditResult<Vec<Row>>;

    fn fetch(&self, kind: &str, row_id: &str, read: RawRead) -> AuditResult<Option<Row>>;

    /// Insert a row that must not exist yet
    fn insert(&mut self, kind: &str, row_id: &str, row: Row) -> AuditResult<()>;

    /// Overwrite `changes` on an existing row
    fn update(&mut self, kind: &str, row_id: &str, changes: Row) -> AuditResult<()>;

    /// Make every write visible at once, or none of them
    fn commit(self: Box<Self>) -> AuditResult<()>;

    fn rollback(self: Box<Self>);
}

/// Durability options for a file-backed store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreOptions {
    /// fsync the journal on every commit
    pub sync_journal: bool,
    /// Snapshot and truncate the journal after this many commits
    pub compact_after_commits: Option<u64>,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            sync_journal: true,
            compact_after_commits: None,
        }
    }
}

/// On-disk snapshot format
#[derive(Debug, Default, Deserialize)]
struct Snapshot {
    seq: u64,
    tables: Tables,
}

#[derive(Debug, Default)]
pub(crate) struct StoreState {
    tables: Tables,
    /// Sequence number of the last applied commit
    seq: u64,
    since_compaction: u64,
}

/// The bundled storage engine
#[derive(Debug)]
pub struct Store {
    state: RwLock<StoreState>,
    journal: Option<Journal>,
    snapshot_path: Option<PathBuf>,
    options: StoreOptions,
}

impl Store {
    /// A store that lives only as long as the process
    pub fn in_memory() -> Self {
        Self {
            state: RwLock::new(StoreState::default()),
            journal: None,
            snapshot_path: None,
            options: StoreOptions::default(),
        }
    }

    /// Open (or create) a file-backed store in `dir`
    ///
    /// Loads `snapshot.json` if present, then replays every journal batch
    /// newer than the snapshot.
    pub fn open(dir: &Path, options: StoreOptions) -> AuditResult<Self> {
        std::fs::create_dir_all(dir).map_err(|e| {
            AuditError::Storage(format!("Failed to create {}: {}", dir.display(), e))
        })?;

        let snapshot_path = dir.join("snapshot.json");
        let journal = Journal::new(dir.join("journal.jsonl"), options.sync_journal);

        let snapshot: Snapshot = read_json_optional(&snapshot_path)?.unwrap_or_default();
        let mut state = StoreState {
            tables: snapshot.tables,
            seq: snapshot.seq,
            since_compaction: 0,
        };

        let mut replayed = 0u64;
        for batch in journal.recover()? {
            if batch.seq <= state.seq {
                continue;
            }
            state.seq = batch.seq;
            for write in batch.writes {
                state.tables.apply(write);
            }
            replayed += 1;
        }
        state.since_compaction = replayed;

        info!(
            dir = %dir.display(),
            seq = state.seq,
            replayed,
            rows = state.tables.row_count(),
            "store opened"
        );

        Ok(Self {
            state: RwLock::new(state),
            journal: Some(journal),
            snapshot_path: Some(snapshot_path),
            options,
        })
    }

    /// Sequence number of the last committed transaction
    pub fn last_seq(&self) -> AuditResult<u64> {
        Ok(self.read_state()?.seq)
    }

    pub(crate) fn read_state(&self) -> AuditResult<RwLockReadGuard<'_, StoreState>> {
        self.state
            .read()
            .map_err(|e| AuditError::Storage(format!("Failed to acquire read lock: {}", e)))
    }

    pub(crate) fn write_state(&self) -> AuditResult<RwLockWriteGuard<'_, StoreState>> {
        self.state
            .write()
            .map_err(|e| AuditError::Storage(format!("Failed to acquire write lock: {}", e)))
    }

    /// Journal a resolved batch, then publish it
    ///
    /// Nothing is applied in memory unless the journal append succeeded.
    pub(crate) fn apply_batch(
        &self,
        state: &mut StoreState,
        writes: Vec<RowWrite>,
    ) -> AuditResult<()> {
        let batch = CommitBatch {
            seq: state.seq + 1,
            committed_at: Utc::now(),
            writes,
        };

        if let Some(journal) = &self.journal {
            journal.append(&batch)?;
        }

        state.seq = batch.seq;
        for write in batch.writes {
            state.tables.apply(write);
        }
        state.since_compaction += 1;

        if let Some(threshold) = self.options.compact_after_commits {
            if threshold > 0 && state.since_compaction >= threshold {
                // The commit is already durable in the journal
                if let Err(e) = self.write_snapshot(state) {
                    warn!(error = %e, "automatic compaction failed");
                }
            }
        }

        Ok(())
    }

    fn write_snapshot(&self, state: &mut StoreState) -> AuditResult<()> {
        let (Some(path), Some(journal)) = (&self.snapshot_path, &self.journal) else {
            return Ok(());
        };

        write_json_atomic(
            path,
            &SnapshotRef {
                seq: state.seq,
                tables: &state.tables,
            },
        )?;
        journal.reset()?;
        state.since_compaction = 0;

        debug!(seq = state.seq, "journal compacted into snapshot");
        Ok(())
    }
}

#[derive(Serialize)]
struct SnapshotRef<'a> {
    seq: u64,
    tables: &'a Tables,
}

impl StorageEngine for Store {
    fn begin(&self) -> AuditResult<Box<dyn StorageTransaction + '_>> {
        Ok(Box::new(StoreTransaction::new(self)))
    }

    fn compact(&self) -> AuditResult<()> {
        let mut state = self.write_state()?;
        self.write_snapshot(&mut state)
    }
}
