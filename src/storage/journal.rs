//! Append-only commit journal
//!
//! Each committed transaction is one JSON line holding the full image of
//! every row it wrote, entity rows and change-log rows alike. A commit is
//! durable once its line is on disk; a line cut short by a crash is the
//! only thing recovery tolerates.

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{AuditError, AuditResult};

use super::tables::RowWrite;

/// One committed transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitBatch {
    pub seq: u64,
    pub committed_at: DateTime<Utc>,
    pub writes: Vec<RowWrite>,
}

/// Handle on the journal file
#[derive(Debug)]
pub struct Journal {
    path: PathBuf,
    sync: bool,
}

impl Journal {
    pub fn new(path: PathBuf, sync: bool) -> Self {
        Self { path, sync }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every complete batch, dropping a torn final line
    ///
    /// A malformed line anywhere but the end means the journal was damaged
    /// after it was written, which is reported instead of skipped.
    pub fn recover(&self) -> AuditResult<Vec<CommitBatch>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let contents = fs::read_to_string(&self.path).map_err(|e| {
            AuditError::Storage(format!("Failed to read journal {}: {}", self.path.display(), e))
        })?;

        let lines: Vec<&str> = contents.split_inclusive('\n').collect();
        let mut batches = Vec::new();
        let mut valid_len = 0usize;

        for (index, line) in lines.iter().enumerate() {
            if line.trim().is_empty() {
                valid_len += line.len();
                continue;
            }

            let is_last = index == lines.len() - 1;
            match serde_json::from_str::<CommitBatch>(line.trim_end()) {
                Ok(batch) if line.ends_with('\n') => {
                    valid_len += line.len();
                    batches.push(batch);
                }
                Err(e) if !is_last => {
                    return Err(AuditError::Storage(format!(
                        "Corrupt journal entry at line {}: {}",
                        index + 1,
                        e
                    )));
                }
                // Only the final line can lack its terminator
                result => {
                    let reason = match result {
                        Ok(_) => "missing line terminator".to_string(),
                        Err(e) => e.to_string(),
                    };
                    warn!(
                        journal = %self.path.display(),
                        %reason,
                        "discarding torn final journal line"
                    );
                    self.truncate_to(valid_len as u64)?;
                }
            }
        }

        debug!(batches = batches.len(), "journal recovered");
        Ok(batches)
    }

    /// Append one batch as a single line
    ///
    /// An unterminated fragment left by an earlier failed append is cut
    /// off first. If this append fails, the journal is truncated back to
    /// its previous length so no partial line survives.
    pub fn append(&self, batch: &CommitBatch) -> AuditResult<()> {
        let mut line = serde_json::to_string(batch).map_err(|e| {
            AuditError::Storage(format!("Failed to encode commit {}: {}", batch.seq, e))
        })?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| AuditError::Storage(format!("Failed to open journal: {}", e)))?;

        let prev_len = self.complete_len(&mut file)?;

        if let Err(e) = self.write_line(&mut file, &line) {
            if let Err(undo) = self.truncate_to(prev_len) {
                warn!(error = %undo, "could not remove partial journal line");
            }
            return Err(e);
        }
        Ok(())
    }

    fn write_line(&self, file: &mut File, line: &str) -> AuditResult<()> {
        file.write_all(line.as_bytes())
            .map_err(|e| AuditError::Storage(format!("Failed to append commit: {}", e)))?;

        file.flush()
            .map_err(|e| AuditError::Storage(format!("Failed to flush journal: {}", e)))?;

        if self.sync {
            file.sync_data()
                .map_err(|e| AuditError::Storage(format!("Failed to sync journal: {}", e)))?;
        }
        Ok(())
    }

    /// Length of the journal up to its last line terminator
    ///
    /// Anything after it is a fragment of a failed append and is removed.
    fn complete_len(&self, file: &mut File) -> AuditResult<u64> {
        let len = file
            .metadata()
            .map_err(|e| AuditError::Storage(format!("Failed to stat journal: {}", e)))?
            .len();
        if len == 0 {
            return Ok(0);
        }

        let mut last = [0u8; 1];
        file.seek(SeekFrom::Start(len - 1))
            .and_then(|_| file.read_exact(&mut last))
            .map_err(|e| AuditError::Storage(format!("Failed to read journal: {}", e)))?;
        if last[0] == b'\n' {
            return Ok(len);
        }

        let mut contents = Vec::new();
        file.seek(SeekFrom::Start(0))
            .and_then(|_| file.read_to_end(&mut contents))
            .map_err(|e| AuditError::Storage(format!("Failed to read journal: {}", e)))?;
        let complete = contents
            .iter()
            .rposition(|&b| b == b'\n')
            .map_or(0, |i| i as u64 + 1);

        warn!(
            journal = %self.path.display(),
            dropped = len - complete,
            "discarding unterminated journal fragment"
        );
        self.truncate_to(complete)?;
        Ok(complete)
    }

    /// Empty the journal after its contents were folded into a snapshot
    pub fn reset(&self) -> AuditResult<()> {
        self.truncate_to(0)
    }

    fn truncate_to(&self, len: u64) -> AuditResult<()> {
        let file = match OpenOptions::new().write(true).open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                File::create(&self.path).map_err(|e| {
                    AuditError::Storage(format!("Failed to create journal: {}", e))
                })?
            }
            Err(e) => {
                return Err(AuditError::Storage(format!(
                    "Failed to open journal: {}",
                    e
                )))
            }
        };
        file.set_len(len)
            .map_err(|e| AuditError::Storage(format!("Failed to truncate journal: {}", e)))?;
        file.sync_all()
            .map_err(|e| AuditError::Storage(format!("Failed to sync journal: {}", e)))
    }
}
