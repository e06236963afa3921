//! File helpers for the snapshot and settings files
//!
//! Whole-file writes go through a temp file and a rename so a crash leaves
//! either the previous contents or the new ones, never a mix.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use serde::{de::DeserializeOwned, Serialize};

use crate::error::{AuditError, AuditResult};

/// Read JSON from a file, returning `None` if the file doesn't exist
pub fn read_json_optional<T, P>(path: P) -> AuditResult<Option<T>>
where
    T: DeserializeOwned,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    if !path.exists() {
        return Ok(None);
    }
    read_json_required(path).map(Some)
}

/// Read JSON from a file, returning an error if the file doesn't exist
pub fn read_json_required<T, P>(path: P) -> AuditResult<T>
where
    T: DeserializeOwned,
    P: AsRef<Path>,
{
    let path = path.as_ref();

    let file = File::open(path)
        .map_err(|e| AuditError::Storage(format!("Failed to open {}: {}", path.display(), e)))?;

    let reader = BufReader::new(file);
    serde_json::from_reader(reader)
        .map_err(|e| AuditError::Storage(format!("Failed to parse {}: {}", path.display(), e)))
}

/// Write JSON to a file atomically (write to temp, sync, then rename)
pub fn write_json_atomic<T, P>(path: P, data: &T) -> AuditResult<()>
where
    T: Serialize,
    P: AsRef<Path>,
{
    let path = path.as_ref();

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| {
            AuditError::Storage(format!(
                "Failed to create directory {}: {}",
                parent.display(),
                e
            ))
        })?;
    }

    // Same directory as the target so the rename stays on one filesystem
    let temp_path = path.with_extension("json.tmp");

    let file = File::create(&temp_path)
        .map_err(|e| AuditError::Storage(format!("Failed to create temp file: {}", e)))?;

    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, data)
        .map_err(|e| AuditError::Storage(format!("Failed to serialize data: {}", e)))?;

    writer
        .flush()
        .map_err(|e| AuditError::Storage(format!("Failed to flush data: {}", e)))?;

    writer
        .get_ref()
        .sync_all()
        .map_err(|e| AuditError::Storage(format!("Failed to sync data: {}", e)))?;

    fs::rename(&temp_path, path).map_err(|e| {
        let _ = fs::remove_file(&temp_path);
        AuditError::Storage(format!("Failed to rename temp file: {}", e))
    })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::TempDir;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Snapshot {
        seq: u64,
        kinds: Vec<String>,
    }

    fn sample() -> Snapshot {
        Snapshot {
            seq: 7,
            kinds: vec!["customers".into(), "contacts".into()],
        }
    }

    #[test]
    fn test_optional_read_of_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let loaded: Option<Snapshot> =
            read_json_optional(temp_dir.path().join("missing.json")).unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn test_write_then_read() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("snapshot.json");

        write_json_atomic(&path, &sample()).unwrap();

        let loaded: Snapshot = read_json_required(&path).unwrap();
        assert_eq!(loaded, sample());
        assert!(!temp_dir.path().join("nested").join("snapshot.json.tmp").exists());
    }

    #[test]
    fn test_required_read_errors() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("snapshot.json");
        assert!(read_json_required::<Snapshot, _>(&path).is_err());

        fs::write(&path, "{ not json").unwrap();
        let err = read_json_optional::<Snapshot, _>(&path).unwrap_err();
        assert!(err.is_storage_failure());
    }
}
