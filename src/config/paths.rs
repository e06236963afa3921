//! Path management for softaudit
//!
//! ## Path Resolution Order
//!
//! 1. `SOFTAUDIT_DATA_DIR` environment variable (if set)
//! 2. The platform configuration directory for `softaudit`
//!    (`~/.config/softaudit` on Linux, `%APPDATA%\softaudit\config` on Windows)

use std::path::PathBuf;

use directories::ProjectDirs;

use crate::error::AuditError;

/// Environment variable overriding the base directory
pub const DATA_DIR_ENV: &str = "SOFTAUDIT_DATA_DIR";

/// Manages all paths used by softaudit
#[derive(Debug, Clone)]
pub struct AuditPaths {
    /// Base directory for all softaudit data
    base_dir: PathBuf,
}

impl AuditPaths {
    /// Resolve the base directory from the environment or the platform default
    ///
    /// # Errors
    ///
    /// Returns an error if no home directory can be determined.
    pub fn new() -> Result<Self, AuditError> {
        let base_dir = match std::env::var(DATA_DIR_ENV) {
            Ok(custom) if !custom.trim().is_empty() => PathBuf::from(custom),
            _ => resolve_default_path()?,
        };

        Ok(Self { base_dir })
    }

    /// Create AuditPaths with a custom base directory (useful for testing)
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    pub fn base_dir(&self) -> &PathBuf {
        &self.base_dir
    }

    /// Directory holding the snapshot and the commit journal
    pub fn data_dir(&self) -> PathBuf {
        self.base_dir.join("data")
    }

    pub fn settings_file(&self) -> PathBuf {
        self.base_dir.join("config.json")
    }

    /// Append-only commit journal (one JSON line per committed transaction)
    pub fn journal_file(&self) -> PathBuf {
        self.data_dir().join("journal.jsonl")
    }

    /// Compacted table snapshot
    pub fn snapshot_file(&self) -> PathBuf {
        self.data_dir().join("snapshot.json")
    }

    /// Ensure the base and data directories exist
    pub fn ensure_directories(&self) -> Result<(), AuditError> {
        std::fs::create_dir_all(&self.base_dir)
            .map_err(|e| AuditError::Io(format!("Failed to create base directory: {}", e)))?;

        std::fs::create_dir_all(self.data_dir())
            .map_err(|e| AuditError::Io(format!("Failed to create data directory: {}", e)))?;

        Ok(())
    }

    /// Check if softaudit has been initialized (config file exists)
    pub fn is_initialized(&self) -> bool {
        self.settings_file().exists()
    }
}

fn resolve_default_path() -> Result<PathBuf, AuditError> {
    ProjectDirs::from("", "", "softaudit")
        .map(|dirs| dirs.config_dir().to_path_buf())
        .ok_or_else(|| AuditError::Config("Could not determine a home directory".into()))
}
