//! User settings for softaudit
//!
//! Controls which kinds are recorded in the change log, how the journal is
//! flushed, and declares the schema of dynamic kinds.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::paths::AuditPaths;
use crate::error::AuditError;
use crate::models::KindSchema;
use crate::storage::file_io::{read_json_required, write_json_atomic};
use crate::storage::StoreOptions;

/// Change-log behaviour
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditSettings {
    /// Kind name of the change-log table
    #[serde(default = "default_change_log_kind")]
    pub change_log_kind: String,

    /// Kinds that are persisted but never recorded in the change log
    #[serde(default = "default_excluded_kinds")]
    pub excluded_kinds: Vec<String>,

    /// Whether `updated_at`/`updated_by` appear in UPDATE payloads
    #[serde(default)]
    pub record_update_stamps: bool,
}

impl AuditSettings {
    /// Whether mutations of `kind` produce change-log entries
    pub fn is_recorded(&self, kind: &str) -> bool {
        kind != self.change_log_kind && !self.excluded_kinds.iter().any(|k| k == kind)
    }
}

impl Default for AuditSettings {
    fn default() -> Self {
        Self {
            change_log_kind: default_change_log_kind(),
            excluded_kinds: default_excluded_kinds(),
            record_update_stamps: false,
        }
    }
}

/// Journal and snapshot behaviour
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageSettings {
    /// fsync the journal after every commit
    #[serde(default = "default_sync_journal")]
    pub sync_journal: bool,

    /// Compact the journal into a snapshot after this many commits
    #[serde(default = "default_compact_after")]
    pub compact_after_commits: Option<u64>,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            sync_journal: default_sync_journal(),
            compact_after_commits: default_compact_after(),
        }
    }
}

/// User settings for softaudit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Schema version for migration support
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,

    #[serde(default)]
    pub audit: AuditSettings,

    #[serde(default)]
    pub storage: StorageSettings,

    /// Dynamic kinds available to the CLI
    #[serde(default)]
    pub schema: Vec<KindSchema>,
}

fn default_schema_version() -> u32 {
    1
}

fn default_change_log_kind() -> String {
    "data_changes".to_string()
}

fn default_excluded_kinds() -> Vec<String> {
    vec!["user_actions".to_string()]
}

fn default_sync_journal() -> bool {
    true
}

fn default_compact_after() -> Option<u64> {
    Some(500)
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            schema_version: default_schema_version(),
            audit: AuditSettings::default(),
            storage: StorageSettings::default(),
            schema: Vec::new(),
        }
    }
}

impl Settings {
    /// Load settings from disk, or return defaults if the file doesn't exist
    pub fn load_or_create(paths: &AuditPaths) -> Result<Self, AuditError> {
        let settings_path = paths.settings_file();

        if !settings_path.exists() {
            // Don't save yet - let caller decide when to persist
            return Ok(Settings::default());
        }

        let settings: Settings = read_json_required(&settings_path)
            .map_err(|e| AuditError::Config(format!("Failed to load settings: {}", e)))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Save settings to disk
    pub fn save(&self, paths: &AuditPaths) -> Result<(), AuditError> {
        self.validate()?;
        paths.ensure_directories()?;
        write_json_atomic(paths.settings_file(), self)
    }

    /// Sample schema written by `init --example`: customers owning
    /// contacts (cascading) and notes (not cascading)
    pub fn with_example_schema(mut self) -> Self {
        self.schema = vec![
            KindSchema::new("customers")
                .audited()
                .soft_deletable()
                .owns("contacts", "contacts", "customer_id", true)
                .owns("notes", "notes", "customer_id", false),
            KindSchema::new("contacts").audited().soft_deletable(),
            KindSchema::new("notes").audited().soft_deletable(),
        ];
        self
    }

    /// Look up a dynamic kind by name
    pub fn kind_schema(&self, name: &str) -> Option<&KindSchema> {
        self.schema.iter().find(|k| k.name == name)
    }

    /// Options handed to the storage engine
    pub fn store_options(&self) -> StoreOptions {
        StoreOptions {
            sync_journal: self.storage.sync_journal,
            compact_after_commits: self.storage.compact_after_commits,
        }
    }

    /// Check the schema for duplicate kinds and dangling relation targets
    pub fn validate(&self) -> Result<(), AuditError> {
        if self.audit.change_log_kind.trim().is_empty() {
            return Err(AuditError::Config(
                "change_log_kind cannot be empty".into(),
            ));
        }

        let mut names = HashSet::new();
        for kind in &self.schema {
            if kind.name == self.audit.change_log_kind {
                return Err(AuditError::Config(format!(
                    "'{}' is reserved for the change log",
                    kind.name
                )));
            }
            if !names.insert(kind.name.as_str()) {
                return Err(AuditError::Config(format!(
                    "kind '{}' is declared twice",
                    kind.name
                )));
            }
        }

        for kind in &self.schema {
            for relation in &kind.relations {
                if !names.contains(relation.target.as_str()) {
                    return Err(AuditError::Config(format!(
                        "relation '{}.{}' targets undeclared kind '{}'",
                        kind.name, relation.name, relation.target
                    )));
                }
            }
        }

        Ok(())
    }
}
