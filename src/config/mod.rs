//! Configuration module for softaudit
//!
//! This module provides configuration management including:
//! - Platform path resolution with an environment override
//! - Settings persistence (change-log policy, journal options, dynamic schema)

pub mod paths;
pub mod settings;

pub use paths::AuditPaths;
pub use settings::{AuditSettings, Settings, StorageSettings};
