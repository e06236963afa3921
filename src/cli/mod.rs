//! CLI command handlers
//!
//! This module contains the implementation of CLI commands,
//! bridging the clap argument parsing with the service layer.

pub mod entity;
pub mod export;
pub mod import;
pub mod log;

pub use entity::{handle_entity_command, ActorArg, EntityCommands};
pub use export::{handle_export_command, ExportArgs};
pub use import::{handle_import_command, ImportArgs};
pub use log::{handle_log_command, LogCommands};
