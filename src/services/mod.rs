//! Service layer for softaudit
//!
//! Operations on schema-declared kinds built on top of `Database`, used by
//! the CLI. Each mutating call is one unit of work.

pub mod entity;
pub mod import;

pub use entity::{parse_assignment, parse_assignments, parse_value, EntityService};
pub use import::{ImportFormat, ImportResult, ImportService};
