//! softaudit - transactional audit and soft-delete layer
//!
//! Wraps a row store so that every write made through a unit of work is
//! stamped with its actor and time, recorded in an append-only change log,
//! and every delete is logical: it cascades along owned relations and hides
//! the rows from normal reads.
//!
//! # Architecture
//!
//! The crate is organized into the following modules:
//!
//! - `config`: Configuration and path management
//! - `error`: Custom error types
//! - `models`: Identities, actor context, audit columns, entity traits
//! - `storage`: Storage engine traits and the journaled row store
//! - `query`: Queries and the read pipeline with the soft-delete filter
//! - `registry`: Loaders that turn stored rows into tracked entities
//! - `uow`: Unit of work (stamping, cascading, change recording)
//! - `audit`: Change-log entries and reader
//! - `database`: Entry point tying the above together
//! - `services`, `cli`, `display`, `export`: the `softaudit` binary
//!
//! # Example
//!
//! ```rust,ignore
//! use softaudit::{ActorContext, Database, Registry};
//!
//! let mut registry = Registry::new();
//! registry.register::<Customer>();
//! let db = Database::in_memory(registry);
//!
//! db.with_unit_of_work(ActorContext::actor(user), |uow| {
//!     uow.track(Customer::new("Acme"))?;
//!     Ok(())
//! })?;
//! ```

pub mod audit;
pub mod cli;
pub mod config;
pub mod database;
pub mod display;
pub mod error;
pub mod export;
pub mod models;
pub mod query;
pub mod registry;
pub mod services;
pub mod storage;
pub mod uow;

pub use audit::{ChangeAction, ChangeLog, ChangeLogEntry};
pub use database::Database;
pub use error::{AuditError, AuditResult};
pub use models::{
    ActorContext, ActorId, CreationAudited, CreationStamp, EntityId, EntityState, Record,
    Relation, SoftDeletable, SoftDeleteMarker, TrackedEntity, UpdateAudited, UpdateStamp,
};
pub use query::{ExecutionOptions, Predicate, Query, INCLUDE_DELETED};
pub use registry::Registry;
pub use uow::{CommitReport, UnitOfWork};
