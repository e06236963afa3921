//! Query rewriting and execution
//!
//! Reads are described with `Query`, rewritten by the `QueryPipeline` (which
//! always applies the soft-delete filter) and only then executed.

pub mod options;
pub mod pipeline;
pub mod predicate;
pub mod select;

pub use options::{ExecutionOptions, INCLUDE_DELETED};
pub use pipeline::{PreparedQuery, QueryPipeline, QueryRow, QueryStage, SoftDeleteFilter};
pub use predicate::Predicate;
pub use select::{Join, JoinOn, Query, SortOrder};
