//! Change log
//!
//! Records every insert, update and logical delete committed through a unit
//! of work as an immutable row of the change-log kind.
//!
//! - `ChangeLogEntry`: one row of the log (kind, action, row id, payload,
//!   success flag, commit timestamp).
//! - `changed_columns` / `describe_changes`: per-column diffs used for UPDATE
//!   payloads and for display.
//! - `ChangeLog`: read access to the committed log.

mod diff;
mod entry;
mod log;

pub use diff::{changed_columns, describe_changes, format_value, summarize_payload};
pub use entry::{ChangeAction, ChangeLogEntry};
pub use log::ChangeLog;
