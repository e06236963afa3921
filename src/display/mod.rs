//! Display formatting for terminal output
//!
//! Tables of stored rows and listings of the change log.

pub mod change_log;
pub mod rows;

pub use change_log::{format_change_log_details, format_change_log_list, format_commit_report};
pub use rows::{format_cell, format_query_rows, format_row_details, format_rows_table};
