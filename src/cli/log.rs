//! Change log CLI commands

use clap::Subcommand;

use crate::audit::{ChangeAction, ChangeLogEntry};
use crate::database::Database;
use crate::display::{format_change_log_details, format_change_log_list};
use crate::error::{AuditError, AuditResult};
use crate::models::ChangeId;

/// Change log subcommands
#[derive(Subcommand)]
pub enum LogCommands {
    /// List recent change-log entries
    List {
        /// Number of entries to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
        /// Only entries for this kind
        #[arg(short, long)]
        kind: Option<String>,
        /// Only entries for this row id (requires --kind)
        #[arg(short, long, requires = "kind")]
        row: Option<String>,
        /// Only entries with this action (insert, update, delete)
        #[arg(short, long)]
        action: Option<String>,
    },
    /// Show one entry in full
    Show {
        /// Change-log entry id
        id: String,
    },
}

/// Handle a change log command
pub fn handle_log_command(db: &Database, cmd: LogCommands) -> AuditResult<()> {
    let log = db.change_log();

    match cmd {
        LogCommands::List {
            limit,
            kind,
            row,
            action,
        } => {
            let action = action.as_deref().map(str::parse::<ChangeAction>).transpose()?;

            let mut entries: Vec<ChangeLogEntry> = match (&kind, &row) {
                (Some(kind), Some(row)) => log.for_row(kind, row)?,
                (Some(kind), None) => log.for_kind(kind)?,
                _ => log.read_all()?,
            };
            if let Some(action) = action {
                entries.retain(|e| e.action == action);
            }

            let start = entries.len().saturating_sub(limit);
            print!("{}", format_change_log_list(&entries[start..]));
        }

        LogCommands::Show { id } => {
            let change_id: ChangeId = id
                .trim()
                .parse()
                .map_err(|e| AuditError::Validation(format!("Invalid change id '{}': {}", id, e)))?;
            let entry = log
                .get(change_id)?
                .ok_or_else(|| AuditError::not_found("change", id))?;
            print!("{}", format_change_log_details(&entry));
        }
    }

    Ok(())
}
