//! Entity CLI commands
//!
//! Insert, update, delete and read rows of the kinds declared in the
//! settings schema.

use clap::{Args, Subcommand};

use crate::database::Database;
use crate::display::{format_commit_report, format_query_rows, format_row_details, format_rows_table};
use crate::error::{AuditError, AuditResult};
use crate::models::{ActorContext, ActorId, EntityId};
use crate::query::ExecutionOptions;
use crate::services::{parse_assignments, EntityService};

/// The actor a mutating command is attributed to
#[derive(Args, Debug, Clone, Default)]
pub struct ActorArg {
    /// Acting user id (UUID); omit for a system action
    #[arg(long, env = "SOFTAUDIT_ACTOR")]
    pub actor: Option<String>,
}

impl ActorArg {
    pub fn context(&self) -> AuditResult<ActorContext> {
        match self.actor.as_deref().map(str::trim) {
            None | Some("") => Ok(ActorContext::system()),
            Some(raw) => raw
                .parse::<ActorId>()
                .map(ActorContext::actor)
                .map_err(|e| AuditError::Validation(format!("Invalid actor id '{}': {}", raw, e))),
        }
    }
}

pub(crate) fn parse_entity_id(raw: &str) -> AuditResult<EntityId> {
    raw.trim()
        .parse()
        .map_err(|e| AuditError::Validation(format!("Invalid id '{}': {}", raw, e)))
}

fn options(include_deleted: bool) -> ExecutionOptions {
    ExecutionOptions::from(include_deleted)
}

/// Entity commands
#[derive(Subcommand)]
pub enum EntityCommands {
    /// Insert a row
    Insert {
        /// Entity kind
        kind: String,
        /// Column values as column=value
        #[arg(required = true)]
        fields: Vec<String>,
        #[command(flatten)]
        actor: ActorArg,
    },
    /// Update columns of a row
    Update {
        /// Entity kind
        kind: String,
        /// Row id
        id: String,
        /// New column values as column=value
        #[arg(required = true)]
        fields: Vec<String>,
        #[command(flatten)]
        actor: ActorArg,
    },
    /// Soft-delete a row and everything it owns
    Delete {
        /// Entity kind
        kind: String,
        /// Row id
        id: String,
        #[command(flatten)]
        actor: ActorArg,
    },
    /// Show one row
    Show {
        /// Entity kind
        kind: String,
        /// Row id
        id: String,
        /// Also find deleted rows
        #[arg(long)]
        include_deleted: bool,
    },
    /// List rows of a kind
    Query {
        /// Entity kind
        kind: String,
        /// Filter as column=value (repeatable)
        #[arg(short = 'w', long = "where")]
        filters: Vec<String>,
        /// Include deleted rows
        #[arg(long)]
        include_deleted: bool,
        /// Load every declared relation with each row
        #[arg(short, long)]
        relations: bool,
        /// Maximum number of rows
        #[arg(short, long)]
        limit: Option<usize>,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// List the rows a row owns through one relation
    Related {
        /// Entity kind
        kind: String,
        /// Row id
        id: String,
        /// Relation name
        relation: String,
        /// Include deleted rows
        #[arg(long)]
        include_deleted: bool,
    },
}

/// Handle an entity command
pub fn handle_entity_command(db: &Database, cmd: EntityCommands) -> AuditResult<()> {
    let service = EntityService::new(db);

    match cmd {
        EntityCommands::Insert {
            kind,
            fields,
            actor,
        } => {
            let (id, report) = service.insert(actor.context()?, &kind, parse_assignments(&fields)?)?;
            println!("Inserted {} {}", kind, id.to_key());
            println!("{}", format_commit_report(&report));
        }

        EntityCommands::Update {
            kind,
            id,
            fields,
            actor,
        } => {
            let id = parse_entity_id(&id)?;
            let report = service.update(actor.context()?, &kind, id, parse_assignments(&fields)?)?;
            if report.is_empty() {
                println!("No changes to {} {}", kind, id.to_key());
            } else {
                println!("Updated {} {}", kind, id.to_key());
                println!("{}", format_commit_report(&report));
            }
        }

        EntityCommands::Delete { kind, id, actor } => {
            let id = parse_entity_id(&id)?;
            let report = service.delete(actor.context()?, &kind, id)?;
            if report.is_empty() {
                println!("{} {} is already deleted", kind, id.to_key());
            } else {
                println!("Deleted {} {}", kind, id.to_key());
                println!("{}", format_commit_report(&report));
            }
        }

        EntityCommands::Show {
            kind,
            id,
            include_deleted,
        } => {
            let id = parse_entity_id(&id)?;
            let row = service
                .show(&kind, id, options(include_deleted))?
                .ok_or_else(|| AuditError::not_found(&kind, id.to_key()))?;
            print!("{}", format_row_details(&kind, &row));
        }

        EntityCommands::Query {
            kind,
            filters,
            include_deleted,
            relations,
            limit,
            json,
        } => {
            let filters = parse_assignments(&filters)?;

            if relations {
                if !filters.is_empty() {
                    return Err(AuditError::Validation(
                        "--where cannot be combined with --relations".into(),
                    ));
                }
                let mut rows = service.list_with_relations(&kind, options(include_deleted))?;
                if let Some(limit) = limit {
                    rows.truncate(limit);
                }
                if json {
                    println!("{}", serde_json::to_string_pretty(&rows)?);
                } else {
                    print!("{}", format_query_rows(&rows));
                }
            } else {
                let mut rows = service.list(&kind, filters, options(include_deleted))?;
                if let Some(limit) = limit {
                    rows.truncate(limit);
                }
                if json {
                    println!("{}", serde_json::to_string_pretty(&rows)?);
                } else {
                    print!("{}", format_rows_table(&rows));
                }
            }
        }

        EntityCommands::Related {
            kind,
            id,
            relation,
            include_deleted,
        } => {
            let id = parse_entity_id(&id)?;
            let rows = service.related(&kind, id, &relation, options(include_deleted))?;
            print!("{}", format_rows_table(&rows));
        }
    }

    Ok(())
}
