//! Bulk import CLI command

use std::path::PathBuf;

use clap::Args;

use crate::cli::entity::ActorArg;
use crate::database::Database;
use crate::error::{AuditError, AuditResult};
use crate::services::ImportService;

/// Arguments of `import`
#[derive(Args, Debug)]
pub struct ImportArgs {
    /// Entity kind to insert into
    pub kind: String,

    /// JSON array or CSV file with a header line
    pub file: PathBuf,

    /// Exit with an error when any item is rejected
    #[arg(long)]
    pub strict: bool,

    #[command(flatten)]
    pub actor: ActorArg,
}

/// Handle the import command
pub fn handle_import_command(db: &Database, args: ImportArgs) -> AuditResult<()> {
    if !args.file.exists() {
        return Err(AuditError::Import(format!(
            "File not found: {}",
            args.file.display()
        )));
    }

    let result =
        ImportService::new(db).import_file(args.actor.context()?, &args.kind, &args.file)?;

    println!("Import complete!");
    println!("  Imported: {}", result.imported);
    println!("  Failed:   {}", result.failed);

    if !result.error_messages.is_empty() {
        println!();
        println!("Errors:");
        for (item, message) in &result.error_messages {
            println!("  Item {}: {}", item, message);
        }
    }

    if args.strict && !result.is_clean() {
        return Err(AuditError::Import(format!(
            "{} of {} items were rejected",
            result.failed,
            result.failed + result.imported
        )));
    }

    Ok(())
}
