//! CLI command for change log export

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use clap::Args;

use crate::database::Database;
use crate::error::{AuditError, AuditResult};
use crate::export::{export_change_log, ExportFormat};

/// Arguments of `export`
#[derive(Args, Debug)]
pub struct ExportArgs {
    /// Output file path; standard output when omitted
    pub output: Option<PathBuf>,

    /// Export format
    #[arg(short, long, value_enum, default_value = "json")]
    pub format: ExportFormat,
}

/// Handle the export command
pub fn handle_export_command(db: &Database, args: ExportArgs) -> AuditResult<()> {
    match args.output {
        Some(path) => {
            let file = File::create(&path).map_err(|e| {
                AuditError::Export(format!("Failed to create {}: {}", path.display(), e))
            })?;
            let mut writer = BufWriter::new(file);
            export_change_log(db, args.format, &mut writer)?;
            writer
                .flush()
                .map_err(|e| AuditError::Export(e.to_string()))?;

            let count = db.change_log().count()?;
            println!(
                "Exported {} change-log entries to {} ({:?})",
                count,
                path.display(),
                args.format
            );
        }
        None => {
            let stdout = io::stdout();
            let mut writer = stdout.lock();
            export_change_log(db, args.format, &mut writer)?;
            writer
                .flush()
                .map_err(|e| AuditError::Export(e.to_string()))?;
        }
    }

    Ok(())
}
