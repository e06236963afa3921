use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use softaudit::cli::{
    handle_entity_command, handle_export_command, handle_import_command, handle_log_command,
    EntityCommands, ExportArgs, ImportArgs, LogCommands,
};
use softaudit::config::{paths::AuditPaths, settings::Settings};
use softaudit::database::Database;

/// Environment variable holding the log filter
const LOG_ENV: &str = "SOFTAUDIT_LOG";

#[derive(Parser)]
#[command(
    name = "softaudit",
    version,
    about = "Audited, soft-deleting row store",
    long_about = "softaudit stores rows of schema-declared kinds. Every write is \
                  stamped with its actor and time, recorded in an append-only \
                  change log, and deletes are logical: they cascade along owned \
                  relations and hide rows from normal reads."
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the data directory and settings
    Init {
        /// Write a sample schema (customers, contacts, notes)
        #[arg(long)]
        example: bool,
    },

    /// Show current configuration and paths
    Config,

    #[command(flatten)]
    Entity(EntityCommands),

    /// Insert every row of a JSON or CSV file
    Import(ImportArgs),

    /// Change log commands
    #[command(subcommand)]
    Log(LogCommands),

    /// Export the change log
    Export(ExportArgs),

    /// Fold the commit journal into a snapshot
    Compact,
}

fn init_logging() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();

    // Initialize paths and settings
    let paths = AuditPaths::new()?;
    let settings = Settings::load_or_create(&paths)?;

    match cli.command {
        Some(Commands::Init { example }) => {
            println!("Initializing softaudit at: {}", paths.base_dir().display());
            let settings = if example && settings.schema.is_empty() {
                settings.with_example_schema()
            } else {
                settings
            };
            settings.save(&paths)?;
            Database::open(&paths, &settings)?;
            println!("Initialization complete!");
            println!();
            if settings.schema.is_empty() {
                println!(
                    "Declare your kinds under \"schema\" in {}",
                    paths.settings_file().display()
                );
            } else {
                println!("Declared kinds:");
                for kind in &settings.schema {
                    println!("  - {}", kind.name);
                }
            }
        }
        Some(Commands::Config) => {
            println!("softaudit Configuration");
            println!("=======================");
            println!("Base directory:  {}", paths.base_dir().display());
            println!("Settings file:   {}", paths.settings_file().display());
            println!("Journal:         {}", paths.journal_file().display());
            println!("Snapshot:        {}", paths.snapshot_file().display());
            println!();
            println!("Settings:");
            println!("  Change log kind: {}", settings.audit.change_log_kind);
            println!("  Excluded kinds:  {}", settings.audit.excluded_kinds.join(", "));
            println!("  Sync journal:    {}", settings.storage.sync_journal);
            match settings.storage.compact_after_commits {
                Some(n) => println!("  Auto-compact:    after {} commits", n),
                None => println!("  Auto-compact:    off"),
            }
            println!();
            println!("Kinds:");
            if settings.schema.is_empty() {
                println!("  (none)");
            }
            for kind in &settings.schema {
                let mut traits = Vec::new();
                if kind.creation_audit || kind.update_audit {
                    traits.push("audited");
                }
                if kind.soft_delete {
                    traits.push("soft-delete");
                }
                println!("  {} [{}]", kind.name, traits.join(", "));
                for rel in &kind.relations {
                    println!(
                        "    {} -> {}{}",
                        rel.name,
                        rel.target,
                        if rel.cascade { " (cascade)" } else { "" }
                    );
                }
            }
        }
        Some(Commands::Entity(cmd)) => {
            let db = Database::open(&paths, &settings)?;
            handle_entity_command(&db, cmd)?;
        }
        Some(Commands::Import(args)) => {
            let db = Database::open(&paths, &settings)?;
            handle_import_command(&db, args)?;
        }
        Some(Commands::Log(cmd)) => {
            let db = Database::open(&paths, &settings)?;
            handle_log_command(&db, cmd)?;
        }
        Some(Commands::Export(args)) => {
            let db = Database::open(&paths, &settings)?;
            handle_export_command(&db, args)?;
        }
        Some(Commands::Compact) => {
            let db = Database::open(&paths, &settings)?;
            db.compact()?;
            println!("Journal compacted into {}", paths.snapshot_file().display());
        }
        None => {
            println!("softaudit - audited, soft-deleting row store");
            println!();
            println!("Run 'softaudit --help' for usage information.");
            println!("Run 'softaudit init --example' to start with a sample schema.");
        }
    }

    Ok(())
}
