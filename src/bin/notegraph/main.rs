//! notegraph CLI tool
//!
//! Command-line access to the link-graph queries and snapshot-backed batch edits of a vault.
//!
//! ## Commands
//!
//! - `outgoing`, `backlinks`, `orphans`, `graph`, `related`: link-graph queries
//! - `backup create|restore|list|cleanup`: snapshot management
//! - `batch-update <file>`, `batch-append <file>`: apply a JSON list of edits as one batch
//! - `list`, `stats`, `tags`: note listings, vault statistics and tag counts
//! - `set-frontmatter`: merge a field into a note's frontmatter
//! - `daily`, `daily-list`: date-named daily notes
//! - `templates`, `from-template`: list templates and create notes from them
//!
//! Results are printed to stdout as pretty JSON. Logs go to stderr and honour `RUST_LOG`.
//!
//! ## Choosing a vault
//!
//! `--config <file>` reads a TOML config, `--vault <dir>` uses a directory with default
//! settings, and with neither the `NOTEGRAPH_*` environment variables are used.
//!
//! Batch commands only write when `--confirm` is given; `batch-update --dry-run` shows what
//! would change.

use clap::{Parser, Subcommand};
use notegraph::{
    batch::Mutation,
    commands::{dispatch, AppendRequest, Op},
    config::{EnvConfigProvider, TomlConfigProvider, VaultConfigProvider},
    Vault, VaultConfig, VaultError,
};
use serde_yaml::{Mapping, Value};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "notegraph")]
#[command(author, version, about = "Link-graph queries and snapshot-backed batch edits for a notes vault", long_about = None)]
struct Cli {
    /// Vault directory (default settings)
    #[arg(long, global = true)]
    vault: Option<PathBuf>,

    /// TOML configuration file; takes precedence over --vault
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Notes a note links to
    Outgoing {
        /// Vault-relative note path
        path: String,
    },

    /// Notes linking to a note
    Backlinks {
        /// Vault-relative note path
        path: String,

        /// Scan at most this many notes (default: the whole vault)
        #[arg(long)]
        scan_limit: Option<usize>,
    },

    /// Notes with no links in either direction
    Orphans,

    /// Nodes and edges of the link graph
    Graph {
        #[arg(long, default_value = "500")]
        max_notes: usize,
    },

    /// Notes ranked by shared links, shared tags and direct links
    Related {
        /// Vault-relative note path
        path: String,

        #[arg(long, default_value = "10")]
        limit: usize,
    },

    /// Snapshot management
    Backup {
        #[command(subcommand)]
        command: BackupCommands,
    },

    /// Apply a JSON array of mutations as one batch
    BatchUpdate {
        /// File holding e.g. `[{"op": "update", "path": "A.md", "content": "..."}]`
        file: PathBuf,

        /// Show what would change without writing
        #[arg(long)]
        dry_run: bool,

        /// Required to write
        #[arg(long)]
        confirm: bool,
    },

    /// Append to several notes as one batch
    BatchAppend {
        /// File holding e.g. `[{"path": "A.md", "content": "..."}]`
        file: PathBuf,

        /// Required to write
        #[arg(long)]
        confirm: bool,
    },

    /// Notes in a folder, newest first
    List {
        /// Vault-relative folder (default: the vault root)
        #[arg(default_value = "")]
        folder: String,

        /// Only notes directly inside the folder
        #[arg(long)]
        no_recursive: bool,

        #[arg(long)]
        limit: Option<usize>,

        /// Include each note's tags
        #[arg(long)]
        tags: bool,
    },

    /// Note, tag and size totals
    Stats,

    /// Tags with usage counts, most used first
    Tags {
        #[arg(long, default_value = "100")]
        limit: usize,
    },

    /// Set one frontmatter field of a note, keeping its body
    SetFrontmatter {
        path: String,
        key: String,
        /// Parsed as YAML, so `3`, `true` and `[a, b]` keep their types
        value: String,
    },

    /// Show a daily note, creating it if needed
    Daily {
        /// YYYY-MM-DD (default: today)
        #[arg(long)]
        date: Option<String>,

        #[arg(long, default_value = notegraph::daily::DEFAULT_DAILY_FOLDER)]
        folder: String,

        /// Fail instead of creating a missing note
        #[arg(long)]
        no_create: bool,
    },

    /// Recent daily notes, newest first
    DailyList {
        #[arg(long, default_value = notegraph::daily::DEFAULT_DAILY_FOLDER)]
        folder: String,

        #[arg(long, default_value = "30")]
        limit: usize,
    },

    /// Notes in the templates folder
    Templates {
        #[arg(long, default_value = notegraph::template::DEFAULT_TEMPLATE_FOLDER)]
        folder: String,
    },

    /// Create a note from a template
    FromTemplate {
        template: String,
        new_path: String,

        /// Fills `{{title}}`
        #[arg(long)]
        title: Option<String>,
    },
}

#[derive(Subcommand)]
enum BackupCommands {
    /// Snapshot the given notes
    Create {
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// Write a snapshot's notes back into the vault
    Restore { snapshot_id: String },

    /// Snapshots, newest first
    List {
        #[arg(long, default_value = "10")]
        limit: usize,
    },

    /// Delete snapshots older than the retention window
    Cleanup {
        /// Override the configured retention
        #[arg(long)]
        max_age_days: Option<u32>,
    },
}

fn load_vault(cli: &Cli) -> Result<Vault, VaultError> {
    if let Some(config_path) = &cli.config {
        return Vault::from_provider(&TomlConfigProvider::new(config_path.clone()));
    }
    if let Some(vault_path) = &cli.vault {
        return Vault::open(VaultConfig::new(vault_path));
    }
    Vault::open(EnvConfigProvider::new().load()?)
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, VaultError> {
    let raw = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

fn to_op(command: Commands) -> Result<Op, VaultError> {
    let op = match command {
        Commands::Outgoing { path } => Op::Outgoing { path },
        Commands::Backlinks { path, scan_limit } => Op::Backlinks { path, scan_limit },
        Commands::Orphans => Op::Orphans,
        Commands::Graph { max_notes } => Op::Graph { max_notes },
        Commands::Related { path, limit } => Op::Related { path, limit },
        Commands::Backup { command } => match command {
            BackupCommands::Create { paths } => Op::CreateBatchBackup { paths },
            BackupCommands::Restore { snapshot_id } => Op::RestoreBatchBackup { snapshot_id },
            BackupCommands::List { limit } => Op::ListBatchBackups { limit },
            BackupCommands::Cleanup { max_age_days } => Op::CleanupBatchBackups { max_age_days },
        },
        Commands::BatchUpdate {
            file,
            dry_run,
            confirm,
        } => Op::BatchUpdate {
            mutations: read_json::<Vec<Mutation>>(&file)?,
            dry_run,
            confirm,
        },
        Commands::BatchAppend { file, confirm } => Op::BatchAppend {
            appends: read_json::<Vec<AppendRequest>>(&file)?,
            confirm,
        },
        Commands::List {
            folder,
            no_recursive,
            limit,
            tags,
        } => Op::ListNotes {
            folder,
            recursive: !no_recursive,
            limit,
            include_tags: tags,
        },
        Commands::Stats => Op::Stats,
        Commands::Tags { limit } => Op::ListTags { limit },
        Commands::SetFrontmatter { path, key, value } => {
            let mut updates = Mapping::new();
            updates.insert(Value::from(key), serde_yaml::from_str::<Value>(&value)?);
            Op::UpdateFrontmatter { path, updates }
        }
        Commands::Daily {
            date,
            folder,
            no_create,
        } => Op::DailyNote {
            date,
            folder,
            create: !no_create,
        },
        Commands::DailyList { folder, limit } => Op::ListDailyNotes { folder, limit },
        Commands::Templates { folder } => Op::ListTemplates { folder },
        Commands::FromTemplate {
            template,
            new_path,
            title,
        } => Op::CreateFromTemplate {
            template_path: template,
            new_path,
            title,
        },
    };
    Ok(op)
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .init();

    let vault = load_vault(&cli)?;
    let op = to_op(cli.command)?;

    match dispatch(&vault, op).await {
        Ok(result) => {
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(())
        }
        Err(e) => {
            tracing::error!("{e}");
            eprintln!("{}", serde_json::to_string_pretty(&e)?);
            std::process::exit(match e.status_code().as_u16() {
                400 => 2,
                404 => 3,
                403 => 4,
                409 => 5,
                _ => 1,
            });
        }
    }
}
