//! pcgs-scalar - course scalar command-line tool
//!
//! Imports, inspects and edits the per-course scalar stored in the PCGS
//! database. Every command prints JSON on stdout; logs go to stderr.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use pcgs_common::config::{load_toml_config, RootFolderInitializer, RootFolderResolver, TomlConfig};
use pcgs_common::db::init_database;
use pcgs_common::ScalarLevel;
use pcgs_scalar::export::{bind_fields, canonical_fields};
use pcgs_scalar::services::ImportOptions;
use pcgs_scalar::{GridSource, HeaderMode, ScalarImporter, ScalarService, SqliteScalarStore, TemplateProfiles};
use serde::Serialize;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const MODULE_NAME: &str = "scalar";

/// Command-line arguments for pcgs-scalar
#[derive(Parser, Debug)]
#[command(name = "pcgs-scalar")]
#[command(about = "Course scalar engine for PCGS")]
#[command(version)]
struct Args {
    /// Root folder holding pcgs.db
    #[arg(short, long, global = true)]
    root_folder: Option<PathBuf>,

    /// Config file (defaults to <config dir>/pcgs/scalar.toml)
    #[arg(short, long, global = true, env = "PCGS_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Import a sheet from an .xlsx workbook or a JSON array of rows
    Import {
        #[arg(long)]
        course: String,
        #[arg(long)]
        file: PathBuf,
        /// Worksheet name for .xlsx files (defaults to the first sheet)
        #[arg(long)]
        sheet: Option<String>,
        /// Fail on any unrecognized header
        #[arg(long)]
        strict: bool,
        /// 1-based header row (overrides config)
        #[arg(long)]
        header_row: Option<usize>,
        /// 1-based first data row (overrides config)
        #[arg(long)]
        data_row: Option<usize>,
        #[arg(long)]
        max_rows: Option<usize>,
    },
    /// Show a course in render order, or list courses when no course is given
    List {
        #[arg(long)]
        course: Option<String>,
        #[arg(long)]
        level: Option<ScalarLevel>,
    },
    /// Re-run the Bloom's-verb pass on every CLO
    Validate {
        #[arg(long)]
        course: String,
    },
    /// Add an entry at the end of its siblings
    Add {
        #[arg(long)]
        course: String,
        #[arg(long)]
        level: ScalarLevel,
        #[arg(long)]
        serial: String,
        #[arg(long)]
        text: String,
        /// Parent serial (omit for CLOs)
        #[arg(long)]
        parent: Option<String>,
    },
    /// Change an entry's text and/or merge metadata
    Update {
        #[arg(long)]
        course: String,
        #[arg(long)]
        serial: String,
        #[arg(long)]
        text: Option<String>,
        /// JSON object merged into the metadata; null values remove keys
        #[arg(long)]
        metadata: Option<String>,
    },
    /// Delete an entry and everything beneath it
    Delete {
        #[arg(long)]
        course: String,
        #[arg(long)]
        serial: String,
    },
    /// Reorder the siblings under one parent
    Reorder {
        #[arg(long)]
        course: String,
        #[arg(long)]
        level: ScalarLevel,
        /// Parent serial (omit for CLOs)
        #[arg(long)]
        parent: Option<String>,
        /// New order as comma-separated serials
        #[arg(long, value_delimiter = ',', required = true)]
        order: Vec<String>,
    },
    /// Canonical fields, optionally bound to a template profile
    Export {
        #[arg(long)]
        course: String,
        #[arg(long)]
        profile: Option<String>,
    },
    /// Resolve raw terms to canonical ids
    Normalize {
        #[arg(required = true)]
        terms: Vec<String>,
    },
    /// List template profiles, or the mappings of one
    Profiles {
        #[arg(long)]
        profile: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let resolver = RootFolderResolver::new(MODULE_NAME)
        .with_cli_arg(args.root_folder.clone())
        .with_config_file(args.config.clone());
    let config = load_config(resolver.config_file_path().as_deref(), std::io::stderr)?;

    init_tracing(&config)?;

    let lexicon = Arc::new(config.build_lexicon().context("Invalid lexicon aliases")?);

    match args.command {
        Command::Normalize { terms } => {
            let resolved: Vec<_> = terms
                .iter()
                .map(|term| match lexicon.normalize(term) {
                    Ok(id) => json!({ "term": term, "id": id }),
                    Err(e) => json!({ "term": term, "error": e.to_string() }),
                })
                .collect();
            return print_json(&resolved);
        }
        Command::Profiles { profile } => {
            let profiles = TemplateProfiles::from_config(&config.profiles, &lexicon)
                .context("Invalid template profiles")?;
            return match profile {
                Some(name) => print_json(profiles.mappings(&name)?),
                None => print_json(&profiles.profile_names()),
            };
        }
        _ => {}
    }

    let root_folder = resolver.resolve();
    let initializer = RootFolderInitializer::new(root_folder);
    initializer
        .ensure_directory_exists()
        .context("Failed to initialize root folder")?;
    let db_path = initializer.database_path();
    info!("Database: {}", db_path.display());

    let pool = init_database(&db_path)
        .await
        .context("Failed to open database")?;
    let store = Arc::new(SqliteScalarStore::new(pool));
    let service = ScalarService::from_config(store, &config, Arc::clone(&lexicon));

    match args.command {
        Command::Import {
            course,
            file,
            sheet,
            strict,
            header_row,
            data_row,
            max_rows,
        } => {
            let mut options = ImportOptions::from_config(&config.import);
            if strict {
                options.header_mode = HeaderMode::Strict;
            }
            if max_rows.is_some() {
                options.max_rows = max_rows;
            }
            let service = service
                .with_importer(ScalarImporter::new(Arc::clone(&lexicon)).with_options(options));

            let cancel = CancellationToken::new();
            let ctrl_c_token = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Received Ctrl+C, cancelling import");
                    ctrl_c_token.cancel();
                }
            });

            let header_row = header_row.unwrap_or(config.import.header_row);
            let data_row = data_row.unwrap_or(config.import.data_start_row);
            let mut source = open_sheet(&file, sheet.as_deref(), header_row, data_row, &cancel)
                .await
                .with_context(|| format!("Failed to read sheet {}", file.display()))?;

            let outcome = service.import(&course, &mut source, &cancel).await?;
            print_json(&outcome)
        }
        Command::List { course, level } => match (course, level) {
            (None, _) => print_json(&service.list_courses().await?),
            (Some(course), Some(level)) => print_json(&service.entries_at(&course, level).await?),
            (Some(course), None) => print_json(&service.listing(&course).await?),
        },
        Command::Validate { course } => {
            let warnings = service.validate_all_clos(&course).await?;
            print_json(&json!({
                "warnings": warnings,
                "messages": warnings.iter().map(|w| w.to_string()).collect::<Vec<_>>(),
            }))
        }
        Command::Add {
            course,
            level,
            serial,
            text,
            parent,
        } => {
            service
                .add_entry(&course, level, &serial, &text, parent.as_deref())
                .await?;
            print_json(&service.get_entry(&course, &serial).await?)
        }
        Command::Update {
            course,
            serial,
            text,
            metadata,
        } => {
            let metadata: Option<BTreeMap<String, Value>> = metadata
                .as_deref()
                .map(serde_json::from_str::<BTreeMap<String, Value>>)
                .transpose()
                .context("--metadata must be a JSON object")?;
            let entry = service
                .update_entry(&course, &serial, text.as_deref(), metadata)
                .await?;
            print_json(&entry)
        }
        Command::Delete { course, serial } => {
            let removed = service.delete_entry(&course, &serial).await?;
            print_json(&json!({ "serial": serial, "removed": removed }))
        }
        Command::Reorder {
            course,
            level,
            parent,
            order,
        } => {
            service
                .reorder_siblings(&course, level, parent.as_deref(), &order)
                .await?;
            print_json(&service.siblings(&course, level, parent.as_deref()).await?)
        }
        Command::Export { course, profile } => {
            let snapshot = service.snapshot(&course).await?;
            match profile {
                Some(name) => {
                    let profiles = TemplateProfiles::from_config(&config.profiles, &lexicon)
                        .context("Invalid template profiles")?;
                    print_json(&bind_fields(&snapshot, &profiles, &name)?)
                }
                None => print_json(&canonical_fields(&snapshot)),
            }
        }
        Command::Normalize { .. } | Command::Profiles { .. } => Ok(()),
    }
}

/// Pick the sheet reader by file extension
async fn open_sheet(
    file: &Path,
    sheet: Option<&str>,
    header_row: usize,
    data_row: usize,
    cancel: &CancellationToken,
) -> Result<GridSource> {
    let extension = file
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    let source = match extension.as_str() {
        "xlsx" | "xlsm" => {
            GridSource::from_xlsx_file(file, sheet, header_row, data_row, cancel).await?
        }
        "json" => {
            if sheet.is_some() {
                warn!("--sheet is ignored for JSON sheets");
            }
            GridSource::from_json_file(file, header_row, data_row, cancel).await?
        }
        other => bail!("Unsupported sheet format '{}' (expected .xlsx or .json)", other),
    };
    Ok(source)
}

/// Load the config before the configured subscriber exists; its warnings
/// go through a temporary subscriber writing to `writer`
fn load_config<W>(path: Option<&Path>, writer: W) -> Result<TomlConfig>
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let Some(path) = path else {
        return Ok(TomlConfig::default());
    };
    let bootstrap = tracing_subscriber::fmt()
        .with_writer(writer)
        .with_ansi(false)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()),
        )
        .finish();
    tracing::subscriber::with_default(bootstrap, || load_toml_config(path))
        .with_context(|| format!("Failed to load config {}", path.display()))
}

fn init_tracing(config: &TomlConfig) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("pcgs_scalar={0},pcgs_common={0}", config.logging.level).into());

    let file_layer = match &config.logging.file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(std::sync::Mutex::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();
    Ok(())
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
