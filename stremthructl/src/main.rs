//! # stremthructl
//!
//! Operator CLI for the StremThru sync engine: applies migrations, merges id
//! observations exported from elsewhere, resolves ids against the id map, and
//! inspects the sync state of mirrored lists.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};
use stremthru_config::{Config, ConfigLoad, ConfigLoader, ConfigWarnings};
use stremthru_core::types::{IdColumn, IdentityType, Observation, Provider};
use stremthru_core::{Store, SyncEngine};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(name = "stremthructl", version)]
#[command(about = "Manage the StremThru list mirror and id map")]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(ClapArgs, Debug, Clone)]
struct GlobalArgs {
    /// Path to a stremthru.toml configuration file
    #[arg(long, global = true, env = "STREMTHRU_CONFIG")]
    config: Option<PathBuf>,

    /// Load environment variables from this file instead of ./.env
    #[arg(long, global = true)]
    env_file: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Apply database migrations and exit
    Migrate,
    /// Merge id observations from a JSON file into the id map
    Merge {
        /// JSON array of observations, e.g. [{"type":"movie","imdb":"tt0111161","tmdb":"278"}]
        file: PathBuf,
        /// Column every observation is matched on
        #[arg(long, default_value = "imdb")]
        anchor: IdColumn,
    },
    /// Look an id up in the id map
    Resolve {
        column: IdColumn,
        value: String,
        /// Print only the id in this column
        #[arg(long)]
        to: Option<IdColumn>,
        /// Reject records whose known type differs
        #[arg(long = "type", value_enum)]
        kind: Option<KindArg>,
    },
    /// Overwrite or clear one column of an id map record
    Repair {
        record: Uuid,
        column: IdColumn,
        /// New value; the column is cleared when omitted
        value: Option<String>,
    },
    /// Show the sync state of a mirrored list
    List { provider: Provider, id: String },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum KindArg {
    Movie,
    Show,
}

impl From<KindArg> for IdentityType {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Movie => IdentityType::Movie,
            KindArg::Show => IdentityType::Show,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut config = load_config(&cli.global)?;

    match cli.command {
        Command::Migrate => run_migrate(&mut config).await,
        Command::Merge { file, anchor } => run_merge(&config, &file, anchor).await,
        Command::Resolve {
            column,
            value,
            to,
            kind,
        } => {
            let kind = kind.map(IdentityType::from).unwrap_or_default();
            run_resolve(&config, column, &value, to, kind).await
        }
        Command::Repair {
            record,
            column,
            value,
        } => run_repair(&config, record, column, value.as_deref()).await,
        Command::List { provider, id } => run_list(&config, provider, &id).await,
    }
}

fn load_config(args: &GlobalArgs) -> anyhow::Result<Config> {
    let mut loader = ConfigLoader::new();
    if let Some(path) = &args.config {
        loader = loader.with_config_path(path);
    }
    if let Some(path) = &args.env_file {
        loader = loader.with_env_file(path);
    }
    let ConfigLoad { config, warnings } =
        loader.load().context("failed to load configuration")?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,stremthru_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if config.metadata.env_file_loaded {
        info!("loaded .env file");
    }
    if let Some(path) = &config.metadata.config_path {
        info!(path = %path.display(), "configuration file loaded");
    }
    log_warnings(&warnings);

    Ok(config)
}

fn log_warnings(warnings: &ConfigWarnings) {
    for warning in &warnings.items {
        match &warning.hint {
            Some(hint) => warn!(message = %warning.message, hint = %hint, "configuration warning"),
            None => warn!(message = %warning.message, "configuration warning"),
        }
    }
}

async fn open_engine(config: &Config) -> anyhow::Result<SyncEngine> {
    let store = Store::connect(&config.engine.database)
        .await
        .context("failed to connect to the database")?;
    let engine = SyncEngine::builder(store)
        .config(config.engine.clone())
        .connect_shared_cache()
        .await
        .context("failed to connect to the shared cache")?
        .build();
    Ok(engine)
}

async fn run_migrate(config: &mut Config) -> anyhow::Result<()> {
    config.engine.database.run_migrations = false;
    let store = Store::connect(&config.engine.database)
        .await
        .context("failed to connect to the database for migration")?;
    store.migrate().await.context("database migration failed")?;
    info!("database migrations applied successfully");
    Ok(())
}

async fn run_merge(config: &Config, file: &Path, anchor: IdColumn) -> anyhow::Result<()> {
    let raw = fs::read_to_string(file)
        .with_context(|| format!("failed to read {}", file.display()))?;
    let observations: Vec<Observation> = serde_json::from_str(&raw)
        .with_context(|| format!("{} is not a JSON array of observations", file.display()))?;

    let engine = open_engine(config).await?;
    let report = engine
        .merge_identities(observations, anchor)
        .await
        .context("merge failed")?;
    engine.shutdown().await;

    for failure in &report.failures {
        warn!(error = %failure.error, "observation not merged");
    }
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn run_resolve(
    config: &Config,
    column: IdColumn,
    value: &str,
    to: Option<IdColumn>,
    kind: IdentityType,
) -> anyhow::Result<()> {
    let engine = open_engine(config).await?;
    let record = engine
        .resolve_identity(column, value, kind)
        .await
        .with_context(|| format!("failed to resolve {column}:{value}"));
    engine.shutdown().await;

    let Some(record) = record? else {
        bail!("no id map entry for {column}:{value}");
    };
    match to {
        Some(target) => match record.get(target) {
            Some(mapped) => println!("{mapped}"),
            None => bail!("{column}:{value} has no {target} id"),
        },
        None => println!("{}", serde_json::to_string_pretty(&record)?),
    }
    Ok(())
}

async fn run_repair(
    config: &Config,
    record: Uuid,
    column: IdColumn,
    value: Option<&str>,
) -> anyhow::Result<()> {
    let engine = open_engine(config).await?;
    let repaired = engine
        .repair_identity(record, column, value)
        .await
        .context("repair failed");
    engine.shutdown().await;

    match repaired? {
        Some(id) => {
            println!("{id}");
            Ok(())
        }
        None => bail!("no id map record {record}"),
    }
}

async fn run_list(config: &Config, provider: Provider, id: &str) -> anyhow::Result<()> {
    let engine = open_engine(config).await?;
    let status = engine
        .list_status(provider, id)
        .await
        .with_context(|| format!("failed to read {provider} list {id}"));
    engine.shutdown().await;

    println!("{}", serde_json::to_string_pretty(&status?)?);
    Ok(())
}
