//! sushi-harvest - COUNTER usage harvesting command line
//!
//! `harvest` pulls master reports for one statistics source into the usage
//! database; `match` finds duplicate resource descriptions in record files;
//! `sources` lists the configured statistics sources.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing::info;

use sushi_common::config::{self, TomlConfig};
use sushi_common::ReportType;
use sushi_harvest::services::{
    DedupMatcher, HarvestOrchestrator, InexactNameReview, MatchResult, ResourceMetadata, SushiClient,
};
use sushi_harvest::{DirectoryFallbackStore, SqliteUsageStore, TomlCredentialRegistry, UsageSink};

/// Command-line arguments for sushi-harvest
#[derive(Parser, Debug)]
#[command(name = "sushi-harvest")]
#[command(about = "Harvest and deduplicate COUNTER usage statistics")]
#[command(version)]
struct Args {
    /// Config file (overrides SUSHI_HARVEST_CONFIG)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Harvest master reports for one statistics source
    Harvest {
        /// Statistics source id from the credentials file
        #[arg(short, long)]
        source: i64,

        /// First month (YYYY-MM)
        #[arg(short, long, value_parser = parse_month)]
        begin: NaiveDate,

        /// Last month (YYYY-MM)
        #[arg(short, long, value_parser = parse_month)]
        end: NaiveDate,

        /// Master reports to harvest (default: whatever the provider offers)
        #[arg(short, long = "report")]
        reports: Vec<ReportType>,

        /// Print the records instead of storing them
        #[arg(long)]
        dry_run: bool,
    },

    /// Find records describing the same resource
    Match {
        /// JSON list of records
        #[arg(short, long)]
        input: PathBuf,

        /// JSON list of catalog entries to compare the records against
        #[arg(long)]
        catalog: Option<PathBuf>,

        /// Hold pairs matched only on similar (not identical) names for review
        #[arg(long)]
        review_inexact: bool,
    },

    /// List configured statistics sources
    Sources,
}

fn parse_month(value: &str) -> std::result::Result<NaiveDate, String> {
    NaiveDate::parse_from_str(&format!("{}-01", value.trim()), "%Y-%m-%d")
        .map_err(|_| format!("expected YYYY-MM, got '{}'", value))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = config::load_config(args.config.as_deref())?;
    sushi_common::logging::init(&config.logging)?;

    info!("Starting sushi-harvest {}", env!("CARGO_PKG_VERSION"));

    match args.command {
        Command::Harvest {
            source,
            begin,
            end,
            reports,
            dry_run,
        } => run_harvest(&config, source, begin, end, reports, dry_run).await,
        Command::Match {
            input,
            catalog,
            review_inexact,
        } => run_match(&input, catalog.as_deref(), review_inexact).await,
        Command::Sources => {
            let registry = load_registry(&config)?;
            for entry in registry.sources() {
                println!("{}\t{}\t{}", entry.id, entry.name, entry.endpoint.base_url);
            }
            Ok(())
        }
    }
}

fn load_registry(config: &TomlConfig) -> Result<TomlCredentialRegistry> {
    let path = config
        .credentials_file
        .as_deref()
        .ok_or_else(|| anyhow!("credentials_file is not set in the configuration"))?;
    Ok(TomlCredentialRegistry::load(path)?)
}

async fn run_harvest(
    config: &TomlConfig,
    source_id: i64,
    begin: NaiveDate,
    end: NaiveDate,
    reports: Vec<ReportType>,
    dry_run: bool,
) -> Result<()> {
    let registry = load_registry(config)?;
    let source = registry
        .find(source_id)
        .map(|entry| entry.source())
        .ok_or_else(|| anyhow!("statistics source {} is not in the credentials file", source_id))?;

    let db_path = config.database_path();
    info!("Database: {}", db_path.display());
    let pool = sushi_common::db::init_database(&db_path).await?;
    let store = Arc::new(SqliteUsageStore::new(pool));
    store.upsert_statistics_source(&source).await?;

    let mut client = SushiClient::new(&config.sushi).context("Failed to build SUSHI client")?;
    if let Some(dir) = &config.fallback_dir {
        client = client.with_fallback_store(Arc::new(DirectoryFallbackStore::new(dir)));
    }

    let orchestrator = HarvestOrchestrator::new(client, Arc::new(registry), store.clone())
        .with_field_limits(config.field_limits)
        .with_status_check(config.sushi.check_service_status);

    let requested = (!reports.is_empty()).then_some(reports.as_slice());
    let result = orchestrator.harvest(&source, begin, end, requested).await?;

    for (scope, messages) in &result.messages {
        for message in messages {
            println!("[{}] {}", scope, message);
        }
    }

    if dry_run {
        println!("{}", serde_json::to_string_pretty(&result.records)?);
        return Ok(());
    }

    let written = store.bulk_insert(&result.records).await?;
    println!("Stored {} usage records for {}", written, source.name);
    Ok(())
}

async fn run_match(input: &Path, catalog: Option<&Path>, review_inexact: bool) -> Result<()> {
    let records = read_resources(input)?;
    let catalog = catalog.map(read_resources).transpose()?;

    // Pairwise comparison is CPU-bound
    let result = tokio::task::spawn_blocking(move || {
        let catalog = catalog.as_deref();
        if review_inexact {
            DedupMatcher::new()
                .with_policy(InexactNameReview)
                .find_matches(&records, catalog)
        } else {
            DedupMatcher::new().find_matches(&records, catalog)
        }
    })
    .await?;

    println!("{}", serde_json::to_string_pretty(&match_json(&result))?);
    Ok(())
}

fn read_resources(path: &Path) -> Result<Vec<ResourceMetadata>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

fn match_json(result: &MatchResult) -> serde_json::Value {
    let pending: Vec<_> = result
        .pending
        .iter()
        .map(|(pair, pending)| {
            json!({
                "left": pair.left,
                "right": pair.right,
                "passes": pending.passes,
                "reason": pending.reason,
            })
        })
        .collect();
    json!({
        "confirmed": result.confirmed,
        "pending": pending,
    })
}
