//! Reprice Job - flags spreadsheet products that are due for a price refresh.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use clap::Parser;
use reprice_common::config::{Config, PolicyKind};
use reprice_common::logging::init_logging;
use reprice_common::Validate;
use reprice_job::sheets::{ServiceAccountTokenSource, SheetsClient, StaticTokenSource, TokenSource};
use reprice_job::{is_retryable, RepriceJob, SheetRepository};

/// Select inventory rows to reprice and mark them on the sheet.
#[derive(Debug, Parser)]
#[command(name = "reprice-job", version, about)]
struct Args {
    /// Config file (defaults to ~/.reprice/config.json)
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Select and log without writing markers
    #[arg(long)]
    dry_run: bool,

    /// Override the configured selection policy
    #[arg(long, value_parser = clap::value_parser!(PolicyKindArg))]
    policy: Option<PolicyKindArg>,

    /// Staleness reference date (YYYY-MM-DD), defaults to today
    #[arg(long)]
    today: Option<NaiveDate>,
}

#[derive(Debug, Clone)]
struct PolicyKindArg(PolicyKind);

impl std::str::FromStr for PolicyKindArg {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        s.parse().map(PolicyKindArg)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = Config::load_with_env(args.config.as_deref())?;
    if let Some(PolicyKindArg(kind)) = args.policy {
        config.selection.policy = kind;
    }

    let _log_guard = init_logging(&config.observability)?;
    tracing::info!("Reprice Job v{}", env!("CARGO_PKG_VERSION"));

    if let Err(e) = config.validate() {
        tracing::error!(error = %e, "Invalid configuration");
        return Err(e).context("Invalid configuration");
    }

    let today = args.today.unwrap_or_else(|| Local::now().date_naive());

    match run(config, today, args.dry_run).await {
        Ok(()) => Ok(()),
        Err(e) => {
            if is_retryable(&e) {
                tracing::error!(
                    error = format!("{:#}", e),
                    "Repricing run failed with a transient error, safe to rerun"
                );
            } else {
                tracing::error!(error = format!("{:#}", e), "Repricing run failed");
            }
            Err(e)
        }
    }
}

async fn run(config: Config, today: NaiveDate, dry_run: bool) -> Result<()> {
    let tokens: Arc<dyn TokenSource> = match std::env::var("REPRICE_ACCESS_TOKEN") {
        Ok(token) if !token.trim().is_empty() => {
            tracing::info!("Using access token from REPRICE_ACCESS_TOKEN");
            Arc::new(StaticTokenSource::new(token.trim()))
        }
        _ => {
            let path = config.sheets.credentials_file();
            let source = ServiceAccountTokenSource::from_file(&path)
                .with_context(|| format!("Failed to load credentials from {}", path.display()))?;
            tracing::info!(account = %source.client_email(), "Using service account");
            Arc::new(source)
        }
    };

    let client = SheetsClient::new(&config.sheets, tokens)?;
    let repository = SheetRepository::new(client, config.sheets, config.selection);
    let job = RepriceJob::new(repository).dry_run(dry_run);

    job.run(today).await?;
    Ok(())
}
