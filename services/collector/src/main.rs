//! Collector Service - Fetches indicator observations from public data APIs
//!
//! Responsibilities:
//! - Fetch every mapped indicator of each source (World Bank, WHO GHO,
//!   UNICEF and OECD over SDMX)
//! - Read EDGAR emission totals from the extracted workbooks in EDGAR_DIR
//! - Retry transient HTTP failures with a fixed backoff
//! - Skip a source that fails or times out without stopping the others
//! - Write one raw CSV per source into CACHE_DIR for the loader
//!
//! Usage:
//!   cargo run --bin collector
//!   cargo run --bin collector -- --source who --start-year 2015

mod edgar;
mod fetch;
mod oecd;
mod sdmx;
mod source;
mod unicef;
mod who;
mod world_bank;

use anyhow::{Context, Result};
use chrono::Datelike;
use clap::Parser;
use edgar::Edgar;
use fetch::{Fetcher, RetryPolicy};
use loader::raw_csv;
use loader::mapping::{EDGAR, OECD, UNICEF, WHO, WORLD_BANK};
use loader::RawObservation;
use oecd::Oecd;
use source::{FetchRequest, Source};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{error, info};
use unicef::Unicef;
use who::Who;
use world_bank::WorldBank;

#[derive(Parser, Debug)]
#[command(name = "collector", about = "Collects indicator observations from public data APIs")]
struct Args {
    /// Sources to collect (world_bank, who, unicef, oecd, edgar); default: all
    #[arg(long)]
    source: Vec<String>,

    /// First year to request (overrides START_YEAR)
    #[arg(long)]
    start_year: Option<i32>,

    /// Last year to request (overrides END_YEAR)
    #[arg(long)]
    end_year: Option<i32>,

    /// Dry run - fetch but don't write files
    #[arg(long, default_value = "false")]
    dry_run: bool,
}

#[derive(Debug, Clone)]
struct Config {
    cache_dir: PathBuf,
    start_year: i32,
    end_year: i32,
    countries: Vec<String>,
    fetch_timeout_secs: u64,
    fetch_retries: u32,
    retry_backoff_ms: u64,
    world_bank_url: String,
    who_url: String,
    unicef_url: String,
    oecd_url: String,
    edgar_dir: PathBuf,
}

impl Config {
    fn from_env() -> Result<Self> {
        let this_year = chrono::Utc::now().year();
        let var = |key: &str, default: &str| std::env::var(key).unwrap_or_else(|_| default.to_string());
        let cache_dir = PathBuf::from(var("CACHE_DIR", "./data_cache"));
        Ok(Self {
            edgar_dir: std::env::var("EDGAR_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| cache_dir.join("edgar")),
            cache_dir,
            start_year: var("START_YEAR", &(this_year - 10).to_string())
                .parse()
                .context("START_YEAR must be a year")?,
            end_year: var("END_YEAR", &this_year.to_string())
                .parse()
                .context("END_YEAR must be a year")?,
            countries: var("COUNTRIES", "")
                .split(',')
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty())
                .collect(),
            fetch_timeout_secs: var("FETCH_TIMEOUT_SECS", "60").parse().unwrap_or(60),
            fetch_retries: var("FETCH_RETRIES", "3").parse().unwrap_or(3),
            retry_backoff_ms: var("RETRY_BACKOFF_MS", "2000").parse().unwrap_or(2000),
            world_bank_url: var("WORLD_BANK_URL", "https://api.worldbank.org"),
            who_url: var("WHO_URL", "https://ghoapi.azureedge.net"),
            unicef_url: var("UNICEF_URL", "https://sdmx.data.unicef.org/ws/public/sdmxapi/rest/data"),
            oecd_url: var("OECD_URL", "https://stats.oecd.org/SDMX-JSON/data"),
        })
    }
}

/// Outcome of one source task.
struct Collected {
    source: &'static str,
    rows: Vec<RawObservation>,
}

async fn collect<S: Source>(source: S, fetcher: Fetcher, request: Arc<FetchRequest>) -> Collected {
    let rows = source.collect(&fetcher, &request).await;
    Collected {
        source: source.name(),
        rows,
    }
}

fn wanted(args: &Args, name: &str) -> bool {
    args.source.is_empty() || args.source.iter().any(|s| s == name)
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = Config::from_env()?;

    let request = Arc::new(FetchRequest {
        start_year: args.start_year.unwrap_or(config.start_year),
        end_year: args.end_year.unwrap_or(config.end_year),
        countries: config.countries.clone(),
    });
    if request.start_year > request.end_year {
        anyhow::bail!("start year {} is after end year {}", request.start_year, request.end_year);
    }

    println!("=== polmatrix collector ===");
    println!("Years: {}..={}", request.start_year, request.end_year);
    if request.countries.is_empty() {
        println!("Countries: all");
    } else {
        println!("Countries: {}", request.countries.join(", "));
    }

    let fetcher = Fetcher::new(
        Duration::from_secs(config.fetch_timeout_secs),
        RetryPolicy {
            attempts: config.fetch_retries,
            backoff: Duration::from_millis(config.retry_backoff_ms),
        },
    )
    .context("Failed to build HTTP client")?;

    // Sources share no state, so each runs as its own task.
    let mut tasks = JoinSet::new();
    if wanted(&args, WORLD_BANK) {
        tasks.spawn(collect(WorldBank::new(&config.world_bank_url), fetcher.clone(), request.clone()));
    }
    if wanted(&args, WHO) {
        tasks.spawn(collect(Who::new(&config.who_url), fetcher.clone(), request.clone()));
    }
    if wanted(&args, UNICEF) {
        tasks.spawn(collect(Unicef::new(&config.unicef_url), fetcher.clone(), request.clone()));
    }
    if wanted(&args, OECD) {
        tasks.spawn(collect(Oecd::new(&config.oecd_url), fetcher.clone(), request.clone()));
    }
    if wanted(&args, EDGAR) {
        tasks.spawn(collect(Edgar::new(&config.edgar_dir), fetcher.clone(), request.clone()));
    }
    if tasks.is_empty() {
        anyhow::bail!("No known source matches {:?}", args.source);
    }

    if !args.dry_run {
        tokio::fs::create_dir_all(&config.cache_dir)
            .await
            .with_context(|| format!("Failed to create {}", config.cache_dir.display()))?;
    }

    let mut written = 0;
    let mut failed = 0;
    while let Some(joined) = tasks.join_next().await {
        let collected = match joined {
            Ok(c) => c,
            Err(e) => {
                error!(error = %e, "source task failed");
                failed += 1;
                continue;
            }
        };
        if collected.rows.is_empty() {
            println!("  ✗ {}: no observations", collected.source);
            failed += 1;
            continue;
        }
        if args.dry_run {
            println!("  Dry run - {}: {} observations", collected.source, collected.rows.len());
            continue;
        }

        let path = config.cache_dir.join(format!("{}.csv", collected.source));
        match raw_csv::write_raw_file(&path, &collected.rows) {
            Ok(()) => {
                info!(source = collected.source, rows = collected.rows.len(), file = %path.display(), "raw file written");
                println!("  ✓ {}: {} observations -> {}", collected.source, collected.rows.len(), path.display());
                written += 1;
            }
            Err(e) => {
                error!(source = collected.source, error = %e, "failed to write raw file");
                failed += 1;
            }
        }
    }

    println!("{:-<60}", "");
    println!("Summary: {} written, {} failed", written, failed);
    Ok(())
}
