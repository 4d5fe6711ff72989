//! Loader service: reads raw indicator CSVs and upserts them into the
//! polmatrix warehouse.
//!
//! Inputs default to every `*.csv` in `CACHE_DIR`, as written by the
//! collector. With `--dry-run` the whole pipeline runs against an in-memory
//! warehouse and nothing touches the database.

use anyhow::{Context, Result};
use clap::Parser;
use loader::config::Config;
use loader::pipeline::{self, Catalogs, RunReport};
use loader::raw_csv;
use loader::resolver::DimensionResolver;
use loader::store::{MemoryWarehouse, PgWarehouse};
use loader::{Domain, RawObservation};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "loader", about = "Normalizes raw indicator files into the polmatrix warehouse")]
struct Args {
    /// Raw CSV files to load (default: every *.csv in CACHE_DIR)
    #[arg(long)]
    input: Vec<PathBuf>,

    /// Source name for rows without a source column (default: file stem)
    #[arg(long)]
    source: Option<String>,

    /// Dry run - load into memory, don't touch the database
    #[arg(long, default_value = "false")]
    dry_run: bool,

    /// Apply pending migrations before loading
    #[arg(long, default_value = "false")]
    migrate: bool,

    /// Skip rows for countries not already in the geography table
    #[arg(long, default_value = "false")]
    strict_geography: bool,
}

/// Explicit inputs, or the cache directory's CSV files in name order.
fn input_files(args: &Args, config: &Config) -> Result<Vec<PathBuf>> {
    if !args.input.is_empty() {
        return Ok(args.input.clone());
    }
    let entries = std::fs::read_dir(&config.cache_dir)
        .with_context(|| format!("Failed to read cache dir {}", config.cache_dir.display()))?;
    let mut files = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) == Some("csv") {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn read_inputs(files: &[PathBuf], source: Option<&str>) -> Vec<RawObservation> {
    let mut observations = Vec::new();
    for path in files {
        let fallback = source
            .map(str::to_string)
            .or_else(|| stem(path));
        match raw_csv::read_raw_file(path, fallback.as_deref()) {
            Ok(batch) => {
                info!(
                    file = %path.display(),
                    rows = batch.observations.len(),
                    skipped_lines = batch.skipped_lines,
                    "read raw file"
                );
                observations.extend(batch.observations);
            }
            Err(e) => warn!(file = %path.display(), error = %e, "skipping unreadable file"),
        }
    }
    observations
}

fn stem(path: &Path) -> Option<String> {
    path.file_stem().and_then(|s| s.to_str()).map(str::to_string)
}

fn print_summary(report: &RunReport) {
    println!("\n{:-<60}", "");
    println!("Rows read:        {}", report.input_rows);
    println!("Rows normalized:  {}", report.normalized_rows);
    println!("Malformed values: {}", report.malformed_values);
    println!("Duplicates:       {}", report.duplicates_dropped);
    println!("\n{:<24} {:>9} {:>9} {:>9}", "domain", "attempted", "written", "skipped");
    for domain in Domain::ALL {
        let Some(outcome) = report.domains.get(&domain) else {
            continue;
        };
        println!(
            "{:<24} {:>9} {:>9} {:>9}",
            domain.table_name(),
            outcome.attempted,
            outcome.written,
            outcome.skipped
        );
        if let Some(error) = &outcome.error {
            println!("  ✗ {}", error);
        }
    }
    if !report.mapping_gaps.is_empty() {
        println!("\nMapping gaps:");
        for gap in &report.mapping_gaps {
            println!(
                "  {:?} '{}' from {} ({} rows)",
                gap.kind, gap.code, gap.source, gap.occurrences
            );
        }
    }
    for error in &report.metadata_errors {
        println!("  ✗ {}", error);
    }
    println!("{:-<60}", "");
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

    println!("=== polmatrix loader ===");

    let mut policy = config.dimension_policy();
    if args.strict_geography {
        policy.create_missing_geography = false;
    }
    let mut resolver = DimensionResolver::new(policy);

    let files = input_files(&args, &config)?;
    if files.is_empty() {
        anyhow::bail!("No raw CSV files found in {}", config.cache_dir.display());
    }
    println!("Inputs: {} file(s)", files.len());
    let observations = read_inputs(&files, args.source.as_deref());
    let catalogs = Catalogs::default();

    if args.dry_run {
        println!("DRY RUN - loading into memory");
        let mut store = MemoryWarehouse::new();
        let report = pipeline::run(&mut store, &mut resolver, observations, &catalogs).await;
        print_summary(&report);
        println!(
            "Would create {} geography and {} time rows",
            store.geography_count(),
            store.time_count()
        );
        return Ok(());
    }

    let mut store = PgWarehouse::connect(config.db_url()?, config.db_max_connections)
        .await
        .context("Failed to connect to database")?;
    if args.migrate {
        store.migrate().await.context("Failed to apply migrations")?;
        info!("migrations applied");
    }

    let inputs: Vec<String> = files.iter().map(|p| p.display().to_string()).collect();
    let job_run_id = store
        .start_run(serde_json::json!({ "inputs": inputs }))
        .await
        .context("Failed to record job run")?;

    let report = pipeline::run(&mut store, &mut resolver, observations, &catalogs).await;
    print_summary(&report);

    let status = if report.is_clean() { "success" } else { "partial" };
    let failed: Vec<String> = report
        .failed_domains()
        .iter()
        .map(|d| d.to_string())
        .collect();
    let error = (!failed.is_empty()).then(|| format!("failed domains: {}", failed.join(", ")));
    store
        .finish_run(
            job_run_id,
            status,
            error.as_deref(),
            serde_json::json!({ "report": report }),
        )
        .await
        .context("Failed to finish job run")?;

    println!("Job run {} finished: {}", job_run_id, status);
    Ok(())
}
