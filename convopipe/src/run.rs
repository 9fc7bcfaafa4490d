//! convopipe-run - run the classification pipeline for one date
//!
//! Reads `landing/date=D/*`, publishes metrics and a run report, and exits
//! 0 on success or 1 on failure.
//!
//! Settings are layered: config file, then `CONVOPIPE_*` environment
//! variables, then the flags below.
//!
//! Uses XDG Base Directory specification for file locations:
//! - Logs: $XDG_STATE_HOME/convopipe/convopipe.log (~/.local/state/convopipe/convopipe.log)
//! - Config: $XDG_CONFIG_HOME/convopipe/config.toml (~/.config/convopipe/config.toml)

use anyhow::{Context, Result};
use clap::Parser;
use convopipe_core::config::parse_date;
use convopipe_core::output::{metrics_key, report_key};
use convopipe_core::{run_pipeline, Config, RunStatus, StorageKind};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "convopipe-run")]
#[command(about = "Classify one day of conversation logs and publish metrics")]
#[command(version)]
struct Args {
    /// Config file (default: $XDG_CONFIG_HOME/convopipe/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Date to process, YYYY-MM-DD (default: today, UTC)
    #[arg(long, value_parser = parse_date_arg)]
    date: Option<chrono::NaiveDate>,

    /// Storage backend: local or s3
    #[arg(long)]
    storage: Option<StorageKind>,

    /// Base directory for local storage
    #[arg(long)]
    base_path: Option<PathBuf>,

    /// S3 bucket
    #[arg(long)]
    bucket: Option<String>,

    /// S3 region
    #[arg(long)]
    region: Option<String>,

    /// Also write sanitized events
    #[arg(long)]
    write_sanitized: bool,

    /// Skip LLM classification (every conversation is Unclassified)
    #[arg(long, conflicts_with = "llm")]
    no_llm: bool,

    /// Force LLM classification on
    #[arg(long)]
    llm: bool,
}

fn parse_date_arg(value: &str) -> std::result::Result<chrono::NaiveDate, String> {
    parse_date(value).map_err(|e| e.to_string())
}

impl Args {
    fn apply(&self, config: &mut Config) {
        if let Some(date) = self.date {
            config.date = Some(date);
        }
        if let Some(storage) = self.storage {
            config.storage.backend = storage;
        }
        if let Some(base_path) = &self.base_path {
            config.storage.base_path = base_path.clone();
        }
        if let Some(bucket) = &self.bucket {
            config.storage.bucket = Some(bucket.clone());
        }
        if let Some(region) = &self.region {
            config.storage.region = region.clone();
        }
        if self.write_sanitized {
            config.write_sanitized = true;
        }
        if self.no_llm {
            config.classifier.enabled = false;
        }
        if self.llm {
            config.classifier.enabled = true;
        }
    }
}

fn load_config(args: &Args) -> Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::load_from(path)
            .with_context(|| format!("failed to load configuration from {}", path.display()))?,
        None => Config::load().context("failed to load configuration")?,
    };
    config
        .apply_env()
        .context("invalid environment override")?;
    args.apply(&mut config);
    Ok(config)
}

fn main() -> ExitCode {
    let args = Args::parse();

    match run(&args) {
        Ok(RunStatus::Success) => ExitCode::SUCCESS,
        Ok(RunStatus::Failure) => ExitCode::from(1),
        Err(e) => {
            tracing::error!(error = %e, "convopipe-run failed");
            eprintln!("Error: {:#}", e);
            ExitCode::from(1)
        }
    }
}

fn run(args: &Args) -> Result<RunStatus> {
    let config = load_config(args)?;

    // Nothing touches the filesystem until the configuration is known good
    config.validate().context("invalid configuration")?;

    // Initialize logging
    let _log_guard =
        convopipe_core::logging::init(&config.logging).context("failed to initialize logging")?;

    tracing::info!("convopipe-run starting");

    let date = config.run_date();
    let outcome = run_pipeline(&config).context("failed to start pipeline")?;
    let report = &outcome.report;

    println!("Date: {}", date);
    println!("Storage: {}", report.storage_type);
    println!(
        "Events: {} read, {} valid, {} invalid",
        report.events_read, report.events_valid, report.events_invalid
    );
    println!(
        "Conversations: {} assembled, {} classified",
        report.conversations_assembled, report.conversations_classified
    );
    println!(
        "Redactions: {} (emails={}, phones={}, urls={})",
        report.redaction_stats.total(),
        report.redaction_stats.emails_redacted,
        report.redaction_stats.phones_redacted,
        report.redaction_stats.urls_redacted
    );
    if report.metrics_written {
        println!("Metrics: {}", metrics_key(date));
    }
    println!("Report: {}", report_key(date));
    for error in &report.errors {
        println!("  ! {}", error);
    }

    match outcome.status {
        RunStatus::Success => println!("Completed in {:.2}s", report.duration_seconds),
        RunStatus::Failure => println!("Run failed"),
    }

    Ok(outcome.status)
}
