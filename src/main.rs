//! Rollcall - bounded-concurrency class size aggregator
//!
//! Fetches a class list from a roll service, fetches every class size with
//! at most N requests in flight, and renders a report grouped by year.
//!
//! Exit codes:
//!   0 - Success (every class counted, or --strict not set)
//!   1 - Runtime error (list fetch, invalid class name, config, I/O, etc.)
//!   2 - Some class sizes could not be fetched and --strict is set

mod cli;
mod config;
mod demo;
mod error;
mod fanout;
mod fetch;
mod models;
mod pipeline;
mod report;
mod source;
mod validate;

use anyhow::{Context, Result};
use chrono::Utc;
use cli::{Args, Command};
use config::{Config, CONFIG_FILE};
use indicatif::{ProgressBar, ProgressStyle};
use models::ReportMetadata;
use pipeline::Aggregator;
use source::HttpSource;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    init_logging(&args);

    info!("Rollcall v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);

    match dispatch(args).await {
        Ok(exit_code) => std::process::exit(exit_code),
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Handle --init-config: generate a default .rollcall.toml.
fn handle_init_config() -> Result<()> {
    let path = Path::new(CONFIG_FILE);

    if path.exists() {
        eprintln!("{} already exists. Remove it first or edit it manually.", CONFIG_FILE);
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content).with_context(|| format!("Failed to write {}", CONFIG_FILE))?;

    println!("Created {} with default settings.", CONFIG_FILE);
    Ok(())
}

/// Initialize logging based on verbosity settings.
///
/// Logs go to stderr so a report on stdout stays machine-readable.
fn init_logging(args: &Args) {
    let level = args.log_level();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");
}

async fn dispatch(args: Args) -> Result<i32> {
    let mut config = load_config(&args)?;
    config.merge_with_args(&args);
    config.validate()?;

    match &args.command {
        Some(Command::Serve(_)) => {
            demo::serve(config.demo.clone()).await?;
            Ok(0)
        }
        Some(Command::Demo(_)) => {
            config.source.base_url = demo::spawn_local(config.demo.clone()).await?;
            run_aggregation(&args, &config).await
        }
        Some(Command::Fetch(_)) => run_aggregation(&args, &config).await,
        None => Ok(0),
    }
}

/// Run one aggregation and render the report. Returns exit code (0 or 2).
async fn run_aggregation(args: &Args, config: &Config) -> Result<i32> {
    let start_time = Instant::now();

    info!(
        "Aggregating class sizes from {} ({} requests in flight)",
        config.source.base_url, config.fetch.concurrency
    );

    let source = HttpSource::new((&config.source).into()).context("Failed to create HTTP client")?;
    let mut aggregator = Aggregator::new(Arc::new(source)).with_concurrency(config.fetch.concurrency);
    if !args.quiet {
        aggregator = aggregator.with_progress(progress_bar());
    }

    let outcome = aggregator.run().await?;
    debug!("Aggregator finished in state {}", aggregator.state());

    let metadata = ReportMetadata {
        source_url: config.source.base_url.clone(),
        generated_at: Utc::now(),
        concurrency: config.fetch.concurrency,
        duration_seconds: start_time.elapsed().as_secs_f64(),
    };

    let output = match config.report.format {
        cli::ReportFormat::Json => report::generate_json_report(&outcome, &metadata)?,
        cli::ReportFormat::Markdown => report::generate_markdown_report(&outcome, &metadata),
    };
    report::write_report(&output, args.output().map(|p| p.as_path()))?;

    if let Some(path) = args.output() {
        info!("Report saved to {}", path.display());
    }

    if outcome.is_partial() {
        warn!(
            "{} of {} class sizes could not be fetched",
            outcome.failures.len(),
            outcome.report.len()
        );
        if config.report.strict {
            return Ok(2);
        }
    }

    Ok(0)
}

fn progress_bar() -> ProgressBar {
    let pb = ProgressBar::new(0);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} classes")
    {
        pb.set_style(style.progress_chars("#>-"));
    }
    pb
}

/// Load configuration from file or use defaults.
fn load_config(args: &Args) -> Result<Config> {
    // Try explicit config path
    if let Some(ref config_path) = args.config {
        info!("Loading config from: {}", config_path.display());
        return Config::load(config_path);
    }

    match Config::load_from_dir(Path::new(".")) {
        Ok(Some(config)) => {
            info!("Loaded default config from {}", CONFIG_FILE);
            Ok(config)
        }
        Ok(None) => {
            debug!("No config file found, using defaults");
            Ok(Config::default())
        }
        Err(e) => {
            warn!("Failed to load config: {:#}", e);
            Ok(Config::default())
        }
    }
}
