//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Rollcall - bounded-concurrency class size aggregator
///
/// Fetches the class list from a roll service, then fetches each class
/// size with a capped number of requests in flight, and prints a report
/// grouped by year.
///
/// Examples:
///   rollcall fetch --url http://localhost:3000
///   rollcall fetch --concurrency 5 --format markdown --output roll.md
///   rollcall serve --port 3000
///   rollcall demo
///   rollcall --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Path to configuration file
    ///
    /// If not specified, looks for .rollcall.toml in the current directory
    #[arg(short, long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Run in quiet mode (errors only, no progress bar)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Generate a default .rollcall.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Aggregate class sizes from a roll service
    Fetch(FetchArgs),
    /// Run the demonstration roll service
    Serve(ServeArgs),
    /// Start the demonstration service locally and aggregate against it
    Demo(DemoArgs),
}

#[derive(clap::Args, Debug, Clone)]
pub struct FetchArgs {
    /// Base URL of the roll service
    #[arg(long, value_name = "URL", env = "ROLLCALL_URL")]
    pub url: Option<String>,

    /// Maximum class size requests in flight (default: 3)
    #[arg(long, value_name = "NUM")]
    pub concurrency: Option<usize>,

    /// Request timeout in seconds (default: 30)
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Output format (json, markdown)
    #[arg(long, value_name = "FORMAT")]
    pub format: Option<ReportFormat>,

    /// Write the report to a file instead of stdout
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Exit with code 2 if any class size could not be fetched
    #[arg(long)]
    pub strict: bool,
}

#[derive(clap::Args, Debug, Clone)]
pub struct ServeArgs {
    /// Port to listen on (default: 3000)
    #[arg(short, long)]
    pub port: Option<u16>,
}

#[derive(clap::Args, Debug, Clone)]
pub struct DemoArgs {
    /// Maximum class size requests in flight (default: 3)
    #[arg(long, value_name = "NUM")]
    pub concurrency: Option<usize>,

    /// Output format (json, markdown)
    #[arg(long, value_name = "FORMAT")]
    pub format: Option<ReportFormat>,

    /// Write the report to a file instead of stdout
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Exit with code 2 if any class size could not be fetched
    #[arg(long)]
    pub strict: bool,
}

/// Output format for the report.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    /// JSON format (default)
    #[default]
    Json,
    /// Markdown format
    Markdown,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        // Skip validation for --init-config
        if self.init_config {
            return Ok(());
        }

        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        let (concurrency, timeout, url) = match &self.command {
            None => return Err("A subcommand is required (fetch, serve, demo)".to_string()),
            Some(Command::Fetch(fetch)) => (fetch.concurrency, fetch.timeout, fetch.url.as_deref()),
            Some(Command::Demo(demo)) => (demo.concurrency, None, None),
            Some(Command::Serve(_)) => (None, None, None),
        };

        if concurrency == Some(0) {
            return Err("Concurrency must be at least 1".to_string());
        }

        if timeout == Some(0) {
            return Err("Timeout must be at least 1 second".to_string());
        }

        if let Some(url) = url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err("Roll service URL must start with 'http://' or 'https://'".to_string());
            }
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }

    /// Report output path of the selected subcommand, if any.
    pub fn output(&self) -> Option<&PathBuf> {
        match &self.command {
            Some(Command::Fetch(fetch)) => fetch.output.as_ref(),
            Some(Command::Demo(demo)) => demo.output.as_ref(),
            _ => None,
        }
    }
}
