//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.rollcall.toml` files.

use crate::cli::{Args, Command, ReportFormat};
use crate::source::HttpSourceConfig;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default configuration file name, looked up in the working directory.
pub const CONFIG_FILE: &str = ".rollcall.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Upstream roll service settings.
    #[serde(default)]
    pub source: SourceConfig,

    /// Fan-out settings.
    #[serde(default)]
    pub fetch: FetchConfig,

    /// Report settings.
    #[serde(default)]
    pub report: ReportConfig,

    /// Demonstration service settings.
    #[serde(default)]
    pub demo: DemoConfig,
}

/// Upstream roll service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Base URL of the roll service.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Path of the class list endpoint.
    #[serde(default = "default_list_path")]
    pub list_path: String,

    /// Path prefix of the per-class size endpoint.
    #[serde(default = "default_detail_path")]
    pub detail_path: String,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            list_path: default_list_path(),
            detail_path: default_detail_path(),
            timeout_seconds: default_timeout(),
        }
    }
}

impl From<&SourceConfig> for HttpSourceConfig {
    fn from(config: &SourceConfig) -> Self {
        Self {
            base_url: config.base_url.clone(),
            list_path: config.list_path.clone(),
            detail_path: config.detail_path.clone(),
            timeout_seconds: config.timeout_seconds,
        }
    }
}

fn default_base_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_list_path() -> String {
    "/classes".to_string()
}

fn default_detail_path() -> String {
    "/classes/".to_string()
}

fn default_timeout() -> u64 {
    30
}

/// Fan-out settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Maximum class size requests in flight.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
        }
    }
}

fn default_concurrency() -> usize {
    crate::pipeline::DEFAULT_CONCURRENCY
}

/// Report settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Output format.
    #[serde(default)]
    pub format: ReportFormat,

    /// Exit with code 2 when any class count could not be fetched.
    #[serde(default)]
    pub strict: bool,
}

/// Demonstration service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DemoConfig {
    /// Port for `rollcall serve`.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Class list served by the stub.
    #[serde(default = "default_classes")]
    pub classes: Vec<String>,

    /// Smallest random class size.
    #[serde(default = "default_min_count")]
    pub min_count: u64,

    /// Largest random class size.
    #[serde(default = "default_max_count")]
    pub max_count: u64,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            classes: default_classes(),
            min_count: default_min_count(),
            max_count: default_max_count(),
        }
    }
}

fn default_port() -> u16 {
    3000
}

fn default_classes() -> Vec<String> {
    vec!["01A", "01B", "02A", "02B", "03X"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_min_count() -> u64 {
    18
}

fn default_max_count() -> u64 {
    28
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        config.validate()?;
        Ok(config)
    }

    /// Try to load configuration from the default location in `dir`.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_from_dir(dir: &Path) -> Result<Option<Self>> {
        let config_path = dir.join(CONFIG_FILE);

        if config_path.exists() {
            Ok(Some(Self::load(&config_path)?))
        } else {
            Ok(None)
        }
    }

    /// Reject values no run could use.
    pub fn validate(&self) -> Result<()> {
        if self.fetch.concurrency == 0 {
            anyhow::bail!("fetch.concurrency must be at least 1");
        }
        if self.source.timeout_seconds == 0 {
            anyhow::bail!("source.timeout_seconds must be at least 1");
        }
        if self.demo.min_count > self.demo.max_count {
            anyhow::bail!(
                "demo.min_count ({}) exceeds demo.max_count ({})",
                self.demo.min_count,
                self.demo.max_count
            );
        }
        Ok(())
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file settings.
    /// This method only overrides config when CLI provides explicit values.
    pub fn merge_with_args(&mut self, args: &Args) {
        match &args.command {
            Some(Command::Fetch(fetch)) => {
                if let Some(ref url) = fetch.url {
                    self.source.base_url = url.clone();
                }
                if let Some(timeout) = fetch.timeout {
                    self.source.timeout_seconds = timeout;
                }
                self.merge_run_options(fetch.concurrency, fetch.format, fetch.strict);
            }
            Some(Command::Demo(demo)) => {
                self.merge_run_options(demo.concurrency, demo.format, demo.strict);
            }
            Some(Command::Serve(serve)) => {
                if let Some(port) = serve.port {
                    self.demo.port = port;
                }
            }
            None => {}
        }
    }

    fn merge_run_options(
        &mut self,
        concurrency: Option<usize>,
        format: Option<ReportFormat>,
        strict: bool,
    ) {
        if let Some(concurrency) = concurrency {
            self.fetch.concurrency = concurrency;
        }
        if let Some(format) = format {
            self.report.format = format;
        }
        if strict {
            self.report.strict = true;
        }
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}
