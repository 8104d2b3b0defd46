//! Upstream roll service access.
//!
//! The aggregator only sees [`ClassSource`]; [`HttpSource`] is the
//! production implementation over `reqwest`.

use crate::error::TransportError;
use crate::models::ClassName;
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

/// Raw upstream reply: status code and unparsed body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceResponse {
    pub status: u16,
    pub body: String,
}

impl SourceResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == 200
    }
}

/// The two operations the aggregator consumes from the roll service.
#[async_trait]
pub trait ClassSource: Send + Sync {
    /// Fetch the list of all class names.
    async fn list_classes(&self) -> Result<SourceResponse, TransportError>;

    /// Fetch the size of one class.
    async fn class_size(&self, class: &ClassName) -> Result<SourceResponse, TransportError>;
}

/// Endpoint settings for [`HttpSource`].
#[derive(Debug, Clone)]
pub struct HttpSourceConfig {
    pub base_url: String,
    pub list_path: String,
    /// Prefix for per-class requests; the class name is appended.
    pub detail_path: String,
    pub timeout_seconds: u64,
}

impl Default for HttpSourceConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".to_string(),
            list_path: "/classes".to_string(),
            detail_path: "/classes/".to_string(),
            timeout_seconds: 30,
        }
    }
}

/// Roll service reached over HTTP.
pub struct HttpSource {
    config: HttpSourceConfig,
    http_client: reqwest::Client,
}

impl HttpSource {
    pub fn new(config: HttpSourceConfig) -> Result<Self, TransportError> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;

        Ok(Self {
            config,
            http_client,
        })
    }

    pub fn list_url(&self) -> String {
        join_url(&self.config.base_url, &self.config.list_path)
    }

    pub fn detail_url(&self, class: &ClassName) -> String {
        format!(
            "{}{}",
            join_url(&self.config.base_url, &self.config.detail_path),
            class
        )
    }

    async fn get(&self, url: &str) -> Result<SourceResponse, TransportError> {
        debug!("GET {}", url);

        let response = self.http_client.get(url).send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;

        debug!("GET {} -> HTTP {} ({} bytes)", url, status, body.len());
        Ok(SourceResponse::new(status, body))
    }
}

#[async_trait]
impl ClassSource for HttpSource {
    async fn list_classes(&self) -> Result<SourceResponse, TransportError> {
        self.get(&self.list_url()).await
    }

    async fn class_size(&self, class: &ClassName) -> Result<SourceResponse, TransportError> {
        self.get(&self.detail_url(class)).await
    }
}

fn join_url(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    if path.starts_with('/') {
        format!("{}{}", base, path)
    } else {
        format!("{}/{}", base, path)
    }
}
