//! Fetch and validate the size of a single class.

use crate::error::DetailError;
use crate::models::ClassName;
use crate::source::ClassSource;
use crate::validate::extract_count;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

/// Fetches one class size per call. Makes exactly one upstream request and
/// never retries.
#[derive(Clone)]
pub struct ClassSizeFetcher {
    source: Arc<dyn ClassSource>,
}

impl ClassSizeFetcher {
    pub fn new(source: Arc<dyn ClassSource>) -> Self {
        Self { source }
    }

    /// `class` must already be validated by the caller.
    pub async fn fetch(&self, class: &ClassName) -> Result<u64, DetailError> {
        let response = self.source.class_size(class).await.map_err(|source| {
            warn!("Class {}: transport failure: {}", class, source);
            DetailError::Transport {
                class: class.clone(),
                source,
            }
        })?;

        if !response.is_success() {
            warn!("Class {}: upstream returned HTTP {}", class, response.status);
            return Err(DetailError::UpstreamStatus {
                class: class.clone(),
                status: response.status,
            });
        }

        let payload: Option<Value> = serde_json::from_str(&response.body).ok();
        match payload.as_ref().and_then(extract_count) {
            Some(count) => {
                debug!("Class {}: count {}", class, count);
                Ok(count)
            }
            None => {
                warn!("Class {}: malformed payload: {}", class, response.body);
                Err(DetailError::MalformedPayload {
                    class: class.clone(),
                    payload: response.body,
                })
            }
        }
    }
}
