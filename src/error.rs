//! Error types for a roll aggregation run.
//!
//! Fatal errors (`PipelineError`) end a run without a report. Per-class
//! errors (`DetailError`) are collected and delivered next to the report.

use crate::models::ClassName;
use thiserror::Error;

/// Failure below the HTTP status layer: the call never produced a response.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("transport error: {0}")]
    Other(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        let message = error_chain(&e);
        if e.is_timeout() {
            TransportError::Timeout(message)
        } else if e.is_connect() {
            TransportError::Connect(message)
        } else {
            TransportError::Other(message)
        }
    }
}

/// Render an error followed by each of its causes, separated by `: `.
fn error_chain(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut cause = err.source();
    while let Some(inner) = cause {
        let text = inner.to_string();
        if !message.contains(&text) {
            message.push_str(": ");
            message.push_str(&text);
        }
        cause = inner.source();
    }
    message
}

/// Failure fetching the size of one class. Never fatal to the run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DetailError {
    #[error("class {class}: {source}")]
    Transport {
        class: ClassName,
        #[source]
        source: TransportError,
    },

    #[error("class {class}: upstream returned HTTP {status}")]
    UpstreamStatus { class: ClassName, status: u16 },

    #[error("class {class}: malformed payload: {payload}")]
    MalformedPayload { class: ClassName, payload: String },
}

impl DetailError {
    /// The class this error belongs to.
    pub fn class(&self) -> &ClassName {
        match self {
            DetailError::Transport { class, .. }
            | DetailError::UpstreamStatus { class, .. }
            | DetailError::MalformedPayload { class, .. } => class,
        }
    }

    /// Short machine-readable kind, used in rendered reports.
    pub fn kind(&self) -> &'static str {
        match self {
            DetailError::Transport { .. } => "transport",
            DetailError::UpstreamStatus { .. } => "upstream_status",
            DetailError::MalformedPayload { .. } => "malformed_payload",
        }
    }
}

/// Failure of the class list call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ListFetchError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("upstream returned HTTP {0}")]
    Status(u16),

    #[error("malformed payload: {0}")]
    MalformedPayload(String),
}

/// Fatal errors: the run ends in the `Failed` state with no report.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipelineError {
    #[error("class list fetch failed: {0}")]
    ListFetch(#[from] ListFetchError),

    #[error("invalid class name in list: {token:?}")]
    InvalidIdentifier { token: String },

    #[error("duplicate class name in list: {0}")]
    DuplicateIdentifier(ClassName),

    #[error("aggregator has already been run")]
    AlreadyStarted,
}
