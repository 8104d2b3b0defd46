//! Demonstration roll service.
//!
//! Serves a fixed class list and a random size per class, standing in for a
//! real upstream during local runs and end-to-end tests.

use crate::config::DemoConfig;
use anyhow::{Context, Result};
use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};
use rand::Rng;
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, info};

#[derive(Debug, Serialize)]
struct ClassSize {
    count: u64,
}

#[derive(Clone)]
struct DemoState {
    config: Arc<DemoConfig>,
}

async fn list_classes(State(state): State<DemoState>) -> Json<Vec<String>> {
    debug!("Demo: serving class list");
    Json(state.config.classes.clone())
}

async fn class_size(
    State(state): State<DemoState>,
    Path(class): Path<String>,
) -> Json<ClassSize> {
    let count = rand::rng().random_range(state.config.min_count..=state.config.max_count);
    debug!("Demo: class {} -> {}", class, count);
    Json(ClassSize { count })
}

/// Build the demo router.
pub fn router(config: DemoConfig) -> Router {
    let state = DemoState {
        config: Arc::new(config),
    };

    Router::new()
        .route("/classes", get(list_classes))
        .route("/classes/{class}", get(class_size))
        .with_state(state)
}

/// Serve the demo routes on an already-bound listener until the future is dropped.
pub async fn serve_on(listener: TcpListener, config: DemoConfig) -> Result<()> {
    let addr = listener.local_addr().context("Listener has no local address")?;
    info!("Demo roll service listening on http://{}", addr);

    axum::serve(listener, router(config))
        .await
        .context("Demo roll service stopped")
}

/// Bind `port` on all interfaces and serve until Ctrl-C.
pub async fn serve(config: DemoConfig) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    tokio::select! {
        result = serve_on(listener, config) => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Demo roll service shutting down");
            Ok(())
        }
    }
}

/// Bind an ephemeral local port and serve in the background.
///
/// Returns the base URL the service answers on.
pub async fn spawn_local(config: DemoConfig) -> Result<String> {
    let listener = TcpListener::bind(("127.0.0.1", 0))
        .await
        .context("Failed to bind demo listener")?;
    let addr = listener.local_addr().context("Listener has no local address")?;

    tokio::spawn(async move {
        if let Err(e) = serve_on(listener, config).await {
            tracing::error!("{:#}", e);
        }
    });

    Ok(format!("http://{}", addr))
}
