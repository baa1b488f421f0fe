//! SPDX-FileCopyrightText: © 2025 Cory Parent <goedelsoup+orasi@goedelsoup.io>
//! SPDX-License-Identifier: Apache-2.0

//! Main controller binary for the MCP registry operator

use axum::{extract::State, http::StatusCode, response::Json, routing::get, Router};
use chrono::Utc;
use kube::Client;
use std::time::Duration;
use toolhive_controller::run_controller;
use tracing::{error, info};

/// Application state for the admin endpoints
#[derive(Clone)]
struct AppState {
    /// Controller start time
    started_at: chrono::DateTime<Utc>,
}

/// Health check endpoint
async fn health_check() -> StatusCode {
    StatusCode::OK
}

/// Metrics endpoint
async fn metrics(State(_state): State<AppState>) -> String {
    "metrics_placeholder".to_string()
}

/// Root endpoint with debug information
async fn root(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "service": "toolhive-controller",
        "version": env!("CARGO_PKG_VERSION"),
        "started_at": state.started_at.to_rfc3339(),
    }))
}

/// Start the admin HTTP server
async fn start_admin_server(state: AppState) -> Result<(), std::io::Error> {
    let app = Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .route("/metrics", get(metrics))
        .with_state(state);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], 8081));
    info!("Starting admin HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await
}

/// Initialize logging
fn init_logging() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,toolhive_controller=debug".into());

    tracing_subscriber::fmt().with_env_filter(env_filter).init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    init_logging();

    info!("Starting MCPRegistry controller v{}", env!("CARGO_PKG_VERSION"));

    let client = Client::try_default().await?;

    let state = AppState {
        started_at: Utc::now(),
    };

    // Admin endpoints run alongside the controller
    let server_handle = tokio::spawn(start_admin_server(state));

    // Runs until a shutdown signal arrives
    if let Err(e) = run_controller(client).await {
        error!("Controller failed: {}", e);
        return Err(Box::new(e) as Box<dyn std::error::Error + Send + Sync>);
    }

    info!("Shutting down...");
    server_handle.abort();

    let _ = tokio::time::timeout(Duration::from_secs(10), async {
        if let Err(e) = server_handle.await {
            if !e.is_cancelled() {
                error!("Admin server task failed: {:?}", e);
            }
        }
    })
    .await;

    info!("Shutdown complete");
    Ok(())
}
