//! SPDX-FileCopyrightText: © 2025 Cory Parent <goedelsoup+orasi@goedelsoup.io>
//! SPDX-License-Identifier: Apache-2.0
//!

//! Registry API main binary
//!
//! Serves the synced data of one MCPRegistry resource over HTTP.

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use registry_api::{ApiConfig, KubeRegistryDataProvider, RegistryApiServer, REGISTRY_API_NAME};

#[derive(Parser)]
#[command(name = "thv-registry-api")]
#[command(about = "Read-only API server for a synced MCP registry")]
#[command(version)]
struct Cli {
    /// Address to bind to
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Port to listen on
    #[arg(long, default_value = "8080")]
    port: u16,

    /// Name of the MCPRegistry resource to serve
    #[arg(long)]
    registry_name: String,

    /// Namespace of the MCPRegistry resource
    #[arg(long)]
    registry_namespace: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let config = ApiConfig {
        host: cli.host,
        port: cli.port,
        registry_name: cli.registry_name,
        registry_namespace: cli.registry_namespace,
        ..Default::default()
    };

    if let Err(e) = config.validate() {
        anyhow::bail!("invalid configuration: {}", e);
    }

    info!(
        service = REGISTRY_API_NAME,
        version = env!("CARGO_PKG_VERSION"),
        registry = %config.registry_name,
        "Starting registry API"
    );

    let client = kube::Client::try_default().await?;
    let provider = Arc::new(KubeRegistryDataProvider::new(
        client,
        config.registry_name.clone(),
        config.registry_namespace.clone(),
        config.cluster_timeout,
    ));

    let server = RegistryApiServer::new(config, provider);
    server.serve().await?;

    Ok(())
}
