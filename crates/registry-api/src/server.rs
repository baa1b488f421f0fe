//! SPDX-FileCopyrightText: © 2025 Cory Parent <goedelsoup+orasi@goedelsoup.io>
//! SPDX-License-Identifier: Apache-2.0
//!

//! HTTP server setup for the registry API
//!
//! Requests are bounded by a per-request timeout layer; idle keep-alive
//! connections are reaped at the connection level, so each accepted socket
//! is served through its own hyper connection with the idle timeout
//! configured.

use std::sync::Arc;
use std::time::Duration;

use axum::routing::get;
use axum::Router;
use hyper_util::rt::{TokioExecutor, TokioIo, TokioTimer};
use hyper_util::server::conn::auto::Builder as ConnectionBuilder;
use hyper_util::service::TowerToHyperService;
use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use crate::config::ApiConfig;
use crate::handlers::{self, AppState};
use crate::provider::RegistryDataProvider;

/// Default per-request timeout when building a router without a config
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Build the router with all endpoints
pub fn app(state: AppState) -> Router {
    app_with_timeout(state, DEFAULT_REQUEST_TIMEOUT)
}

/// Build the router with an explicit request timeout
pub fn app_with_timeout(state: AppState, request_timeout: Duration) -> Router {
    let api_routes = Router::new()
        .route("/info", get(handlers::registry_info))
        .route("/servers", get(handlers::list_servers))
        .route("/servers/:name", get(handlers::get_server));

    Router::new()
        .route("/health", get(handlers::health))
        .route("/readiness", get(handlers::readiness))
        .route("/openapi.yaml", get(handlers::openapi))
        .nest("/api/v1/registry", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(request_timeout))
        .with_state(state)
}

/// The registry API server
pub struct RegistryApiServer {
    config: ApiConfig,
    state: AppState,
}

impl RegistryApiServer {
    /// Create a new server for the given provider
    pub fn new(config: ApiConfig, provider: Arc<dyn RegistryDataProvider>) -> Self {
        Self {
            config,
            state: AppState { provider },
        }
    }

    /// The configured router
    pub fn router(&self) -> Router {
        app_with_timeout(self.state.clone(), self.config.request_timeout)
    }

    /// Serve until a shutdown signal arrives
    ///
    /// Keep-alive connections idle past the configured idle timeout are
    /// closed. On shutdown, open connections get the configured deadline to
    /// drain before being aborted.
    pub async fn serve(self) -> std::io::Result<()> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = TcpListener::bind(&addr).await?;
        info!(
            addr = %addr,
            registry = %self.config.registry_name,
            namespace = %self.config.registry_namespace,
            "Starting registry API server"
        );

        let router = self.router();
        let idle_timeout = self.config.idle_timeout;
        let shutdown_timeout = self.config.shutdown_timeout;

        let mut connections: JoinSet<()> = JoinSet::new();

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let (stream, remote_addr) = match accepted {
                        Ok(accepted) => accepted,
                        Err(e) => {
                            warn!(error = %e, "Failed to accept connection");
                            continue;
                        }
                    };
                    debug!(remote = %remote_addr, "Accepted connection");

                    let service = TowerToHyperService::new(router.clone());
                    connections.spawn(async move {
                        let mut builder = ConnectionBuilder::new(TokioExecutor::new());
                        builder
                            .http1()
                            .timer(TokioTimer::new())
                            .keep_alive(true)
                            .header_read_timeout(idle_timeout);
                        if let Err(e) = builder
                            .serve_connection(TokioIo::new(stream), service)
                            .await
                        {
                            debug!(error = %e, "Connection closed with error");
                        }
                    });
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("Shutdown signal received");
                    break;
                }
                Some(_) = connections.join_next(), if !connections.is_empty() => {}
            }
        }

        drop(listener);

        if !connections.is_empty() {
            info!(open = connections.len(), "Draining connections");
            let drained = tokio::time::timeout(shutdown_timeout, async {
                while connections.join_next().await.is_some() {}
            })
            .await;
            if drained.is_err() {
                warn!("Graceful shutdown deadline exceeded, aborting open connections");
                connections.abort_all();
            }
        }

        info!("Registry API server stopped");
        Ok(())
    }
}
