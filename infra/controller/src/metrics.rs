//! SPDX-FileCopyrightText: © 2025 Cory Parent <goedelsoup+orasi@goedelsoup.io>
//! SPDX-License-Identifier: Apache-2.0

//! Metrics collection for the MCP registry controller

use std::time::Instant;

/// Metrics collection for the controller
#[derive(Clone)]
pub struct Metrics;

impl Metrics {
    /// Create new metrics instance
    pub fn new() -> Self {
        Self
    }

    /// Record reconciliation duration
    pub fn record_reconcile_duration(&self, duration: std::time::Duration) {
        metrics::histogram!(
            "mcpregistry_controller_reconcile_duration_seconds",
            duration.as_secs_f64()
        );
    }

    /// Increment reconciliation counter
    pub fn increment_reconciliations(&self) {
        metrics::counter!("mcpregistry_controller_reconciliations_total", 1);
    }

    /// Increment reconciliation errors counter
    pub fn increment_reconciliation_errors(&self) {
        metrics::counter!("mcpregistry_controller_reconciliation_errors_total", 1);
    }

    /// Increment sync counter
    pub fn increment_syncs(&self) {
        metrics::counter!("mcpregistry_controller_syncs_total", 1);
    }

    /// Increment sync failure counter
    pub fn increment_sync_failures(&self) {
        metrics::counter!("mcpregistry_controller_sync_failures_total", 1);
    }

    /// Time an async reconciliation operation
    pub async fn time_reconciliation_async<F, Fut, T>(&self, f: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = T>,
    {
        let start = Instant::now();
        let result = f().await;
        let duration = start.elapsed();
        self.record_reconcile_duration(duration);
        result
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
