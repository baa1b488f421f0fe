//! SPDX-FileCopyrightText: © 2025 Cory Parent <goedelsoup+orasi@goedelsoup.io>
//! SPDX-License-Identifier: Apache-2.0

//! Kubernetes controller for MCP registry resources
//!
//! This crate reconciles MCPRegistry custom resources: it fetches registry
//! data from the declared source, normalizes and filters it, persists it to
//! a controller-owned ConfigMap, and keeps a per-registry read-only API
//! deployment running.

pub mod apiservice;
pub mod controller;
pub mod crd;
pub mod error;
pub mod metrics;
pub mod sources;
pub mod storage;
pub mod sync;

/// Re-export main components
pub use controller::run_controller;
pub use error::ControllerError;
pub use metrics::Metrics;

/// Result type for controller operations
pub type ControllerResult<T> = Result<T, ControllerError>;

/// Finalizer ensuring cleanup of owned resources
pub const MCPREGISTRY_FINALIZER: &str = "mcpregistry.toolhive.stacklok.dev/finalizer";
