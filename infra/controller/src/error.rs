//! SPDX-FileCopyrightText: © 2025 Cory Parent <goedelsoup+orasi@goedelsoup.io>
//! SPDX-License-Identifier: Apache-2.0

//! Error types for the MCP registry controller

use thiserror::Error;

use crate::sources::SourceError;
use crate::storage::StorageError;

/// Controller error types
#[derive(Error, Debug)]
pub enum ControllerError {
    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    /// Source handler error
    #[error(transparent)]
    Source(#[from] SourceError),

    /// Storage error
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Registry data error
    #[error(transparent)]
    Registry(#[from] registry_core::RegistryError),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Resource is missing a required field
    #[error("Invalid resource: {0}")]
    InvalidResource(String),

    /// Finalizer handling error
    #[error("Finalizer error: {0}")]
    Finalizer(#[source] Box<kube::runtime::finalizer::Error<ControllerError>>),

    /// General error
    #[error("General error: {0}")]
    General(String),
}
