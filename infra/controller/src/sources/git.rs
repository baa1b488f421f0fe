//! SPDX-FileCopyrightText: © 2025 Cory Parent <goedelsoup+orasi@goedelsoup.io>
//! SPDX-License-Identifier: Apache-2.0

//! Git source handler
//!
//! The git source type is structurally validated so declarations can be
//! authored ahead of time, but the transport itself is not wired up yet;
//! fetches fail with an unsupported-source error instead of panicking.

use async_trait::async_trait;

use registry_core::v1alpha1::{GitSource, MCPRegistry, MCPRegistrySource, SourceType};

use super::{FetchResult, SourceError, SourceHandler};

/// Handler for Git repository sources
pub struct GitSourceHandler;

fn git_source(source: &MCPRegistrySource) -> Result<&GitSource, SourceError> {
    if source.source_type != SourceType::Git {
        return Err(SourceError::validation(
            SourceType::Git,
            format!("source type mismatch: got {}", source.source_type),
        ));
    }
    let git_source = source
        .git
        .as_ref()
        .ok_or_else(|| SourceError::validation(SourceType::Git, "git configuration is required"))?;
    if git_source.repository.is_empty() {
        return Err(SourceError::validation(
            SourceType::Git,
            "git repository is required",
        ));
    }
    if git_source.path.is_empty() {
        return Err(SourceError::validation(SourceType::Git, "git path is required"));
    }
    Ok(git_source)
}

impl GitSourceHandler {
    pub fn new() -> Self {
        Self
    }
}

impl Default for GitSourceHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SourceHandler for GitSourceHandler {
    fn validate(&self, source: &MCPRegistrySource) -> Result<(), SourceError> {
        git_source(source).map(|_| ())
    }

    async fn fetch_registry(&self, _registry: &MCPRegistry) -> Result<FetchResult, SourceError> {
        Err(SourceError::unsupported(
            "git source support is not yet implemented",
        ))
    }

    async fn current_hash(&self, _registry: &MCPRegistry) -> Result<String, SourceError> {
        Err(SourceError::unsupported(
            "git source support is not yet implemented",
        ))
    }
}
