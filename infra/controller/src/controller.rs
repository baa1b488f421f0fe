//! SPDX-FileCopyrightText: © 2025 Cory Parent <goedelsoup+orasi@goedelsoup.io>
//! SPDX-License-Identifier: Apache-2.0

//! Main reconciliation logic for the MCP registry controller
//!
//! Each reconcile runs the declaration through the sync decision, delegates
//! the pipeline to the sync manager, and keeps the per-registry API
//! resources in step. Source ConfigMaps are watched so edits enqueue the
//! dependent declarations without waiting for the next interval tick.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::Utc;
use futures::StreamExt;
use k8s_openapi::api::core::v1::ConfigMap;
use kube::api::PostParams;
use kube::runtime::controller::{Action, Controller};
use kube::runtime::finalizer::{finalizer, Event as FinalizerEvent};
use kube::runtime::reflector::ObjectRef;
use kube::runtime::watcher;
use kube::{Api, Client, ResourceExt};
use tracing::{debug, info, warn};

use registry_core::v1alpha1::{MCPRegistry, MCPRegistryPhase, SourceType};

use crate::apiservice::RegistryApiManager;
use crate::error::ControllerError;
use crate::metrics::Metrics;
use crate::sync::{SyncManager, REASON_MANUAL_NO_CHANGES, REASON_MANUAL_WITH_CHANGES};
use crate::{ControllerResult, MCPREGISTRY_FINALIZER};

/// Requeue interval for unexpected reconcile errors
const DEFAULT_ERROR_REQUEUE: Duration = Duration::from_secs(300);

/// Shared state handed to every reconcile
pub struct Context {
    pub client: Client,
    pub sync_manager: SyncManager,
    pub api_manager: RegistryApiManager,
    pub metrics: Metrics,
    pub source_index: Arc<SourceIndex>,
}

impl Context {
    pub fn new(client: Client) -> Self {
        Self {
            sync_manager: SyncManager::new(client.clone()),
            api_manager: RegistryApiManager::new(client.clone()),
            metrics: Metrics::new(),
            source_index: Arc::new(SourceIndex::default()),
            client,
        }
    }
}

/// Mapping from source ConfigMaps to the declarations that read them
///
/// Maintained by the reconciler itself; the ConfigMap watch uses it to
/// enqueue dependents when a source changes.
#[derive(Default)]
pub struct SourceIndex {
    entries: RwLock<HashMap<(String, String), HashSet<ObjectRef<MCPRegistry>>>>,
}

impl SourceIndex {
    /// Record the source ConfigMap referenced by a declaration
    pub fn record(&self, registry: &MCPRegistry) {
        let object_ref = ObjectRef::from_obj(registry);
        let mut entries = self.entries.write().expect("source index lock poisoned");

        for dependents in entries.values_mut() {
            dependents.remove(&object_ref);
        }

        if registry.spec.source.source_type == SourceType::Configmap {
            if let Some(cm_source) = &registry.spec.source.configmap {
                let namespace = cm_source
                    .namespace
                    .clone()
                    .or_else(|| registry.namespace())
                    .unwrap_or_default();
                entries
                    .entry((namespace, cm_source.name.clone()))
                    .or_default()
                    .insert(object_ref);
            }
        }

        entries.retain(|_, dependents| !dependents.is_empty());
    }

    /// Drop all entries for a deleted declaration
    pub fn remove(&self, registry: &MCPRegistry) {
        let object_ref = ObjectRef::from_obj(registry);
        let mut entries = self.entries.write().expect("source index lock poisoned");
        for dependents in entries.values_mut() {
            dependents.remove(&object_ref);
        }
        entries.retain(|_, dependents| !dependents.is_empty());
    }

    /// Declarations that read the given ConfigMap
    pub fn dependents(&self, namespace: &str, name: &str) -> Vec<ObjectRef<MCPRegistry>> {
        let entries = self.entries.read().expect("source index lock poisoned");
        entries
            .get(&(namespace.to_string(), name.to_string()))
            .map(|refs| refs.iter().cloned().collect())
            .unwrap_or_default()
    }
}

/// Reconcile one MCPRegistry
pub async fn reconcile(
    registry: Arc<MCPRegistry>,
    ctx: Arc<Context>,
) -> Result<Action, ControllerError> {
    let namespace = registry
        .namespace()
        .ok_or_else(|| ControllerError::InvalidResource("registry has no namespace".into()))?;
    let api: Api<MCPRegistry> = Api::namespaced(ctx.client.clone(), &namespace);

    let metrics = ctx.metrics.clone();
    metrics
        .time_reconciliation_async(|| async {
            finalizer(&api, MCPREGISTRY_FINALIZER, registry, |event| async {
                match event {
                    FinalizerEvent::Apply(registry) => apply(registry, &ctx).await,
                    FinalizerEvent::Cleanup(registry) => cleanup(registry, &ctx).await,
                }
            })
            .await
            .map_err(|e| ControllerError::Finalizer(Box::new(e)))
        })
        .await
}

/// Reconcile a live declaration
async fn apply(registry: Arc<MCPRegistry>, ctx: &Context) -> ControllerResult<Action> {
    let name = registry.name_any();
    ctx.metrics.increment_reconciliations();
    ctx.source_index.record(&registry);

    // First observation: surface the Pending phase before any sync work
    if registry.phase().is_none() {
        set_phase(
            ctx,
            &registry,
            MCPRegistryPhase::Pending,
            "Initializing registry",
        )
        .await?;
    }

    let decision = ctx.sync_manager.should_sync(&registry).await;
    debug!(
        registry = %name,
        sync_now = decision.sync_now,
        reason = decision.reason,
        "Sync decision"
    );

    if !decision.sync_now {
        // Steady state: keep the API resources for a Ready registry in place
        if registry.phase() == Some(MCPRegistryPhase::Ready) {
            let endpoint = ctx.api_manager.reconcile(&registry).await?;
            record_api_endpoint(ctx, &registry, &endpoint).await?;
        }

        return Ok(match decision.next_check {
            Some(next_check) => {
                let delay = (next_check - Utc::now())
                    .to_std()
                    .unwrap_or(Duration::from_secs(0));
                Action::requeue(delay)
            }
            None => Action::await_change(),
        });
    }

    if decision.reason == REASON_MANUAL_NO_CHANGES {
        ctx.sync_manager
            .update_manual_sync_trigger_only(&registry)
            .await?;
        return Ok(Action::await_change());
    }

    info!(registry = %name, reason = decision.reason, "Starting sync operation");
    set_phase(
        ctx,
        &registry,
        MCPRegistryPhase::Syncing,
        "Syncing registry data",
    )
    .await?;

    let outcome = ctx.sync_manager.perform_sync(&registry).await?;

    if !outcome.succeeded {
        ctx.metrics.increment_sync_failures();
        return Ok(match outcome.requeue_after {
            Some(delay) => Action::requeue(delay),
            None => Action::await_change(),
        });
    }

    ctx.metrics.increment_syncs();

    // Keep the per-registry API running and its URL recorded
    let endpoint = ctx.api_manager.reconcile(&registry).await?;
    record_api_endpoint(ctx, &registry, &endpoint).await?;

    if registry.is_automatic_sync() && decision.reason != REASON_MANUAL_WITH_CHANGES {
        if let Ok(interval) = registry.sync_interval() {
            return Ok(Action::requeue(interval));
        }
    }

    Ok(Action::await_change())
}

/// Tear down owned resources before the finalizer is released
///
/// Failures propagate so the declaration is not deleted until cleanup has
/// actually succeeded.
async fn cleanup(registry: Arc<MCPRegistry>, ctx: &Context) -> ControllerResult<Action> {
    let name = registry.name_any();
    info!(registry = %name, "Cleaning up registry resources");

    // Best-effort phase update; the object is already marked for deletion
    if let Err(e) = set_phase(
        ctx,
        &registry,
        MCPRegistryPhase::Terminating,
        "Registry is being deleted",
    )
    .await
    {
        debug!(registry = %name, error = %e, "Could not record Terminating phase");
    }

    ctx.api_manager.delete(&registry).await?;
    ctx.sync_manager.delete(&registry).await?;
    ctx.source_index.remove(&registry);

    info!(registry = %name, "Registry cleanup completed");
    Ok(Action::await_change())
}

/// Update phase and message in one status write
async fn set_phase(
    ctx: &Context,
    registry: &MCPRegistry,
    phase: MCPRegistryPhase,
    message: &str,
) -> ControllerResult<()> {
    if registry.phase() == Some(phase)
        && registry.status.as_ref().map(|s| s.message.as_str()) == Some(message)
    {
        return Ok(());
    }

    let namespace = registry
        .namespace()
        .ok_or_else(|| ControllerError::InvalidResource("registry has no namespace".into()))?;
    let api: Api<MCPRegistry> = Api::namespaced(ctx.client.clone(), &namespace);
    let name = registry.name_any();

    let mut latest = api.get(&name).await?;
    let status = latest.status.get_or_insert_with(Default::default);
    status.phase = Some(phase);
    status.message = message.to_string();

    api.replace_status(&name, &PostParams::default(), serde_json::to_vec(&latest)?)
        .await?;
    Ok(())
}

/// Record the API service URL in status once it is known
async fn record_api_endpoint(
    ctx: &Context,
    registry: &MCPRegistry,
    endpoint: &str,
) -> ControllerResult<()> {
    let namespace = registry
        .namespace()
        .ok_or_else(|| ControllerError::InvalidResource("registry has no namespace".into()))?;
    let api: Api<MCPRegistry> = Api::namespaced(ctx.client.clone(), &namespace);
    let name = registry.name_any();

    let mut latest = api.get(&name).await?;
    let status = latest.status.get_or_insert_with(Default::default);
    if status.api_endpoint.as_deref() == Some(endpoint) {
        return Ok(());
    }
    status.api_endpoint = Some(endpoint.to_string());

    api.replace_status(&name, &PostParams::default(), serde_json::to_vec(&latest)?)
        .await?;
    Ok(())
}

/// Requeue policy for errors the reconciler did not capture into status
pub fn error_policy(
    registry: Arc<MCPRegistry>,
    error: &ControllerError,
    ctx: Arc<Context>,
) -> Action {
    ctx.metrics.increment_reconciliation_errors();
    warn!(
        registry = %registry.name_any(),
        error = %error,
        "Reconcile failed, requeueing"
    );
    Action::requeue(DEFAULT_ERROR_REQUEUE)
}

/// Run the controller until shutdown
pub async fn run_controller(client: Client) -> ControllerResult<()> {
    let registries: Api<MCPRegistry> = Api::all(client.clone());
    let owned_configmaps: Api<ConfigMap> = Api::all(client.clone());
    let source_configmaps: Api<ConfigMap> = Api::all(client.clone());

    let context = Arc::new(Context::new(client));
    let source_index = context.source_index.clone();

    info!("Starting MCPRegistry controller");

    Controller::new(registries, watcher::Config::default())
        .owns(owned_configmaps, watcher::Config::default())
        .watches(source_configmaps, watcher::Config::default(), move |cm| {
            let namespace = cm.namespace().unwrap_or_default();
            source_index.dependents(&namespace, &cm.name_any())
        })
        .shutdown_on_signal()
        .run(reconcile, error_policy, context)
        .for_each(|result| async move {
            match result {
                Ok((object_ref, _)) => debug!(object = %object_ref, "Reconciled"),
                Err(e) => warn!(error = %e, "Reconciliation error"),
            }
        })
        .await;

    info!("MCPRegistry controller stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use registry_core::v1alpha1::{
        ConfigMapSource, MCPRegistrySource, MCPRegistrySpec,
    };

    fn registry_with_source(name: &str, cm_name: &str, cm_namespace: Option<&str>) -> MCPRegistry {
        let spec = MCPRegistrySpec {
            display_name: None,
            source: MCPRegistrySource {
                source_type: SourceType::Configmap,
                format: None,
                configmap: Some(ConfigMapSource {
                    name: cm_name.to_string(),
                    namespace: cm_namespace.map(|s| s.to_string()),
                    key: "registry.json".to_string(),
                }),
                url: None,
                git: None,
                registry: None,
            },
            sync_policy: None,
            filter: None,
        };
        let mut registry = MCPRegistry::new(name, spec);
        registry.metadata.namespace = Some("default".to_string());
        registry
    }

    #[test]
    fn test_source_index_maps_configmap_to_registry() {
        let index = SourceIndex::default();
        let registry = registry_with_source("reg-a", "shared-data", None);
        index.record(&registry);

        let dependents = index.dependents("default", "shared-data");
        assert_eq!(dependents.len(), 1);
        assert_eq!(dependents[0].name, "reg-a");

        assert!(index.dependents("default", "other-data").is_empty());
        assert!(index.dependents("elsewhere", "shared-data").is_empty());
    }

    #[test]
    fn test_source_index_honors_explicit_namespace() {
        let index = SourceIndex::default();
        let registry = registry_with_source("reg-a", "shared-data", Some("data-ns"));
        index.record(&registry);

        assert_eq!(index.dependents("data-ns", "shared-data").len(), 1);
        assert!(index.dependents("default", "shared-data").is_empty());
    }

    #[test]
    fn test_source_index_tracks_source_changes() {
        let index = SourceIndex::default();
        let registry = registry_with_source("reg-a", "first", None);
        index.record(&registry);

        let moved = registry_with_source("reg-a", "second", None);
        index.record(&moved);

        assert!(index.dependents("default", "first").is_empty());
        assert_eq!(index.dependents("default", "second").len(), 1);
    }

    #[test]
    fn test_source_index_remove_clears_registry() {
        let index = SourceIndex::default();
        let registry = registry_with_source("reg-a", "shared-data", None);
        index.record(&registry);
        index.remove(&registry);
        assert!(index.dependents("default", "shared-data").is_empty());
    }

    #[test]
    fn test_source_index_supports_multiple_dependents() {
        let index = SourceIndex::default();
        index.record(&registry_with_source("reg-a", "shared-data", None));
        index.record(&registry_with_source("reg-b", "shared-data", None));
        assert_eq!(index.dependents("default", "shared-data").len(), 2);
    }
}
