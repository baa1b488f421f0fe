//! SPDX-FileCopyrightText: © 2025 Cory Parent <goedelsoup+orasi@goedelsoup.io>
//! SPDX-License-Identifier: Apache-2.0

//! Sync state machine
//!
//! The sync manager decides whether a registry needs syncing and executes
//! the sync pipeline: handler creation, source validation, fetch, filter,
//! store. It is stateless; every piece of memory (hashes, attempt counters,
//! retry times, the last manual trigger) lives in the declaration's status
//! subresource. Each terminal decision is applied as one status write.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use kube::api::PostParams;
use kube::{Api, Client, ResourceExt};
use tracing::{info, warn};

use registry_core::filtering::apply_filters;
use registry_core::v1alpha1::{
    set_condition, MCPRegistry, MCPRegistryPhase, StorageReference, CONDITION_DATA_VALID,
    CONDITION_SOURCE_AVAILABLE, CONDITION_SYNC_SUCCESSFUL,
};

use crate::error::ControllerError;
use crate::sources::{create_handler, FetchResult, SourceError};
use crate::storage::{ConfigMapStorageManager, StorageManager};
use crate::ControllerResult;

// Sync decision reasons
pub const REASON_ALREADY_IN_PROGRESS: &str = "sync-already-in-progress";
pub const REASON_REGISTRY_NOT_READY: &str = "registry-not-ready";
pub const REASON_RETRY_BACKOFF_ACTIVE: &str = "retry-backoff-active";
pub const REASON_SOURCE_DATA_CHANGED: &str = "source-data-changed";
pub const REASON_ERROR_CHECKING_CHANGES: &str = "error-checking-data-changes";
pub const REASON_ERROR_PARSING_INTERVAL: &str = "error-parsing-sync-interval";
pub const REASON_MANUAL_WITH_CHANGES: &str = "manual-sync-with-data-changes";
pub const REASON_MANUAL_NO_CHANGES: &str = "manual-sync-no-data-changes";
pub const REASON_UP_TO_DATE_WITH_POLICY: &str = "up-to-date-with-policy";
pub const REASON_UP_TO_DATE_NO_POLICY: &str = "up-to-date-no-policy";

// Retry limits
/// Maximum sync attempts before giving up on transient failures
pub const MAX_SYNC_ATTEMPTS: i32 = 10;
/// Maximum retries for validation failures
pub const MAX_VALIDATION_RETRIES: i32 = 3;
/// Maximum retries for handler creation failures
pub const MAX_HANDLER_CREATION_RETRIES: i32 = 3;

/// Fixed retry interval for permanent-ish failures
const PERMANENT_FAILURE_RETRY: Duration = Duration::from_secs(3600);

// Condition reasons
const REASON_HANDLER_CREATION_FAILED: &str = "HandlerCreationFailed";
const REASON_VALIDATION_FAILED: &str = "ValidationFailed";
const REASON_SOURCE_NOT_FOUND: &str = "SourceNotFound";
const REASON_INVALID_DATA: &str = "InvalidData";
const REASON_FETCH_FAILED: &str = "FetchFailed";
const REASON_STORAGE_FAILED: &str = "StorageFailed";
const REASON_SOURCE_READY: &str = "SourceReady";
const REASON_DATA_VALID: &str = "DataValid";
const REASON_SYNC_COMPLETED: &str = "SyncCompleted";

/// Outcome of ShouldSync
#[derive(Debug, Clone, PartialEq)]
pub struct SyncDecision {
    pub sync_now: bool,
    pub reason: &'static str,
    pub next_check: Option<DateTime<Utc>>,
}

impl SyncDecision {
    fn new(sync_now: bool, reason: &'static str, next_check: Option<DateTime<Utc>>) -> Self {
        Self {
            sync_now,
            reason,
            next_check,
        }
    }
}

/// Outcome of PerformSync
#[derive(Debug)]
pub struct SyncOutcome {
    pub succeeded: bool,
    pub requeue_after: Option<Duration>,
}

/// All status changes for a single sync operation, applied in one write
struct StatusUpdate {
    phase: MCPRegistryPhase,
    message: String,
    conditions: Vec<ConditionUpdate>,
    sync_data: Option<SyncData>,
    requeue_after: Option<Duration>,
}

struct ConditionUpdate {
    condition_type: &'static str,
    status: bool,
    reason: &'static str,
    message: String,
}

/// Sync-specific status fields
struct SyncData {
    last_sync_time: Option<DateTime<Utc>>,
    last_sync_hash: Option<String>,
    server_count: Option<i32>,
    storage_ref: Option<StorageReference>,
    sync_attempts: i32,
    next_retry_time: Option<DateTime<Utc>>,
    last_manual_sync_trigger: Option<String>,
}

impl SyncData {
    fn attempts_only(sync_attempts: i32, next_retry_time: Option<DateTime<Utc>>) -> Self {
        Self {
            last_sync_time: None,
            last_sync_hash: None,
            server_count: None,
            storage_ref: None,
            sync_attempts,
            next_retry_time,
            last_manual_sync_trigger: None,
        }
    }
}

/// How a failed pipeline step is retried and reported
struct FailurePolicy {
    condition_type: &'static str,
    reason: &'static str,
    max_attempts: i32,
    exponential: bool,
}

/// Manages synchronization operations for MCPRegistry resources
pub struct SyncManager {
    client: Client,
    storage: Arc<dyn StorageManager>,
}

impl SyncManager {
    pub fn new(client: Client) -> Self {
        let storage = Arc::new(ConfigMapStorageManager::new(client.clone()));
        Self { client, storage }
    }

    pub fn storage(&self) -> Arc<dyn StorageManager> {
        self.storage.clone()
    }

    /// Determine whether a sync is needed and when to check next
    pub async fn should_sync(&self, registry: &MCPRegistry) -> SyncDecision {
        let now = Utc::now();

        if let Some(decision) = decide_from_phase(registry, now) {
            return decision;
        }

        // Registry is Ready: look at the source for changes
        let data_changed = match self.is_data_changed(registry).await {
            Ok(changed) => changed,
            Err(e) => {
                warn!(
                    registry = %registry.name_any(),
                    error = %e,
                    "Failed to check source for changes, forcing sync"
                );
                return SyncDecision::new(true, REASON_ERROR_CHECKING_CHANGES, None);
            }
        };

        decide_when_ready(registry, data_changed, now)
    }

    /// Compare the source's current hash with the last synced hash
    async fn is_data_changed(&self, registry: &MCPRegistry) -> Result<bool, SourceError> {
        let handler = create_handler(self.client.clone(), registry.spec.source.source_type)?;
        let current = handler.current_hash(registry).await?;
        let last = registry
            .status
            .as_ref()
            .map(|s| s.last_sync_hash.as_str())
            .unwrap_or("");
        Ok(last.is_empty() || current != last)
    }

    /// Execute the complete sync pipeline
    ///
    /// Failures never propagate as errors; they are captured into a single
    /// status update carrying the retry schedule.
    pub async fn perform_sync(&self, registry: &MCPRegistry) -> ControllerResult<SyncOutcome> {
        let attempts = registry.status.as_ref().map(|s| s.sync_attempts).unwrap_or(0);

        // Step 1: handler creation
        let handler = match create_handler(self.client.clone(), registry.spec.source.source_type) {
            Ok(handler) => handler,
            Err(e) => {
                let update = build_failure_update(
                    "Failed to create source handler",
                    &e,
                    FailurePolicy {
                        condition_type: CONDITION_SOURCE_AVAILABLE,
                        reason: REASON_HANDLER_CREATION_FAILED,
                        max_attempts: MAX_HANDLER_CREATION_RETRIES,
                        exponential: false,
                    },
                    attempts,
                    Utc::now(),
                );
                return self.apply_final_status_update(registry, update).await;
            }
        };

        // Step 2: source validation
        if let Err(e) = handler.validate(&registry.spec.source) {
            let update = build_failure_update(
                "Source validation failed",
                &e,
                FailurePolicy {
                    condition_type: CONDITION_SOURCE_AVAILABLE,
                    reason: REASON_VALIDATION_FAILED,
                    max_attempts: MAX_VALIDATION_RETRIES,
                    exponential: false,
                },
                attempts,
                Utc::now(),
            );
            return self.apply_final_status_update(registry, update).await;
        }

        // Step 3: fetch
        let mut fetch = match handler.fetch_registry(registry).await {
            Ok(result) => result,
            Err(e) => {
                let update = build_failure_update(
                    "Fetch failed",
                    &e,
                    fetch_failure_policy(&e),
                    attempts,
                    Utc::now(),
                );
                return self.apply_final_status_update(registry, update).await;
            }
        };

        info!(
            registry = %registry.name_any(),
            servers = fetch.server_count,
            format = %fetch.format,
            hash = %&fetch.hash[..8],
            "Registry data fetched successfully from source"
        );

        // Step 4: filter
        if let Some(filter) = &registry.spec.filter {
            match apply_filters(&fetch.registry, filter) {
                Ok(filtered) => {
                    let original_count = fetch.server_count;
                    fetch.server_count = filtered.server_count() as u32;
                    fetch.bytes = match filtered.to_canonical_bytes() {
                        Ok(bytes) => bytes,
                        Err(e) => return Err(ControllerError::Registry(e)),
                    };
                    fetch.registry = filtered;
                    info!(
                        registry = %registry.name_any(),
                        original = original_count,
                        filtered = fetch.server_count,
                        "Registry filtering completed"
                    );
                }
                Err(e) => {
                    let update = build_failure_update(
                        "Filtering failed",
                        &e,
                        FailurePolicy {
                            condition_type: CONDITION_SYNC_SUCCESSFUL,
                            reason: REASON_FETCH_FAILED,
                            max_attempts: MAX_SYNC_ATTEMPTS,
                            exponential: true,
                        },
                        attempts,
                        Utc::now(),
                    );
                    return self.apply_final_status_update(registry, update).await;
                }
            }
        }

        // Step 5: store
        if let Err(e) = self.storage.store(registry, &fetch.bytes).await {
            let update = build_failure_update(
                "Storage failed",
                &e,
                FailurePolicy {
                    condition_type: CONDITION_SYNC_SUCCESSFUL,
                    reason: REASON_STORAGE_FAILED,
                    max_attempts: MAX_SYNC_ATTEMPTS,
                    exponential: true,
                },
                attempts,
                Utc::now(),
            );
            return self.apply_final_status_update(registry, update).await;
        }

        // Step 6: success
        let storage_ref = self.storage.storage_reference(registry);
        let update = build_success_update(registry, &fetch, storage_ref, Utc::now());
        self.apply_final_status_update(registry, update).await
    }

    /// Record a manual trigger without syncing
    ///
    /// Keeps repeated manual triggers idempotent when the source is
    /// unchanged.
    pub async fn update_manual_sync_trigger_only(
        &self,
        registry: &MCPRegistry,
    ) -> ControllerResult<()> {
        let trigger = match registry.manual_sync_trigger() {
            Some(value) => value.to_string(),
            None => return Ok(()),
        };

        let api = self.registry_api(registry)?;
        let name = registry.name_any();
        let mut latest = api.get(&name).await?;
        latest
            .status
            .get_or_insert_with(Default::default)
            .last_manual_sync_trigger = trigger.clone();

        api.replace_status(&name, &PostParams::default(), serde_json::to_vec(&latest)?)
            .await?;

        info!(
            registry = %name,
            trigger = %trigger,
            "Manual sync trigger processed (no data changes)"
        );
        Ok(())
    }

    /// Clean up stored registry data
    pub async fn delete(&self, registry: &MCPRegistry) -> ControllerResult<()> {
        self.storage.delete(registry).await?;
        Ok(())
    }

    fn registry_api(&self, registry: &MCPRegistry) -> ControllerResult<Api<MCPRegistry>> {
        let namespace = registry
            .namespace()
            .ok_or_else(|| ControllerError::InvalidResource("registry has no namespace".into()))?;
        Ok(Api::namespaced(self.client.clone(), &namespace))
    }

    /// Apply all status changes from one sync decision in a single write
    ///
    /// The declaration is re-read first so the write carries the latest
    /// resourceVersion; a conflict surfaces as an error and the reconcile is
    /// retried by the runtime.
    async fn apply_final_status_update(
        &self,
        registry: &MCPRegistry,
        update: StatusUpdate,
    ) -> ControllerResult<SyncOutcome> {
        let api = self.registry_api(registry)?;
        let name = registry.name_any();

        let mut latest = api.get(&name).await?;
        let status = latest.status.get_or_insert_with(Default::default);

        status.phase = Some(update.phase);
        status.message = update.message.clone();

        if let Some(sync_data) = &update.sync_data {
            if let Some(t) = sync_data.last_sync_time {
                status.last_sync_time = Some(t.to_rfc3339_opts(chrono::SecondsFormat::Secs, true));
            }
            if let Some(hash) = &sync_data.last_sync_hash {
                status.last_sync_hash = hash.clone();
            }
            if let Some(count) = sync_data.server_count {
                status.server_count = count;
            }
            if let Some(storage_ref) = &sync_data.storage_ref {
                status.storage_ref = Some(storage_ref.clone());
            }
            if let Some(trigger) = &sync_data.last_manual_sync_trigger {
                status.last_manual_sync_trigger = trigger.clone();
            }
            // Always written: attempts count up on failure and reset on
            // success, and the retry time clears when no retry is scheduled.
            status.sync_attempts = sync_data.sync_attempts;
            status.next_retry_time = sync_data
                .next_retry_time
                .map(|t| t.to_rfc3339_opts(chrono::SecondsFormat::Secs, true));
        }

        let now = Utc::now();
        for condition in &update.conditions {
            set_condition(
                &mut status.conditions,
                condition.condition_type,
                if condition.status { "True" } else { "False" },
                condition.reason,
                &condition.message,
                now,
            );
        }

        api.replace_status(&name, &PostParams::default(), serde_json::to_vec(&latest)?)
            .await?;

        let succeeded = update.phase == MCPRegistryPhase::Ready;
        if succeeded {
            info!(registry = %name, "Registry sync completed successfully");
        } else {
            warn!(
                registry = %name,
                phase = %update.phase,
                message = %update.message,
                "Registry sync failed"
            );
        }

        Ok(SyncOutcome {
            succeeded,
            requeue_after: update.requeue_after,
        })
    }
}

/// Decision rules that only need the phase and retry schedule
fn decide_from_phase(registry: &MCPRegistry, now: DateTime<Utc>) -> Option<SyncDecision> {
    let phase = registry.phase();

    if phase == Some(MCPRegistryPhase::Syncing) {
        return Some(SyncDecision::new(false, REASON_ALREADY_IN_PROGRESS, None));
    }

    if phase != Some(MCPRegistryPhase::Ready) {
        if phase == Some(MCPRegistryPhase::Failed) {
            if let Some(next_retry) = registry.status.as_ref().and_then(|s| s.next_retry_after()) {
                if now < next_retry {
                    return Some(SyncDecision::new(
                        false,
                        REASON_RETRY_BACKOFF_ACTIVE,
                        Some(next_retry),
                    ));
                }
            }
        }
        return Some(SyncDecision::new(true, REASON_REGISTRY_NOT_READY, None));
    }

    None
}

/// Decision rules for a Ready registry once change detection has run
fn decide_when_ready(
    registry: &MCPRegistry,
    data_changed: bool,
    now: DateTime<Utc>,
) -> SyncDecision {
    let last_processed = registry
        .status
        .as_ref()
        .map(|s| s.last_manual_sync_trigger.as_str())
        .unwrap_or("");
    let manual_requested = registry
        .manual_sync_trigger()
        .map(|t| t != last_processed)
        .unwrap_or(false);

    if manual_requested {
        if data_changed {
            return SyncDecision::new(true, REASON_MANUAL_WITH_CHANGES, None);
        }
        return SyncDecision::new(true, REASON_MANUAL_NO_CHANGES, None);
    }

    if data_changed {
        return SyncDecision::new(true, REASON_SOURCE_DATA_CHANGED, None);
    }

    if registry.spec.sync_policy.is_some() {
        return match registry.sync_interval() {
            Ok(interval) => SyncDecision::new(
                false,
                REASON_UP_TO_DATE_WITH_POLICY,
                Some(now + chrono::Duration::from_std(interval).unwrap_or(chrono::Duration::hours(1))),
            ),
            Err(_) => SyncDecision::new(true, REASON_ERROR_PARSING_INTERVAL, None),
        };
    }

    SyncDecision::new(false, REASON_UP_TO_DATE_NO_POLICY, None)
}

/// Retry interval with exponential backoff: 5m, 10m, 20m, 40m, 1h, 1h...
pub fn calculate_retry_interval(attempts: i32) -> Duration {
    let base = Duration::from_secs(300);
    let max = Duration::from_secs(3600);

    if attempts <= 0 {
        return base;
    }

    let exponent = (attempts - 1).min(4) as u32;
    (base * 2u32.pow(exponent)).min(max)
}

/// Pick the retry policy for a fetch failure by error kind
fn fetch_failure_policy(err: &SourceError) -> FailurePolicy {
    match err {
        SourceError::SourceNotFound { .. } => FailurePolicy {
            condition_type: CONDITION_SOURCE_AVAILABLE,
            reason: REASON_SOURCE_NOT_FOUND,
            max_attempts: MAX_VALIDATION_RETRIES,
            exponential: false,
        },
        SourceError::ValidationFailed { .. } | SourceError::UnsupportedSource { .. } => {
            FailurePolicy {
                condition_type: CONDITION_SOURCE_AVAILABLE,
                reason: REASON_VALIDATION_FAILED,
                max_attempts: MAX_VALIDATION_RETRIES,
                exponential: false,
            }
        }
        SourceError::InvalidData { .. } => FailurePolicy {
            condition_type: CONDITION_DATA_VALID,
            reason: REASON_INVALID_DATA,
            max_attempts: MAX_SYNC_ATTEMPTS,
            exponential: true,
        },
        SourceError::FetchFailed { .. } => FailurePolicy {
            condition_type: CONDITION_SYNC_SUCCESSFUL,
            reason: REASON_FETCH_FAILED,
            max_attempts: MAX_SYNC_ATTEMPTS,
            exponential: true,
        },
    }
}

/// Compose the single status update for a failed pipeline step
fn build_failure_update(
    prefix: &str,
    err: &dyn std::fmt::Display,
    policy: FailurePolicy,
    attempts: i32,
    now: DateTime<Utc>,
) -> StatusUpdate {
    let next_attempts = attempts + 1;

    if attempts >= policy.max_attempts {
        // Give up: record the failure but stop requeueing.
        return StatusUpdate {
            phase: MCPRegistryPhase::Failed,
            message: format!("{} after {} attempts: {}", prefix, attempts, err),
            conditions: vec![ConditionUpdate {
                condition_type: policy.condition_type,
                status: false,
                reason: policy.reason,
                message: err.to_string(),
            }],
            sync_data: Some(SyncData::attempts_only(next_attempts, None)),
            requeue_after: None,
        };
    }

    let interval = if policy.exponential {
        calculate_retry_interval(next_attempts)
    } else {
        PERMANENT_FAILURE_RETRY
    };
    let next_retry = now + chrono::Duration::from_std(interval).unwrap_or(chrono::Duration::hours(1));

    StatusUpdate {
        phase: MCPRegistryPhase::Failed,
        message: format!("{}: {}", prefix, err),
        conditions: vec![ConditionUpdate {
            condition_type: policy.condition_type,
            status: false,
            reason: policy.reason,
            message: err.to_string(),
        }],
        sync_data: Some(SyncData::attempts_only(next_attempts, Some(next_retry))),
        requeue_after: Some(interval),
    }
}

/// Compose the single status update for a successful sync
fn build_success_update(
    registry: &MCPRegistry,
    fetch: &FetchResult,
    storage_ref: StorageReference,
    now: DateTime<Utc>,
) -> StatusUpdate {
    StatusUpdate {
        phase: MCPRegistryPhase::Ready,
        message: "Registry is ready and synchronized".to_string(),
        conditions: vec![
            ConditionUpdate {
                condition_type: CONDITION_SOURCE_AVAILABLE,
                status: true,
                reason: REASON_SOURCE_READY,
                message: "Source configuration is valid and accessible".to_string(),
            },
            ConditionUpdate {
                condition_type: CONDITION_DATA_VALID,
                status: true,
                reason: REASON_DATA_VALID,
                message: "Registry data is valid and parsed successfully".to_string(),
            },
            ConditionUpdate {
                condition_type: CONDITION_SYNC_SUCCESSFUL,
                status: true,
                reason: REASON_SYNC_COMPLETED,
                message: "Registry sync completed successfully".to_string(),
            },
        ],
        sync_data: Some(SyncData {
            last_sync_time: Some(now),
            last_sync_hash: Some(fetch.hash.clone()),
            server_count: Some(fetch.server_count as i32),
            storage_ref: Some(storage_ref),
            sync_attempts: 0,
            next_retry_time: None,
            last_manual_sync_trigger: registry.manual_sync_trigger().map(|t| t.to_string()),
        }),
        requeue_after: None,
    }
}
