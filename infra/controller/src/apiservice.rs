//! SPDX-FileCopyrightText: © 2025 Cory Parent <goedelsoup+orasi@goedelsoup.io>
//! SPDX-License-Identifier: Apache-2.0

//! Registry API resource management
//!
//! Every registry gets a dedicated read-only API: a single-replica
//! deployment of the registry-api binary plus a cluster-internal service.
//! Both carry a controller reference so they are removed with the
//! declaration.

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, HTTPGetAction, PodSpec, PodTemplateSpec, Probe,
    ResourceRequirements, Service, ServicePort, ServiceSpec,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::api::{ObjectMeta, PostParams};
use kube::{Api, Client, Resource, ResourceExt};
use tracing::{debug, info};

use registry_core::v1alpha1::MCPRegistry;

use crate::error::ControllerError;
use crate::ControllerResult;

/// Port the registry API container listens on
pub const REGISTRY_API_PORT: i32 = 8080;

/// Port exposed by the service
pub const REGISTRY_API_SERVICE_PORT: i32 = 80;

/// Container image for the registry API
pub const REGISTRY_API_IMAGE: &str = "thv-registry-api:latest";

/// Manages the per-registry API deployment and service
pub struct RegistryApiManager {
    client: Client,
}

impl RegistryApiManager {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Ensure the API deployment and service exist and are up to date
    ///
    /// Returns the stable in-cluster endpoint URL.
    pub async fn reconcile(&self, registry: &MCPRegistry) -> ControllerResult<String> {
        let namespace = registry
            .namespace()
            .ok_or_else(|| ControllerError::InvalidResource("registry has no namespace".into()))?;
        let owner_ref = registry.controller_owner_ref(&()).ok_or_else(|| {
            ControllerError::InvalidResource("registry has no uid for owner reference".into())
        })?;

        let mut deployment = build_deployment(registry);
        deployment.metadata.owner_references = Some(vec![owner_ref.clone()]);

        let deployments: Api<Deployment> = Api::namespaced(self.client.clone(), &namespace);
        reconcile_deployment(&deployments, deployment).await?;

        let mut service = build_service(registry);
        service.metadata.owner_references = Some(vec![owner_ref]);

        let services: Api<Service> = Api::namespaced(self.client.clone(), &namespace);
        reconcile_service(&services, service).await?;

        let endpoint = api_endpoint(registry);
        info!(
            registry = %registry.name_any(),
            endpoint = %endpoint,
            "Registry API reconciled"
        );
        Ok(endpoint)
    }

    /// Remove the API deployment and service; not-found is not an error
    pub async fn delete(&self, registry: &MCPRegistry) -> ControllerResult<()> {
        let namespace = registry
            .namespace()
            .ok_or_else(|| ControllerError::InvalidResource("registry has no namespace".into()))?;
        let name = resource_name(registry);

        let deployments: Api<Deployment> = Api::namespaced(self.client.clone(), &namespace);
        match deployments.delete(&name, &Default::default()).await {
            Ok(_) => {}
            Err(kube::Error::Api(e)) if e.code == 404 => {}
            Err(e) => return Err(e.into()),
        }

        let services: Api<Service> = Api::namespaced(self.client.clone(), &namespace);
        match services.delete(&name, &Default::default()).await {
            Ok(_) => {}
            Err(kube::Error::Api(e)) if e.code == 404 => {}
            Err(e) => return Err(e.into()),
        }

        info!(registry = %registry.name_any(), "Registry API resources deleted");
        Ok(())
    }
}

async fn reconcile_deployment(
    api: &Api<Deployment>,
    deployment: Deployment,
) -> ControllerResult<()> {
    let name = deployment.name_any();
    match api.get_opt(&name).await? {
        Some(mut existing) => {
            debug!(deployment = %name, "Updating registry API deployment");
            existing.spec = deployment.spec;
            existing.metadata.labels = deployment.metadata.labels;
            existing.metadata.owner_references = deployment.metadata.owner_references;
            api.replace(&name, &PostParams::default(), &existing).await?;
        }
        None => {
            debug!(deployment = %name, "Creating registry API deployment");
            api.create(&PostParams::default(), &deployment).await?;
        }
    }
    Ok(())
}

async fn reconcile_service(api: &Api<Service>, service: Service) -> ControllerResult<()> {
    let name = service.name_any();
    match api.get_opt(&name).await? {
        Some(mut existing) => {
            debug!(service = %name, "Updating registry API service");
            // clusterIP is immutable; carry the live spec fields over
            if let (Some(existing_spec), Some(desired_spec)) =
                (existing.spec.as_mut(), service.spec)
            {
                existing_spec.selector = desired_spec.selector;
                existing_spec.ports = desired_spec.ports;
                existing_spec.type_ = desired_spec.type_;
            }
            existing.metadata.labels = service.metadata.labels;
            existing.metadata.owner_references = service.metadata.owner_references;
            api.replace(&name, &PostParams::default(), &existing).await?;
        }
        None => {
            debug!(service = %name, "Creating registry API service");
            api.create(&PostParams::default(), &service).await?;
        }
    }
    Ok(())
}

/// Name for the per-registry API resources
pub fn resource_name(registry: &MCPRegistry) -> String {
    format!("{}-api", registry.name_any())
}

/// Stable in-cluster endpoint URL for the registry API
pub fn api_endpoint(registry: &MCPRegistry) -> String {
    format!(
        "http://{}.{}.svc.cluster.local:{}",
        resource_name(registry),
        registry.namespace().unwrap_or_default(),
        REGISTRY_API_SERVICE_PORT
    )
}

/// Labels for the per-registry API resources
pub fn api_labels(registry: &MCPRegistry) -> BTreeMap<String, String> {
    BTreeMap::from([
        (
            "app.kubernetes.io/name".to_string(),
            "registry-api".to_string(),
        ),
        ("app.kubernetes.io/instance".to_string(), registry.name_any()),
        ("app.kubernetes.io/component".to_string(), "api".to_string()),
        ("app.kubernetes.io/part-of".to_string(), "toolhive".to_string()),
        (
            "app.kubernetes.io/managed-by".to_string(),
            "toolhive-operator".to_string(),
        ),
        (
            "toolhive.stacklok.dev/registry".to_string(),
            registry.name_any(),
        ),
    ])
}

/// Build the single-replica API deployment
pub fn build_deployment(registry: &MCPRegistry) -> Deployment {
    let labels = api_labels(registry);

    Deployment {
        metadata: ObjectMeta {
            name: Some(resource_name(registry)),
            namespace: registry.namespace(),
            labels: Some(labels.clone()),
            ..Default::default()
        },
        spec: Some(DeploymentSpec {
            replicas: Some(1),
            selector: LabelSelector {
                match_labels: Some(labels.clone()),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![Container {
                        name: "registry-api".to_string(),
                        image: Some(REGISTRY_API_IMAGE.to_string()),
                        args: Some(vec![
                            format!("--port={}", REGISTRY_API_PORT),
                            format!("--registry-name={}", registry.name_any()),
                            format!(
                                "--registry-namespace={}",
                                registry.namespace().unwrap_or_default()
                            ),
                        ]),
                        ports: Some(vec![ContainerPort {
                            name: Some("http".to_string()),
                            container_port: REGISTRY_API_PORT,
                            protocol: Some("TCP".to_string()),
                            ..Default::default()
                        }]),
                        readiness_probe: Some(Probe {
                            http_get: Some(HTTPGetAction {
                                path: Some("/readiness".to_string()),
                                port: IntOrString::Int(REGISTRY_API_PORT),
                                ..Default::default()
                            }),
                            initial_delay_seconds: Some(5),
                            period_seconds: Some(10),
                            ..Default::default()
                        }),
                        liveness_probe: Some(Probe {
                            http_get: Some(HTTPGetAction {
                                path: Some("/health".to_string()),
                                port: IntOrString::Int(REGISTRY_API_PORT),
                                ..Default::default()
                            }),
                            initial_delay_seconds: Some(15),
                            period_seconds: Some(20),
                            ..Default::default()
                        }),
                        resources: Some(ResourceRequirements {
                            requests: Some(BTreeMap::from([
                                ("cpu".to_string(), Quantity("100m".to_string())),
                                ("memory".to_string(), Quantity("128Mi".to_string())),
                            ])),
                            limits: Some(BTreeMap::from([
                                ("cpu".to_string(), Quantity("500m".to_string())),
                                ("memory".to_string(), Quantity("512Mi".to_string())),
                            ])),
                            ..Default::default()
                        }),
                        ..Default::default()
                    }],
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Build the cluster-internal API service
pub fn build_service(registry: &MCPRegistry) -> Service {
    let labels = api_labels(registry);

    Service {
        metadata: ObjectMeta {
            name: Some(resource_name(registry)),
            namespace: registry.namespace(),
            labels: Some(labels.clone()),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            selector: Some(labels),
            ports: Some(vec![ServicePort {
                name: Some("http".to_string()),
                protocol: Some("TCP".to_string()),
                port: REGISTRY_API_SERVICE_PORT,
                target_port: Some(IntOrString::Int(REGISTRY_API_PORT)),
                ..Default::default()
            }]),
            type_: Some("ClusterIP".to_string()),
            ..Default::default()
        }),
        ..Default::default()
    }
}
