//! Dependency graph construction.
//!
//! The fixed part of the topology (namespaces, cert-manager, the controller
//! and its access objects) is built once; every repository then contributes an
//! independent subgraph that is folded in by identity. The controller variant
//! only changes a handful of node specs and one edge.

use std::collections::BTreeMap;

use serde_json::json;
use tracing::{debug, info, warn};

use crate::config::{ControllerVariant, FleetConfig};
use crate::crds::ScaleTargetRef;
use crate::errors::{FleetError, FleetResult};
use crate::graph::{
    ChartReleaseSpec, CredentialKey, DependencyGraph, GraphExports, NamespaceExports,
    RepositoryExport, ResourceKind, ResourceNode, ResourceSpec, Subgraph,
};
use crate::manifests;
use crate::naming::{self, ids};
use crate::repositories::RepositoryDescriptor;
use crate::scaling::{ScalingPolicy, ScalingResolver};

/// Builds the cluster resource graph for a fleet.
#[derive(Debug, Clone)]
pub struct TopologyBuilder<'a> {
    config: &'a FleetConfig,
}

impl<'a> TopologyBuilder<'a> {
    #[must_use]
    pub const fn new(config: &'a FleetConfig) -> Self {
        Self { config }
    }

    /// Resolve scaling policies with the configured autoscaler settings and build.
    ///
    /// # Errors
    ///
    /// See [`TopologyBuilder::build`].
    pub fn plan(&self, descriptors: &[RepositoryDescriptor]) -> FleetResult<DependencyGraph> {
        let resolver = ScalingResolver::new(
            self.config.autoscaler.clone(),
            self.config.controller.variant,
        );
        self.build(descriptors, &resolver.resolve_all(descriptors))
    }

    /// Build the graph. `policies[i]` belongs to `descriptors[i]`.
    ///
    /// Repository subgraphs are ordered by derived name, so the output does
    /// not depend on input order.
    ///
    /// # Errors
    ///
    /// - [`FleetError::Settings`] if the settings fail validation, or a metric
    ///   policy is paired with the scale-set controller
    /// - [`FleetError::PolicyMismatch`] if the slices differ in length
    /// - [`FleetError::DuplicateResourceName`] if two repositories derive the same name
    /// - [`FleetError::DanglingDependency`] if a node references a skipped subsystem
    /// - [`FleetError::CyclicDependency`] if the edges form a cycle
    pub fn build(
        &self,
        descriptors: &[RepositoryDescriptor],
        policies: &[ScalingPolicy],
    ) -> FleetResult<DependencyGraph> {
        self.config.validate()?;

        if descriptors.len() != policies.len() {
            return Err(FleetError::PolicyMismatch {
                descriptors: descriptors.len(),
                policies: policies.len(),
            });
        }

        if self.config.controller.variant == ControllerVariant::ScaleSet
            && self.config.access.include_autoscaling_listeners.is_none()
        {
            warn!(
                "access.include_autoscaling_listeners is not set; granting the controller \
                 'autoscalinglisteners' in the runner namespace. Set it explicitly to silence this."
            );
        }

        let root = self.root_topology()?;

        let mut repositories = descriptors
            .iter()
            .zip(policies)
            .map(|(descriptor, policy)| {
                let name = naming::derive_resource_name(&descriptor.repository_id);
                let subgraph = self.repository_subgraph(&name, descriptor, policy)?;
                Ok((name, subgraph))
            })
            .collect::<FleetResult<Vec<_>>>()?;
        repositories.sort_by(|a, b| a.0.cmp(&b.0));

        let merged = repositories
            .into_iter()
            .map(|(_, subgraph)| subgraph)
            .try_fold(root, Subgraph::merge)?;

        let graph = DependencyGraph::seal(merged, self.exports(descriptors))?;
        info!(
            nodes = graph.len(),
            repositories = descriptors.len(),
            variant = %self.config.controller.variant,
            "Built resource graph"
        );
        Ok(graph)
    }

    fn exports(&self, descriptors: &[RepositoryDescriptor]) -> GraphExports {
        let ns = &self.config.namespaces;
        GraphExports {
            namespaces: NamespaceExports {
                cert_manager: ns.cert_manager.clone(),
                controller: ns.controller.clone(),
                runners: ns.runners.clone(),
            },
            repositories: descriptors
                .iter()
                .map(|d| RepositoryExport {
                    repository_id: d.repository_id.clone(),
                    release_name: d.release_name.clone(),
                })
                .collect(),
        }
    }

    fn namespace_node(identity: &str, name: &str) -> FleetResult<ResourceNode> {
        Ok(ResourceNode::new(
            ResourceKind::Namespace,
            identity,
            None,
            ResourceSpec::Manifest(manifests::to_manifest(identity, &manifests::namespace(name))?),
        ))
    }

    fn root_topology(&self) -> FleetResult<Subgraph> {
        let ns = &self.config.namespaces;
        let controller = &self.config.controller;
        let service_account = controller.service_account();
        let mut graph = Subgraph::new();

        if self.config.cert_manager.enabled {
            graph.insert(Self::namespace_node(ids::CERT_MANAGER_NAMESPACE, &ns.cert_manager)?)?;
        }
        graph.insert(Self::namespace_node(ids::CONTROLLER_NAMESPACE, &ns.controller)?)?;
        graph.insert(Self::namespace_node(ids::RUNNER_NAMESPACE, &ns.runners)?)?;

        if self.config.cert_manager.enabled {
            let cert_manager = &self.config.cert_manager;
            graph.insert(
                ResourceNode::new(
                    ResourceKind::ChartRelease,
                    ids::CERT_MANAGER_RELEASE,
                    Some(ns.cert_manager.clone()),
                    ResourceSpec::Chart(ChartReleaseSpec {
                        release: cert_manager.release.clone(),
                        namespace: ns.cert_manager.clone(),
                        chart: cert_manager.chart.clone(),
                        values: json!({ "installCRDs": true }),
                        credential_values: BTreeMap::new(),
                    }),
                )
                .depends_on([ids::CERT_MANAGER_NAMESPACE]),
            )?;
        }

        let mut controller_values = json!({
            "serviceAccount": { "create": true, "name": service_account },
        });
        let mut credential_values = BTreeMap::new();
        if controller.variant == ControllerVariant::Legacy {
            controller_values["authSecret"] = json!({
                "create": true,
                "name": self.config.runners.auth_secret_name,
            });
            credential_values.insert("authSecret.github_token".to_string(), CredentialKey::GithubToken);
        }

        let mut controller_deps = vec![ids::CONTROLLER_NAMESPACE];
        if controller.variant.requires_cert_manager() {
            controller_deps.push(ids::CERT_MANAGER_RELEASE);
        }
        graph.insert(
            ResourceNode::new(
                ResourceKind::ChartRelease,
                ids::CONTROLLER_RELEASE,
                Some(ns.controller.clone()),
                ResourceSpec::Chart(ChartReleaseSpec {
                    release: controller.release.clone(),
                    namespace: ns.controller.clone(),
                    chart: controller.chart(),
                    values: controller_values,
                    credential_values,
                }),
            )
            .depends_on(controller_deps),
        )?;

        let subject = manifests::service_account_subject(&service_account, &ns.controller);

        let cluster_binding = manifests::cluster_role_binding(
            &format!("{}-controller", controller.release),
            &self.config.access.cluster_role,
            subject.clone(),
        );
        graph.insert(
            ResourceNode::new(
                ResourceKind::ClusterRoleBinding,
                ids::CONTROLLER_CLUSTER_BINDING,
                None,
                ResourceSpec::Manifest(manifests::to_manifest(
                    ids::CONTROLLER_CLUSTER_BINDING,
                    &cluster_binding,
                )?),
            )
            .depends_on([ids::CONTROLLER_RELEASE]),
        )?;

        let role_name = format!("{}-runner-manager", controller.release);
        let role = manifests::role(
            &role_name,
            &ns.runners,
            manifests::runner_manager_rules(controller.variant, self.config.access.include_listeners()),
        );
        graph.insert(
            ResourceNode::new(
                ResourceKind::Role,
                ids::RUNNER_MANAGER_ROLE,
                Some(ns.runners.clone()),
                ResourceSpec::Manifest(manifests::to_manifest(ids::RUNNER_MANAGER_ROLE, &role)?),
            )
            .depends_on([ids::RUNNER_NAMESPACE, ids::CONTROLLER_RELEASE]),
        )?;

        let binding = manifests::role_binding(&role_name, &ns.runners, &role_name, subject);
        graph.insert(
            ResourceNode::new(
                ResourceKind::RoleBinding,
                ids::RUNNER_MANAGER_BINDING,
                Some(ns.runners.clone()),
                ResourceSpec::Manifest(manifests::to_manifest(ids::RUNNER_MANAGER_BINDING, &binding)?),
            )
            .depends_on([
                ids::RUNNER_NAMESPACE,
                ids::CONTROLLER_RELEASE,
                ids::RUNNER_MANAGER_ROLE,
            ]),
        )?;

        Ok(graph)
    }

    fn repository_subgraph(
        &self,
        name: &str,
        descriptor: &RepositoryDescriptor,
        policy: &ScalingPolicy,
    ) -> FleetResult<Subgraph> {
        let runners_ns = &self.config.namespaces.runners;
        let controller = &self.config.controller;
        let mut subgraph = Subgraph::new();

        let scale_set = match controller.variant {
            ControllerVariant::ScaleSet => {
                if policy.metric().is_some() {
                    return Err(FleetError::Settings {
                        reason: format!(
                            "'{}' has a metric autoscaler, which the scale-set controller \
                             does not reconcile",
                            descriptor.repository_id
                        ),
                    });
                }
                let values = json!({
                    "githubConfigUrl": format!(
                        "{}/{}",
                        self.config.runners.github_url.trim_end_matches('/'),
                        descriptor.repository_id
                    ),
                    "runnerScaleSetName": descriptor.release_name,
                    "minRunners": policy.min,
                    "maxRunners": policy.max,
                    "controllerServiceAccount": {
                        "namespace": self.config.namespaces.controller,
                        "name": controller.service_account(),
                    },
                });
                let node = ResourceNode::new(
                    ResourceKind::ChartRelease,
                    name,
                    Some(runners_ns.clone()),
                    ResourceSpec::Chart(ChartReleaseSpec {
                        release: descriptor.release_name.clone(),
                        namespace: runners_ns.clone(),
                        chart: controller.runner_chart(),
                        values,
                        credential_values: [(
                            "githubConfigSecret.github_token".to_string(),
                            CredentialKey::GithubToken,
                        )]
                        .into_iter()
                        .collect(),
                    }),
                );
                node
            }
            ControllerVariant::Legacy => {
                let mut labels = self.config.runners.labels.clone();
                labels.push(descriptor.release_name.clone());
                let deployment = manifests::runner_deployment(
                    name,
                    runners_ns,
                    &descriptor.repository_id,
                    policy.min,
                    &labels,
                );
                ResourceNode::new(
                    ResourceKind::CustomResource,
                    name,
                    Some(runners_ns.clone()),
                    ResourceSpec::Manifest(manifests::to_manifest(name, &deployment)?),
                )
            }
        };

        subgraph.insert(scale_set.depends_on([
            ids::RUNNER_NAMESPACE,
            ids::CONTROLLER_RELEASE,
            ids::RUNNER_MANAGER_BINDING,
        ]))?;

        if let Some(metric) = policy.metric() {
            let autoscaler_id = naming::autoscaler_identity(name);
            let target = ScaleTargetRef {
                kind: Some("RunnerDeployment".to_string()),
                name: name.to_string(),
            };
            let hra = manifests::autoscaler(
                &naming::autoscaler_name(name),
                runners_ns,
                target,
                policy.min,
                policy.max,
                metric,
            );
            subgraph.insert(
                ResourceNode::new(
                    ResourceKind::CustomResource,
                    autoscaler_id.as_str(),
                    Some(runners_ns.clone()),
                    ResourceSpec::Manifest(manifests::to_manifest(&autoscaler_id, &hra)?),
                )
                .depends_on([name]),
            )?;
        }

        debug!(
            repository = %descriptor.repository_id,
            resource = name,
            min = policy.min,
            max = policy.max,
            nodes = subgraph.len(),
            "Built repository subgraph"
        );
        Ok(subgraph)
    }
}
