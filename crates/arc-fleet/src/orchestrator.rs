//! Submission façade: hands the sealed graph to an engine and publishes
//! the outputs downstream automation consumes.

use std::collections::BTreeMap;

use serde_json::{json, Value};
use tracing::{error, info, warn};

use crate::engine::{ConvergenceReport, ProvisioningEngine};
use crate::errors::{FleetError, FleetResult};
use crate::graph::DependencyGraph;

pub const OUTPUT_CERT_MANAGER_NAMESPACE: &str = "certManagerNamespace";
pub const OUTPUT_CONTROLLER_NAMESPACE: &str = "controllerNamespace";
pub const OUTPUT_RUNNER_NAMESPACE: &str = "runnerNamespace";
pub const OUTPUT_REPOSITORIES: &str = "repositories";

/// Published outputs, keyed by output name.
pub type Outputs = BTreeMap<String, Value>;

/// The outputs a graph publishes once converged. Needs no cluster.
#[must_use]
pub fn outputs(graph: &DependencyGraph) -> Outputs {
    let exports = graph.exports();
    let repositories: Vec<Value> = exports
        .repositories
        .iter()
        .map(|r| json!({"repositoryId": r.repository_id, "releaseName": r.release_name}))
        .collect();

    BTreeMap::from([
        (
            OUTPUT_CERT_MANAGER_NAMESPACE.to_string(),
            Value::String(exports.namespaces.cert_manager.clone()),
        ),
        (
            OUTPUT_CONTROLLER_NAMESPACE.to_string(),
            Value::String(exports.namespaces.controller.clone()),
        ),
        (
            OUTPUT_RUNNER_NAMESPACE.to_string(),
            Value::String(exports.namespaces.runners.clone()),
        ),
        (OUTPUT_REPOSITORIES.to_string(), Value::Array(repositories)),
    ])
}

pub struct Orchestrator<E> {
    engine: E,
}

impl<E: ProvisioningEngine> Orchestrator<E> {
    pub const fn new(engine: E) -> Self {
        Self { engine }
    }

    /// Converge `graph` and return its outputs.
    ///
    /// Nothing is retried here. Every failed node is logged; the first one in
    /// apply order is returned.
    ///
    /// # Errors
    ///
    /// - [`FleetError::ConvergenceFailure`] if any node failed
    /// - [`FleetError::Engine`] if the engine itself could not run
    pub async fn submit(&self, graph: &DependencyGraph) -> FleetResult<Outputs> {
        let report = self.converge(graph).await?;
        conclude(graph, &report)
    }

    /// Run the engine and hand back the raw per-node report.
    ///
    /// # Errors
    ///
    /// [`FleetError::Engine`] if the engine itself could not run.
    pub async fn converge(&self, graph: &DependencyGraph) -> FleetResult<ConvergenceReport> {
        info!(nodes = graph.len(), "Submitting resource graph");
        self.engine.converge(graph).await
    }
}

/// Turn a convergence report into outputs, or the first node failure.
///
/// # Errors
///
/// [`FleetError::ConvergenceFailure`] for the first failed node in `report`.
pub fn conclude(graph: &DependencyGraph, report: &ConvergenceReport) -> FleetResult<Outputs> {
    let mut first_failure = None;
    for (node_id, cause) in report.failures() {
        error!(node = node_id, %cause, "Convergence failed");
        first_failure.get_or_insert((node_id, cause));
    }

    if let Some((node_id, cause)) = first_failure {
        let blocked = report.blocked();
        if blocked > 0 {
            warn!(blocked, "Nodes skipped because a dependency failed");
        }
        return Err(FleetError::ConvergenceFailure {
            node_id: node_id.to_string(),
            cause: cause.to_string(),
        });
    }

    info!(nodes = report.outcomes.len(), "Resource graph converged");
    Ok(outputs(graph))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FleetConfig;
    use crate::engine::{NodeOutcome, NodeStatus};
    use crate::repositories::RepositoryDescriptor;
    use crate::topology::TopologyBuilder;
    use async_trait::async_trait;

    struct ScriptedEngine {
        failing: Vec<&'static str>,
    }

    #[async_trait]
    impl ProvisioningEngine for ScriptedEngine {
        async fn converge(&self, graph: &DependencyGraph) -> FleetResult<ConvergenceReport> {
            let outcomes = graph
                .topological_order()
                .into_iter()
                .map(|node| NodeOutcome {
                    node_id: node.identity.clone(),
                    status: if self.failing.contains(&node.identity.as_str()) {
                        NodeStatus::Failed {
                            cause: format!("{} rejected", node.identity),
                        }
                    } else {
                        NodeStatus::Applied
                    },
                })
                .collect();
            Ok(ConvergenceReport { outcomes })
        }
    }

    struct BrokenEngine;

    #[async_trait]
    impl ProvisioningEngine for BrokenEngine {
        async fn converge(&self, _graph: &DependencyGraph) -> FleetResult<ConvergenceReport> {
            Err(FleetError::Engine {
                reason: "cluster unreachable".into(),
            })
        }
    }

    fn graph() -> DependencyGraph {
        TopologyBuilder::new(&FleetConfig::default())
            .plan(&[
                RepositoryDescriptor::new("Acme/Widgets", "r1", 1, 3),
                RepositoryDescriptor::new("acme/gadgets", "r2", 2, 2),
            ])
            .unwrap()
    }

    #[test]
    fn test_outputs_without_submission() {
        let outputs = outputs(&graph());
        assert_eq!(outputs[OUTPUT_CERT_MANAGER_NAMESPACE], "cert-manager");
        assert_eq!(outputs[OUTPUT_CONTROLLER_NAMESPACE], "arc-systems");
        assert_eq!(outputs[OUTPUT_RUNNER_NAMESPACE], "arc-runners");
        assert_eq!(
            outputs[OUTPUT_REPOSITORIES],
            json!([
                {"repositoryId": "Acme/Widgets", "releaseName": "r1"},
                {"repositoryId": "acme/gadgets", "releaseName": "r2"},
            ])
        );
    }

    #[tokio::test]
    async fn test_submit_returns_outputs_on_success() {
        let graph = graph();
        let orchestrator = Orchestrator::new(ScriptedEngine { failing: vec![] });
        assert_eq!(orchestrator.submit(&graph).await.unwrap(), outputs(&graph));
    }

    #[tokio::test]
    async fn test_submit_reports_first_failure_in_apply_order() {
        let orchestrator = Orchestrator::new(ScriptedEngine {
            failing: vec!["arc-runner-set-widgets", "namespace-runners"],
        });
        match orchestrator.submit(&graph()).await {
            Err(FleetError::ConvergenceFailure { node_id, cause }) => {
                assert_eq!(node_id, "namespace-runners");
                assert_eq!(cause, "namespace-runners rejected");
            }
            other => panic!("expected ConvergenceFailure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_engine_error_passes_through() {
        let result = Orchestrator::new(BrokenEngine).submit(&graph()).await;
        assert!(matches!(result, Err(FleetError::Engine { .. })));
    }
}
