//! Provisioning engine seam.
//!
//! The graph builder never talks to a cluster. A [`ProvisioningEngine`]
//! receives the sealed graph, creates nodes only after their dependencies
//! succeeded and reports the outcome of every node.

mod cluster;

pub use cluster::ClusterApplier;

use std::collections::HashSet;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, error, info};

use crate::errors::FleetResult;
use crate::graph::{DependencyGraph, ResourceNode};

/// What happened to a node during convergence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case", tag = "status")]
pub enum NodeStatus {
    Applied,
    Failed { cause: String },
    /// Not attempted because `by` failed or was itself blocked.
    Blocked { by: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeOutcome {
    pub node_id: String,
    #[serde(flatten)]
    pub status: NodeStatus,
}

/// Per-node results, in the order the engine visited the nodes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConvergenceReport {
    pub outcomes: Vec<NodeOutcome>,
}

impl ConvergenceReport {
    #[must_use]
    pub fn is_converged(&self) -> bool {
        self.outcomes
            .iter()
            .all(|o| o.status == NodeStatus::Applied)
    }

    /// Nodes that failed on their own, with the engine's cause.
    pub fn failures(&self) -> impl Iterator<Item = (&str, &str)> {
        self.outcomes.iter().filter_map(|o| match &o.status {
            NodeStatus::Failed { cause } => Some((o.node_id.as_str(), cause.as_str())),
            NodeStatus::Applied | NodeStatus::Blocked { .. } => None,
        })
    }

    #[must_use]
    pub fn blocked(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.status, NodeStatus::Blocked { .. }))
            .count()
    }
}

/// Converges a dependency graph onto a cluster.
#[async_trait]
pub trait ProvisioningEngine: Send + Sync {
    /// Apply every node. Node failures go into the report; `Err` is reserved
    /// for failures of the engine itself.
    async fn converge(&self, graph: &DependencyGraph) -> FleetResult<ConvergenceReport>;
}

/// Applies a single node. Must be idempotent.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NodeApplier: Send + Sync {
    async fn apply(&self, node: &ResourceNode) -> Result<(), String>;
}

/// Walks the graph in dependency order and applies nodes one at a time.
#[derive(Debug)]
pub struct OrderedEngine<A> {
    applier: A,
}

impl<A: NodeApplier> OrderedEngine<A> {
    pub const fn new(applier: A) -> Self {
        Self { applier }
    }
}

#[async_trait]
impl<A: NodeApplier> ProvisioningEngine for OrderedEngine<A> {
    async fn converge(&self, graph: &DependencyGraph) -> FleetResult<ConvergenceReport> {
        let mut unavailable: HashSet<&str> = HashSet::new();
        let mut report = ConvergenceReport::default();

        for node in graph.topological_order() {
            let id = node.identity.as_str();

            if let Some(dep) = node
                .depends_on
                .iter()
                .find(|d| unavailable.contains(d.as_str()))
            {
                debug!(node = id, blocked_by = %dep, "Skipping node with unavailable dependency");
                unavailable.insert(id);
                report.outcomes.push(NodeOutcome {
                    node_id: id.to_string(),
                    status: NodeStatus::Blocked { by: dep.clone() },
                });
                continue;
            }

            info!(node = id, kind = %node.kind, "Applying node");
            let status = match self.applier.apply(node).await {
                Ok(()) => NodeStatus::Applied,
                Err(cause) => {
                    error!(node = id, %cause, "Node failed to apply");
                    unavailable.insert(id);
                    NodeStatus::Failed { cause }
                }
            };
            report.outcomes.push(NodeOutcome {
                node_id: id.to_string(),
                status,
            });
        }

        Ok(report)
    }
}
