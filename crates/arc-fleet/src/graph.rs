//! Resource dependency graph.
//!
//! Nodes are collected into [`Subgraph`] values that are merged by identity,
//! then sealed into a [`DependencyGraph`] that guarantees every edge resolves
//! and no node transitively depends on itself.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use serde::Serialize;

use crate::config::ChartRef;
use crate::errors::{FleetError, FleetResult};

/// Kind of cluster object a node declares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ResourceKind {
    Namespace,
    ChartRelease,
    Role,
    RoleBinding,
    ClusterRoleBinding,
    CustomResource,
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Namespace => write!(f, "Namespace"),
            Self::ChartRelease => write!(f, "ChartRelease"),
            Self::Role => write!(f, "Role"),
            Self::RoleBinding => write!(f, "RoleBinding"),
            Self::ClusterRoleBinding => write!(f, "ClusterRoleBinding"),
            Self::CustomResource => write!(f, "CustomResource"),
        }
    }
}

/// A secret the engine injects at apply time. Only the key travels with the
/// graph, never the value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialKey {
    GithubToken,
}

/// A Helm release to install or upgrade.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartReleaseSpec {
    pub release: String,
    pub namespace: String,
    pub chart: ChartRef,
    pub values: serde_json::Value,
    /// Dotted values paths filled from credentials, e.g. `githubConfigSecret.github_token`.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub credential_values: BTreeMap<String, CredentialKey>,
}

/// What the engine should apply for a node.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ResourceSpec {
    /// A complete Kubernetes object, applied as-is.
    Manifest(serde_json::Value),
    /// A chart release.
    Chart(ChartReleaseSpec),
}

/// A declared cluster object and the nodes that must exist before it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceNode {
    pub kind: ResourceKind,
    pub identity: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    pub spec: ResourceSpec,
    pub depends_on: BTreeSet<String>,
}

impl ResourceNode {
    pub fn new(
        kind: ResourceKind,
        identity: impl Into<String>,
        namespace: Option<String>,
        spec: ResourceSpec,
    ) -> Self {
        Self {
            kind,
            identity: identity.into(),
            namespace,
            spec,
            depends_on: BTreeSet::new(),
        }
    }

    /// Add "must exist before" edges.
    #[must_use]
    pub fn depends_on<I, S>(mut self, dependencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends_on
            .extend(dependencies.into_iter().map(Into::into));
        self
    }
}

/// An unsealed, ordered collection of nodes with unique identities.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Subgraph {
    nodes: Vec<ResourceNode>,
}

impl Subgraph {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a node.
    ///
    /// # Errors
    ///
    /// Returns [`FleetError::DuplicateResourceName`] if the identity is taken.
    pub fn insert(&mut self, node: ResourceNode) -> FleetResult<()> {
        if self.contains(&node.identity) {
            return Err(FleetError::DuplicateResourceName {
                name: node.identity,
            });
        }
        self.nodes.push(node);
        Ok(())
    }

    #[must_use]
    pub fn contains(&self, identity: &str) -> bool {
        self.nodes.iter().any(|n| n.identity == identity)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Merge `other` after `self`. Neither side is modified on collision.
    ///
    /// # Errors
    ///
    /// Returns [`FleetError::DuplicateResourceName`] for the first identity
    /// present in both subgraphs.
    pub fn merge(self, other: Self) -> FleetResult<Self> {
        if other.is_empty() {
            return Ok(self);
        }
        if self.is_empty() {
            return Ok(other);
        }

        let existing: HashSet<&str> = self.nodes.iter().map(|n| n.identity.as_str()).collect();
        if let Some(clash) = other
            .nodes
            .iter()
            .find(|n| existing.contains(n.identity.as_str()))
        {
            return Err(FleetError::DuplicateResourceName {
                name: clash.identity.clone(),
            });
        }

        let mut nodes = self.nodes;
        nodes.extend(other.nodes);
        Ok(Self { nodes })
    }
}

impl FromIterator<ResourceNode> for Subgraph {
    /// Collects without collision checks; use [`Subgraph::insert`] for that.
    fn from_iter<T: IntoIterator<Item = ResourceNode>>(iter: T) -> Self {
        Self {
            nodes: iter.into_iter().collect(),
        }
    }
}

/// A namespace published for downstream automation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NamespaceExports {
    pub cert_manager: String,
    pub controller: String,
    pub runners: String,
}

/// The `(repositoryId, releaseName)` pair published per repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryExport {
    pub repository_id: String,
    pub release_name: String,
}

/// Stable values surfaced after submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphExports {
    pub namespaces: NamespaceExports,
    pub repositories: Vec<RepositoryExport>,
}

/// A validated, acyclic graph with no dangling edges.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DependencyGraph {
    nodes: Vec<ResourceNode>,
    #[serde(skip)]
    index: HashMap<String, usize>,
    exports: GraphExports,
}

impl DependencyGraph {
    /// Seal a subgraph.
    ///
    /// # Errors
    ///
    /// - [`FleetError::DanglingDependency`] for the first edge whose target is missing
    /// - [`FleetError::CyclicDependency`] if any cycle exists
    pub fn seal(subgraph: Subgraph, exports: GraphExports) -> FleetResult<Self> {
        let nodes = subgraph.nodes;
        let index: HashMap<String, usize> = nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (n.identity.clone(), i))
            .collect();

        for node in &nodes {
            if let Some(missing) = node.depends_on.iter().find(|d| !index.contains_key(*d)) {
                return Err(FleetError::DanglingDependency {
                    node_id: node.identity.clone(),
                    missing_dependency_id: missing.clone(),
                });
            }
        }

        if let Some(cycle) = find_cycle(&nodes, &index) {
            return Err(FleetError::CyclicDependency { cycle });
        }

        Ok(Self {
            nodes,
            index,
            exports,
        })
    }

    #[must_use]
    pub fn get(&self, identity: &str) -> Option<&ResourceNode> {
        self.index.get(identity).map(|&i| &self.nodes[i])
    }

    #[must_use]
    pub fn contains(&self, identity: &str) -> bool {
        self.index.contains_key(identity)
    }

    /// Nodes in insertion order.
    pub fn nodes(&self) -> impl Iterator<Item = &ResourceNode> {
        self.nodes.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    #[must_use]
    pub fn exports(&self) -> &GraphExports {
        &self.exports
    }

    /// Nodes that list `identity` as a dependency.
    #[must_use]
    pub fn dependents(&self, identity: &str) -> Vec<&ResourceNode> {
        self.nodes
            .iter()
            .filter(|n| n.depends_on.contains(identity))
            .collect()
    }

    /// Nodes ordered so every node follows all of its dependencies. Ties keep
    /// insertion order, so the result is stable across calls.
    #[must_use]
    pub fn topological_order(&self) -> Vec<&ResourceNode> {
        let mut remaining: Vec<usize> = self.nodes.iter().map(|n| n.depends_on.len()).collect();
        let mut placed = vec![false; self.nodes.len()];
        let mut order = Vec::with_capacity(self.nodes.len());

        while order.len() < self.nodes.len() {
            // Sealed graphs are acyclic, so some node is always ready.
            let Some(next) = (0..self.nodes.len()).find(|&i| !placed[i] && remaining[i] == 0)
            else {
                break;
            };
            placed[next] = true;
            let identity = &self.nodes[next].identity;
            for (i, node) in self.nodes.iter().enumerate() {
                if node.depends_on.contains(identity) {
                    remaining[i] -= 1;
                }
            }
            order.push(&self.nodes[next]);
        }

        order
    }
}

fn find_cycle(nodes: &[ResourceNode], index: &HashMap<String, usize>) -> Option<Vec<String>> {
    let mut visited = HashSet::new();
    let mut rec_stack = HashSet::new();
    let mut path = Vec::new();

    for start in 0..nodes.len() {
        if !visited.contains(&start) {
            if let Some(cycle) =
                dfs_cycle(nodes, index, start, &mut visited, &mut rec_stack, &mut path)
            {
                return Some(cycle);
            }
        }
    }
    None
}

fn dfs_cycle(
    nodes: &[ResourceNode],
    index: &HashMap<String, usize>,
    node: usize,
    visited: &mut HashSet<usize>,
    rec_stack: &mut HashSet<usize>,
    path: &mut Vec<usize>,
) -> Option<Vec<String>> {
    visited.insert(node);
    rec_stack.insert(node);
    path.push(node);

    for dep in &nodes[node].depends_on {
        let Some(&dep) = index.get(dep) else {
            continue;
        };
        if rec_stack.contains(&dep) {
            let start = path.iter().position(|&n| n == dep).unwrap_or(0);
            let mut cycle: Vec<String> = path[start..]
                .iter()
                .map(|&n| nodes[n].identity.clone())
                .collect();
            cycle.push(nodes[dep].identity.clone());
            return Some(cycle);
        }
        if !visited.contains(&dep) {
            if let Some(cycle) = dfs_cycle(nodes, index, dep, visited, rec_stack, path) {
                return Some(cycle);
            }
        }
    }

    path.pop();
    rec_stack.remove(&node);
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn node(id: &str, deps: &[&str]) -> ResourceNode {
        ResourceNode::new(
            ResourceKind::Namespace,
            id,
            None,
            ResourceSpec::Manifest(json!({ "metadata": { "name": id } })),
        )
        .depends_on(deps.iter().copied())
    }

    fn exports() -> GraphExports {
        GraphExports {
            namespaces: NamespaceExports {
                cert_manager: "cm".into(),
                controller: "ctl".into(),
                runners: "run".into(),
            },
            repositories: vec![],
        }
    }

    #[test]
    fn test_insert_rejects_duplicates() {
        let mut graph = Subgraph::new();
        graph.insert(node("a", &[])).unwrap();
        let result = graph.insert(node("a", &[]));
        assert_eq!(
            result,
            Err(FleetError::DuplicateResourceName { name: "a".into() })
        );
        assert_eq!(graph.len(), 1);
    }

    #[test]
    fn test_merge_detects_collisions() {
        let left: Subgraph = [node("a", &[]), node("b", &[])].into_iter().collect();
        let right: Subgraph = [node("c", &[]), node("b", &[])].into_iter().collect();
        assert_eq!(
            left.merge(right),
            Err(FleetError::DuplicateResourceName { name: "b".into() })
        );
    }

    #[test]
    fn test_merge_preserves_order() {
        let left: Subgraph = [node("b", &[])].into_iter().collect();
        let right: Subgraph = [node("a", &[])].into_iter().collect();
        let merged = left.merge(right).unwrap();
        let graph = DependencyGraph::seal(merged, exports()).unwrap();
        let ids: Vec<_> = graph.nodes().map(|n| n.identity.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);
    }

    #[test]
    fn test_merge_with_empty_subgraph() {
        let empty = Subgraph::new();
        assert!(empty.is_empty());

        let left: Subgraph = [node("a", &[]), node("b", &["a"])].into_iter().collect();
        let merged = left.merge(Subgraph::new()).unwrap();
        assert_eq!(merged.len(), 2);

        let merged = Subgraph::new().merge(merged).unwrap();
        assert!(!merged.is_empty());
        assert!(merged.contains("a") && merged.contains("b"));
    }

    #[test]
    fn test_seal_rejects_dangling_edges() {
        let subgraph: Subgraph = [node("a", &[]), node("b", &["a", "ghost"])]
            .into_iter()
            .collect();
        assert_eq!(
            DependencyGraph::seal(subgraph, exports()),
            Err(FleetError::DanglingDependency {
                node_id: "b".into(),
                missing_dependency_id: "ghost".into(),
            })
        );
    }

    #[test]
    fn test_seal_rejects_cycles() {
        let subgraph: Subgraph = [node("a", &["c"]), node("b", &["a"]), node("c", &["b"])]
            .into_iter()
            .collect();
        match DependencyGraph::seal(subgraph, exports()) {
            Err(FleetError::CyclicDependency { cycle }) => {
                assert_eq!(cycle.first(), cycle.last());
                assert_eq!(cycle.len(), 4);
            }
            other => panic!("expected cycle, got {other:?}"),
        }
    }

    #[test]
    fn test_self_dependency_is_a_cycle() {
        let subgraph: Subgraph = [node("a", &["a"])].into_iter().collect();
        assert!(matches!(
            DependencyGraph::seal(subgraph, exports()),
            Err(FleetError::CyclicDependency { .. })
        ));
    }

    #[test]
    fn test_topological_order() {
        let subgraph: Subgraph = [
            node("app", &["binding", "ns"]),
            node("binding", &["ns"]),
            node("ns", &[]),
            node("other", &[]),
        ]
        .into_iter()
        .collect();
        let graph = DependencyGraph::seal(subgraph, exports()).unwrap();

        let order: Vec<_> = graph
            .topological_order()
            .into_iter()
            .map(|n| n.identity.as_str())
            .collect();
        assert_eq!(order, vec!["ns", "binding", "app", "other"]);
    }

    #[test]
    fn test_dependents() {
        let subgraph: Subgraph = [node("ns", &[]), node("a", &["ns"]), node("b", &["ns"])]
            .into_iter()
            .collect();
        let graph = DependencyGraph::seal(subgraph, exports()).unwrap();
        assert_eq!(graph.dependents("ns").len(), 2);
        assert!(graph.dependents("a").is_empty());
        assert!(graph.get("a").is_some());
        assert!(!graph.contains("z"));
    }
}
