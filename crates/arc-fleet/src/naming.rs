//! Resource naming.
//!
//! Scale-set names are derived from the repository name alone, so two
//! repositories whose names differ only by case (or by characters Kubernetes
//! does not allow) map to the same resource. The graph builder rejects those
//! collisions instead of letting the second one win.

/// Prefix shared by every per-repository scale-set resource.
pub const SCALE_SET_PREFIX: &str = "arc-runner-set";

/// Suffix of the autoscaler attached to an elastic scale-set.
const AUTOSCALER_SUFFIX: &str = "autoscaler";

/// Derive the scale-set resource name for `owner/name`.
///
/// The segment after the `/` is lowercased and every character outside
/// `[a-z0-9-]` becomes `-`.
#[must_use]
pub fn derive_resource_name(repository_id: &str) -> String {
    let name = repository_id
        .split_once('/')
        .map_or(repository_id, |(_, name)| name);
    format!("{SCALE_SET_PREFIX}-{}", canonicalize(name))
}

/// Kubernetes name of the autoscaler for a scale-set.
#[must_use]
pub fn autoscaler_name(scale_set_name: &str) -> String {
    format!("{scale_set_name}-{AUTOSCALER_SUFFIX}")
}

/// Graph identity of the autoscaler for a scale-set. Derived names never
/// contain `/`, so this cannot clash with another repository's scale-set.
#[must_use]
pub fn autoscaler_identity(scale_set_name: &str) -> String {
    format!("{AUTOSCALER_SUFFIX}/{scale_set_name}")
}

fn canonicalize(segment: &str) -> String {
    let mapped: String = segment
        .chars()
        .flat_map(char::to_lowercase)
        .map(|c| if c.is_ascii_lowercase() || c.is_ascii_digit() { c } else { '-' })
        .collect();
    mapped.trim_matches('-').to_string()
}

/// Node identities for the fixed part of the topology.
pub mod ids {
    pub const CERT_MANAGER_NAMESPACE: &str = "namespace-cert-manager";
    pub const CONTROLLER_NAMESPACE: &str = "namespace-controller";
    pub const RUNNER_NAMESPACE: &str = "namespace-runners";
    pub const CERT_MANAGER_RELEASE: &str = "release-cert-manager";
    pub const CONTROLLER_RELEASE: &str = "release-controller";
    pub const CONTROLLER_CLUSTER_BINDING: &str = "controller-cluster-binding";
    pub const RUNNER_MANAGER_ROLE: &str = "runner-manager-role";
    pub const RUNNER_MANAGER_BINDING: &str = "runner-manager-binding";
}
