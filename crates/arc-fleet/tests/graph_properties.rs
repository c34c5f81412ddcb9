//! End-to-end properties of the load → resolve → build pipeline.

use std::collections::HashSet;

use arc_fleet::config::AutoscalerMode;
use arc_fleet::crds::HorizontalRunnerAutoscaler;
use arc_fleet::graph::ResourceSpec;
use arc_fleet::naming::{self, ids};
use arc_fleet::repositories::{self, RepositorySource};
use arc_fleet::{
    derive_resource_name, outputs, ControllerVariant, DependencyGraph, FleetConfig, FleetError,
    RepositoryDescriptor, ScalingResolver, TopologyBuilder,
};
use tempfile::TempDir;

const FLEET: &str = r#"
- releaseName: widgets
  repositoryId: Acme/Widgets
- releaseName: gadgets
  repositoryId: acme/gadgets
  minRunners: 2
  maxRunners: 2
- releaseName: docs
  repositoryId: acme/docs.site
  minRunners: 0
  maxRunners: 10
"#;

fn plan(config: &FleetConfig, content: &str) -> DependencyGraph {
    let descriptors = repositories::parse(content).unwrap();
    TopologyBuilder::new(config).plan(&descriptors).unwrap()
}

fn assert_well_formed(graph: &DependencyGraph) {
    for node in graph.nodes() {
        for dep in &node.depends_on {
            assert!(graph.contains(dep), "{} has dangling edge to {dep}", node.identity);
        }
    }

    let order = graph.topological_order();
    assert_eq!(order.len(), graph.len(), "graph has a cycle");
    let mut seen = HashSet::new();
    for node in order {
        assert!(node.depends_on.iter().all(|d| seen.contains(d.as_str())));
        seen.insert(node.identity.as_str());
    }
}

fn configs() -> Vec<FleetConfig> {
    let mut scale_set = FleetConfig::default();
    scale_set.controller.variant = ControllerVariant::ScaleSet;

    let mut size_range = FleetConfig::default();
    size_range.autoscaler.mode = Some(AutoscalerMode::SizeRange);

    let mut scale_set_without_cert_manager = scale_set.clone();
    scale_set_without_cert_manager.cert_manager.enabled = false;

    vec![
        FleetConfig::default(),
        scale_set,
        size_range,
        scale_set_without_cert_manager,
    ]
}

#[test]
fn valid_inputs_build_graphs_without_dangling_edges_or_cycles() {
    for config in configs() {
        for content in ["[]", FLEET] {
            assert_well_formed(&plan(&config, content));
        }
    }
}

#[test]
fn derived_names_are_deterministic() {
    for id in ["Acme/Widgets", "acme/docs.site", "o/Under_Score"] {
        assert_eq!(derive_resource_name(id), derive_resource_name(id));
    }
    assert_eq!(derive_resource_name("acme/docs.site"), "arc-runner-set-docs-site");
}

#[test]
fn case_folded_collisions_are_rejected() {
    let config = FleetConfig::default();
    let descriptors = repositories::parse(
        "- { releaseName: a, repositoryId: acme/Widgets }\n- { releaseName: b, repositoryId: other/widgets }\n",
    )
    .unwrap();

    match TopologyBuilder::new(&config).plan(&descriptors) {
        Err(FleetError::DuplicateResourceName { name }) => {
            assert_eq!(name, "arc-runner-set-widgets");
        }
        other => panic!("expected DuplicateResourceName, got {other:?}"),
    }
}

#[test]
fn autoscaler_attached_only_to_elastic_pools() {
    let config = FleetConfig::default();
    let descriptors = repositories::parse(FLEET).unwrap();
    let policies = ScalingResolver::default().resolve_all(&descriptors);
    let graph = TopologyBuilder::new(&config).plan(&descriptors).unwrap();

    for (descriptor, policy) in descriptors.iter().zip(&policies) {
        assert!(policy.min <= policy.max);

        let name = derive_resource_name(&descriptor.repository_id);
        let autoscaler = naming::autoscaler_identity(&name);
        let attached: Vec<_> = graph
            .nodes()
            .filter(|n| n.identity == autoscaler)
            .collect();

        if policy.min == policy.max {
            assert!(attached.is_empty(), "{name} is fixed");
            continue;
        }

        assert_eq!(attached.len(), 1, "{name} is elastic");
        let ResourceSpec::Manifest(manifest) = &attached[0].spec else {
            panic!("autoscaler should be a manifest");
        };
        let hra: HorizontalRunnerAutoscaler = serde_json::from_value(manifest.clone()).unwrap();
        assert_eq!(hra.spec.min_replicas, policy.min);
        assert_eq!(hra.spec.max_replicas, policy.max);
        assert_eq!(hra.spec.metrics[0].scale_up_threshold, "1");
        assert_eq!(hra.spec.metrics[0].scale_down_threshold, "0");
    }
}

#[test]
fn repositories_named_like_autoscalers_do_not_collide() {
    let config = FleetConfig::default();
    let graph = plan(
        &config,
        "- { releaseName: w, repositoryId: acme/widgets, minRunners: 1, maxRunners: 3 }\n\
         - { releaseName: wa, repositoryId: acme/widgets-autoscaler, minRunners: 1, maxRunners: 1 }\n",
    );
    assert_well_formed(&graph);
    assert!(graph.contains("arc-runner-set-widgets-autoscaler"));
    assert!(graph.contains(&naming::autoscaler_identity("arc-runner-set-widgets")));
}

#[test]
fn building_twice_yields_identical_graphs() {
    for config in configs() {
        assert_eq!(plan(&config, FLEET), plan(&config, FLEET));
    }
}

#[test]
fn input_order_does_not_change_nodes() {
    let config = FleetConfig::default();
    let mut descriptors = repositories::parse(FLEET).unwrap();
    let forward = TopologyBuilder::new(&config).plan(&descriptors).unwrap();
    descriptors.reverse();
    let reversed = TopologyBuilder::new(&config).plan(&descriptors).unwrap();

    let nodes = |g: &DependencyGraph| g.nodes().cloned().collect::<Vec<_>>();
    assert_eq!(nodes(&forward), nodes(&reversed));
}

#[test]
fn widgets_scenario() {
    let config = FleetConfig::default();
    let descriptors = vec![RepositoryDescriptor::new("Acme/Widgets", "r1", 1, 3)];
    let policy = ScalingResolver::default().resolve(&descriptors[0]);
    assert_eq!((policy.min, policy.max), (1, 3));
    assert!(policy.metric().is_some());

    let graph = TopologyBuilder::new(&config).plan(&descriptors).unwrap();
    let scale_sets: Vec<_> = graph
        .nodes()
        .filter(|n| n.identity.starts_with("arc-runner-set-"))
        .collect();
    assert_eq!(scale_sets.len(), 1);
    assert_eq!(scale_sets[0].identity, "arc-runner-set-widgets");

    let expected: HashSet<&str> = [
        ids::RUNNER_NAMESPACE,
        ids::CONTROLLER_RELEASE,
        ids::RUNNER_MANAGER_BINDING,
    ]
    .into_iter()
    .collect();
    let actual: HashSet<&str> = scale_sets[0].depends_on.iter().map(String::as_str).collect();
    assert_eq!(actual, expected);
    assert!(graph.contains("autoscaler/arc-runner-set-widgets"));
}

#[test]
fn empty_configuration_builds_only_root_topology() {
    let config = FleetConfig::default();
    let graph = plan(&config, "[]");

    let identities: HashSet<&str> = graph.nodes().map(|n| n.identity.as_str()).collect();
    let expected: HashSet<&str> = [
        ids::CERT_MANAGER_NAMESPACE,
        ids::CONTROLLER_NAMESPACE,
        ids::RUNNER_NAMESPACE,
        ids::CERT_MANAGER_RELEASE,
        ids::CONTROLLER_RELEASE,
        ids::CONTROLLER_CLUSTER_BINDING,
        ids::RUNNER_MANAGER_ROLE,
        ids::RUNNER_MANAGER_BINDING,
    ]
    .into_iter()
    .collect();
    assert_eq!(identities, expected);
    assert_eq!(outputs(&graph)["repositories"], serde_json::json!([]));
}

#[test]
fn missing_repository_id_at_index_two_fails_load() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("repositories.yaml");
    std::fs::write(
        &path,
        r#"
- { releaseName: a, repositoryId: acme/a }
- { releaseName: b, repositoryId: acme/b }
- { releaseName: c, minRunners: 1 }
"#,
    )
    .unwrap();

    match repositories::load(&RepositorySource::File(path)) {
        Err(FleetError::ConfigInvalid { index, field, .. }) => {
            assert_eq!(index, 2);
            assert_eq!(field, "repositoryId");
        }
        other => panic!("expected ConfigInvalid, got {other:?}"),
    }
}
