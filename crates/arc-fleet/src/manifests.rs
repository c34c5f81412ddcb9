//! Typed Kubernetes objects for the manifest nodes of the graph.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::Namespace;
use k8s_openapi::api::rbac::v1::{
    ClusterRoleBinding, PolicyRule, Role, RoleBinding, RoleRef, Subject,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::Serialize;

use crate::config::ControllerVariant;
use crate::crds::{
    AutoscalerMetric, HorizontalRunnerAutoscaler, HorizontalRunnerAutoscalerSpec,
    RunnerDeployment, RunnerDeploymentSpec, RunnerTemplate, RunnerTemplateSpec, ScaleTargetRef,
};
use crate::errors::{FleetError, FleetResult};
use crate::scaling::MetricPolicy;

const MANAGED_BY: &str = "arc-fleet";
const RBAC_API_GROUP: &str = "rbac.authorization.k8s.io";

const MANAGE_VERBS: &[&str] = &["get", "list", "watch", "create", "update", "patch", "delete"];
const STATUS_VERBS: &[&str] = &["get", "update", "patch"];

fn metadata(name: &str, namespace: Option<&str>) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: namespace.map(str::to_string),
        labels: Some(BTreeMap::from([(
            "app.kubernetes.io/managed-by".to_string(),
            MANAGED_BY.to_string(),
        )])),
        ..ObjectMeta::default()
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| (*s).to_string()).collect()
}

/// Serialize a typed object into a node payload.
pub fn to_manifest<T: Serialize>(node_id: &str, object: &T) -> FleetResult<serde_json::Value> {
    serde_json::to_value(object).map_err(|e| FleetError::Serialization {
        node_id: node_id.to_string(),
        reason: e.to_string(),
    })
}

#[must_use]
pub fn namespace(name: &str) -> Namespace {
    Namespace {
        metadata: metadata(name, None),
        ..Namespace::default()
    }
}

#[must_use]
pub fn service_account_subject(name: &str, namespace: &str) -> Subject {
    Subject {
        api_group: None,
        kind: "ServiceAccount".to_string(),
        name: name.to_string(),
        namespace: Some(namespace.to_string()),
    }
}

#[must_use]
pub fn cluster_role_binding(name: &str, cluster_role: &str, subject: Subject) -> ClusterRoleBinding {
    ClusterRoleBinding {
        metadata: metadata(name, None),
        role_ref: RoleRef {
            api_group: RBAC_API_GROUP.to_string(),
            kind: "ClusterRole".to_string(),
            name: cluster_role.to_string(),
        },
        subjects: Some(vec![subject]),
    }
}

#[must_use]
pub fn role(name: &str, namespace: &str, rules: Vec<PolicyRule>) -> Role {
    Role {
        metadata: metadata(name, Some(namespace)),
        rules: Some(rules),
    }
}

#[must_use]
pub fn role_binding(name: &str, namespace: &str, role: &str, subject: Subject) -> RoleBinding {
    RoleBinding {
        metadata: metadata(name, Some(namespace)),
        role_ref: RoleRef {
            api_group: RBAC_API_GROUP.to_string(),
            kind: "Role".to_string(),
            name: role.to_string(),
        },
        subjects: Some(vec![subject]),
    }
}

/// Rules letting the controller manage runners inside the runner namespace.
///
/// `include_listeners` only affects the scale-set variant, which is the only
/// one that has `autoscalinglisteners`.
#[must_use]
pub fn runner_manager_rules(variant: ControllerVariant, include_listeners: bool) -> Vec<PolicyRule> {
    let (mut resources, mut status) = match variant {
        ControllerVariant::ScaleSet => (
            strings(&["autoscalingrunnersets", "ephemeralrunnersets", "ephemeralrunners"]),
            strings(&[
                "autoscalingrunnersets/status",
                "ephemeralrunnersets/status",
                "ephemeralrunners/status",
            ]),
        ),
        ControllerVariant::Legacy => (
            strings(&[
                "runnerdeployments",
                "runnerreplicasets",
                "runners",
                "horizontalrunnerautoscalers",
            ]),
            strings(&[
                "runnerdeployments/status",
                "runnerreplicasets/status",
                "runners/status",
                "horizontalrunnerautoscalers/status",
            ]),
        ),
    };

    if variant == ControllerVariant::ScaleSet && include_listeners {
        resources.push("autoscalinglisteners".to_string());
        status.push("autoscalinglisteners/status".to_string());
    }

    let group = vec![variant.runner_api_group().to_string()];
    vec![
        PolicyRule {
            api_groups: Some(group.clone()),
            resources: Some(resources),
            verbs: strings(MANAGE_VERBS),
            ..PolicyRule::default()
        },
        PolicyRule {
            api_groups: Some(group),
            resources: Some(status),
            verbs: strings(STATUS_VERBS),
            ..PolicyRule::default()
        },
        PolicyRule {
            api_groups: Some(vec![String::new()]),
            resources: Some(strings(&["pods", "secrets", "serviceaccounts"])),
            verbs: strings(MANAGE_VERBS),
            ..PolicyRule::default()
        },
    ]
}

#[must_use]
pub fn runner_deployment(
    name: &str,
    namespace: &str,
    repository_id: &str,
    replicas: u32,
    labels: &[String],
) -> RunnerDeployment {
    let mut deployment = RunnerDeployment::new(
        name,
        RunnerDeploymentSpec {
            replicas,
            template: RunnerTemplate {
                spec: RunnerTemplateSpec {
                    repository: repository_id.to_string(),
                    labels: labels.to_vec(),
                },
            },
        },
    );
    deployment.metadata = metadata(name, Some(namespace));
    deployment
}

#[must_use]
pub fn autoscaler(
    name: &str,
    namespace: &str,
    target: ScaleTargetRef,
    min: u32,
    max: u32,
    metric: &MetricPolicy,
) -> HorizontalRunnerAutoscaler {
    let mut hra = HorizontalRunnerAutoscaler::new(
        name,
        HorizontalRunnerAutoscalerSpec {
            scale_target_ref: target,
            min_replicas: min,
            max_replicas: max,
            metrics: vec![AutoscalerMetric {
                metric_type: metric.metric_type.clone(),
                scale_up_threshold: metric.scale_up_threshold.to_string(),
                scale_down_threshold: metric.scale_down_threshold.to_string(),
                scale_up_factor: metric.scale_up_factor.to_string(),
                scale_down_factor: metric.scale_down_factor.to_string(),
            }],
        },
    );
    hra.metadata = metadata(name, Some(namespace));
    hra
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_namespace_manifest_carries_type_meta() {
        let value = to_manifest("ns", &namespace("arc-runners")).unwrap();
        assert_eq!(value["apiVersion"], "v1");
        assert_eq!(value["kind"], "Namespace");
        assert_eq!(value["metadata"]["name"], "arc-runners");
        assert_eq!(
            value["metadata"]["labels"]["app.kubernetes.io/managed-by"],
            "arc-fleet"
        );
    }

    #[test]
    fn test_listener_rule_toggle() {
        let with = runner_manager_rules(ControllerVariant::ScaleSet, true);
        let without = runner_manager_rules(ControllerVariant::ScaleSet, false);

        let has_listeners = |rules: &[PolicyRule]| {
            rules.iter().any(|r| {
                r.resources
                    .as_ref()
                    .is_some_and(|res| res.iter().any(|x| x == "autoscalinglisteners"))
            })
        };
        assert!(has_listeners(&with));
        assert!(!has_listeners(&without));
    }

    #[test]
    fn test_legacy_rules_use_summerwind_group() {
        let rules = runner_manager_rules(ControllerVariant::Legacy, true);
        assert_eq!(
            rules[0].api_groups.as_deref(),
            Some(&["actions.summerwind.dev".to_string()][..])
        );
        assert!(!rules[0]
            .resources
            .as_ref()
            .unwrap()
            .contains(&"autoscalinglisteners".to_string()));
    }

    #[test]
    fn test_autoscaler_renders_string_thresholds() {
        let metric = MetricPolicy {
            metric_type: "TotalNumberOfQueuedAndInProgressWorkflowRuns".into(),
            scale_up_threshold: 1,
            scale_down_threshold: 0,
            scale_up_factor: 2.0,
            scale_down_factor: 0.5,
        };
        let hra = autoscaler(
            "set-autoscaler",
            "arc-runners",
            ScaleTargetRef {
                kind: Some("RunnerDeployment".into()),
                name: "set".into(),
            },
            1,
            3,
            &metric,
        );
        let value = to_manifest("set-autoscaler", &hra).unwrap();
        assert_eq!(value["kind"], "HorizontalRunnerAutoscaler");
        assert_eq!(value["apiVersion"], "actions.summerwind.dev/v1alpha1");
        assert_eq!(value["spec"]["minReplicas"], 1);
        assert_eq!(value["spec"]["maxReplicas"], 3);
        let rendered = &value["spec"]["metrics"][0];
        assert_eq!(rendered["scaleUpThreshold"], "1");
        assert_eq!(rendered["scaleDownThreshold"], "0");
        assert_eq!(rendered["scaleUpFactor"], "2");
        assert_eq!(rendered["scaleDownFactor"], "0.5");
        assert_eq!(value["spec"]["scaleTargetRef"]["name"], "set");
    }

    #[test]
    fn test_runner_deployment() {
        let labels = vec!["self-hosted".to_string()];
        let value = to_manifest(
            "d",
            &runner_deployment("d", "arc-runners", "acme/widgets", 2, &labels),
        )
        .unwrap();
        assert_eq!(value["kind"], "RunnerDeployment");
        assert_eq!(value["metadata"]["namespace"], "arc-runners");
        assert_eq!(value["spec"]["replicas"], 2);
        assert_eq!(value["spec"]["template"]["spec"]["repository"], "acme/widgets");
    }
}
