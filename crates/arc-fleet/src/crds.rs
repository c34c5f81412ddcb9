//! Runner custom resources (`actions.summerwind.dev/v1alpha1`).
//!
//! Only the fields this crate sets are modelled; the controller owns the rest
//! of the schema.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Pod template for runners.
#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RunnerTemplateSpec {
    /// `owner/name` the runners register against.
    pub repository: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<String>,
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, PartialEq, Eq)]
pub struct RunnerTemplate {
    pub spec: RunnerTemplateSpec,
}

/// `RunnerDeployment` keeps `replicas` runners registered for one repository.
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, JsonSchema)]
#[kube(
    group = "actions.summerwind.dev",
    version = "v1alpha1",
    kind = "RunnerDeployment"
)]
#[kube(namespaced)]
pub struct RunnerDeploymentSpec {
    pub replicas: u32,
    pub template: RunnerTemplate,
}

/// Resource an autoscaler resizes.
#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, PartialEq, Eq)]
pub struct ScaleTargetRef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    pub name: String,
}

/// A scaling metric. The controller expects every threshold as a string.
#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AutoscalerMetric {
    #[serde(rename = "type")]
    pub metric_type: String,
    pub scale_up_threshold: String,
    pub scale_down_threshold: String,
    pub scale_up_factor: String,
    pub scale_down_factor: String,
}

/// `HorizontalRunnerAutoscaler` resizes a runner pool between its bounds.
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, JsonSchema)]
#[kube(
    group = "actions.summerwind.dev",
    version = "v1alpha1",
    kind = "HorizontalRunnerAutoscaler"
)]
#[kube(namespaced)]
#[serde(rename_all = "camelCase")]
pub struct HorizontalRunnerAutoscalerSpec {
    pub scale_target_ref: ScaleTargetRef,
    pub min_replicas: u32,
    pub max_replicas: u32,
    pub metrics: Vec<AutoscalerMetric>,
}
