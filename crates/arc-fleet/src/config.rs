//! Fleet settings.
//!
//! Operator-facing knobs for the fixed part of the topology: namespaces, chart
//! pins, the controller variant, autoscaler policy constants and the access
//! rule set. Every field has a default so an empty (or absent) settings file
//! yields a working legacy-controller deployment with metric autoscaling.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::errors::{FleetError, FleetResult};

/// Which Actions Runner Controller architecture to deploy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ControllerVariant {
    /// `gha-runner-scale-set-controller` with per-repository scale-set charts.
    ScaleSet,
    /// The summerwind controller with `RunnerDeployment` resources.
    #[default]
    Legacy,
}

impl ControllerVariant {
    /// Whether the controller chart needs cert-manager for its webhooks.
    #[must_use]
    pub const fn requires_cert_manager(self) -> bool {
        matches!(self, Self::Legacy)
    }

    /// Autoscaler mode used when the settings leave it unset. Only the legacy
    /// controller reconciles `HorizontalRunnerAutoscaler`.
    #[must_use]
    pub const fn default_autoscaler_mode(self) -> AutoscalerMode {
        match self {
            Self::ScaleSet => AutoscalerMode::SizeRange,
            Self::Legacy => AutoscalerMode::Metrics,
        }
    }

    /// API group of the runner custom resources managed by this controller.
    #[must_use]
    pub const fn runner_api_group(self) -> &'static str {
        match self {
            Self::ScaleSet => "actions.github.com",
            Self::Legacy => "actions.summerwind.dev",
        }
    }
}

impl std::fmt::Display for ControllerVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ScaleSet => write!(f, "scale-set"),
            Self::Legacy => write!(f, "legacy"),
        }
    }
}

impl std::str::FromStr for ControllerVariant {
    type Err = FleetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "scale-set" | "scaleset" | "gha" => Ok(Self::ScaleSet),
            "legacy" | "summerwind" => Ok(Self::Legacy),
            _ => Err(FleetError::Settings {
                reason: format!("Unknown controller variant: {s}. Supported: scale-set, legacy"),
            }),
        }
    }
}

/// How elastic pools express their scaling behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AutoscalerMode {
    /// Attach a `HorizontalRunnerAutoscaler` with an explicit metric.
    Metrics,
    /// Only carry min/max bounds on the scale-set itself.
    SizeRange,
}

impl std::fmt::Display for AutoscalerMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Metrics => write!(f, "metrics"),
            Self::SizeRange => write!(f, "size-range"),
        }
    }
}

impl std::str::FromStr for AutoscalerMode {
    type Err = FleetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "metrics" => Ok(Self::Metrics),
            "size-range" | "sizerange" | "bounds" => Ok(Self::SizeRange),
            _ => Err(FleetError::Settings {
                reason: format!("Unknown autoscaler mode: {s}. Supported: metrics, size-range"),
            }),
        }
    }
}

/// A pinned Helm chart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChartRef {
    pub name: String,
    /// Either an `https://` index URL or an `oci://` registry prefix.
    pub repository: String,
    pub version: String,
}

impl ChartRef {
    fn new(name: &str, repository: &str, version: &str) -> Self {
        Self {
            name: name.to_string(),
            repository: repository.to_string(),
            version: version.to_string(),
        }
    }

    #[must_use]
    pub fn is_oci(&self) -> bool {
        self.repository.starts_with("oci://")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Namespaces {
    pub cert_manager: String,
    pub controller: String,
    pub runners: String,
}

impl Default for Namespaces {
    fn default() -> Self {
        Self {
            cert_manager: "cert-manager".into(),
            controller: "arc-systems".into(),
            runners: "arc-runners".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CertManagerSettings {
    pub enabled: bool,
    pub release: String,
    pub chart: ChartRef,
}

impl Default for CertManagerSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            release: "cert-manager".into(),
            chart: ChartRef::new("cert-manager", "https://charts.jetstack.io", "v1.14.4"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerSettings {
    pub variant: ControllerVariant,
    pub release: String,
    /// Overrides the chart's generated service account name.
    pub service_account: Option<String>,
    /// Overrides the variant's controller chart.
    pub chart: Option<ChartRef>,
    /// Overrides the scale-set chart used for each repository.
    pub runner_chart: Option<ChartRef>,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            variant: ControllerVariant::default(),
            release: "arc".into(),
            service_account: None,
            chart: None,
            runner_chart: None,
        }
    }
}

const GHA_CHARTS: &str = "oci://ghcr.io/actions/actions-runner-controller-charts";
const GHA_CHART_VERSION: &str = "0.9.3";

impl ControllerSettings {
    /// The controller chart for the selected variant.
    #[must_use]
    pub fn chart(&self) -> ChartRef {
        if let Some(chart) = &self.chart {
            return chart.clone();
        }
        match self.variant {
            ControllerVariant::ScaleSet => ChartRef::new(
                "gha-runner-scale-set-controller",
                GHA_CHARTS,
                GHA_CHART_VERSION,
            ),
            ControllerVariant::Legacy => ChartRef::new(
                "actions-runner-controller",
                "https://actions-runner-controller.github.io/actions-runner-controller",
                "0.23.5",
            ),
        }
    }

    /// The per-repository scale-set chart.
    #[must_use]
    pub fn runner_chart(&self) -> ChartRef {
        self.runner_chart.clone().unwrap_or_else(|| {
            ChartRef::new("gha-runner-scale-set", GHA_CHARTS, GHA_CHART_VERSION)
        })
    }

    /// Service account the controller runs as.
    #[must_use]
    pub fn service_account(&self) -> String {
        if let Some(sa) = &self.service_account {
            return sa.clone();
        }
        match self.variant {
            ControllerVariant::ScaleSet => format!("{}-gha-rs-controller", self.release),
            ControllerVariant::Legacy => format!("{}-actions-runner-controller", self.release),
        }
    }
}

/// Policy constants for elastic pools.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoscalerSettings {
    /// Unset means the controller variant's default.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<AutoscalerMode>,
    pub metric_type: String,
    pub scale_up_threshold: u32,
    pub scale_down_threshold: u32,
    pub scale_up_factor: f64,
    pub scale_down_factor: f64,
}

impl Default for AutoscalerSettings {
    fn default() -> Self {
        Self {
            mode: None,
            metric_type: "TotalNumberOfQueuedAndInProgressWorkflowRuns".into(),
            scale_up_threshold: 1,
            scale_down_threshold: 0,
            scale_up_factor: 2.0,
            scale_down_factor: 0.5,
        }
    }
}

impl AutoscalerSettings {
    /// The mode in effect for `variant`.
    #[must_use]
    pub fn mode_for(&self, variant: ControllerVariant) -> AutoscalerMode {
        self.mode
            .unwrap_or_else(|| variant.default_autoscaler_mode())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccessSettings {
    /// Cluster role bound to the controller service account.
    pub cluster_role: String,
    /// Whether the runner role covers `autoscalinglisteners`. Left unset, the
    /// rule is included and a warning is logged at build time.
    pub include_autoscaling_listeners: Option<bool>,
}

impl Default for AccessSettings {
    fn default() -> Self {
        Self {
            cluster_role: "cluster-admin".into(),
            include_autoscaling_listeners: None,
        }
    }
}

impl AccessSettings {
    #[must_use]
    pub fn include_listeners(&self) -> bool {
        self.include_autoscaling_listeners.unwrap_or(true)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerSettings {
    pub labels: Vec<String>,
    /// Base URL repository identifiers are resolved against.
    pub github_url: String,
    /// Name of the token secret the legacy controller creates.
    pub auth_secret_name: String,
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self {
            labels: vec!["self-hosted".into(), "kubernetes".into()],
            github_url: "https://github.com".into(),
            auth_secret_name: "controller-manager".into(),
        }
    }
}

/// Full fleet configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct FleetConfig {
    pub namespaces: Namespaces,
    pub cert_manager: CertManagerSettings,
    pub controller: ControllerSettings,
    pub autoscaler: AutoscalerSettings,
    pub access: AccessSettings,
    pub runners: RunnerSettings,
}

impl FleetConfig {
    /// Load settings from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`FleetError::Settings`] if the file cannot be read, parsed or
    /// fails validation.
    pub fn load(path: &Path) -> FleetResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| FleetError::Settings {
            reason: format!("Failed to read {}: {e}", path.display()),
        })?;
        Self::from_toml(&content)
    }

    /// Parse and validate settings from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`FleetError::Settings`] on parse or validation failure.
    pub fn from_toml(content: &str) -> FleetResult<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns [`FleetError::Settings`] describing the first violation.
    pub fn validate(&self) -> FleetResult<()> {
        let required = [
            ("namespaces.cert_manager", &self.namespaces.cert_manager),
            ("namespaces.controller", &self.namespaces.controller),
            ("namespaces.runners", &self.namespaces.runners),
            ("cert_manager.release", &self.cert_manager.release),
            ("controller.release", &self.controller.release),
            ("access.cluster_role", &self.access.cluster_role),
        ];
        for (key, value) in required {
            if value.trim().is_empty() {
                return Err(FleetError::Settings {
                    reason: format!("'{key}' must not be empty"),
                });
            }
        }

        if self.autoscaler.scale_up_factor <= 0.0 || self.autoscaler.scale_down_factor <= 0.0 {
            return Err(FleetError::Settings {
                reason: "autoscaler scale factors must be greater than 0".into(),
            });
        }

        if self.controller.variant == ControllerVariant::ScaleSet
            && self.autoscaler.mode == Some(AutoscalerMode::Metrics)
        {
            return Err(FleetError::Settings {
                reason: "autoscaler mode 'metrics' needs the legacy controller; \
                         use 'size-range' with the scale-set controller"
                    .into(),
            });
        }

        if self.autoscaler.scale_down_threshold > self.autoscaler.scale_up_threshold {
            return Err(FleetError::Settings {
                reason: "autoscaler scale_down_threshold cannot exceed scale_up_threshold".into(),
            });
        }

        Ok(())
    }
}
