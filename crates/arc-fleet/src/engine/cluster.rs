use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use kube::api::{Api, Patch, PatchParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::core::{ApiResource, DynamicObject, GroupVersionKind};
use kube::{Client, Config};
use serde_json::Value;
use tokio::process::Command;
use tracing::{debug, info};

use super::NodeApplier;
use crate::config::ChartRef;
use crate::credentials::Credentials;
use crate::errors::{FleetError, FleetResult};
use crate::graph::{ChartReleaseSpec, ResourceNode, ResourceSpec};

const FIELD_MANAGER: &str = "arc-fleet";
const DEFAULT_HELM_TIMEOUT: Duration = Duration::from_secs(600);

/// Applies nodes to a live cluster: manifests through server-side apply,
/// chart releases through `helm upgrade --install`.
pub struct ClusterApplier {
    client: Client,
    kubeconfig: PathBuf,
    credentials: Credentials,
    helm_timeout: Duration,
}

impl ClusterApplier {
    /// Connect using the kubeconfig at `kubeconfig`.
    ///
    /// # Errors
    ///
    /// [`FleetError::Engine`] if the kubeconfig cannot be read or no client
    /// can be built from it.
    pub async fn connect(kubeconfig: &Path, credentials: Credentials) -> FleetResult<Self> {
        let engine_error = |reason: String| FleetError::Engine { reason };

        let raw = Kubeconfig::read_from(kubeconfig).map_err(|e| {
            engine_error(format!("Failed to read kubeconfig {}: {e}", kubeconfig.display()))
        })?;
        let config = Config::from_custom_kubeconfig(raw, &KubeConfigOptions::default())
            .await
            .map_err(|e| engine_error(format!("Invalid kubeconfig: {e}")))?;
        let client = Client::try_from(config)
            .map_err(|e| engine_error(format!("Failed to create Kubernetes client: {e}")))?;

        info!(kubeconfig = %kubeconfig.display(), "Connected to cluster");

        Ok(Self {
            client,
            kubeconfig: kubeconfig.to_path_buf(),
            credentials,
            helm_timeout: DEFAULT_HELM_TIMEOUT,
        })
    }

    /// Override how long helm waits for a release to become ready.
    #[must_use]
    pub const fn with_helm_timeout(mut self, timeout: Duration) -> Self {
        self.helm_timeout = timeout;
        self
    }

    async fn apply_manifest(&self, manifest: &Value) -> Result<()> {
        let object: DynamicObject =
            serde_json::from_value(manifest.clone()).context("Manifest is not a Kubernetes object")?;
        let types = object
            .types
            .as_ref()
            .ok_or_else(|| anyhow!("Manifest has no apiVersion/kind"))?;
        let (group, version) = types
            .api_version
            .split_once('/')
            .unwrap_or(("", types.api_version.as_str()));
        let gvk = GroupVersionKind::gvk(group, version, &types.kind);
        let resource = ApiResource::from_gvk(&gvk);
        let name = object
            .metadata
            .name
            .clone()
            .ok_or_else(|| anyhow!("Manifest has no metadata.name"))?;

        let api: Api<DynamicObject> = match object.metadata.namespace.as_deref() {
            Some(namespace) => Api::namespaced_with(self.client.clone(), namespace, &resource),
            None => Api::all_with(self.client.clone(), &resource),
        };

        debug!(kind = %gvk.kind, name = %name, "Server-side applying manifest");
        api.patch(
            &name,
            &PatchParams::apply(FIELD_MANAGER).force(),
            &Patch::Apply(&object),
        )
        .await
        .with_context(|| format!("Failed to apply {} {name}", gvk.kind))?;

        Ok(())
    }

    async fn install_chart(&self, spec: &ChartReleaseSpec) -> Result<()> {
        let mut values = spec.values.clone();
        for (path, key) in &spec.credential_values {
            let secret = self
                .credentials
                .get(*key)
                .ok_or_else(|| anyhow!("No credential available for {key:?}"))?;
            set_path(&mut values, path, Value::String(secret.expose().to_string()));
        }

        // Removed when dropped, after helm has read it.
        let mut values_file = tempfile::Builder::new()
            .prefix("arc-fleet-values-")
            .suffix(".yaml")
            .tempfile()
            .context("Failed to create values file")?;
        serde_yaml::to_writer(&mut values_file, &values).context("Failed to render values")?;
        values_file.flush().context("Failed to write values file")?;

        let args = helm_args(spec, values_file.path(), self.helm_timeout);
        info!(
            release = %spec.release,
            namespace = %spec.namespace,
            chart = %spec.chart.name,
            version = %spec.chart.version,
            "Installing chart release"
        );

        let output = Command::new("helm")
            .args(&args)
            .env("KUBECONFIG", &self.kubeconfig)
            .output()
            .await
            .context("Failed to run helm")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!("helm upgrade failed for {}: {}", spec.release, stderr.trim()));
        }

        Ok(())
    }
}

#[async_trait]
impl NodeApplier for ClusterApplier {
    async fn apply(&self, node: &ResourceNode) -> Result<(), String> {
        let result = match &node.spec {
            ResourceSpec::Manifest(manifest) => self.apply_manifest(manifest).await,
            ResourceSpec::Chart(chart) => self.install_chart(chart).await,
        };
        result.map_err(|e| format!("{e:#}"))
    }
}

fn chart_reference(chart: &ChartRef) -> String {
    if chart.is_oci() {
        format!("{}/{}", chart.repository.trim_end_matches('/'), chart.name)
    } else {
        chart.name.clone()
    }
}

fn helm_args(spec: &ChartReleaseSpec, values_file: &Path, timeout: Duration) -> Vec<String> {
    let mut args = vec![
        "upgrade".to_string(),
        "--install".to_string(),
        spec.release.clone(),
        chart_reference(&spec.chart),
    ];
    if !spec.chart.is_oci() {
        args.extend(["--repo".to_string(), spec.chart.repository.clone()]);
    }
    args.extend([
        "--version".to_string(),
        spec.chart.version.clone(),
        "--namespace".to_string(),
        spec.namespace.clone(),
        "--values".to_string(),
        values_file.display().to_string(),
        "--wait".to_string(),
        "--timeout".to_string(),
        format!("{}s", timeout.as_secs()),
    ]);
    args
}

/// Set a dotted path inside a values tree, creating objects on the way.
fn set_path(values: &mut Value, path: &str, leaf: Value) {
    let mut current = values;
    for segment in path.split('.') {
        if !current.is_object() {
            *current = Value::Object(serde_json::Map::new());
        }
        let Value::Object(map) = current else {
            return;
        };
        current = map.entry(segment.to_string()).or_insert(Value::Null);
    }
    *current = leaf;
}
