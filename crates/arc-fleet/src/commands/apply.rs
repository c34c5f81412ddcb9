//! Apply command: converge the graph on a live cluster.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use arc_fleet::credentials::{Credentials, SecretValue};
use arc_fleet::engine::{ClusterApplier, OrderedEngine};
use arc_fleet::orchestrator::{self, Orchestrator};
use arc_fleet::ui::{self, Tone};
use clap::Args;
use tracing::info;

use super::GraphArgs;

/// Converge runner infrastructure on a cluster and print its outputs.
#[derive(Args)]
pub struct ApplyCommand {
    #[command(flatten)]
    graph: GraphArgs,

    /// Path to kubeconfig file.
    #[arg(long, env = "KUBECONFIG")]
    kubeconfig: PathBuf,

    /// Token the controller uses to register runners.
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    github_token: String,

    /// Seconds helm waits for each release to become ready.
    #[arg(long, default_value = "600")]
    helm_timeout: u64,
}

impl ApplyCommand {
    pub async fn run(&self) -> Result<()> {
        let graph = self.graph.build()?;
        info!(nodes = graph.len(), "Built resource graph");

        ui::status(
            Tone::Step,
            &format!("Connecting with {}", self.kubeconfig.display()),
        );
        let credentials = Credentials::new(SecretValue::new(self.github_token.clone()));
        let applier = ClusterApplier::connect(&self.kubeconfig, credentials)
            .await?
            .with_helm_timeout(Duration::from_secs(self.helm_timeout));
        let orchestrator = Orchestrator::new(OrderedEngine::new(applier));

        ui::heading("Converging runner infrastructure");
        let report = orchestrator.converge(&graph).await?;
        ui::print_report(&report);
        println!();
        if report.blocked() > 0 {
            let skipped = report.blocked();
            ui::status(
                Tone::Warn,
                &format!("{skipped} resources skipped because a dependency failed"),
            );
        }

        let outputs = match orchestrator::conclude(&graph, &report) {
            Ok(outputs) => outputs,
            Err(e) => {
                ui::status(Tone::Fail, &e.to_string());
                return Err(e.into());
            }
        };

        ui::status(Tone::Done, "All resources converged");
        for (key, value) in &outputs {
            match value.as_str() {
                Some(text) => ui::field(key, text),
                None => ui::field(key, &value.to_string()),
            }
        }
        Ok(())
    }
}
