//! CLI subcommands.

pub mod apply;
pub mod plan;

use std::path::PathBuf;

use anyhow::{Context, Result};
use arc_fleet::repositories::{self, RepositorySource};
use arc_fleet::{DependencyGraph, FleetConfig, TopologyBuilder};
use clap::Args;

/// Inputs every subcommand needs to build the resource graph.
#[derive(Args)]
pub struct GraphArgs {
    /// Repository descriptor file (YAML or JSON).
    #[arg(long, env = "ARC_FLEET_REPOSITORIES")]
    repositories: PathBuf,

    /// Operator settings file (TOML). Defaults apply when omitted.
    #[arg(long, env = "ARC_FLEET_CONFIG")]
    config: Option<PathBuf>,
}

impl GraphArgs {
    fn settings(&self) -> Result<FleetConfig> {
        match &self.config {
            Some(path) => FleetConfig::load(path)
                .with_context(|| format!("Failed to load settings from {}", path.display())),
            None => Ok(FleetConfig::default()),
        }
    }

    /// Load settings and descriptors and build the sealed graph.
    pub fn build(&self) -> Result<DependencyGraph> {
        let config = self.settings()?;
        let descriptors = repositories::load(&RepositorySource::File(self.repositories.clone()))?;
        let graph = TopologyBuilder::new(&config).plan(&descriptors)?;
        Ok(graph)
    }
}
