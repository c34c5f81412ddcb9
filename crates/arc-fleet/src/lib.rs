//! arc-fleet: self-hosted CI runner infrastructure for a fleet of repositories.
//!
//! Turns a list of repository descriptors into a dependency-ordered graph of
//! cluster resources (namespaces, cert-manager, the runner controller, access
//! bindings, one runner scale-set per repository and optional autoscalers),
//! then hands the graph to a provisioning engine.
//!
//! # Example
//!
//! ```ignore
//! use arc_fleet::{outputs, repositories, FleetConfig, RepositorySource, TopologyBuilder};
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = FleetConfig::default();
//!     let descriptors = repositories::load(&RepositorySource::File("repos.yaml".into()))?;
//!     let graph = TopologyBuilder::new(&config).plan(&descriptors)?;
//!     println!("{:?}", outputs(&graph));
//!     Ok(())
//! }
//! ```

// Allow product names without backticks in doc comments
#![allow(clippy::doc_markdown)]
// Allow module names repeated in type names (graph::GraphExports)
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod crds;
pub mod credentials;
pub mod engine;
pub mod errors;
pub mod graph;
pub mod manifests;
pub mod naming;
pub mod orchestrator;
pub mod repositories;
pub mod scaling;
pub mod topology;
pub mod ui;

// Re-export commonly used types at the crate root
pub use config::{ControllerVariant, FleetConfig};
pub use errors::{FleetError, FleetResult};
pub use graph::{DependencyGraph, ResourceKind, ResourceNode, Subgraph};
pub use naming::derive_resource_name;
pub use orchestrator::{outputs, Orchestrator, Outputs};
pub use repositories::{RepositoryDescriptor, RepositorySource};
pub use scaling::{ScalingPolicy, ScalingResolver};
pub use topology::TopologyBuilder;
