//! Error types for the arc-fleet crate.

use thiserror::Error;

/// Errors raised while loading configuration, building the resource graph,
/// or converging it on a cluster.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FleetError {
    // Configuration errors
    #[error("Repository configuration not found at '{path}'")]
    ConfigNotFound { path: String },

    #[error("Repository configuration is malformed: {reason}")]
    ConfigMalformed { reason: String },

    #[error("Invalid repository entry at index {index}: field '{field}' {reason}")]
    ConfigInvalid {
        index: usize,
        field: String,
        reason: String,
    },

    #[error("Invalid fleet settings: {reason}")]
    Settings { reason: String },

    // Graph construction errors
    #[error("Resource name '{name}' is derived more than once")]
    DuplicateResourceName { name: String },

    #[error("Node '{node_id}' depends on '{missing_dependency_id}', which is not in the graph")]
    DanglingDependency {
        node_id: String,
        missing_dependency_id: String,
    },

    #[error("Circular dependency detected: {}", cycle.join(" -> "))]
    CyclicDependency { cycle: Vec<String> },

    #[error("Got {policies} scaling policies for {descriptors} repositories")]
    PolicyMismatch { descriptors: usize, policies: usize },

    #[error("Failed to serialize resource '{node_id}': {reason}")]
    Serialization { node_id: String, reason: String },

    // Convergence errors, reported as the engine produced them
    #[error("Node '{node_id}' failed to converge: {cause}")]
    ConvergenceFailure { node_id: String, cause: String },

    #[error("Provisioning engine error: {reason}")]
    Engine { reason: String },
}

impl FleetError {
    pub(crate) fn invalid(index: usize, field: &str, reason: impl Into<String>) -> Self {
        Self::ConfigInvalid {
            index,
            field: field.to_string(),
            reason: reason.into(),
        }
    }

    /// Whether the error was raised before any graph could be built.
    #[must_use]
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            Self::ConfigNotFound { .. }
                | Self::ConfigMalformed { .. }
                | Self::ConfigInvalid { .. }
                | Self::Settings { .. }
        )
    }
}

impl From<serde_yaml::Error> for FleetError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::ConfigMalformed {
            reason: err.to_string(),
        }
    }
}

impl From<toml::de::Error> for FleetError {
    fn from(err: toml::de::Error) -> Self {
        Self::Settings {
            reason: err.to_string(),
        }
    }
}

/// Result type alias for fleet operations
pub type FleetResult<T> = Result<T, FleetError>;
