//! Repository descriptor loading.
//!
//! Reads the list of repositories that get a runner pool, applies the
//! min/max defaults and rejects incomplete entries before anything else runs.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::errors::{FleetError, FleetResult};

/// Runner count used when `minRunners` is omitted.
pub const DEFAULT_MIN_RUNNERS: u32 = 1;
/// Runner count used when `maxRunners` is omitted.
pub const DEFAULT_MAX_RUNNERS: u32 = 3;
/// Longest name Helm accepts for a release.
pub const MAX_RELEASE_NAME_LEN: usize = 53;

/// A repository that gets its own runner scale-set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryDescriptor {
    /// `owner/name` on the CI platform.
    pub repository_id: String,
    /// Helm release (and `runs-on` label) of the scale-set.
    pub release_name: String,
    pub min_runners: u32,
    pub max_runners: u32,
}

impl RepositoryDescriptor {
    /// Create a descriptor with explicit bounds.
    pub fn new(
        repository_id: impl Into<String>,
        release_name: impl Into<String>,
        min_runners: u32,
        max_runners: u32,
    ) -> Self {
        Self {
            repository_id: repository_id.into(),
            release_name: release_name.into(),
            min_runners,
            max_runners,
        }
    }

    /// Repository owner (the part before the `/`).
    #[must_use]
    pub fn owner(&self) -> &str {
        self.repository_id
            .split_once('/')
            .map_or("", |(owner, _)| owner)
    }

    /// Repository name (the part after the `/`).
    #[must_use]
    pub fn name(&self) -> &str {
        self.repository_id
            .split_once('/')
            .map_or(self.repository_id.as_str(), |(_, name)| name)
    }
}

/// Where repository descriptors come from.
#[derive(Debug, Clone)]
pub enum RepositorySource {
    /// A YAML or JSON file on disk.
    File(PathBuf),
    /// Already-fetched YAML or JSON text.
    Inline(String),
}

impl std::fmt::Display for RepositorySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::File(path) => write!(f, "{}", path.display()),
            Self::Inline(_) => write!(f, "<inline>"),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawRecord {
    release_name: Option<String>,
    repository_id: Option<String>,
    min_runners: Option<i64>,
    max_runners: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawDocument {
    List(Vec<RawRecord>),
    Wrapped { repositories: Vec<RawRecord> },
}

/// Load and validate repository descriptors from `source`.
///
/// # Errors
///
/// - [`FleetError::ConfigNotFound`] if the file does not exist
/// - [`FleetError::ConfigMalformed`] if the content is not a sequence of records
/// - [`FleetError::ConfigInvalid`] naming the first offending record and field
pub fn load(source: &RepositorySource) -> FleetResult<Vec<RepositoryDescriptor>> {
    let content = match source {
        RepositorySource::File(path) => match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(FleetError::ConfigNotFound {
                    path: path.display().to_string(),
                });
            }
            Err(e) => {
                return Err(FleetError::ConfigMalformed {
                    reason: format!("Failed to read {}: {e}", path.display()),
                });
            }
        },
        RepositorySource::Inline(content) => content.clone(),
    };

    let descriptors = parse(&content)?;
    info!(
        source = %source,
        repositories = descriptors.len(),
        "Loaded repository configuration"
    );
    Ok(descriptors)
}

/// Parse and validate descriptors from YAML or JSON text.
///
/// # Errors
///
/// Same as [`load`], minus `ConfigNotFound`.
pub fn parse(content: &str) -> FleetResult<Vec<RepositoryDescriptor>> {
    if content.trim().is_empty() {
        return Err(FleetError::ConfigMalformed {
            reason: "document is empty".into(),
        });
    }

    let records = match serde_yaml::from_str::<RawDocument>(content)? {
        RawDocument::List(records) | RawDocument::Wrapped { repositories: records } => records,
    };

    let mut seen_releases: HashMap<String, usize> = HashMap::new();
    let mut descriptors = Vec::with_capacity(records.len());

    for (index, record) in records.into_iter().enumerate() {
        let descriptor = validate_record(index, record)?;

        if let Some(first) = seen_releases.insert(descriptor.release_name.clone(), index) {
            return Err(FleetError::invalid(
                index,
                "releaseName",
                format!("duplicates the release name of entry {first}"),
            ));
        }

        debug!(
            index,
            repository = %descriptor.repository_id,
            release = %descriptor.release_name,
            min = descriptor.min_runners,
            max = descriptor.max_runners,
            "Validated repository entry"
        );
        descriptors.push(descriptor);
    }

    Ok(descriptors)
}

fn validate_record(index: usize, record: RawRecord) -> FleetResult<RepositoryDescriptor> {
    let release_name = required(index, "releaseName", record.release_name)?;
    let repository_id = required(index, "repositoryId", record.repository_id)?;

    if let Err(reason) = check_release_name(&release_name) {
        return Err(FleetError::invalid(index, "releaseName", reason));
    }

    match repository_id.split_once('/') {
        Some((owner, name))
            if !owner.is_empty()
                && !name.is_empty()
                && !name.contains('/')
                && !repository_id.contains(char::is_whitespace) => {}
        _ => {
            return Err(FleetError::invalid(
                index,
                "repositoryId",
                format!("'{repository_id}' is not of the form owner/name"),
            ));
        }
    }

    // The resource name is built from ASCII alphanumerics only.
    if !repository_id
        .split_once('/')
        .is_some_and(|(_, name)| name.chars().any(|c| c.is_ascii_alphanumeric()))
    {
        return Err(FleetError::invalid(
            index,
            "repositoryId",
            format!("'{repository_id}' has no characters usable in a resource name"),
        ));
    }

    let min_runners = runner_count(index, "minRunners", record.min_runners, DEFAULT_MIN_RUNNERS)?;
    let max_runners = runner_count(index, "maxRunners", record.max_runners, DEFAULT_MAX_RUNNERS)?;

    if max_runners < min_runners {
        return Err(FleetError::invalid(
            index,
            "maxRunners",
            format!("{max_runners} is below minRunners ({min_runners})"),
        ));
    }

    Ok(RepositoryDescriptor {
        repository_id,
        release_name,
        min_runners,
        max_runners,
    })
}

fn required(index: usize, field: &str, value: Option<String>) -> FleetResult<String> {
    match value.as_deref().map(str::trim) {
        Some("") => Err(FleetError::invalid(index, field, "must not be empty")),
        Some(v) => Ok(v.to_string()),
        None => Err(FleetError::invalid(index, field, "is required")),
    }
}

/// Helm release names are dot-separated DNS-1123 labels of at most 53 characters.
fn check_release_name(name: &str) -> Result<(), String> {
    if name.len() > MAX_RELEASE_NAME_LEN {
        return Err(format!(
            "'{name}' is longer than {MAX_RELEASE_NAME_LEN} characters"
        ));
    }

    let alnum = |b: u8| b.is_ascii_lowercase() || b.is_ascii_digit();
    let valid_label = |label: &str| {
        let bytes = label.as_bytes();
        match (bytes.first(), bytes.last()) {
            (Some(&first), Some(&last)) => {
                alnum(first) && alnum(last) && bytes.iter().all(|&b| alnum(b) || b == b'-')
            }
            _ => false,
        }
    };

    if name.split('.').all(valid_label) {
        Ok(())
    } else {
        Err(format!(
            "'{name}' must be lowercase alphanumerics and '-', starting and ending alphanumeric"
        ))
    }
}

fn runner_count(index: usize, field: &str, value: Option<i64>, default: u32) -> FleetResult<u32> {
    match value {
        None => Ok(default),
        Some(v) => u32::try_from(v)
            .map_err(|_| FleetError::invalid(index, field, format!("{v} is out of range"))),
    }
}
