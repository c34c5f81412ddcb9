//! Secrets handed through to the provisioning engine.

use crate::graph::CredentialKey;

/// A secret string that never shows up in `Debug` output or logs.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretValue(String);

impl SecretValue {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The raw value. Only the engine should call this, right before use.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for SecretValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SecretValue(***)")
    }
}

/// Credentials resolvable by [`CredentialKey`].
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    github_token: Option<SecretValue>,
}

impl Credentials {
    #[must_use]
    pub fn new(github_token: SecretValue) -> Self {
        Self {
            github_token: Some(github_token),
        }
    }

    #[must_use]
    pub fn get(&self, key: CredentialKey) -> Option<&SecretValue> {
        match key {
            CredentialKey::GithubToken => self.github_token.as_ref(),
        }
    }
}
