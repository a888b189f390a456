//! Secret domain types
//!
//! Credentials are opaque: they can be injected into a run environment but
//! never printed, serialized or logged.

use std::collections::BTreeMap;
use thiserror::Error;

/// Platform key identifier
pub const FAL_KEY_ID: &str = "FAL_KEY_ID";

/// Platform key secret
pub const FAL_KEY_SECRET: &str = "FAL_KEY_SECRET";

/// Every credential name this service manages
pub const CREDENTIAL_NAMES: [&str; 2] = [FAL_KEY_ID, FAL_KEY_SECRET];

/// An opaque secret string
#[derive(Clone, PartialEq, Eq)]
pub struct SecretValue(String);

impl SecretValue {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the raw value; only call this when handing it to a child process
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for SecretValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SecretValue(***)")
    }
}

impl std::fmt::Display for SecretValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("***")
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SecretError {
    #[error("Required secret {0} is not configured")]
    Missing(String),
}

/// The secret store a run draws its credentials from
#[derive(Debug, Clone, Default)]
pub struct CredentialSet {
    secrets: BTreeMap<String, SecretValue>,
}

impl CredentialSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads the managed credentials from the current process environment.
    /// Unset or empty variables are left out.
    pub fn from_env() -> Self {
        let mut set = Self::new();
        for name in CREDENTIAL_NAMES {
            if let Ok(value) = std::env::var(name) {
                if !value.is_empty() {
                    set.insert(name, SecretValue::new(value));
                }
            }
        }
        set
    }

    pub fn insert(&mut self, name: impl Into<String>, value: SecretValue) {
        self.secrets.insert(name.into(), value);
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(name, SecretValue::new(value));
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.secrets.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.secrets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.secrets.is_empty()
    }

    /// Returns exactly the declared secrets, failing on the first missing one
    pub fn select(&self, required: &[String]) -> Result<Vec<(String, SecretValue)>, SecretError> {
        required
            .iter()
            .map(|name| {
                self.secrets
                    .get(name)
                    .map(|value| (name.clone(), value.clone()))
                    .ok_or_else(|| SecretError::Missing(name.clone()))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secret_value_is_redacted() {
        let secret = SecretValue::new("hunter2");
        assert_eq!(format!("{}", secret), "***");
        assert!(!format!("{:?}", secret).contains("hunter2"));
        assert_eq!(secret.expose(), "hunter2");
    }

    #[test]
    fn test_select_returns_only_declared() {
        let set = CredentialSet::new()
            .with(FAL_KEY_ID, "id")
            .with(FAL_KEY_SECRET, "secret")
            .with("UNRELATED", "x");

        let selected = set.select(&[FAL_KEY_ID.to_string()]).unwrap();
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].0, FAL_KEY_ID);
        assert_eq!(selected[0].1.expose(), "id");

        assert!(set.select(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_select_missing_secret() {
        let set = CredentialSet::new().with(FAL_KEY_ID, "id");
        let err = set
            .select(&[FAL_KEY_ID.to_string(), FAL_KEY_SECRET.to_string()])
            .unwrap_err();
        assert_eq!(err, SecretError::Missing(FAL_KEY_SECRET.to_string()));
    }
}
