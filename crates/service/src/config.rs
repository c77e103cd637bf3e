//! Versioned service configuration.

use std::collections::BTreeMap;
use std::fmt::Write;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Configuration handed to [`crate::ServiceController::configure`].
///
/// Computed fresh every round; its fingerprint decides whether the local
/// instance needs a restart.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ServiceConfig {
    version: u32,
    params: BTreeMap<String, String>,
}

impl ServiceConfig {
    /// Layout version of the parameter set. Bumping it forces a restart.
    pub const SCHEMA_VERSION: u32 = 1;

    /// An empty configuration at the current schema version.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            version: Self::SCHEMA_VERSION,
            params: BTreeMap::new(),
        }
    }

    /// Builder-style [`Self::insert`].
    #[must_use]
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    /// Set a parameter.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.params.insert(key.into(), value.into());
    }

    /// Read a parameter.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// All parameters in key order.
    #[must_use]
    pub const fn params(&self) -> &BTreeMap<String, String> {
        &self.params
    }

    /// The schema version.
    #[must_use]
    pub const fn version(&self) -> u32 {
        self.version
    }

    /// Hex SHA-256 over the version and the length-prefixed parameters.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        let mut canonical = format!("v{}\n", self.version);
        for (key, value) in &self.params {
            let _ = writeln!(canonical, "{}:{key}={}:{value}", key.len(), value.len());
        }
        hex::encode(Sha256::digest(canonical.as_bytes()))
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_is_order_independent() {
        let a = ServiceConfig::new()
            .with_param("peers", "10.0.0.1,10.0.0.2")
            .with_param("advertise_address", "10.0.0.1");
        let b = ServiceConfig::new()
            .with_param("advertise_address", "10.0.0.1")
            .with_param("peers", "10.0.0.1,10.0.0.2");
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint().len(), 64);
    }

    #[test]
    fn test_fingerprint_tracks_values() {
        let a = ServiceConfig::new().with_param("peers", "10.0.0.1");
        let b = ServiceConfig::new().with_param("peers", "10.0.0.2");
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn test_fingerprint_is_not_fooled_by_separators() {
        let a = ServiceConfig::new().with_param("a", "b=c");
        let b = ServiceConfig::new().with_param("a=b", "c");
        assert_ne!(a.fingerprint(), b.fingerprint());
    }
}
