//! TOML credential registry
//!
//! Statistics sources and their SUSHI credentials, one `[[sources]]` table
//! each:
//!
//! ```toml
//! [[sources]]
//! id = 1
//! name = "Example Platform"
//! base_url = "https://sushi.example.org/counter/r5"
//! customer_id = "cust-1"
//! requestor_id = "req-1"
//! partial_ranges = false
//! ```

use crate::types::CredentialStore;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use sushi_common::{Error, Result, StatisticsSource, SushiEndpoint};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceEntry {
    pub id: i64,
    pub name: String,
    #[serde(flatten)]
    pub endpoint: SushiEndpoint,
}

impl SourceEntry {
    pub fn source(&self) -> StatisticsSource {
        StatisticsSource::new(self.id, self.name.clone())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TomlCredentialRegistry {
    #[serde(default)]
    sources: Vec<SourceEntry>,
}

impl TomlCredentialRegistry {
    pub fn new(sources: Vec<SourceEntry>) -> Self {
        Self { sources }
    }

    /// Read a registry file; duplicate source ids are rejected
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
        let registry: Self = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))?;

        let mut seen = std::collections::BTreeSet::new();
        for entry in &registry.sources {
            if !seen.insert(entry.id) {
                return Err(Error::Config(format!(
                    "{} lists statistics source {} more than once",
                    path.display(),
                    entry.id
                )));
            }
        }

        tracing::info!(sources = registry.sources.len(), "Loaded SUSHI credentials from {}", path.display());
        Ok(registry)
    }

    pub fn sources(&self) -> &[SourceEntry] {
        &self.sources
    }

    pub fn find(&self, id: i64) -> Option<&SourceEntry> {
        self.sources.iter().find(|entry| entry.id == id)
    }
}

#[async_trait]
impl CredentialStore for TomlCredentialRegistry {
    async fn credentials_for(&self, source: &StatisticsSource) -> Result<Option<SushiEndpoint>> {
        Ok(self.find(source.id).map(|entry| entry.endpoint.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const REGISTRY: &str = r#"
        [[sources]]
        id = 1
        name = "Example Platform"
        base_url = "https://sushi.example.org/r5"
        customer_id = "cust-1"
        api_key = "secret"

        [[sources]]
        id = 2
        name = "Other Platform"
        base_url = "https://other.example.org/sushi"
        customer_id = "cust-2"
        partial_ranges = false
    "#;

    #[test]
    fn test_registry_parses_flattened_endpoints() {
        let registry: TomlCredentialRegistry = toml::from_str(REGISTRY).unwrap();
        assert_eq!(registry.sources().len(), 2);

        let first = registry.find(1).unwrap();
        assert_eq!(first.endpoint.api_key.as_deref(), Some("secret"));
        assert!(first.endpoint.partial_ranges);
        assert!(!registry.find(2).unwrap().endpoint.partial_ranges);
        assert_eq!(first.source(), StatisticsSource::new(1, "Example Platform"));
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sources.toml");
        std::fs::write(&path, format!("{}\n{}", REGISTRY, REGISTRY)).unwrap();

        assert!(matches!(TomlCredentialRegistry::load(&path), Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn test_unknown_source_has_no_credentials() {
        let registry: TomlCredentialRegistry = toml::from_str(REGISTRY).unwrap();
        let creds = registry
            .credentials_for(&StatisticsSource::new(99, "Missing"))
            .await
            .unwrap();
        assert!(creds.is_none());
    }
}
