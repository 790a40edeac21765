//! Camel runtime catalog

use super::{CatalogError, normalize_dependency};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const EMBEDDED_CATALOG: &str = include_str!("catalog/camel-catalog-quarkus.yaml");

/// Runtime provider of every catalog this operator ships
pub const RUNTIME_PROVIDER_QUARKUS: &str = "quarkus";

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CamelCatalog {
    pub runtime: RuntimeSpec,
    #[serde(default)]
    pub artifacts: BTreeMap<String, CamelArtifact>,
    #[serde(default)]
    pub loaders: BTreeMap<String, CamelLoader>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeSpec {
    pub version: String,
    pub provider: String,
    pub application_class: String,
    #[serde(default)]
    pub dependencies: Vec<MavenArtifact>,
    #[serde(default)]
    pub capabilities: BTreeMap<String, Capability>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Capability {
    #[serde(default)]
    pub dependencies: Vec<MavenArtifact>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MavenArtifact {
    pub group_id: String,
    pub artifact_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl MavenArtifact {
    /// Dependency in `mvn:group:artifact[:version]` form
    pub fn dependency_id(&self) -> String {
        match &self.version {
            Some(version) => format!("mvn:{}:{}:{}", self.group_id, self.artifact_id, version),
            None => format!("mvn:{}:{}", self.group_id, self.artifact_id),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CamelArtifact {
    pub group_id: String,
    pub artifact_id: String,
    #[serde(default)]
    pub schemes: Vec<CamelScheme>,
}

impl CamelArtifact {
    /// Dependency in the `camel:xxx` short form
    pub fn dependency_id(&self) -> String {
        normalize_dependency(&self.artifact_id)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CamelScheme {
    pub id: String,
    /// Consuming from this scheme opens an HTTP endpoint
    #[serde(default)]
    pub http: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CamelLoader {
    pub group_id: String,
    pub artifact_id: String,
    #[serde(default)]
    pub languages: Vec<String>,
    #[serde(default)]
    pub dependencies: Vec<MavenArtifact>,
}

impl CamelCatalog {
    /// Catalog embedded in the binary
    pub fn embedded() -> Result<Self, CatalogError> {
        Self::from_yaml(EMBEDDED_CATALOG)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self, CatalogError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Artifact providing the given endpoint scheme
    pub fn artifact_for_scheme(&self, scheme: &str) -> Option<&CamelArtifact> {
        self.artifacts
            .values()
            .find(|artifact| artifact.schemes.iter().any(|s| s.id == scheme))
    }

    pub fn scheme(&self, scheme: &str) -> Option<&CamelScheme> {
        self.artifacts
            .values()
            .flat_map(|artifact| artifact.schemes.iter())
            .find(|s| s.id == scheme)
    }

    /// Loader able to run sources written in `language`
    pub fn loader_for_language(&self, language: &str) -> Option<&CamelLoader> {
        self.loaders
            .values()
            .find(|loader| loader.languages.iter().any(|l| l == language))
    }

    pub fn has_artifact(&self, name: &str) -> bool {
        self.artifacts.contains_key(name)
            || self.artifacts.contains_key(&format!("camel-quarkus-{}", name))
    }

    pub fn matches(&self, version: &str, provider: &str) -> bool {
        self.runtime.version == version && self.runtime.provider == provider
    }
}

/// Pick the catalog matching a runtime version from the available ones
pub fn find_catalog<'a>(
    catalogs: &'a [CamelCatalog],
    version: &str,
    provider: &str,
) -> Result<&'a CamelCatalog, CatalogError> {
    catalogs
        .iter()
        .find(|c| c.matches(version, provider))
        .ok_or_else(|| CatalogError::NotFound {
            version: version.to_string(),
            provider: provider.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedded_catalog_parses() {
        let catalog = CamelCatalog::embedded().unwrap();
        assert_eq!(catalog.runtime.provider, RUNTIME_PROVIDER_QUARKUS);
        assert!(!catalog.runtime.application_class.is_empty());
        assert!(catalog.runtime.capabilities.contains_key("health"));
    }

    #[test]
    fn test_artifact_for_scheme() {
        let catalog = CamelCatalog::embedded().unwrap();
        let artifact = catalog.artifact_for_scheme("direct").unwrap();
        assert_eq!(artifact.dependency_id(), "camel:direct");
        assert!(catalog.artifact_for_scheme("unknown-scheme").is_none());
        assert!(catalog.scheme("platform-http").unwrap().http);
    }

    #[test]
    fn test_loader_for_language() {
        let catalog = CamelCatalog::embedded().unwrap();
        let loader = catalog.loader_for_language("java").unwrap();
        assert_eq!(loader.artifact_id, "camel-quarkus-java-joor-dsl");
    }

    #[test]
    fn test_find_catalog_version_mismatch() {
        let catalogs = vec![CamelCatalog::embedded().unwrap()];
        let err = find_catalog(&catalogs, "0.0.1", RUNTIME_PROVIDER_QUARKUS).unwrap_err();
        assert_eq!(
            err.to_string(),
            "unable to find catalog matching version requirement: runtime=0.0.1, provider=quarkus"
        );
    }

    #[test]
    fn test_maven_dependency_id() {
        let artifact = MavenArtifact {
            group_id: "org.apache.camel.k".to_string(),
            artifact_id: "camel-k-runtime".to_string(),
            version: None,
        };
        assert_eq!(artifact.dependency_id(), "mvn:org.apache.camel.k:camel-k-runtime");
    }
}
