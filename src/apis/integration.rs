//! Integration custom resource

use super::{IntegrationCondition, KitReference, TraitProfile, TraitsSpec};
use kube::CustomResource;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Desired state of an Integration
#[derive(CustomResource, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[kube(
    group = "camel.apache.org",
    version = "v1",
    kind = "Integration",
    plural = "integrations",
    shortname = "it",
    namespaced,
    status = "IntegrationStatus",
    schema = "disabled"
)]
#[serde(rename_all = "camelCase")]
pub struct IntegrationSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<TraitProfile>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<SourceSpec>,

    /// User supplied dependencies (`camel:xxx`, `mvn:g:a[:v]`, `camel-quarkus-xxx`, ...)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,

    #[serde(default, skip_serializing_if = "TraitsSpec::is_empty")]
    pub traits: TraitsSpec,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub integration_kit: Option<KitReference>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_account_name: Option<String>,
}

/// A single route source
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceSpec {
    pub name: String,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<Language>,
}

impl SourceSpec {
    /// Declared language, falling back to the one implied by the file extension
    pub fn infer_language(&self) -> Option<Language> {
        self.language.or_else(|| Language::from_file_name(&self.name))
    }
}

/// Route DSL a source is written in
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Java,
    Groovy,
    #[serde(rename = "js")]
    JavaScript,
    #[serde(rename = "kts")]
    Kotlin,
    Xml,
    Yaml,
}

impl Language {
    /// Identifier used by the runtime catalog loaders
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Java => "java",
            Language::Groovy => "groovy",
            Language::JavaScript => "js",
            Language::Kotlin => "kts",
            Language::Xml => "xml",
            Language::Yaml => "yaml",
        }
    }

    pub fn from_file_name(name: &str) -> Option<Language> {
        let extension = Path::new(name).extension()?.to_str()?;
        match extension {
            "java" => Some(Language::Java),
            "groovy" => Some(Language::Groovy),
            "js" => Some(Language::JavaScript),
            "kts" => Some(Language::Kotlin),
            "xml" => Some(Language::Xml),
            "yaml" | "yml" => Some(Language::Yaml),
            _ => None,
        }
    }
}

/// Lifecycle phase of an Integration
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IntegrationPhase {
    #[default]
    #[serde(rename = "")]
    None,
    WaitingForPlatform,
    Initialization,
    BuildingKit,
    Deploying,
    Running,
    Error,
}

impl IntegrationPhase {
    /// Phases in which the workload exists (or is being created)
    pub const RUNNING: [IntegrationPhase; 3] = [
        IntegrationPhase::Deploying,
        IntegrationPhase::Running,
        IntegrationPhase::Error,
    ];
}

impl std::str::FromStr for IntegrationPhase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "" | "none" => Ok(IntegrationPhase::None),
            "waitingforplatform" | "waiting-for-platform" => {
                Ok(IntegrationPhase::WaitingForPlatform)
            }
            "initialization" => Ok(IntegrationPhase::Initialization),
            "buildingkit" | "building-kit" => Ok(IntegrationPhase::BuildingKit),
            "deploying" => Ok(IntegrationPhase::Deploying),
            "running" => Ok(IntegrationPhase::Running),
            "error" => Ok(IntegrationPhase::Error),
            _ => Err(format!("unknown integration phase: {}", s)),
        }
    }
}

/// Observed state of an Integration
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrationStatus {
    #[serde(default)]
    pub phase: IntegrationPhase,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<TraitProfile>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub integration_kit: Option<KitReference>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime_version: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime_provider: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub capabilities: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<IntegrationCondition>,
}

impl Integration {
    /// Current phase, `None` when the status has not been initialised
    pub fn phase(&self) -> IntegrationPhase {
        self.status.as_ref().map(|s| s.phase).unwrap_or_default()
    }

    /// Mutable status, created on first access
    pub fn status_mut(&mut self) -> &mut IntegrationStatus {
        self.status.get_or_insert_with(IntegrationStatus::default)
    }

    /// Metadata generation, defaulting to 1 for objects never persisted
    pub fn generation(&self) -> i64 {
        self.metadata.generation.unwrap_or(1)
    }
}
