//! IntegrationKit custom resource

use super::{IntegrationKitCondition, TraitProfile, TraitsSpec};
use kube::CustomResource;
use serde::{Deserialize, Serialize};

/// Desired state of an IntegrationKit
#[derive(CustomResource, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[kube(
    group = "camel.apache.org",
    version = "v1",
    kind = "IntegrationKit",
    plural = "integrationkits",
    shortname = "ik",
    namespaced,
    status = "IntegrationKitStatus",
    schema = "disabled"
)]
#[serde(rename_all = "camelCase")]
pub struct IntegrationKitSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<TraitProfile>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,

    #[serde(default, skip_serializing_if = "TraitsSpec::is_empty")]
    pub traits: TraitsSpec,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum IntegrationKitPhase {
    #[default]
    #[serde(rename = "")]
    None,
    Initialization,
    WaitingForPlatform,
    BuildSubmitted,
    BuildRunning,
    Ready,
    Error,
}

/// Observed state of an IntegrationKit
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrationKitStatus {
    #[serde(default)]
    pub phase: IntegrationKitPhase,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime_version: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime_provider: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<IntegrationKitCondition>,
}

impl IntegrationKit {
    pub fn phase(&self) -> IntegrationKitPhase {
        self.status.as_ref().map(|s| s.phase).unwrap_or_default()
    }

    pub fn status_mut(&mut self) -> &mut IntegrationKitStatus {
        self.status.get_or_insert_with(IntegrationKitStatus::default)
    }

    /// Image built for this kit, preferring the observed one
    pub fn image(&self) -> Option<&str> {
        self.status
            .as_ref()
            .and_then(|s| s.image.as_deref())
            .or(self.spec.image.as_deref())
    }
}
