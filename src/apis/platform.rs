//! IntegrationPlatform custom resource

use super::{TraitProfile, TraitsSpec};
use kube::CustomResource;
use serde::{Deserialize, Serialize};

/// Name given to the platform created on demand by the platform trait
pub const DEFAULT_PLATFORM_NAME: &str = "camel-k";

/// Operator wide defaults shared by every Integration in a namespace
#[derive(CustomResource, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[kube(
    group = "camel.apache.org",
    version = "v1",
    kind = "IntegrationPlatform",
    plural = "integrationplatforms",
    shortname = "ip",
    namespaced,
    status = "IntegrationPlatformStatus",
    schema = "disabled"
)]
#[serde(rename_all = "camelCase")]
pub struct IntegrationPlatformSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster: Option<PlatformCluster>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<TraitProfile>,

    #[serde(default)]
    pub build: PlatformBuildSpec,

    #[serde(default, skip_serializing_if = "TraitsSpec::is_empty")]
    pub traits: TraitsSpec,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlatformCluster {
    Kubernetes,
    OpenShift,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformBuildSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime_version: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime_provider: Option<String>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum IntegrationPlatformPhase {
    #[default]
    #[serde(rename = "")]
    None,
    Creating,
    Warming,
    Ready,
    Error,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrationPlatformStatus {
    #[serde(default)]
    pub phase: IntegrationPlatformPhase,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl IntegrationPlatform {
    pub fn phase(&self) -> IntegrationPlatformPhase {
        self.status.as_ref().map(|s| s.phase).unwrap_or_default()
    }

    /// Profile implied by the platform: explicit profile, else the cluster type
    pub fn profile(&self) -> Option<TraitProfile> {
        self.spec.profile.or(match self.spec.cluster {
            Some(PlatformCluster::OpenShift) => Some(TraitProfile::OpenShift),
            Some(PlatformCluster::Kubernetes) => Some(TraitProfile::Kubernetes),
            None => None,
        })
    }
}
