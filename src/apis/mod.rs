//! Camel K custom resources consumed by the trait pipeline
//!
//! Only the fields read or written by traits are modelled. Anything else present on
//! the cluster objects is ignored when decoding.

mod condition;
mod integration;
mod kit;
mod platform;

pub use condition::*;
pub use integration::*;
pub use kit::*;
pub use platform::*;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// API group of every Camel K resource
pub const GROUP: &str = "camel.apache.org";

/// Label linking generated resources to their Integration
pub const INTEGRATION_LABEL: &str = "camel.apache.org/integration";

/// Label carrying the Integration generation that produced a resource
pub const GENERATION_LABEL: &str = "camel.apache.org/generation";

/// Trait configuration as found on the custom resources: trait id to property map.
///
/// The `addons` key holds a nested map of addon trait ids.
pub type TraitsSpec = BTreeMap<String, serde_json::Value>;

/// Deployment profile a trait may be restricted to
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TraitProfile {
    #[default]
    Kubernetes,
    Knative,
    OpenShift,
}

impl TraitProfile {
    pub fn as_str(&self) -> &'static str {
        match self {
            TraitProfile::Kubernetes => "Kubernetes",
            TraitProfile::Knative => "Knative",
            TraitProfile::OpenShift => "OpenShift",
        }
    }
}

impl fmt::Display for TraitProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TraitProfile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "kubernetes" => Ok(TraitProfile::Kubernetes),
            "knative" => Ok(TraitProfile::Knative),
            "openshift" => Ok(TraitProfile::OpenShift),
            _ => Err(format!("unknown trait profile: {}", s)),
        }
    }
}

/// Reference to an IntegrationKit
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KitReference {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_parse() {
        assert_eq!("knative".parse::<TraitProfile>(), Ok(TraitProfile::Knative));
        assert_eq!("OpenShift".parse::<TraitProfile>(), Ok(TraitProfile::OpenShift));
        assert!("nomad".parse::<TraitProfile>().is_err());
    }

    #[test]
    fn test_profile_serde_name() {
        let yaml = serde_yaml::to_string(&TraitProfile::Knative).unwrap();
        assert_eq!(yaml.trim(), "Knative");
    }
}
