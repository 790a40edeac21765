//! Configuration schema definitions
//!
//! Defines the structure of the operator configuration file using serde.

use super::defaults;
use crate::apis::TraitProfile;
use serde::{Deserialize, Serialize};

/// Operator wide settings consumed by the trait pipeline
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OperatorConfig {
    /// Identifier of the operator, exported to the workloads
    #[serde(default = "defaults::operator_id")]
    pub operator_id: String,

    /// Profile used when neither the Integration nor the platform sets one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_profile: Option<TraitProfile>,

    /// Camel runtime version used when nothing else pins one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_runtime_version: Option<String>,

    /// Capacity of the background post action queue
    #[serde(default = "defaults::post_action_queue")]
    pub post_action_queue: usize,

    /// Integration image used when neither the Integration nor its kit carries one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_container_image: Option<String>,

    /// Image of the init container downloading JVM agents, must provide `curl`
    #[serde(default = "defaults::agent_download_image")]
    pub agent_download_image: String,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            operator_id: defaults::operator_id(),
            default_profile: None,
            default_runtime_version: None,
            post_action_queue: defaults::post_action_queue(),
            default_container_image: None,
            agent_download_image: defaults::agent_download_image(),
        }
    }
}
