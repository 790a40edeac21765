//! Operator configuration
//!
//! Built-in defaults, an optional YAML file and environment variable overrides.

mod defaults;
pub mod loader;
pub mod paths;
pub mod schema;

pub use loader::ConfigLoader;
pub use schema::OperatorConfig;

/// Keys accepted by [`get_config_value`] and [`set_config_value`]
pub const CONFIG_KEYS: [&str; 6] = [
    "operatorId",
    "defaultProfile",
    "defaultRuntimeVersion",
    "postActionQueue",
    "defaultContainerImage",
    "agentDownloadImage",
];

/// Get a configuration value by key
pub fn get_config_value(config: &OperatorConfig, key: &str) -> anyhow::Result<String> {
    match key {
        "operatorId" => Ok(config.operator_id.clone()),
        "defaultProfile" => Ok(config
            .default_profile
            .map(|p| p.to_string())
            .unwrap_or_default()),
        "defaultRuntimeVersion" => Ok(config.default_runtime_version.clone().unwrap_or_default()),
        "postActionQueue" => Ok(config.post_action_queue.to_string()),
        "defaultContainerImage" => Ok(config.default_container_image.clone().unwrap_or_default()),
        "agentDownloadImage" => Ok(config.agent_download_image.clone()),
        _ => Err(anyhow::anyhow!("Unknown configuration key: {}", key)),
    }
}

/// Set a configuration value by key. An empty value resets optional keys.
pub fn set_config_value(config: &mut OperatorConfig, key: &str, value: &str) -> anyhow::Result<()> {
    use anyhow::Context;

    let optional = |value: &str| (!value.is_empty()).then(|| value.to_string());
    match key {
        "operatorId" => {
            if value.trim().is_empty() {
                return Err(anyhow::anyhow!("operatorId must not be empty"));
            }
            config.operator_id = value.to_string();
        }
        "defaultProfile" => {
            config.default_profile = if value.is_empty() {
                None
            } else {
                Some(value.parse().map_err(|e: String| anyhow::anyhow!(e))?)
            };
        }
        "defaultRuntimeVersion" => {
            config.default_runtime_version = optional(value);
        }
        "postActionQueue" => {
            let queue: usize = value
                .parse()
                .context("postActionQueue must be a positive number")?;
            if queue == 0 {
                return Err(anyhow::anyhow!("postActionQueue must be greater than 0"));
            }
            config.post_action_queue = queue;
        }
        "defaultContainerImage" => {
            config.default_container_image = optional(value);
        }
        "agentDownloadImage" => {
            config.agent_download_image = value.to_string();
        }
        _ => return Err(anyhow::anyhow!("Unknown configuration key: {}", key)),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apis::TraitProfile;

    #[test]
    fn test_get_set_roundtrip_keys() {
        let mut config = OperatorConfig::default();
        set_config_value(&mut config, "defaultProfile", "openshift").unwrap();
        assert_eq!(config.default_profile, Some(TraitProfile::OpenShift));
        assert_eq!(get_config_value(&config, "defaultProfile").unwrap(), "OpenShift");

        set_config_value(&mut config, "defaultProfile", "").unwrap();
        assert!(config.default_profile.is_none());

        for key in CONFIG_KEYS {
            assert!(get_config_value(&config, key).is_ok(), "{}", key);
        }
    }

    #[test]
    fn test_invalid_values() {
        let mut config = OperatorConfig::default();
        assert!(set_config_value(&mut config, "postActionQueue", "0").is_err());
        assert!(set_config_value(&mut config, "postActionQueue", "many").is_err());
        assert!(set_config_value(&mut config, "defaultProfile", "mesos").is_err());
        assert!(set_config_value(&mut config, "operatorId", " ").is_err());
        assert!(set_config_value(&mut config, "unknown", "x").is_err());
    }
}
