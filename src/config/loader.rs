//! Configuration loading and merging logic
//!
//! Precedence order (highest to lowest):
//! 1. Environment variable overrides
//! 2. Configuration file (explicit path, else the root config)
//! 3. Built-in defaults

use super::{defaults, paths, schema::OperatorConfig};
use crate::apis::TraitProfile;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::warn;

pub const ENV_OPERATOR_ID: &str = "CAMELK_TRAITS_OPERATOR_ID";
pub const ENV_DEFAULT_PROFILE: &str = "CAMELK_TRAITS_DEFAULT_PROFILE";
pub const ENV_RUNTIME_VERSION: &str = "CAMELK_TRAITS_RUNTIME_VERSION";
pub const ENV_POST_ACTION_QUEUE: &str = "CAMELK_TRAITS_POST_ACTION_QUEUE";

/// Configuration loader
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with all layers merged. A missing root config is not an
    /// error, a missing explicit file is.
    pub fn load(path: Option<&Path>) -> Result<OperatorConfig> {
        let config = match path {
            Some(path) => Self::load_file(path)?,
            None => {
                let root = paths::root_config_path();
                if root.exists() {
                    Self::load_file(&root)?
                } else {
                    Self::load_defaults()
                }
            }
        };
        Ok(Self::apply_env_overrides(config))
    }

    /// Load configuration from a file
    pub fn load_file(path: &Path) -> Result<OperatorConfig> {
        if !path.exists() {
            return Err(anyhow::anyhow!("Config file not found: {}", path.display()));
        }

        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: OperatorConfig = serde_yaml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Validate the configuration file and the merged result
    pub fn validate(path: Option<&Path>) -> Result<()> {
        let config = Self::load(path).context("Failed to load merged configuration")?;
        if config.operator_id.trim().is_empty() {
            return Err(anyhow::anyhow!("operatorId must not be empty"));
        }
        if config.post_action_queue == 0 {
            return Err(anyhow::anyhow!("postActionQueue must be greater than 0"));
        }
        Ok(())
    }

    /// Load default configuration
    pub fn load_defaults() -> OperatorConfig {
        defaults::default_config()
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(mut config: OperatorConfig) -> OperatorConfig {
        if let Ok(operator_id) = std::env::var(ENV_OPERATOR_ID) {
            config.operator_id = operator_id;
        }

        if let Ok(profile) = std::env::var(ENV_DEFAULT_PROFILE) {
            match profile.parse::<TraitProfile>() {
                Ok(profile) => config.default_profile = Some(profile),
                Err(err) => warn!("Ignoring {}: {}", ENV_DEFAULT_PROFILE, err),
            }
        }

        if let Ok(version) = std::env::var(ENV_RUNTIME_VERSION) {
            config.default_runtime_version = Some(version);
        }

        if let Ok(queue) = std::env::var(ENV_POST_ACTION_QUEUE) {
            match queue.parse::<usize>() {
                Ok(queue) => config.post_action_queue = queue,
                Err(err) => warn!("Ignoring {}: {}", ENV_POST_ACTION_QUEUE, err),
            }
        }

        config
    }

    /// Save configuration to a file
    pub fn save(config: &OperatorConfig, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            paths::ensure_dir(parent)?;
        }

        let yaml =
            serde_yaml::to_string(config).context("Failed to serialize configuration to YAML")?;

        std::fs::write(path, yaml)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Save root configuration
    pub fn save_root(config: &OperatorConfig) -> Result<PathBuf> {
        let path = paths::root_config_path();
        Self::save(config, &path)?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_defaults() {
        let config = ConfigLoader::load_defaults();
        assert_eq!(config.operator_id, "camel-k");
    }

    #[test]
    fn test_missing_explicit_file() {
        let err = ConfigLoader::load_file(Path::new("/nonexistent/camelk.yaml")).unwrap_err();
        assert!(err.to_string().contains("Config file not found"));
    }

    #[test]
    fn test_env_overrides() {
        // SAFETY: set_var is unsafe in Rust 2024 due to potential data races.
        // No other unit test reads these variables.
        unsafe {
            std::env::set_var(ENV_OPERATOR_ID, "env-operator");
            std::env::set_var(ENV_DEFAULT_PROFILE, "knative");
            std::env::set_var(ENV_POST_ACTION_QUEUE, "not-a-number");
        }

        let config = ConfigLoader::apply_env_overrides(OperatorConfig::default());

        assert_eq!(config.operator_id, "env-operator");
        assert_eq!(config.default_profile, Some(TraitProfile::Knative));
        assert_eq!(config.post_action_queue, 64);

        // SAFETY: see above
        unsafe {
            std::env::remove_var(ENV_OPERATOR_ID);
            std::env::remove_var(ENV_DEFAULT_PROFILE);
            std::env::remove_var(ENV_POST_ACTION_QUEUE);
        }
    }
}
