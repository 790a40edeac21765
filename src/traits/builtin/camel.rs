//! Camel runtime resolution
//!
//! Picks the runtime catalog matching the requested runtime version. Every trait
//! needing catalog knowledge (dependencies, health capability, JVM main class) runs
//! after this one.

use crate::camel::{RUNTIME_PROVIDER_QUARKUS, find_catalog};
use crate::traits::decode::lenient;
use crate::traits::{
    BaseTrait, Configured, Environment, ORDER_CAMEL, Trait, TraitError, TraitResult,
};
use serde::Deserialize;

pub const ID: &str = "camel";

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CamelConfig {
    #[serde(deserialize_with = "lenient::opt_bool")]
    pub enabled: Option<bool>,
    /// Runtime version to run the Integration with
    #[serde(deserialize_with = "lenient::opt_string")]
    pub runtime_version: Option<String>,
    /// Application properties as `key=value`
    #[serde(deserialize_with = "lenient::string_list")]
    pub properties: Vec<String>,
}

pub struct CamelTrait {
    base: BaseTrait,
    pub config: CamelConfig,
}

pub(crate) fn new_trait() -> Box<dyn Trait> {
    Box::new(CamelTrait {
        base: BaseTrait::platform(ID, ORDER_CAMEL),
        config: CamelConfig::default(),
    })
}

impl CamelTrait {
    fn runtime_version(&self, env: &Environment) -> Option<String> {
        self.config
            .runtime_version
            .clone()
            .or_else(|| {
                env.integration
                    .as_ref()
                    .and_then(|it| it.status.as_ref())
                    .and_then(|s| s.runtime_version.clone())
            })
            .or_else(|| {
                env.integration_kit
                    .as_ref()
                    .and_then(|kit| kit.status.as_ref())
                    .and_then(|s| s.runtime_version.clone())
            })
            .or_else(|| {
                env.platform
                    .as_ref()
                    .and_then(|p| p.spec.build.runtime_version.clone())
            })
            .or_else(|| env.config.default_runtime_version.clone())
            .or_else(|| {
                env.available_catalogs
                    .first()
                    .map(|c| c.runtime.version.clone())
            })
    }

    fn runtime_provider(env: &Environment) -> String {
        env.platform
            .as_ref()
            .and_then(|p| p.spec.build.runtime_provider.clone())
            .unwrap_or_else(|| RUNTIME_PROVIDER_QUARKUS.to_string())
    }
}

impl Trait for CamelTrait {
    trait_base!();

    fn configure(&mut self, env: &Environment) -> TraitResult<Configured> {
        if self.config.enabled == Some(false) {
            return Err(TraitError::InvalidConfiguration(
                "trait camel cannot be disabled".to_string(),
            ));
        }
        if env.integration.is_none() && env.integration_kit.is_none() {
            return Ok((false, None));
        }

        if self.config.runtime_version.is_none() {
            self.config.runtime_version = self.runtime_version(env);
        }
        Ok((true, None))
    }

    fn apply(&mut self, env: &mut Environment) -> TraitResult<()> {
        let version = self.config.runtime_version.clone().unwrap_or_default();
        let provider = Self::runtime_provider(env);
        let catalog = find_catalog(&env.available_catalogs, &version, &provider)?.clone();
        env.camel_catalog = Some(catalog);

        if let Some(integration) = env.integration.as_mut() {
            let status = integration.status_mut();
            status.runtime_version = Some(version.clone());
            status.runtime_provider = Some(provider.clone());
        } else if let Some(kit) = env.integration_kit.as_mut() {
            let status = kit.status_mut();
            status.runtime_version = Some(version.clone());
            status.runtime_provider = Some(provider.clone());
        }

        for property in &self.config.properties {
            let (key, value) = property.split_once('=').ok_or_else(|| {
                TraitError::InvalidConfiguration(format!(
                    "could not parse camel property {:?}: format expected \"key=value\"",
                    property
                ))
            })?;
            env.application_properties
                .insert(key.trim().to_string(), value.trim().to_string());
        }

        if env.integration.is_some() && env.integration_in_running_phases() {
            env.post_processors.push(Box::new(|env: &mut Environment| {
                if let Some(config_map) = env.compute_application_properties() {
                    env.resources.add(config_map);
                }
                Ok(())
            }));
        }
        Ok(())
    }

    fn requires_integration_platform(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apis::IntegrationPhase;
    use crate::traits::builtin::testing;
    use k8s_openapi::api::core::v1::ConfigMap;

    #[test]
    fn test_catalog_resolved_from_default_version() {
        let mut env = testing::environment(testing::integration("it", IntegrationPhase::Running));
        env.camel_catalog = None;

        let mut t = new_trait();
        assert!(t.configure(&env).unwrap().0);
        t.apply(&mut env).unwrap();

        assert!(env.camel_catalog.is_some());
        let status = env.integration().unwrap().status.clone().unwrap();
        assert_eq!(status.runtime_version.as_deref(), Some("3.8.1"));
        assert_eq!(status.runtime_provider.as_deref(), Some("quarkus"));
    }

    #[test]
    fn test_unknown_runtime_version() {
        let mut env = testing::environment(testing::integration("it", IntegrationPhase::Running));
        let mut t = CamelTrait {
            base: BaseTrait::platform(ID, ORDER_CAMEL),
            config: CamelConfig {
                runtime_version: Some("0.0.1".to_string()),
                ..Default::default()
            },
        };
        t.configure(&env).unwrap();
        let err = t.apply(&mut env).unwrap_err();
        assert_eq!(
            err.to_string(),
            "unable to find catalog matching version requirement: runtime=0.0.1, provider=quarkus"
        );
    }

    #[test]
    fn test_properties_scheduled_as_configmap() {
        let mut env = testing::environment(testing::integration("it", IntegrationPhase::Running));
        let mut t = CamelTrait {
            base: BaseTrait::platform(ID, ORDER_CAMEL),
            config: CamelConfig {
                properties: vec!["my.key = value".to_string()],
                ..Default::default()
            },
        };
        t.configure(&env).unwrap();
        t.apply(&mut env).unwrap();

        assert_eq!(env.application_properties["my.key"], "value");
        assert_eq!(env.post_processors.len(), 1);
        let processor = env.post_processors.remove(0);
        processor(&mut env).unwrap();
        assert_eq!(env.resources.all::<ConfigMap>().count(), 1);
    }

    #[test]
    fn test_cannot_be_disabled() {
        let env = testing::environment(testing::integration("it", IntegrationPhase::Running));
        let mut t = CamelTrait {
            base: BaseTrait::platform(ID, ORDER_CAMEL),
            config: CamelConfig {
                enabled: Some(false),
                ..Default::default()
            },
        };
        assert!(t.configure(&env).is_err());
    }
}
