//! Integration platform resolution

use crate::apis::{
    DEFAULT_PLATFORM_NAME, IntegrationPhase, IntegrationPlatform, IntegrationPlatformPhase,
    IntegrationPlatformSpec,
};
use crate::traits::decode::lenient;
use crate::traits::{BaseTrait, Configured, Environment, ORDER_PLATFORM, Trait, TraitResult};
use serde::Deserialize;
use std::collections::BTreeMap;

pub const ID: &str = "platform";

/// Label marking a platform created by this trait
pub const GENERATED_LABEL: &str = "camel.apache.org/platform.generated";

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PlatformConfig {
    #[serde(deserialize_with = "lenient::opt_bool")]
    pub enabled: Option<bool>,
    /// Create a default platform when none exists
    #[serde(deserialize_with = "lenient::opt_bool")]
    pub create_default: Option<bool>,
}

pub struct PlatformTrait {
    base: BaseTrait,
    pub config: PlatformConfig,
}

pub(crate) fn new_trait() -> Box<dyn Trait> {
    Box::new(PlatformTrait {
        base: BaseTrait::platform(ID, ORDER_PLATFORM),
        config: PlatformConfig::default(),
    })
}

impl PlatformTrait {
    fn default_platform(&self, env: &Environment) -> IntegrationPlatform {
        let name = env
            .integration
            .as_ref()
            .and_then(|it| it.status.as_ref())
            .and_then(|s| s.platform.clone())
            .unwrap_or_else(|| {
                if env.config.operator_id.is_empty() {
                    DEFAULT_PLATFORM_NAME.to_string()
                } else {
                    env.config.operator_id.clone()
                }
            });

        let mut platform = IntegrationPlatform::new(&name, IntegrationPlatformSpec::default());
        platform.metadata.namespace = env.integration_namespace();
        platform.metadata.labels = Some(BTreeMap::from([(
            GENERATED_LABEL.to_string(),
            "true".to_string(),
        )]));
        platform
    }
}

impl Trait for PlatformTrait {
    trait_base!();

    fn configure(&mut self, env: &Environment) -> TraitResult<Configured> {
        if env.integration.is_none() || self.config.enabled == Some(false) {
            return Ok((false, None));
        }
        Ok((
            env.integration_in_phase(&[
                IntegrationPhase::None,
                IntegrationPhase::WaitingForPlatform,
            ]),
            None,
        ))
    }

    fn apply(&mut self, env: &mut Environment) -> TraitResult<()> {
        let platform = match env.platform.clone() {
            Some(platform) => Some(platform),
            None if self.config.create_default.unwrap_or(false) => {
                let platform = self.default_platform(env);
                tracing::info!(
                    "Creating default integration platform {}",
                    platform.metadata.name.as_deref().unwrap_or_default()
                );
                env.resources.add(platform.clone());
                env.platform = Some(platform.clone());
                Some(platform)
            }
            None => None,
        };

        let status = env.integration_mut()?.status_mut();
        match platform {
            Some(platform) if platform.phase() == IntegrationPlatformPhase::Ready => {
                status.phase = IntegrationPhase::None;
                status.platform = platform.metadata.name;
            }
            Some(platform) => {
                status.phase = IntegrationPhase::WaitingForPlatform;
                status.platform = platform.metadata.name;
            }
            None => status.phase = IntegrationPhase::WaitingForPlatform,
        }
        Ok(())
    }

    fn requires_integration_platform(&self) -> bool {
        false
    }
}
