//! Deployment workload, the default controller strategy

use super::pdb::parse_int_or_string;
use crate::resources::object_meta;
use crate::traits::decode::lenient;
use crate::traits::{
    BaseTrait, Configured, ControllerStrategy, ControllerStrategySelector, Environment,
    ORDER_DEPLOYMENT, Trait, TraitCondition, TraitError, TraitResult,
};
use k8s_openapi::api::apps::v1::{
    Deployment, DeploymentSpec, DeploymentStrategy, RollingUpdateDeployment,
};
use k8s_openapi::api::core::v1::{PodSpec, PodTemplateSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use serde::Deserialize;

pub const ID: &str = "deployment";

const DEFAULT_PROGRESS_DEADLINE_SECONDS: i32 = 60;
const STRATEGY_RECREATE: &str = "Recreate";
const STRATEGY_ROLLING_UPDATE: &str = "RollingUpdate";

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DeploymentConfig {
    #[serde(deserialize_with = "lenient::opt_bool")]
    pub enabled: Option<bool>,
    #[serde(deserialize_with = "lenient::opt_i32")]
    pub progress_deadline_seconds: Option<i32>,
    /// `RollingUpdate` or `Recreate`
    #[serde(deserialize_with = "lenient::opt_string")]
    pub strategy: Option<String>,
    #[serde(deserialize_with = "lenient::opt_string")]
    pub rolling_update_max_surge: Option<String>,
    #[serde(deserialize_with = "lenient::opt_string")]
    pub rolling_update_max_unavailable: Option<String>,
}

pub struct DeploymentTrait {
    base: BaseTrait,
    pub config: DeploymentConfig,
}

pub(crate) fn new_trait() -> Box<dyn Trait> {
    Box::new(DeploymentTrait {
        base: BaseTrait::platform(ID, ORDER_DEPLOYMENT),
        config: DeploymentConfig::default(),
    })
}

impl DeploymentTrait {
    fn deployment_strategy(&self) -> TraitResult<Option<DeploymentStrategy>> {
        let rolling_update = || RollingUpdateDeployment {
            max_surge: self
                .config
                .rolling_update_max_surge
                .as_deref()
                .map(parse_int_or_string),
            max_unavailable: self
                .config
                .rolling_update_max_unavailable
                .as_deref()
                .map(parse_int_or_string),
        };

        match self.config.strategy.as_deref() {
            Some(STRATEGY_RECREATE) => Ok(Some(DeploymentStrategy {
                type_: Some(STRATEGY_RECREATE.to_string()),
                rolling_update: None,
            })),
            Some(STRATEGY_ROLLING_UPDATE) => Ok(Some(DeploymentStrategy {
                type_: Some(STRATEGY_ROLLING_UPDATE.to_string()),
                rolling_update: Some(rolling_update()),
            })),
            None if self.config.rolling_update_max_surge.is_some()
                || self.config.rolling_update_max_unavailable.is_some() =>
            {
                Ok(Some(DeploymentStrategy {
                    type_: Some(STRATEGY_ROLLING_UPDATE.to_string()),
                    rolling_update: Some(rolling_update()),
                }))
            }
            None => Ok(None),
            Some(other) => Err(TraitError::InvalidConfiguration(format!(
                "unsupported deployment strategy {}",
                other
            ))),
        }
    }

    fn deployment(&self, env: &Environment) -> TraitResult<Deployment> {
        let integration = env.integration()?;
        let labels = env.integration_labels();

        let mut metadata = object_meta(
            &env.integration_name(),
            env.integration_namespace().as_deref(),
        );
        metadata.labels = Some(labels.clone());
        metadata.annotations = integration.metadata.annotations.clone();

        Ok(Deployment {
            metadata,
            spec: Some(DeploymentSpec {
                replicas: integration.spec.replicas,
                progress_deadline_seconds: Some(
                    self.config
                        .progress_deadline_seconds
                        .unwrap_or(DEFAULT_PROGRESS_DEADLINE_SECONDS),
                ),
                strategy: self.deployment_strategy()?,
                selector: LabelSelector {
                    match_labels: Some(labels.clone()),
                    ..Default::default()
                },
                template: PodTemplateSpec {
                    metadata: Some(ObjectMeta {
                        labels: Some(labels),
                        ..Default::default()
                    }),
                    spec: Some(PodSpec {
                        service_account_name: integration.spec.service_account_name.clone(),
                        ..Default::default()
                    }),
                },
                ..Default::default()
            }),
            ..Default::default()
        })
    }
}

impl Trait for DeploymentTrait {
    trait_base!();

    fn configure(&mut self, env: &Environment) -> TraitResult<Configured> {
        if env.integration.is_none() {
            return Ok((false, None));
        }
        if self.config.enabled == Some(false) {
            return Ok((false, Some(TraitCondition::user_disabled("Deployment"))));
        }
        if !env.integration_in_running_phases() {
            return Ok((false, None));
        }
        if env.determine_controller_strategy()? != ControllerStrategy::Deployment {
            return Ok((false, None));
        }
        // Reject an invalid strategy before anything is built
        self.deployment_strategy()?;
        Ok((true, None))
    }

    fn apply(&mut self, env: &mut Environment) -> TraitResult<()> {
        let deployment = self.deployment(env)?;
        env.resources.add(deployment);
        Ok(())
    }

    fn controller_strategy_selector(&self) -> Option<&dyn ControllerStrategySelector> {
        Some(self)
    }
}

impl ControllerStrategySelector for DeploymentTrait {
    fn select_controller_strategy(
        &self,
        _env: &Environment,
    ) -> TraitResult<Option<ControllerStrategy>> {
        Ok(match self.config.enabled {
            Some(true) => Some(ControllerStrategy::Deployment),
            _ => None,
        })
    }

    fn controller_strategy_selector_order(&self) -> i32 {
        10000
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apis::IntegrationPhase;
    use crate::traits::builtin::testing;
    use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;

    fn deployment_trait(config: DeploymentConfig) -> DeploymentTrait {
        DeploymentTrait {
            base: BaseTrait::platform(ID, ORDER_DEPLOYMENT),
            config,
        }
    }

    #[test]
    fn test_deployment_created() {
        let mut it = testing::integration("hello", IntegrationPhase::Running);
        it.spec.replicas = Some(3);
        let mut env = testing::environment(it);

        let mut t = deployment_trait(DeploymentConfig::default());
        assert!(t.configure(&env).unwrap().0);
        t.apply(&mut env).unwrap();

        let deployment = env.resources.find::<Deployment>(|_| true).unwrap();
        let spec = deployment.spec.as_ref().unwrap();
        assert_eq!(spec.replicas, Some(3));
        assert_eq!(spec.progress_deadline_seconds, Some(60));
        assert!(spec.strategy.is_none());
        assert_eq!(
            spec.selector.match_labels.as_ref().unwrap()["camel.apache.org/integration"],
            "hello"
        );
    }

    #[test]
    fn test_rolling_update_parameters() {
        let mut env = testing::environment(testing::integration("hello", IntegrationPhase::Running));
        let mut t = deployment_trait(DeploymentConfig {
            rolling_update_max_surge: Some("25%".to_string()),
            rolling_update_max_unavailable: Some("1".to_string()),
            ..Default::default()
        });
        t.apply(&mut env).unwrap();

        let deployment = env.resources.find::<Deployment>(|_| true).unwrap();
        let strategy = deployment.spec.as_ref().unwrap().strategy.clone().unwrap();
        assert_eq!(strategy.type_.as_deref(), Some("RollingUpdate"));
        let rolling = strategy.rolling_update.unwrap();
        assert_eq!(rolling.max_surge, Some(IntOrString::String("25%".to_string())));
        assert_eq!(rolling.max_unavailable, Some(IntOrString::Int(1)));
    }

    #[test]
    fn test_unsupported_strategy() {
        let env = testing::environment(testing::integration("hello", IntegrationPhase::Running));
        let mut t = deployment_trait(DeploymentConfig {
            strategy: Some("BlueGreen".to_string()),
            ..Default::default()
        });
        let err = t.configure(&env).unwrap_err();
        assert_eq!(err.to_string(), "unsupported deployment strategy BlueGreen");
    }

    #[test]
    fn test_disabled_yields_condition() {
        let env = testing::environment(testing::integration("hello", IntegrationPhase::Running));
        let mut t = deployment_trait(DeploymentConfig {
            enabled: Some(false),
            ..Default::default()
        });
        let (enabled, condition) = t.configure(&env).unwrap();
        assert!(!enabled);
        assert_eq!(condition.unwrap().condition_type(), "DeploymentTraitInfo");
    }
}
