//! CronJob workload for scheduled Integrations

use crate::apis::IntegrationPhase;
use crate::camel::add_sorted_unique;
use crate::resources::object_meta;
use crate::traits::decode::lenient;
use crate::traits::{
    BaseTrait, Configured, ControllerStrategy, ControllerStrategySelector, Environment,
    ORDER_CRON, Trait, TraitCondition, TraitResult,
};
use k8s_openapi::api::batch::v1::{CronJob, CronJobSpec, JobSpec, JobTemplateSpec};
use k8s_openapi::api::core::v1::{PodSpec, PodTemplateSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::Deserialize;

pub const ID: &str = "cron";

/// Capability providing the cron route policy
const CRON_CAPABILITY: &str = "cron";
const ENV_VAR_CRON_OVERRIDE: &str = "CAMEL_K_CRON_OVERRIDE";

const DEFAULT_CONCURRENCY_POLICY: &str = "Forbid";
const DEFAULT_BACKOFF_LIMIT: i32 = 2;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CronConfig {
    #[serde(deserialize_with = "lenient::opt_bool")]
    pub enabled: Option<bool>,
    /// Cron expression, e.g. `0/5 * * * *`
    #[serde(deserialize_with = "lenient::opt_string")]
    pub schedule: Option<String>,
    #[serde(deserialize_with = "lenient::opt_string")]
    pub time_zone: Option<String>,
    /// Comma separated consumer components replaced by the schedule
    #[serde(deserialize_with = "lenient::opt_string")]
    pub components: Option<String>,
    /// `Allow`, `Forbid` or `Replace`
    #[serde(deserialize_with = "lenient::opt_string")]
    pub concurrency_policy: Option<String>,
    #[serde(deserialize_with = "lenient::opt_i32")]
    pub backoff_limit: Option<i32>,
    #[serde(deserialize_with = "lenient::opt_i64")]
    pub active_deadline_seconds: Option<i64>,
    #[serde(deserialize_with = "lenient::opt_i64")]
    pub starting_deadline_seconds: Option<i64>,
}

pub struct CronTrait {
    base: BaseTrait,
    pub config: CronConfig,
}

pub(crate) fn new_trait() -> Box<dyn Trait> {
    Box::new(CronTrait {
        base: BaseTrait::new(ID, ORDER_CRON),
        config: CronConfig::default(),
    })
}

impl CronTrait {
    pub fn schedule(&self) -> Option<&str> {
        self.config.schedule.as_deref().filter(|s| !s.is_empty())
    }

    fn cron_job(&self, env: &Environment, schedule: &str) -> TraitResult<CronJob> {
        let integration = env.integration()?;
        let labels = env.integration_labels();

        let mut metadata = object_meta(
            &env.integration_name(),
            env.integration_namespace().as_deref(),
        );
        metadata.labels = Some(labels.clone());
        metadata.annotations = integration.metadata.annotations.clone();

        Ok(CronJob {
            metadata,
            spec: Some(CronJobSpec {
                schedule: schedule.to_string(),
                time_zone: self.config.time_zone.clone(),
                concurrency_policy: Some(
                    self.config
                        .concurrency_policy
                        .clone()
                        .unwrap_or_else(|| DEFAULT_CONCURRENCY_POLICY.to_string()),
                ),
                starting_deadline_seconds: self.config.starting_deadline_seconds,
                job_template: JobTemplateSpec {
                    spec: Some(JobSpec {
                        active_deadline_seconds: self.config.active_deadline_seconds,
                        backoff_limit: Some(self.config.backoff_limit.unwrap_or(DEFAULT_BACKOFF_LIMIT)),
                        template: PodTemplateSpec {
                            metadata: Some(ObjectMeta {
                                labels: Some(labels),
                                ..Default::default()
                            }),
                            spec: Some(PodSpec {
                                service_account_name: integration.spec.service_account_name.clone(),
                                restart_policy: Some("Never".to_string()),
                                ..Default::default()
                            }),
                        },
                        ..Default::default()
                    }),
                    ..Default::default()
                },
                ..Default::default()
            }),
            ..Default::default()
        })
    }
}

impl Trait for CronTrait {
    trait_base!();

    fn configure(&mut self, env: &Environment) -> TraitResult<Configured> {
        if env.integration.is_none() {
            return Ok((false, None));
        }
        if self.config.enabled == Some(false) {
            return Ok((false, Some(TraitCondition::user_disabled("Cron"))));
        }
        if !env.integration_in_phase(&[IntegrationPhase::Initialization])
            && !env.integration_in_running_phases()
        {
            return Ok((false, None));
        }
        if env.determine_controller_strategy()? != ControllerStrategy::CronJob {
            return Ok((false, None));
        }
        Ok((self.schedule().is_some(), None))
    }

    fn apply(&mut self, env: &mut Environment) -> TraitResult<()> {
        let Some(schedule) = self.schedule().map(str::to_string) else {
            return Ok(());
        };

        if env.integration_in_phase(&[IntegrationPhase::Initialization]) {
            let dependencies: Vec<String> = env
                .camel_catalog()?
                .runtime
                .capabilities
                .get(CRON_CAPABILITY)
                .map(|c| c.dependencies.iter().map(|d| d.dependency_id()).collect())
                .unwrap_or_default();
            let status = env.integration_mut()?.status_mut();
            add_sorted_unique(&mut status.capabilities, CRON_CAPABILITY.to_string());
            for dependency in dependencies {
                add_sorted_unique(&mut status.dependencies, dependency);
            }
            return Ok(());
        }

        let cron_job = self.cron_job(env, &schedule)?;
        env.resources.add(cron_job);

        if let Some(components) = self.config.components.clone() {
            env.set_env_var(ENV_VAR_CRON_OVERRIDE, components);
        }
        Ok(())
    }

    fn controller_strategy_selector(&self) -> Option<&dyn ControllerStrategySelector> {
        Some(self)
    }
}

impl ControllerStrategySelector for CronTrait {
    fn select_controller_strategy(
        &self,
        _env: &Environment,
    ) -> TraitResult<Option<ControllerStrategy>> {
        if self.config.enabled == Some(false) {
            return Ok(None);
        }
        Ok(self.schedule().map(|_| ControllerStrategy::CronJob))
    }

    fn controller_strategy_selector_order(&self) -> i32 {
        1000
    }
}
