//! Knative Serving Service workload

use super::cron::{self, CronTrait};
use crate::apis::TraitProfile;
use crate::resources::{KnativeService, object_meta};
use crate::traits::decode::lenient;
use crate::traits::{
    BaseTrait, Configured, ControllerStrategy, ControllerStrategySelector, Environment,
    ORDER_KNATIVE_SERVICE, Trait, TraitCondition, TraitResult,
};
use serde::Deserialize;
use std::collections::BTreeMap;

pub const ID: &str = "knative-service";

pub const CLASS_ANNOTATION: &str = "autoscaling.knative.dev/class";
pub const METRIC_ANNOTATION: &str = "autoscaling.knative.dev/metric";
pub const TARGET_ANNOTATION: &str = "autoscaling.knative.dev/target";
pub const MIN_SCALE_ANNOTATION: &str = "autoscaling.knative.dev/minScale";
pub const MAX_SCALE_ANNOTATION: &str = "autoscaling.knative.dev/maxScale";
pub const ROLLOUT_DURATION_ANNOTATION: &str = "serving.knative.dev/rollout-duration";
pub const VISIBILITY_LABEL: &str = "networking.knative.dev/visibility";

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct KnativeServiceConfig {
    #[serde(deserialize_with = "lenient::opt_bool")]
    pub enabled: Option<bool>,
    /// Extra annotations for the revision template
    pub annotations: BTreeMap<String, String>,
    /// `kpa.autoscaling.knative.dev` or `hpa.autoscaling.knative.dev`
    #[serde(deserialize_with = "lenient::opt_string")]
    pub autoscaling_class: Option<String>,
    /// `concurrency`, `rps` or `cpu`
    #[serde(deserialize_with = "lenient::opt_string")]
    pub autoscaling_metric: Option<String>,
    #[serde(deserialize_with = "lenient::opt_i32")]
    pub autoscaling_target: Option<i32>,
    #[serde(deserialize_with = "lenient::opt_i32")]
    pub min_scale: Option<i32>,
    #[serde(deserialize_with = "lenient::opt_i32")]
    pub max_scale: Option<i32>,
    #[serde(deserialize_with = "lenient::opt_string")]
    pub rollout_duration: Option<String>,
    /// `cluster-local` keeps the service off the ingress
    #[serde(deserialize_with = "lenient::opt_string")]
    pub visibility: Option<String>,
    #[serde(deserialize_with = "lenient::opt_i64")]
    pub timeout_seconds: Option<i64>,
    /// Derive `minScale` from the sources when unset
    #[serde(deserialize_with = "lenient::opt_bool")]
    pub auto: Option<bool>,
}

pub struct KnativeServiceTrait {
    base: BaseTrait,
    pub config: KnativeServiceConfig,
}

pub(crate) fn new_trait() -> Box<dyn Trait> {
    Box::new(KnativeServiceTrait {
        base: BaseTrait::new(ID, ORDER_KNATIVE_SERVICE),
        config: KnativeServiceConfig::default(),
    })
}

impl KnativeServiceTrait {
    fn template_annotations(&self) -> BTreeMap<String, String> {
        let mut annotations = self.config.annotations.clone();
        let mut set = |key: &str, value: Option<String>| {
            if let Some(value) = value {
                annotations.insert(key.to_string(), value);
            }
        };
        set(CLASS_ANNOTATION, self.config.autoscaling_class.clone());
        set(METRIC_ANNOTATION, self.config.autoscaling_metric.clone());
        set(
            TARGET_ANNOTATION,
            self.config.autoscaling_target.map(|t| t.to_string()),
        );
        set(
            MIN_SCALE_ANNOTATION,
            self.config.min_scale.filter(|s| *s > 0).map(|s| s.to_string()),
        );
        set(
            MAX_SCALE_ANNOTATION,
            self.config.max_scale.filter(|s| *s > 0).map(|s| s.to_string()),
        );
        set(
            ROLLOUT_DURATION_ANNOTATION,
            self.config.rollout_duration.clone(),
        );
        annotations
    }

    fn knative_service(&self, env: &Environment) -> TraitResult<KnativeService> {
        let integration = env.integration()?;
        let labels = env.integration_labels();

        let mut metadata = object_meta(
            &env.integration_name(),
            env.integration_namespace().as_deref(),
        );
        let mut service_labels = labels.clone();
        if let Some(visibility) = &self.config.visibility {
            service_labels.insert(VISIBILITY_LABEL.to_string(), visibility.clone());
        }
        metadata.labels = Some(service_labels);
        metadata.annotations = integration.metadata.annotations.clone();

        let mut service = KnativeService::new(metadata);
        let template = &mut service.spec.template;
        template.metadata.labels = Some(labels);
        let annotations = self.template_annotations();
        if !annotations.is_empty() {
            template.metadata.annotations = Some(annotations);
        }
        template.spec.timeout_seconds = self.config.timeout_seconds;
        template.spec.pod_spec.service_account_name = integration.spec.service_account_name.clone();
        Ok(service)
    }
}

impl Trait for KnativeServiceTrait {
    trait_base!();

    fn configure(&mut self, env: &Environment) -> TraitResult<Configured> {
        if env.integration.is_none() {
            return Ok((false, None));
        }
        if self.config.enabled == Some(false) {
            return Ok((false, Some(TraitCondition::user_disabled("KnativeService"))));
        }
        if !env.integration_in_running_phases() {
            return Ok((false, None));
        }
        if env.determine_controller_strategy()? != ControllerStrategy::KnativeService {
            return Ok((false, None));
        }

        // Only HTTP driven services may scale down to zero
        if self.config.auto.unwrap_or(true)
            && self.config.min_scale.is_none()
            && !env.sources_expose_http()?
        {
            self.config.min_scale = Some(1);
        }
        Ok((true, None))
    }

    fn apply(&mut self, env: &mut Environment) -> TraitResult<()> {
        let service = self.knative_service(env)?;
        env.resources.add(service);
        Ok(())
    }

    fn is_allowed_in_profile(&self, profile: TraitProfile) -> bool {
        profile == TraitProfile::Knative
    }

    fn controller_strategy_selector(&self) -> Option<&dyn ControllerStrategySelector> {
        Some(self)
    }
}

impl ControllerStrategySelector for KnativeServiceTrait {
    fn select_controller_strategy(
        &self,
        env: &Environment,
    ) -> TraitResult<Option<ControllerStrategy>> {
        if self.config.enabled == Some(false) {
            return Ok(None);
        }
        let scheduled = env
            .get_trait_as::<CronTrait>(cron::ID)
            .is_some_and(|c| c.config.enabled != Some(false) && c.schedule().is_some());
        if scheduled {
            return Ok(None);
        }
        if !self.is_allowed_in_profile(env.determine_profile()) {
            if self.config.enabled == Some(true) {
                tracing::warn!(
                    "Knative service of {} is enabled but profile {} is not Knative",
                    env.integration_name(),
                    env.determine_profile()
                );
            }
            return Ok(None);
        }
        if self.config.enabled == Some(true) {
            return Ok(Some(ControllerStrategy::KnativeService));
        }
        Ok(env
            .sources_expose_http()?
            .then_some(ControllerStrategy::KnativeService))
    }

    fn controller_strategy_selector_order(&self) -> i32 {
        100
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apis::{IntegrationPhase, SourceSpec};
    use crate::traits::builtin::testing;

    fn knative_environment(content: &str) -> Environment {
        let mut it = testing::integration("hello", IntegrationPhase::Running);
        it.spec.profile = Some(TraitProfile::Knative);
        it.spec.sources = vec![SourceSpec {
            name: "routes.yaml".to_string(),
            content: content.to_string(),
            language: None,
        }];
        testing::environment(it)
    }

    const HTTP_ROUTE: &str = "- from:\n    uri: \"platform-http:/hello\"\n    steps:\n      - to: \"log:info\"\n";
    const TIMER_ROUTE: &str = "- from:\n    uri: \"timer:tick\"\n    steps:\n      - to: \"log:info\"\n";

    #[test]
    fn test_http_source_selects_knative() {
        let env = knative_environment(HTTP_ROUTE);
        assert_eq!(
            env.determine_controller_strategy().unwrap(),
            ControllerStrategy::KnativeService
        );
        assert_eq!(env.determine_default_container_port_name(), "h2c");
    }

    #[test]
    fn test_non_http_source_falls_back_to_deployment() {
        let env = knative_environment(TIMER_ROUTE);
        assert_eq!(
            env.determine_controller_strategy().unwrap(),
            ControllerStrategy::Deployment
        );
    }

    #[test]
    fn test_defers_to_cron_schedule() {
        let mut env = knative_environment(HTTP_ROUTE);
        if let Some(t) = env.catalog.get_as_mut::<CronTrait>(cron::ID) {
            t.config.schedule = Some("* * * * *".to_string());
        }
        assert_eq!(
            env.determine_controller_strategy().unwrap(),
            ControllerStrategy::CronJob
        );
    }

    #[test]
    fn test_service_with_autoscaling_annotations() {
        let mut env = knative_environment(TIMER_ROUTE);
        if let Some(t) = env.catalog.get_as_mut::<KnativeServiceTrait>(ID) {
            t.config.enabled = Some(true);
        }
        let mut t = KnativeServiceTrait {
            base: BaseTrait::new(ID, ORDER_KNATIVE_SERVICE),
            config: KnativeServiceConfig {
                autoscaling_class: Some("hpa.autoscaling.knative.dev".to_string()),
                autoscaling_target: Some(100),
                max_scale: Some(5),
                ..Default::default()
            },
        };
        assert!(t.configure(&env).unwrap().0);
        // Timer routes never scale to zero
        assert_eq!(t.config.min_scale, Some(1));
        t.apply(&mut env).unwrap();

        let service = env.resources.find::<KnativeService>(|_| true).unwrap();
        let annotations = service.spec.template.metadata.annotations.clone().unwrap();
        assert_eq!(annotations[CLASS_ANNOTATION], "hpa.autoscaling.knative.dev");
        assert_eq!(annotations[TARGET_ANNOTATION], "100");
        assert_eq!(annotations[MIN_SCALE_ANNOTATION], "1");
        assert_eq!(annotations[MAX_SCALE_ANNOTATION], "5");
        assert!(!annotations.contains_key(METRIC_ANNOTATION));
    }

    #[test]
    fn test_explicit_enable_outside_knative_profile_keeps_deployment() {
        let mut env = testing::environment(testing::integration("hello", IntegrationPhase::Running));
        if let Some(t) = env.catalog.get_as_mut::<KnativeServiceTrait>(ID) {
            t.config.enabled = Some(true);
        }
        assert_eq!(env.determine_profile(), TraitProfile::Kubernetes);
        assert_eq!(
            env.determine_controller_strategy().unwrap(),
            ControllerStrategy::Deployment
        );
    }

    #[test]
    fn test_only_allowed_in_knative_profile() {
        let t = new_trait();
        assert!(t.is_allowed_in_profile(TraitProfile::Knative));
        assert!(!t.is_allowed_in_profile(TraitProfile::Kubernetes));
    }
}
