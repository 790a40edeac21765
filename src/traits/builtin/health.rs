//! Health probes of the integration container

use super::container::DEFAULT_CONTAINER_PORT;
use super::jvm::{self, JvmTrait};
use crate::apis::{ConditionStatus, IntegrationPhase};
use crate::camel::add_sorted_unique;
use crate::traits::condition::TRAIT_CONFIGURATION_REASON;
use crate::traits::decode::lenient;
use crate::traits::environment::DEFAULT_CONTAINER_PORT_NAME;
use crate::traits::{
    BaseTrait, Configured, ControllerStrategy, Environment, ORDER_HEALTH, Trait, TraitCondition,
    TraitResult,
};
use k8s_openapi::api::core::v1::{HTTPGetAction, Probe};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use serde::Deserialize;

pub const ID: &str = "health";

const HEALTH_CAPABILITY: &str = "health";
const LIVENESS_PATH: &str = "/q/health/live";
const READINESS_PATH: &str = "/q/health/ready";
const STARTUP_PATH: &str = "/q/health/started";
const DEFAULT_SCHEME: &str = "HTTP";

/// Timing knobs shared by the three probes
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProbeConfig {
    #[serde(deserialize_with = "lenient::opt_string")]
    pub scheme: Option<String>,
    #[serde(deserialize_with = "lenient::opt_i32")]
    pub initial_delay: Option<i32>,
    #[serde(deserialize_with = "lenient::opt_i32")]
    pub timeout: Option<i32>,
    #[serde(deserialize_with = "lenient::opt_i32")]
    pub period: Option<i32>,
    #[serde(deserialize_with = "lenient::opt_i32")]
    pub success_threshold: Option<i32>,
    #[serde(deserialize_with = "lenient::opt_i32")]
    pub failure_threshold: Option<i32>,
}

impl ProbeConfig {
    fn probe(&self, path: &str, port: IntOrString) -> Probe {
        Probe {
            http_get: Some(HTTPGetAction {
                path: Some(path.to_string()),
                port,
                scheme: Some(self.scheme.clone().unwrap_or_else(|| DEFAULT_SCHEME.to_string())),
                ..Default::default()
            }),
            initial_delay_seconds: self.initial_delay,
            timeout_seconds: self.timeout,
            period_seconds: self.period,
            success_threshold: self.success_threshold,
            failure_threshold: self.failure_threshold,
            ..Default::default()
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HealthConfig {
    #[serde(deserialize_with = "lenient::opt_bool")]
    pub enabled: Option<bool>,
    #[serde(deserialize_with = "lenient::opt_bool")]
    pub liveness_probe_enabled: Option<bool>,
    #[serde(deserialize_with = "lenient::opt_bool")]
    pub readiness_probe_enabled: Option<bool>,
    #[serde(deserialize_with = "lenient::opt_bool")]
    pub startup_probe_enabled: Option<bool>,
    pub liveness: ProbeConfig,
    pub readiness: ProbeConfig,
    pub startup: ProbeConfig,
}

pub struct HealthTrait {
    base: BaseTrait,
    pub config: HealthConfig,
}

pub(crate) fn new_trait() -> Box<dyn Trait> {
    Box::new(HealthTrait {
        base: BaseTrait::new(ID, ORDER_HEALTH),
        config: HealthConfig::default(),
    })
}

impl HealthTrait {
    fn liveness_enabled(&self) -> bool {
        self.config.liveness_probe_enabled.unwrap_or(false)
    }

    fn readiness_enabled(&self) -> bool {
        self.config.readiness_probe_enabled.unwrap_or(true)
    }

    fn startup_enabled(&self) -> bool {
        self.config.startup_probe_enabled.unwrap_or(false)
    }
}

impl Trait for HealthTrait {
    trait_base!();

    fn configure(&mut self, env: &Environment) -> TraitResult<Configured> {
        if env.integration.is_none() {
            return Ok((false, None));
        }
        if self.config.enabled == Some(false) {
            return Ok((false, Some(TraitCondition::user_disabled("Health"))));
        }
        if !env.integration_in_phase(&[IntegrationPhase::Initialization])
            && !env.integration_in_running_phases()
        {
            return Ok((false, None));
        }

        let debugging = env
            .get_trait_as::<JvmTrait>(jvm::ID)
            .is_some_and(JvmTrait::debug_enabled);
        if debugging {
            return Ok((
                false,
                Some(TraitCondition::new(
                    "Health",
                    ConditionStatus::True,
                    TRAIT_CONFIGURATION_REASON,
                    "health trait is disabled because JVM debug mode is enabled",
                )),
            ));
        }
        Ok((true, None))
    }

    fn apply(&mut self, env: &mut Environment) -> TraitResult<()> {
        if env.integration_in_phase(&[IntegrationPhase::Initialization]) {
            let dependencies: Vec<String> = env
                .camel_catalog()?
                .runtime
                .capabilities
                .get(HEALTH_CAPABILITY)
                .map(|c| c.dependencies.iter().map(|d| d.dependency_id()).collect())
                .unwrap_or_default();
            let status = env.integration_mut()?.status_mut();
            add_sorted_unique(&mut status.capabilities, HEALTH_CAPABILITY.to_string());
            for dependency in dependencies {
                add_sorted_unique(&mut status.dependencies, dependency);
            }
            return Ok(());
        }

        if !self.liveness_enabled() && !self.readiness_enabled() && !self.startup_enabled() {
            return Ok(());
        }

        // Knative Serving wires the user port into the probes itself
        let knative = env.determine_controller_strategy()? == ControllerStrategy::KnativeService;
        let Some(container) = env.integration_container_mut() else {
            return Ok(());
        };
        let named_http = container.ports.as_ref().is_some_and(|ports| {
            ports
                .iter()
                .any(|p| p.name.as_deref() == Some(DEFAULT_CONTAINER_PORT_NAME))
        });
        let port = if named_http {
            IntOrString::String(DEFAULT_CONTAINER_PORT_NAME.to_string())
        } else if knative {
            IntOrString::Int(0)
        } else {
            IntOrString::Int(DEFAULT_CONTAINER_PORT)
        };

        if self.liveness_enabled() {
            container.liveness_probe = Some(self.config.liveness.probe(LIVENESS_PATH, port.clone()));
        }
        if self.readiness_enabled() {
            container.readiness_probe =
                Some(self.config.readiness.probe(READINESS_PATH, port.clone()));
        }
        if self.startup_enabled() {
            container.startup_probe = Some(self.config.startup.probe(STARTUP_PATH, port));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::object_meta;
    use crate::traits::builtin::testing;
    use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
    use k8s_openapi::api::core::v1::{Container, ContainerPort, PodSpec, PodTemplateSpec};

    fn environment(ports: Option<Vec<ContainerPort>>) -> Environment {
        let mut env = testing::environment(testing::integration("hello", IntegrationPhase::Running));
        env.resources.add(Deployment {
            metadata: object_meta("hello", Some(testing::NAMESPACE)),
            spec: Some(DeploymentSpec {
                template: PodTemplateSpec {
                    spec: Some(PodSpec {
                        containers: vec![Container {
                            name: "integration".to_string(),
                            ports,
                            ..Default::default()
                        }],
                        ..Default::default()
                    }),
                    ..Default::default()
                },
                ..Default::default()
            }),
            ..Default::default()
        });
        env
    }

    #[test]
    fn test_readiness_probe_by_default() {
        let mut env = environment(None);
        let mut t = new_trait();
        assert!(t.configure(&env).unwrap().0);
        t.apply(&mut env).unwrap();

        let container = env.integration_container_mut().unwrap();
        assert!(container.liveness_probe.is_none());
        assert!(container.startup_probe.is_none());
        let get = container
            .readiness_probe
            .as_ref()
            .and_then(|p| p.http_get.clone())
            .unwrap();
        assert_eq!(get.path.as_deref(), Some("/q/health/ready"));
        assert_eq!(get.port, IntOrString::Int(8080));
        assert_eq!(get.scheme.as_deref(), Some("HTTP"));
    }

    #[test]
    fn test_all_probes_on_named_port() {
        let mut env = environment(Some(vec![ContainerPort {
            name: Some("http".to_string()),
            container_port: 8080,
            ..Default::default()
        }]));
        let mut t = HealthTrait {
            base: BaseTrait::new(ID, ORDER_HEALTH),
            config: HealthConfig {
                liveness_probe_enabled: Some(true),
                startup_probe_enabled: Some(true),
                liveness: ProbeConfig {
                    period: Some(10),
                    failure_threshold: Some(3),
                    ..Default::default()
                },
                ..Default::default()
            },
        };
        t.apply(&mut env).unwrap();

        let container = env.integration_container_mut().unwrap();
        let liveness = container.liveness_probe.clone().unwrap();
        assert_eq!(liveness.period_seconds, Some(10));
        assert_eq!(liveness.failure_threshold, Some(3));
        let get = liveness.http_get.unwrap();
        assert_eq!(get.path.as_deref(), Some("/q/health/live"));
        assert_eq!(get.port, IntOrString::String("http".to_string()));
        assert_eq!(
            container
                .startup_probe
                .as_ref()
                .and_then(|p| p.http_get.as_ref())
                .and_then(|g| g.path.clone())
                .as_deref(),
            Some("/q/health/started")
        );
    }

    #[test]
    fn test_disabled_under_jvm_debug() {
        let mut env = environment(None);
        if let Some(jvm) = env.catalog.get_as_mut::<JvmTrait>(jvm::ID) {
            jvm.config.debug = Some(true);
        }
        let (enabled, condition) = new_trait().configure(&env).unwrap();
        assert!(!enabled);
        let condition = condition.unwrap();
        assert_eq!(condition.condition_type(), "HealthTraitInfo");
        assert!(condition.message().contains("debug"));
    }

    #[test]
    fn test_capability_at_initialization() {
        let mut env = testing::environment(testing::integration(
            "hello",
            IntegrationPhase::Initialization,
        ));
        let mut t = new_trait();
        assert!(t.configure(&env).unwrap().0);
        t.apply(&mut env).unwrap();

        let status = env.integration.as_ref().unwrap().status.clone().unwrap();
        assert_eq!(status.capabilities, vec!["health"]);
        assert!(
            status
                .dependencies
                .contains(&"mvn:org.apache.camel.quarkus:camel-quarkus-microprofile-health".to_string())
        );
    }
}
