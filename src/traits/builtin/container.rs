//! The integration container of the workload pod

use crate::traits::decode::lenient;
use crate::traits::{
    BaseTrait, Configured, ControllerStrategy, Environment, ORDER_CONTAINER, Trait,
    TraitCondition, TraitError, TraitResult,
};
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, EnvVar, ResourceRequirements, Service, ServicePort,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use serde::Deserialize;
use std::collections::BTreeMap;

pub const ID: &str = "container";

pub const DEFAULT_CONTAINER_NAME: &str = "integration";
pub const DEFAULT_CONTAINER_PORT: i32 = 8080;
pub const DEFAULT_SERVICE_PORT: i32 = 80;
pub const DEFAULT_SERVICE_PORT_NAME: &str = "http";

const SERVICE_TYPE_LABEL: &str = "camel.apache.org/service.type";
const REST_CAPABILITY: &str = "rest";
const PULL_POLICIES: [&str; 3] = ["Always", "IfNotPresent", "Never"];

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ContainerConfig {
    #[serde(deserialize_with = "lenient::opt_bool")]
    pub enabled: Option<bool>,
    /// Expose the container port when a Service exists for the Integration
    #[serde(deserialize_with = "lenient::opt_bool")]
    pub auto: Option<bool>,
    #[serde(deserialize_with = "lenient::opt_string")]
    pub name: Option<String>,
    #[serde(deserialize_with = "lenient::opt_string")]
    pub image: Option<String>,
    #[serde(deserialize_with = "lenient::opt_string")]
    pub image_pull_policy: Option<String>,
    #[serde(deserialize_with = "lenient::opt_bool")]
    pub expose: Option<bool>,
    #[serde(deserialize_with = "lenient::opt_i32")]
    pub port: Option<i32>,
    #[serde(deserialize_with = "lenient::opt_string")]
    pub port_name: Option<String>,
    #[serde(deserialize_with = "lenient::opt_i32")]
    pub service_port: Option<i32>,
    #[serde(deserialize_with = "lenient::opt_string")]
    pub service_port_name: Option<String>,
    #[serde(rename = "requestCPU", deserialize_with = "lenient::opt_string")]
    pub request_cpu: Option<String>,
    #[serde(deserialize_with = "lenient::opt_string")]
    pub request_memory: Option<String>,
    #[serde(rename = "limitCPU", deserialize_with = "lenient::opt_string")]
    pub limit_cpu: Option<String>,
    #[serde(deserialize_with = "lenient::opt_string")]
    pub limit_memory: Option<String>,
}

pub struct ContainerTrait {
    base: BaseTrait,
    pub config: ContainerConfig,
}

pub(crate) fn new_trait() -> Box<dyn Trait> {
    Box::new(ContainerTrait {
        base: BaseTrait::platform(ID, ORDER_CONTAINER),
        config: ContainerConfig::default(),
    })
}

fn resource_list(entries: [(&str, &Option<String>); 2]) -> Option<BTreeMap<String, Quantity>> {
    let list: BTreeMap<String, Quantity> = entries
        .into_iter()
        .filter_map(|(resource, value)| {
            value
                .as_ref()
                .map(|v| (resource.to_string(), Quantity(v.clone())))
        })
        .collect();
    (!list.is_empty()).then_some(list)
}

impl ContainerTrait {
    fn container_name(&self) -> String {
        self.config
            .name
            .clone()
            .unwrap_or_else(|| DEFAULT_CONTAINER_NAME.to_string())
    }

    fn image(&self, env: &Environment) -> Option<String> {
        self.config
            .image
            .clone()
            .or_else(|| {
                env.integration
                    .as_ref()
                    .and_then(|it| it.status.as_ref())
                    .and_then(|s| s.image.clone())
            })
            .or_else(|| {
                env.integration_kit
                    .as_ref()
                    .and_then(|k| k.image())
                    .map(str::to_string)
            })
            .or_else(|| env.config.default_container_image.clone())
    }

    fn resources(&self) -> Option<ResourceRequirements> {
        let requests = resource_list([
            ("cpu", &self.config.request_cpu),
            ("memory", &self.config.request_memory),
        ]);
        let limits = resource_list([
            ("cpu", &self.config.limit_cpu),
            ("memory", &self.config.limit_memory),
        ]);
        if requests.is_none() && limits.is_none() {
            return None;
        }
        Some(ResourceRequirements {
            requests,
            limits,
            ..Default::default()
        })
    }

    /// Environment variables of the container. Knative revisions reject most field
    /// references, the namespace one is resolved here instead.
    fn env_vars(env: &Environment, knative: bool) -> Vec<EnvVar> {
        let namespace = env.integration_namespace().unwrap_or_default();
        env.env_vars
            .iter()
            .filter_map(|var| {
                let field_path = var
                    .value_from
                    .as_ref()
                    .and_then(|source| source.field_ref.as_ref())
                    .map(|f| f.field_path.as_str());
                match field_path {
                    Some("metadata.namespace") if knative => Some(EnvVar {
                        name: var.name.clone(),
                        value: Some(namespace.clone()),
                        value_from: None,
                    }),
                    Some(_) if knative => {
                        tracing::debug!("Skipping environment variable {} (fieldRef)", var.name);
                        None
                    }
                    _ => Some(var.clone()),
                }
            })
            .collect()
    }

    /// Route the Service of the Integration to the container port
    fn expose(&self, env: &mut Environment, container: &mut Container) {
        let name = env.integration_name();
        let port_name = self
            .config
            .port_name
            .clone()
            .unwrap_or_else(|| env.determine_default_container_port_name().to_string());
        let Some(service) = env
            .resources
            .find_mut::<Service>(|s| s.metadata.name.as_deref() == Some(name.as_str()))
        else {
            return;
        };

        container.ports.get_or_insert_with(Vec::new).push(ContainerPort {
            name: Some(port_name.clone()),
            container_port: self.config.port.unwrap_or(DEFAULT_CONTAINER_PORT),
            protocol: Some("TCP".to_string()),
            ..Default::default()
        });
        service
            .spec
            .get_or_insert_with(Default::default)
            .ports
            .get_or_insert_with(Vec::new)
            .push(ServicePort {
                name: Some(
                    self.config
                        .service_port_name
                        .clone()
                        .unwrap_or_else(|| DEFAULT_SERVICE_PORT_NAME.to_string()),
                ),
                port: self.config.service_port.unwrap_or(DEFAULT_SERVICE_PORT),
                protocol: Some("TCP".to_string()),
                target_port: Some(IntOrString::String(port_name)),
                ..Default::default()
            });
        service
            .metadata
            .labels
            .get_or_insert_with(Default::default)
            .insert(SERVICE_TYPE_LABEL.to_string(), "user".to_string());
    }

    fn container(&self, env: &mut Environment) -> TraitResult<Container> {
        let knative = env.determine_controller_strategy()? == ControllerStrategy::KnativeService;
        let image = self.image(env);
        if image.is_none() {
            tracing::debug!(
                "No image available yet for integration {}",
                env.integration_name()
            );
        }

        let mut container = Container {
            name: self.container_name(),
            image,
            image_pull_policy: self.config.image_pull_policy.clone(),
            resources: self.resources(),
            ..Default::default()
        };
        let vars = Self::env_vars(env, knative);
        if !vars.is_empty() {
            container.env = Some(vars);
        }

        if knative {
            container.ports = Some(vec![ContainerPort {
                name: Some(
                    self.config
                        .port_name
                        .clone()
                        .unwrap_or_else(|| env.determine_default_container_port_name().to_string()),
                ),
                container_port: self.config.port.unwrap_or(DEFAULT_CONTAINER_PORT),
                protocol: Some("TCP".to_string()),
                ..Default::default()
            }]);
        } else if self.config.expose.unwrap_or(false) {
            self.expose(env, &mut container);
        }
        Ok(container)
    }
}

impl Trait for ContainerTrait {
    trait_base!();

    fn configure(&mut self, env: &Environment) -> TraitResult<Configured> {
        if env.integration.is_none() {
            return Ok((false, None));
        }
        if self.config.enabled == Some(false) {
            return Ok((false, Some(TraitCondition::user_disabled("Container"))));
        }
        if !env.integration_in_running_phases() {
            return Ok((false, None));
        }

        if self.config.auto.unwrap_or(true) && self.config.expose.is_none() {
            let name = env.integration_name();
            let exposed = env
                .resources
                .find::<Service>(|s| s.metadata.name.as_deref() == Some(name.as_str()))
                .is_some();
            self.config.expose = Some(exposed);
        }

        if let Some(policy) = &self.config.image_pull_policy {
            if !PULL_POLICIES.contains(&policy.as_str()) {
                return Err(TraitError::InvalidConfiguration(format!(
                    "unsupported pull policy {}",
                    policy
                )));
            }
        }
        Ok((true, None))
    }

    fn apply(&mut self, env: &mut Environment) -> TraitResult<()> {
        let rest = env
            .integration()?
            .status
            .as_ref()
            .is_some_and(|s| s.capabilities.iter().any(|c| c == REST_CAPABILITY));
        if rest {
            env.application_properties.insert(
                "camel.context.rest-configuration.component".to_string(),
                "platform-http".to_string(),
            );
        }

        let container = self.container(env)?;
        let Some(pod_spec) = env.integration_pod_spec_mut() else {
            tracing::debug!("No workload found for the integration container");
            return Ok(());
        };
        match pod_spec.containers.iter_mut().find(|c| c.name == container.name) {
            Some(existing) => *existing = container,
            None => pod_spec.containers.push(container),
        }
        Ok(())
    }
}
