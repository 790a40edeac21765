//! Kubernetes Service exposing the Integration

use crate::apis::{INTEGRATION_LABEL, TraitProfile};
use crate::resources::object_meta;
use crate::traits::decode::lenient;
use crate::traits::{
    BaseTrait, Configured, ControllerStrategy, Environment, ORDER_SERVICE, Trait, TraitCondition,
    TraitError, TraitResult,
};
use k8s_openapi::api::core::v1::{Service, ServicePort, ServiceSpec};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use serde::Deserialize;
use std::collections::BTreeMap;

pub const ID: &str = "service";

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServiceConfig {
    #[serde(deserialize_with = "lenient::opt_bool")]
    pub enabled: Option<bool>,
    /// Enable the service when the sources expose HTTP endpoints
    #[serde(deserialize_with = "lenient::opt_bool")]
    pub auto: Option<bool>,
    /// Deprecated alias of `type: NodePort`
    #[serde(deserialize_with = "lenient::opt_bool")]
    pub node_port: Option<bool>,
    /// `ClusterIP`, `NodePort` or `LoadBalancer`
    #[serde(rename = "type", deserialize_with = "lenient::opt_string")]
    pub service_type: Option<String>,
    /// Extra ports as `name;port;containerPort[;protocol]`
    #[serde(deserialize_with = "lenient::string_list")]
    pub ports: Vec<String>,
    pub labels: BTreeMap<String, String>,
    pub annotations: BTreeMap<String, String>,
}

pub struct ServiceTrait {
    base: BaseTrait,
    pub config: ServiceConfig,
    ports: Vec<ServicePort>,
}

pub(crate) fn new_trait() -> Box<dyn Trait> {
    Box::new(ServiceTrait {
        base: BaseTrait::new(ID, ORDER_SERVICE),
        config: ServiceConfig::default(),
        ports: Vec::new(),
    })
}

/// Parse `name;port;containerPort[;protocol]`
pub fn parse_service_port(spec: &str) -> TraitResult<ServicePort> {
    let parts: Vec<&str> = spec.split(';').collect();
    if parts.len() < 3 {
        return Err(TraitError::InvalidConfiguration(format!(
            "could not parse service port {}: expected format \"port-name;port-number;container-port-number[;port-protocol]\"",
            spec
        )));
    }
    let port = parts[1].parse::<i32>().map_err(|_| {
        TraitError::InvalidConfiguration(format!(
            "could not parse port number in {}: expected port-number as a number",
            spec
        ))
    })?;
    let container_port = parts[2].parse::<i32>().map_err(|_| {
        TraitError::InvalidConfiguration(format!(
            "could not parse container port number in {}: expected container-port-number as a number",
            spec
        ))
    })?;

    Ok(ServicePort {
        name: Some(parts[0].to_string()),
        port,
        target_port: Some(IntOrString::Int(container_port)),
        protocol: Some(parts.get(3).copied().unwrap_or("TCP").to_string()),
        ..Default::default()
    })
}

impl ServiceTrait {
    fn service_type(&self) -> TraitResult<Option<String>> {
        match self.config.service_type.as_deref() {
            Some(t @ ("ClusterIP" | "NodePort" | "LoadBalancer")) => Ok(Some(t.to_string())),
            Some(other) => Err(TraitError::InvalidConfiguration(format!(
                "unsupported service type: {}",
                other
            ))),
            None if self.config.node_port.unwrap_or(false) => Ok(Some("NodePort".to_string())),
            None => Ok(None),
        }
    }

    fn service(&self, env: &Environment) -> TraitResult<Service> {
        let name = env.integration_name();
        let mut labels = self.config.labels.clone();
        labels.insert(INTEGRATION_LABEL.to_string(), name.clone());

        let mut metadata = object_meta(&name, env.integration_namespace().as_deref());
        metadata.labels = Some(labels);
        if !self.config.annotations.is_empty() {
            metadata.annotations = Some(self.config.annotations.clone());
        }

        Ok(Service {
            metadata,
            spec: Some(ServiceSpec {
                type_: self.service_type()?,
                selector: Some(env.integration_labels()),
                ports: (!self.ports.is_empty()).then(|| self.ports.clone()),
                ..Default::default()
            }),
            ..Default::default()
        })
    }
}

impl Trait for ServiceTrait {
    trait_base!();

    fn configure(&mut self, env: &Environment) -> TraitResult<Configured> {
        if env.integration.is_none() {
            return Ok((false, None));
        }
        if self.config.enabled == Some(false) {
            return Ok((false, Some(TraitCondition::user_disabled("Service"))));
        }
        if env.determine_controller_strategy()? == ControllerStrategy::KnativeService {
            return Ok((
                false,
                Some(TraitCondition::platform_disabled(
                    "Service",
                    "knative-service trait has priority over this trait",
                )),
            ));
        }
        if !env.integration_in_running_phases() {
            return Ok((false, None));
        }

        if self.config.auto.unwrap_or(true) && self.config.enabled.is_none() {
            self.config.enabled = Some(env.sources_expose_http()?);
        }
        self.ports = self
            .config
            .ports
            .iter()
            .map(|p| parse_service_port(p))
            .collect::<TraitResult<_>>()?;

        Ok((
            self.config.enabled.unwrap_or(false) || !self.ports.is_empty(),
            None,
        ))
    }

    fn apply(&mut self, env: &mut Environment) -> TraitResult<()> {
        let name = env.integration_name();
        let service = self.service(env)?;
        env.resources
            .get_or_create::<Service>(|s| s.metadata.name.as_deref() == Some(name.as_str()), || service);
        Ok(())
    }

    fn is_allowed_in_profile(&self, profile: TraitProfile) -> bool {
        matches!(profile, TraitProfile::Kubernetes | TraitProfile::OpenShift)
    }
}
