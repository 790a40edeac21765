//! Istio sidecar injection

use crate::traits::decode::lenient;
use crate::traits::{BaseTrait, Configured, Environment, ORDER_ISTIO, Trait, TraitResult};
use serde::Deserialize;

pub const ID: &str = "istio";

pub const INJECT_ANNOTATION: &str = "sidecar.istio.io/inject";
pub const OUTBOUND_IP_RANGES_ANNOTATION: &str = "traffic.sidecar.istio.io/includeOutboundIPRanges";

/// Private network ranges routed through the sidecar
const DEFAULT_ALLOW: &str = "10.0.0.0/8,172.16.0.0/12,192.168.0.0/16";

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IstioConfig {
    #[serde(deserialize_with = "lenient::opt_bool")]
    pub enabled: Option<bool>,
    /// Outbound IP ranges intercepted by the sidecar, comma separated
    #[serde(deserialize_with = "lenient::opt_string")]
    pub allow: Option<String>,
    /// Force sidecar injection on or off
    #[serde(deserialize_with = "lenient::opt_bool")]
    pub inject: Option<bool>,
}

pub struct IstioTrait {
    base: BaseTrait,
    pub config: IstioConfig,
}

pub(crate) fn new_trait() -> Box<dyn Trait> {
    Box::new(IstioTrait {
        base: BaseTrait::new(ID, ORDER_ISTIO),
        config: IstioConfig::default(),
    })
}

impl Trait for IstioTrait {
    trait_base!();

    fn configure(&mut self, env: &Environment) -> TraitResult<Configured> {
        if env.integration.is_none() || !self.config.enabled.unwrap_or(false) {
            return Ok((false, None));
        }
        Ok((env.integration_in_running_phases(), None))
    }

    fn apply(&mut self, env: &mut Environment) -> TraitResult<()> {
        let allow = self
            .config
            .allow
            .clone()
            .unwrap_or_else(|| DEFAULT_ALLOW.to_string());
        let inject = self.config.inject;

        env.resources.visit_pod_template_meta(|meta| {
            let annotations = meta.annotations.get_or_insert_with(Default::default);
            annotations.insert(OUTBOUND_IP_RANGES_ANNOTATION.to_string(), allow.clone());
            if let Some(inject) = inject {
                annotations.insert(INJECT_ANNOTATION.to_string(), inject.to_string());
            }
        });
        Ok(())
    }
}
