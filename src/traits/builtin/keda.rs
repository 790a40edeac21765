//! KEDA autoscaling addon

use crate::apis::Integration;
use crate::resources::{ScaleTargetRef, ScaledObject, ScaledObjectSpec, ScaledObjectTrigger, object_meta};
use crate::traits::decode::lenient;
use crate::traits::{BaseTrait, Configured, Environment, ORDER_KEDA, Trait, TraitResult};
use kube::Resource;
use serde::Deserialize;
use std::collections::BTreeMap;

pub const ID: &str = "keda";

/// A KEDA scaler, `type` names the autoscaler and `metadata` holds its options
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct KedaTrigger {
    #[serde(rename = "type")]
    pub type_: String,
    pub metadata: BTreeMap<String, String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct KedaConfig {
    #[serde(deserialize_with = "lenient::opt_bool")]
    pub enabled: Option<bool>,
    /// Seconds between trigger checks
    #[serde(deserialize_with = "lenient::opt_i32")]
    pub polling_interval: Option<i32>,
    /// Seconds after the last active trigger before scaling back to zero
    #[serde(deserialize_with = "lenient::opt_i32")]
    pub cooldown_period: Option<i32>,
    #[serde(deserialize_with = "lenient::opt_i32")]
    pub idle_replica_count: Option<i32>,
    #[serde(deserialize_with = "lenient::opt_i32")]
    pub min_replica_count: Option<i32>,
    #[serde(deserialize_with = "lenient::opt_i32")]
    pub max_replica_count: Option<i32>,
    pub triggers: Vec<KedaTrigger>,
}

pub struct KedaTrait {
    base: BaseTrait,
    pub config: KedaConfig,
}

pub(crate) fn new_trait() -> Box<dyn Trait> {
    Box::new(KedaTrait {
        base: BaseTrait::new(ID, ORDER_KEDA),
        config: KedaConfig::default(),
    })
}

impl KedaTrait {
    fn scaled_object(&self, env: &Environment) -> ScaledObject {
        let name = env.integration_name();
        let mut metadata = object_meta(&name, env.integration_namespace().as_deref());
        metadata.labels = Some(env.integration_labels());

        // KEDA drives the Integration scale subresource, whatever the workload kind
        let scale_target_ref = ScaleTargetRef {
            api_version: Integration::api_version(&()).to_string(),
            kind: Integration::kind(&()).to_string(),
            name,
        };

        ScaledObject::new(
            metadata,
            ScaledObjectSpec {
                scale_target_ref,
                min_replica_count: self.config.min_replica_count,
                max_replica_count: self.config.max_replica_count,
                polling_interval: self.config.polling_interval,
                cooldown_period: self.config.cooldown_period,
                idle_replica_count: self.config.idle_replica_count,
                triggers: self
                    .config
                    .triggers
                    .iter()
                    .map(|t| ScaledObjectTrigger {
                        type_: t.type_.clone(),
                        metadata: t.metadata.clone(),
                    })
                    .collect(),
            },
        )
    }
}

impl Trait for KedaTrait {
    trait_base!();

    fn configure(&mut self, env: &Environment) -> TraitResult<Configured> {
        if env.integration.is_none() || !self.config.enabled.unwrap_or(false) {
            return Ok((false, None));
        }
        if !env.integration_in_running_phases() {
            return Ok((false, None));
        }
        Ok((!self.config.triggers.is_empty(), None))
    }

    fn apply(&mut self, env: &mut Environment) -> TraitResult<()> {
        let scaled_object = self.scaled_object(env);
        env.resources.add(scaled_object);
        Ok(())
    }
}
