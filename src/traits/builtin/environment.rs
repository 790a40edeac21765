//! Standard environment variables of the integration container

use crate::traits::decode::lenient;
use crate::traits::{
    BaseTrait, Configured, Environment, ORDER_ENVIRONMENT, Trait, TraitCondition, TraitError,
    TraitResult,
};
use k8s_openapi::api::core::v1::{EnvVarSource, ObjectFieldSelector};
use serde::Deserialize;

pub const ID: &str = "environment";

pub const ENV_VAR_VERSION: &str = "CAMEL_K_VERSION";
pub const ENV_VAR_INTEGRATION: &str = "CAMEL_K_INTEGRATION";
pub const ENV_VAR_RUNTIME_VERSION: &str = "CAMEL_K_RUNTIME_VERSION";
pub const ENV_VAR_OPERATOR_ID: &str = "CAMEL_K_OPERATOR_ID";
pub const ENV_VAR_NAMESPACE: &str = "NAMESPACE";
pub const ENV_VAR_POD_NAME: &str = "POD_NAME";

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EnvironmentConfig {
    #[serde(deserialize_with = "lenient::opt_bool")]
    pub enabled: Option<bool>,
    /// Expose the namespace and pod name through the downward API
    #[serde(deserialize_with = "lenient::opt_bool")]
    pub container_meta: Option<bool>,
    /// Extra variables as `NAME=value`
    #[serde(deserialize_with = "lenient::string_list")]
    pub vars: Vec<String>,
}

pub struct EnvironmentTrait {
    base: BaseTrait,
    pub config: EnvironmentConfig,
}

pub(crate) fn new_trait() -> Box<dyn Trait> {
    Box::new(EnvironmentTrait {
        base: BaseTrait::platform(ID, ORDER_ENVIRONMENT),
        config: EnvironmentConfig::default(),
    })
}

fn field_ref(path: &str) -> EnvVarSource {
    EnvVarSource {
        field_ref: Some(ObjectFieldSelector {
            field_path: path.to_string(),
            api_version: None,
        }),
        ..Default::default()
    }
}

impl Trait for EnvironmentTrait {
    trait_base!();

    fn configure(&mut self, env: &Environment) -> TraitResult<Configured> {
        if self.config.enabled == Some(false) {
            return Ok((false, Some(TraitCondition::user_disabled("Environment"))));
        }
        Ok((env.integration_in_running_phases(), None))
    }

    fn apply(&mut self, env: &mut Environment) -> TraitResult<()> {
        let name = env.integration_name();
        let runtime_version = env
            .integration()?
            .status
            .as_ref()
            .and_then(|s| s.runtime_version.clone())
            .unwrap_or_default();
        let operator_id = env.config.operator_id.clone();

        env.set_env_var(ENV_VAR_VERSION, env!("CARGO_PKG_VERSION"));
        env.set_env_var(ENV_VAR_INTEGRATION, name);
        env.set_env_var(ENV_VAR_RUNTIME_VERSION, runtime_version);
        env.set_env_var(ENV_VAR_OPERATOR_ID, operator_id);

        if self.config.container_meta.unwrap_or(true) {
            env.set_env_var_from(ENV_VAR_NAMESPACE, field_ref("metadata.namespace"));
            env.set_env_var_from(ENV_VAR_POD_NAME, field_ref("metadata.name"));
        }

        for var in &self.config.vars {
            let (key, value) = var.split_once('=').ok_or_else(|| {
                TraitError::InvalidConfiguration(format!(
                    "could not parse environment variable {:?}: format expected \"NAME=value\"",
                    var
                ))
            })?;
            env.set_env_var(key.trim(), value);
        }
        Ok(())
    }
}
