//! Pod tolerations matching node taints

use crate::traits::decode::lenient;
use crate::traits::{
    BaseTrait, Configured, Environment, ORDER_TOLERATION, Trait, TraitError, TraitResult,
};
use k8s_openapi::api::core::v1::Toleration;
use regex::Regex;
use serde::Deserialize;
use std::sync::LazyLock;

pub const ID: &str = "toleration";

static TAINT_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([\w/_\-.]+)(=)?([\w_\-.]+)?:(NoSchedule|NoExecute|PreferNoSchedule):?(\d*)?$")
        .expect("taint pattern is a valid regex")
});

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TolerationConfig {
    #[serde(deserialize_with = "lenient::opt_bool")]
    pub enabled: Option<bool>,
    /// Taints to tolerate, as `Key[=Value]:Effect[:Seconds]`
    #[serde(deserialize_with = "lenient::string_list")]
    pub taints: Vec<String>,
}

pub struct TolerationTrait {
    base: BaseTrait,
    pub config: TolerationConfig,
}

pub(crate) fn new_trait() -> Box<dyn Trait> {
    Box::new(TolerationTrait {
        base: BaseTrait::new(ID, ORDER_TOLERATION),
        config: TolerationConfig::default(),
    })
}

/// Parse `Key[=Value]:Effect[:Seconds]` taints into tolerations
pub fn parse_tolerations(taints: &[String]) -> TraitResult<Vec<Toleration>> {
    taints
        .iter()
        .map(|taint| {
            let caps = TAINT_REGEX.captures(taint).ok_or_else(|| {
                TraitError::InvalidConfiguration(format!("could not match taint {}", taint))
            })?;
            let group = |i: usize| caps.get(i).map(|m| m.as_str()).filter(|s| !s.is_empty());

            let toleration_seconds = group(5)
                .map(|s| {
                    s.parse::<i64>().map_err(|e| {
                        TraitError::InvalidConfiguration(format!(
                            "invalid toleration seconds in taint {}: {}",
                            taint, e
                        ))
                    })
                })
                .transpose()?;

            Ok(Toleration {
                key: group(1).map(str::to_string),
                operator: Some(if group(2).is_some() { "Equal" } else { "Exists" }.to_string()),
                value: group(3).map(str::to_string),
                effect: group(4).map(str::to_string),
                toleration_seconds,
            })
        })
        .collect()
}

impl Trait for TolerationTrait {
    trait_base!();

    fn configure(&mut self, env: &Environment) -> TraitResult<Configured> {
        if !self.config.enabled.unwrap_or(false) {
            return Ok((false, None));
        }
        if self.config.taints.is_empty() {
            return Err(TraitError::InvalidConfiguration(
                "no taint was provided".to_string(),
            ));
        }
        Ok((env.integration_in_running_phases(), None))
    }

    fn apply(&mut self, env: &mut Environment) -> TraitResult<()> {
        let tolerations = parse_tolerations(&self.config.taints)?;
        env.resources.visit_pod_specs(|spec| {
            spec.tolerations
                .get_or_insert_with(Vec::new)
                .extend(tolerations.iter().cloned());
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apis::IntegrationPhase;
    use crate::traits::builtin::testing;
    use k8s_openapi::api::apps::v1::Deployment;

    fn toleration_trait(taints: &[&str]) -> TolerationTrait {
        TolerationTrait {
            base: BaseTrait::new(ID, ORDER_TOLERATION),
            config: TolerationConfig {
                enabled: Some(true),
                taints: taints.iter().map(|t| t.to_string()).collect(),
            },
        }
    }

    #[test]
    fn test_parse_tolerations() {
        let tolerations = parse_tolerations(&[
            "my-toleration=my-value:NoExecute".to_string(),
            "node-role.kubernetes.io/master:NoSchedule".to_string(),
            "disktype=ssd:PreferNoSchedule:300".to_string(),
        ])
        .unwrap();

        assert_eq!(tolerations[0].key.as_deref(), Some("my-toleration"));
        assert_eq!(tolerations[0].operator.as_deref(), Some("Equal"));
        assert_eq!(tolerations[0].value.as_deref(), Some("my-value"));
        assert_eq!(tolerations[0].effect.as_deref(), Some("NoExecute"));

        assert_eq!(tolerations[1].operator.as_deref(), Some("Exists"));
        assert_eq!(tolerations[1].value, None);

        assert_eq!(tolerations[2].toleration_seconds, Some(300));
    }

    #[test]
    fn test_missing_taint() {
        let env = testing::environment(testing::integration("it", IntegrationPhase::Running));
        let err = toleration_trait(&[]).configure(&env).unwrap_err();
        assert_eq!(err.to_string(), "no taint was provided");
    }

    #[test]
    fn test_malformed_taint() {
        let mut env = testing::environment(testing::integration("it", IntegrationPhase::Running));
        let err = toleration_trait(&["my-toleration-failure"])
            .apply(&mut env)
            .unwrap_err();
        assert_eq!(err.to_string(), "could not match taint my-toleration-failure");
    }

    #[test]
    fn test_tolerations_added_to_workload() {
        let mut env = testing::environment(testing::integration("it", IntegrationPhase::Running));
        env.resources.add(Deployment {
            metadata: crate::resources::object_meta("it", Some(testing::NAMESPACE)),
            ..Default::default()
        });

        let mut t = toleration_trait(&["my-toleration=my-value:NoExecute"]);
        assert!(t.configure(&env).unwrap().0);
        t.apply(&mut env).unwrap();

        let deployment = env.resources.find::<Deployment>(|_| true).unwrap();
        let spec = deployment.spec.as_ref().unwrap().template.spec.as_ref().unwrap();
        assert_eq!(spec.tolerations.as_ref().unwrap().len(), 1);
    }
}
