//! PodDisruptionBudget for the Integration pods

use crate::resources::object_meta;
use crate::traits::decode::lenient;
use crate::traits::{
    BaseTrait, Configured, Environment, ORDER_PDB, Trait, TraitError, TraitResult,
};
use k8s_openapi::api::policy::v1::{PodDisruptionBudget, PodDisruptionBudgetSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use serde::Deserialize;

pub const ID: &str = "pdb";

const DEFAULT_MAX_UNAVAILABLE: &str = "1";

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PdbConfig {
    #[serde(deserialize_with = "lenient::opt_bool")]
    pub enabled: Option<bool>,
    /// Pods that must stay available after an eviction, number or percentage
    #[serde(deserialize_with = "lenient::opt_string")]
    pub min_available: Option<String>,
    /// Pods that can be unavailable after an eviction, number or percentage
    #[serde(deserialize_with = "lenient::opt_string")]
    pub max_unavailable: Option<String>,
}

pub struct PdbTrait {
    base: BaseTrait,
    pub config: PdbConfig,
}

pub(crate) fn new_trait() -> Box<dyn Trait> {
    Box::new(PdbTrait {
        base: BaseTrait::new(ID, ORDER_PDB),
        config: PdbConfig::default(),
    })
}

/// Integers stay integers, anything else (percentages) is kept as a string
pub(crate) fn parse_int_or_string(value: &str) -> IntOrString {
    match value.parse::<i32>() {
        Ok(n) => IntOrString::Int(n),
        Err(_) => IntOrString::String(value.to_string()),
    }
}

impl PdbTrait {
    fn pod_disruption_budget(&self, env: &Environment) -> PodDisruptionBudget {
        let mut spec = PodDisruptionBudgetSpec {
            selector: Some(LabelSelector {
                match_labels: Some(env.integration_labels()),
                ..Default::default()
            }),
            ..Default::default()
        };
        match (&self.config.min_available, &self.config.max_unavailable) {
            (Some(min), _) => spec.min_available = Some(parse_int_or_string(min)),
            (None, Some(max)) => spec.max_unavailable = Some(parse_int_or_string(max)),
            (None, None) => {}
        }

        PodDisruptionBudget {
            metadata: object_meta(
                &env.integration_name(),
                env.integration_namespace().as_deref(),
            ),
            spec: Some(spec),
            ..Default::default()
        }
    }
}

impl Trait for PdbTrait {
    trait_base!();

    fn configure(&mut self, env: &Environment) -> TraitResult<Configured> {
        if env.integration.is_none() || !self.config.enabled.unwrap_or(false) {
            return Ok((false, None));
        }
        if !env.integration_in_running_phases() {
            return Ok((false, None));
        }

        if self.config.min_available.is_some() && self.config.max_unavailable.is_some() {
            return Err(TraitError::InvalidConfiguration(
                "both minAvailable and maxUnavailable can't be set simultaneously".to_string(),
            ));
        }
        Ok((true, None))
    }

    fn apply(&mut self, env: &mut Environment) -> TraitResult<()> {
        if self.config.min_available.is_none() && self.config.max_unavailable.is_none() {
            self.config.max_unavailable = Some(DEFAULT_MAX_UNAVAILABLE.to_string());
        }
        let pdb = self.pod_disruption_budget(env);
        env.resources.add(pdb);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apis::IntegrationPhase;
    use crate::traits::builtin::testing;

    fn pdb_trait(config: PdbConfig) -> PdbTrait {
        PdbTrait {
            base: BaseTrait::new(ID, ORDER_PDB),
            config,
        }
    }

    #[test]
    fn test_disabled_by_default() {
        let env = testing::environment(testing::integration("it", IntegrationPhase::Running));
        assert!(!new_trait().configure(&env).unwrap().0);
    }

    #[test]
    fn test_max_unavailable_defaults_to_one() {
        let mut env = testing::environment(testing::integration("it", IntegrationPhase::Running));
        let mut t = pdb_trait(PdbConfig {
            enabled: Some(true),
            ..Default::default()
        });
        assert!(t.configure(&env).unwrap().0);
        t.apply(&mut env).unwrap();

        assert_eq!(t.config.max_unavailable.as_deref(), Some("1"));
        let pdb = env.resources.find::<PodDisruptionBudget>(|_| true).unwrap();
        let spec = pdb.spec.as_ref().unwrap();
        assert_eq!(spec.max_unavailable, Some(IntOrString::Int(1)));
        assert_eq!(spec.min_available, None);
        assert_eq!(
            spec.selector.as_ref().unwrap().match_labels.as_ref().unwrap()
                ["camel.apache.org/integration"],
            "it"
        );
    }

    #[test]
    fn test_percentage_min_available() {
        let mut env = testing::environment(testing::integration("it", IntegrationPhase::Running));
        let mut t = pdb_trait(PdbConfig {
            enabled: Some(true),
            min_available: Some("50%".to_string()),
            ..Default::default()
        });
        t.apply(&mut env).unwrap();
        let pdb = env.resources.find::<PodDisruptionBudget>(|_| true).unwrap();
        assert_eq!(
            pdb.spec.as_ref().unwrap().min_available,
            Some(IntOrString::String("50%".to_string()))
        );
    }

    #[test]
    fn test_both_bounds_rejected() {
        let env = testing::environment(testing::integration("it", IntegrationPhase::Running));
        let mut t = pdb_trait(PdbConfig {
            enabled: Some(true),
            min_available: Some("1".to_string()),
            max_unavailable: Some("2".to_string()),
        });
        let err = t.configure(&env).unwrap_err();
        assert_eq!(
            err.to_string(),
            "both minAvailable and maxUnavailable can't be set simultaneously"
        );
    }
}
