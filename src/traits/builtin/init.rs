//! Integration initialization: source languages and profile

use crate::apis::IntegrationPhase;
use crate::camel::InspectError;
use crate::traits::decode::lenient;
use crate::traits::{
    BaseTrait, Configured, Environment, ORDER_INIT, Trait, TraitCondition, TraitResult,
};
use serde::Deserialize;

pub const ID: &str = "init";

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InitConfig {
    #[serde(deserialize_with = "lenient::opt_bool")]
    pub enabled: Option<bool>,
}

pub struct InitTrait {
    base: BaseTrait,
    pub config: InitConfig,
}

pub(crate) fn new_trait() -> Box<dyn Trait> {
    Box::new(InitTrait {
        base: BaseTrait::platform(ID, ORDER_INIT),
        config: InitConfig::default(),
    })
}

impl Trait for InitTrait {
    trait_base!();

    fn configure(&mut self, env: &Environment) -> TraitResult<Configured> {
        if self.config.enabled == Some(false) {
            return Ok((false, Some(TraitCondition::user_disabled("Init"))));
        }
        Ok((env.integration_in_phase(&[IntegrationPhase::Initialization]), None))
    }

    fn apply(&mut self, env: &mut Environment) -> TraitResult<()> {
        let profile = env.determine_profile();
        let integration = env.integration_mut()?;

        for source in integration.spec.sources.iter_mut() {
            let language = source
                .infer_language()
                .ok_or_else(|| InspectError::UnknownLanguage(source.name.clone()))?;
            source.language = Some(language);
        }
        integration.status_mut().profile = Some(profile);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apis::{Language, SourceSpec, TraitProfile};
    use crate::traits::builtin::testing;

    #[test]
    fn test_languages_inferred() {
        let mut it = testing::integration("hello", IntegrationPhase::Initialization);
        it.spec.sources = vec![
            testing::java_source("from(\"timer:tick\").to(\"log:x\");"),
            SourceSpec {
                name: "routes.yaml".to_string(),
                ..Default::default()
            },
        ];
        let mut env = testing::environment(it);

        let mut t = new_trait();
        assert!(t.configure(&env).unwrap().0);
        t.apply(&mut env).unwrap();

        let it = env.integration().unwrap();
        let languages: Vec<_> = it.spec.sources.iter().map(|s| s.language).collect();
        assert_eq!(languages, vec![Some(Language::Java), Some(Language::Yaml)]);
        assert_eq!(
            it.status.as_ref().unwrap().profile,
            Some(TraitProfile::Kubernetes)
        );
    }

    #[test]
    fn test_unknown_language_fails() {
        let mut it = testing::integration("hello", IntegrationPhase::Initialization);
        it.spec.sources = vec![SourceSpec {
            name: "routes.txt".to_string(),
            ..Default::default()
        }];
        let mut env = testing::environment(it);

        let err = new_trait().apply(&mut env).unwrap_err();
        assert_eq!(
            err.to_string(),
            "unable to determine the language of source routes.txt"
        );
    }

    #[test]
    fn test_skipped_outside_initialization() {
        let env = testing::environment(testing::integration("hello", IntegrationPhase::Running));
        assert!(!new_trait().configure(&env).unwrap().0);
    }
}
