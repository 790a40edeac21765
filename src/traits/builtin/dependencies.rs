//! Dependency resolution at initialization

use crate::apis::IntegrationPhase;
use crate::camel::{InspectError, normalize_dependency};
use crate::traits::decode::lenient;
use crate::traits::{
    BaseTrait, Configured, Environment, ORDER_DEPENDENCIES, Trait, TraitCondition, TraitResult,
};
use serde::Deserialize;
use std::collections::BTreeSet;

pub const ID: &str = "dependencies";

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DependenciesConfig {
    #[serde(deserialize_with = "lenient::opt_bool")]
    pub enabled: Option<bool>,
}

pub struct DependenciesTrait {
    base: BaseTrait,
    pub config: DependenciesConfig,
}

pub(crate) fn new_trait() -> Box<dyn Trait> {
    Box::new(DependenciesTrait {
        base: BaseTrait::platform(ID, ORDER_DEPENDENCIES),
        config: DependenciesConfig::default(),
    })
}

impl DependenciesTrait {
    fn resolve(env: &Environment) -> TraitResult<BTreeSet<String>> {
        let integration = env.integration()?;
        let catalog = env.camel_catalog()?;

        let mut dependencies: BTreeSet<String> = integration
            .spec
            .dependencies
            .iter()
            .map(|d| normalize_dependency(d))
            .collect();

        for source in &integration.spec.sources {
            let language = source
                .infer_language()
                .ok_or_else(|| InspectError::UnknownLanguage(source.name.clone()))?;

            if let Some(loader) = catalog.loader_for_language(language.as_str()) {
                dependencies.insert(format!("mvn:{}:{}", loader.group_id, loader.artifact_id));
                dependencies.extend(loader.dependencies.iter().map(|d| d.dependency_id()));
            }

            let metadata = env.inspector.inspect(source)?;
            for scheme in metadata.schemes() {
                match catalog.artifact_for_scheme(&scheme) {
                    Some(artifact) => {
                        dependencies.insert(artifact.dependency_id());
                    }
                    None => tracing::debug!(
                        "No catalog artifact for scheme {} in source {}",
                        scheme,
                        source.name
                    ),
                }
            }
        }

        dependencies.extend(catalog.runtime.dependencies.iter().map(|d| d.dependency_id()));
        Ok(dependencies)
    }
}

impl Trait for DependenciesTrait {
    trait_base!();

    fn configure(&mut self, env: &Environment) -> TraitResult<Configured> {
        if env.integration.is_none() {
            return Ok((false, None));
        }
        if self.config.enabled == Some(false) {
            return Ok((false, Some(TraitCondition::user_disabled("Dependencies"))));
        }
        Ok((env.integration_in_phase(&[IntegrationPhase::Initialization]), None))
    }

    fn apply(&mut self, env: &mut Environment) -> TraitResult<()> {
        let dependencies = Self::resolve(env)?;
        env.integration_mut()?.status_mut().dependencies = dependencies.into_iter().collect();
        Ok(())
    }
}
