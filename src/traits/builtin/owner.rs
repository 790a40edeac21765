//! Ownership of the generated resources

use crate::traits::decode::lenient;
use crate::traits::{
    BaseTrait, Configured, Environment, ORDER_OWNER, Trait, TraitCondition, TraitResult,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use kube::Resource;
use serde::Deserialize;
use std::collections::BTreeMap;
use tracing::debug;

pub const ID: &str = "owner";

/// Kinds never owned by an Integration
const UNOWNED_KINDS: [&str; 1] = ["IntegrationPlatform"];

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OwnerConfig {
    #[serde(deserialize_with = "lenient::opt_bool")]
    pub enabled: Option<bool>,
    /// Integration annotations copied to the resources and their pods
    #[serde(deserialize_with = "lenient::string_list")]
    pub target_annotations: Vec<String>,
    /// Integration labels copied to the resources and their pods
    #[serde(deserialize_with = "lenient::string_list")]
    pub target_labels: Vec<String>,
}

pub struct OwnerTrait {
    base: BaseTrait,
    pub config: OwnerConfig,
}

pub(crate) fn new_trait() -> Box<dyn Trait> {
    Box::new(OwnerTrait {
        base: BaseTrait::platform(ID, ORDER_OWNER),
        config: OwnerConfig::default(),
    })
}

fn pick(source: Option<&BTreeMap<String, String>>, keys: &[String]) -> BTreeMap<String, String> {
    let Some(source) = source else {
        return BTreeMap::new();
    };
    keys.iter()
        .filter_map(|k| source.get(k).map(|v| (k.clone(), v.clone())))
        .collect()
}

fn merge_into(target: &mut Option<BTreeMap<String, String>>, values: &BTreeMap<String, String>) {
    if values.is_empty() {
        return;
    }
    target
        .get_or_insert_with(BTreeMap::new)
        .extend(values.iter().map(|(k, v)| (k.clone(), v.clone())));
}

fn set_owner(meta: &mut ObjectMeta, owner: &OwnerReference) {
    let references = meta.owner_references.get_or_insert_with(Vec::new);
    references.retain(|r| r.uid != owner.uid && r.controller != Some(true));
    references.push(owner.clone());
}

impl Trait for OwnerTrait {
    trait_base!();

    fn configure(&mut self, env: &Environment) -> TraitResult<Configured> {
        if env.integration.is_none() {
            return Ok((false, None));
        }
        if self.config.enabled == Some(false) {
            return Ok((false, Some(TraitCondition::user_disabled("Owner"))));
        }
        Ok((env.integration_in_running_phases(), None))
    }

    fn apply(&mut self, env: &mut Environment) -> TraitResult<()> {
        let integration = env.integration()?;
        let owner = integration.controller_owner_ref(&());
        let annotations = pick(
            integration.metadata.annotations.as_ref(),
            &self.config.target_annotations,
        );
        let labels = pick(integration.metadata.labels.as_ref(), &self.config.target_labels);

        if owner.is_none() {
            debug!(
                "Integration {} has no uid yet, resources left without owner",
                env.integration_name()
            );
        }

        env.resources.visit_metadata(|kind, meta| {
            if UNOWNED_KINDS.contains(&kind) {
                return;
            }
            if let Some(owner) = &owner {
                set_owner(meta, owner);
            }
            merge_into(&mut meta.annotations, &annotations);
            merge_into(&mut meta.labels, &labels);
        });
        env.resources.visit_pod_template_meta(|meta| {
            merge_into(&mut meta.annotations, &annotations);
            merge_into(&mut meta.labels, &labels);
        });
        Ok(())
    }
}
