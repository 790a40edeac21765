//! Garbage collection of resources left behind by previous generations
//!
//! Every object produced by a reconcile is labelled with the Integration name and its
//! generation. Once the new objects are persisted, a post action queues a background
//! task deleting the labelled objects of older generations.

use crate::apis::{GENERATION_LABEL, INTEGRATION_LABEL};
use crate::traits::decode::lenient;
use crate::traits::{
    BaseTrait, Configured, Environment, ORDER_GC, Trait, TraitCondition, TraitResult,
};
use async_trait::async_trait;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::api::{Api, ApiResource, DeleteParams, DynamicObject, GroupVersionKind, ListParams};
use serde::Deserialize;

pub const ID: &str = "gc";

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GcConfig {
    #[serde(deserialize_with = "lenient::opt_bool")]
    pub enabled: Option<bool>,
}

pub struct GcTrait {
    base: BaseTrait,
    pub config: GcConfig,
}

pub(crate) fn new_trait() -> Box<dyn Trait> {
    Box::new(GcTrait {
        base: BaseTrait::new(ID, ORDER_GC),
        config: GcConfig::default(),
    })
}

/// Kinds the collector is allowed to delete
pub fn deletable_kinds() -> Vec<GroupVersionKind> {
    vec![
        GroupVersionKind::gvk("", "v1", "ConfigMap"),
        GroupVersionKind::gvk("", "v1", "Secret"),
        GroupVersionKind::gvk("", "v1", "Service"),
        GroupVersionKind::gvk("apps", "v1", "Deployment"),
        GroupVersionKind::gvk("batch", "v1", "CronJob"),
        GroupVersionKind::gvk("batch", "v1", "Job"),
        GroupVersionKind::gvk("policy", "v1", "PodDisruptionBudget"),
        GroupVersionKind::gvk("serving.knative.dev", "v1", "Service"),
        GroupVersionKind::gvk("keda.sh", "v1alpha1", "ScaledObject"),
    ]
}

/// An object found by the collector, with its generation label when present
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LabeledObject {
    pub name: String,
    pub generation: Option<i64>,
    pub owner_references: Vec<OwnerReference>,
}

impl LabeledObject {
    /// True when the named Integration is the controller of this object
    pub fn controlled_by(&self, integration: &str) -> bool {
        self.owner_references.iter().any(|owner| {
            owner.controller == Some(true)
                && owner.kind == "Integration"
                && owner.name == integration
                && owner.api_version.split('/').next() == Some(crate::apis::GROUP)
        })
    }
}

/// Cluster access needed by the collector
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ResourceDeleter: Send + Sync {
    /// Objects of kind `gvk` labelled with the Integration name
    async fn list(
        &self,
        gvk: &GroupVersionKind,
        namespace: &str,
        integration: &str,
    ) -> anyhow::Result<Vec<LabeledObject>>;

    /// Delete an object, succeeding when it is already gone
    async fn delete(&self, gvk: &GroupVersionKind, namespace: &str, name: &str)
    -> anyhow::Result<()>;
}

/// [`ResourceDeleter`] backed by the Kubernetes dynamic API
pub struct KubeDeleter {
    client: kube::Client,
}

impl KubeDeleter {
    pub fn new(client: kube::Client) -> Self {
        Self { client }
    }

    fn api(&self, gvk: &GroupVersionKind, namespace: &str) -> Api<DynamicObject> {
        let resource = ApiResource::from_gvk(gvk);
        Api::namespaced_with(self.client.clone(), namespace, &resource)
    }
}

#[async_trait]
impl ResourceDeleter for KubeDeleter {
    async fn list(
        &self,
        gvk: &GroupVersionKind,
        namespace: &str,
        integration: &str,
    ) -> anyhow::Result<Vec<LabeledObject>> {
        let params = ListParams::default().labels(&format!("{}={}", INTEGRATION_LABEL, integration));
        let list = match self.api(gvk, namespace).list(&params).await {
            Ok(list) => list,
            // Kind not served by this cluster
            Err(kube::Error::Api(ae)) if ae.code == 404 => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        Ok(list
            .items
            .into_iter()
            .map(|object| LabeledObject {
                generation: object
                    .metadata
                    .labels
                    .as_ref()
                    .and_then(|labels| labels.get(GENERATION_LABEL))
                    .and_then(|g| g.parse().ok()),
                name: object.metadata.name.unwrap_or_default(),
                owner_references: object.metadata.owner_references.unwrap_or_default(),
            })
            .collect())
    }

    async fn delete(
        &self,
        gvk: &GroupVersionKind,
        namespace: &str,
        name: &str,
    ) -> anyhow::Result<()> {
        match self
            .api(gvk, namespace)
            .delete(name, &DeleteParams::background())
            .await
        {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

/// Delete every object of an older generation controlled by the Integration. Returns the
/// number of objects deleted. Objects without a generation label are left alone; list and
/// delete failures are logged and skipped.
pub async fn collect_garbage(
    deleter: &dyn ResourceDeleter,
    namespace: &str,
    integration: &str,
    generation: i64,
) -> usize {
    let mut deleted = 0;
    for gvk in deletable_kinds() {
        let objects = match deleter.list(&gvk, namespace, integration).await {
            Ok(objects) => objects,
            Err(err) => {
                tracing::warn!(
                    "Cannot list {} of integration {}/{}: {}",
                    gvk.kind,
                    namespace,
                    integration,
                    err
                );
                continue;
            }
        };
        for object in objects {
            if !object.generation.is_some_and(|g| g < generation) {
                continue;
            }
            if !object.controlled_by(integration) {
                tracing::debug!(
                    "Skipping {} {}/{}: not controlled by integration {}",
                    gvk.kind,
                    namespace,
                    object.name,
                    integration
                );
                continue;
            }
            if let Err(err) = deleter.delete(&gvk, namespace, &object.name).await {
                tracing::warn!(
                    "Cannot delete {} {}/{} of integration {}: {}",
                    gvk.kind,
                    namespace,
                    object.name,
                    integration,
                    err
                );
                continue;
            }
            tracing::debug!(
                "Deleted {} {}/{} of integration {}",
                gvk.kind,
                namespace,
                object.name,
                integration
            );
            deleted += 1;
        }
    }
    deleted
}

fn label_resources(env: &mut Environment) -> TraitResult<()> {
    let name = env.integration_name();
    let generation = env.integration()?.generation().to_string();
    env.resources.visit_metadata(|_, meta| {
        let labels = meta.labels.get_or_insert_with(Default::default);
        labels.insert(INTEGRATION_LABEL.to_string(), name.clone());
        labels.insert(GENERATION_LABEL.to_string(), generation.clone());
    });
    Ok(())
}

fn schedule_collection(env: &Environment, generation: i64) -> TraitResult<()> {
    let name = env.integration_name();
    let (Some(client), Some(worker)) = (env.client.clone(), env.worker.as_ref()) else {
        tracing::debug!("No cluster access, skipping garbage collection of {}", name);
        return Ok(());
    };
    let namespace = env.integration_namespace().unwrap_or_default();

    worker.submit(format!("gc/{}", name), async move {
        let deleter = KubeDeleter::new(client);
        let deleted = collect_garbage(&deleter, &namespace, &name, generation).await;
        if deleted > 0 {
            tracing::info!(
                "Garbage collected {} resources of integration {}/{}",
                deleted,
                namespace,
                name
            );
        }
        Ok(())
    })?;
    Ok(())
}

impl Trait for GcTrait {
    trait_base!();

    fn configure(&mut self, env: &Environment) -> TraitResult<Configured> {
        if env.integration.is_none() {
            return Ok((false, None));
        }
        if self.config.enabled == Some(false) {
            return Ok((false, Some(TraitCondition::user_disabled("GC"))));
        }
        Ok((env.integration_in_running_phases(), None))
    }

    fn apply(&mut self, env: &mut Environment) -> TraitResult<()> {
        env.post_processors.push(Box::new(label_resources));

        let generation = env.integration()?.generation();
        if generation > 1 {
            env.post_actions
                .push(Box::new(move |env: &Environment| schedule_collection(env, generation)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apis::IntegrationPhase;
    use crate::traits::builtin::testing;
    use k8s_openapi::api::core::v1::ConfigMap;
    use mockall::predicate::eq;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_labels_every_resource() {
        let mut it = testing::integration("hello", IntegrationPhase::Running);
        it.metadata.generation = Some(3);
        let mut env = testing::environment(it);
        env.resources.add(ConfigMap {
            metadata: crate::resources::object_meta("cm", Some(testing::NAMESPACE)),
            ..Default::default()
        });

        let mut t = new_trait();
        assert!(t.configure(&env).unwrap().0);
        t.apply(&mut env).unwrap();
        assert_eq!(env.post_actions.len(), 1);

        let processor = env.post_processors.pop().unwrap();
        processor(&mut env).unwrap();

        let cm = env.resources.find::<ConfigMap>(|_| true).unwrap();
        let labels = cm.metadata.labels.as_ref().unwrap();
        assert_eq!(labels[INTEGRATION_LABEL], "hello");
        assert_eq!(labels[GENERATION_LABEL], "3");
    }

    #[test]
    fn test_first_generation_has_no_post_action() {
        let mut env = testing::environment(testing::integration("hello", IntegrationPhase::Running));
        new_trait().apply(&mut env).unwrap();
        assert!(env.post_actions.is_empty());
    }

    #[test]
    fn test_post_action_without_client_is_noop() {
        let mut it = testing::integration("hello", IntegrationPhase::Running);
        it.metadata.generation = Some(2);
        let mut env = testing::environment(it);
        new_trait().apply(&mut env).unwrap();
        assert_eq!(env.run_post_actions(), 0);
    }

    #[test]
    fn test_disabled_condition() {
        let env = testing::environment(testing::integration("hello", IntegrationPhase::Running));
        let mut t = GcTrait {
            base: BaseTrait::new(ID, ORDER_GC),
            config: GcConfig {
                enabled: Some(false),
            },
        };
        let (enabled, condition) = t.configure(&env).unwrap();
        assert!(!enabled);
        assert_eq!(condition.unwrap().condition_type(), "GCTraitInfo");
    }

    fn owned(name: &str, generation: Option<i64>) -> LabeledObject {
        LabeledObject {
            name: name.to_string(),
            generation,
            owner_references: vec![OwnerReference {
                api_version: "camel.apache.org/v1".to_string(),
                kind: "Integration".to_string(),
                name: "hello".to_string(),
                uid: "0f4c2b1e-hello".to_string(),
                controller: Some(true),
                ..Default::default()
            }],
        }
    }

    #[tokio::test]
    async fn test_collect_only_older_generations() {
        let mut deleter = MockResourceDeleter::new();
        deleter.expect_list().returning(|gvk, _, _| {
            if gvk.kind == "Deployment" {
                Ok(vec![
                    owned("old", Some(1)),
                    owned("current", Some(2)),
                    owned("unlabelled", None),
                ])
            } else {
                Ok(Vec::new())
            }
        });
        deleter
            .expect_delete()
            .with(
                eq(GroupVersionKind::gvk("apps", "v1", "Deployment")),
                eq("ns"),
                eq("old"),
            )
            .times(1)
            .returning(|_, _, _| Ok(()));

        assert_eq!(collect_garbage(&deleter, "ns", "hello", 2).await, 1);
    }

    #[tokio::test]
    async fn test_collect_skips_failed_deletes() {
        let deleted = Arc::new(Mutex::new(Vec::new()));
        let mut deleter = MockResourceDeleter::new();
        deleter.expect_list().returning(|gvk, _, _| match gvk.kind.as_str() {
            "ConfigMap" => Ok(vec![owned("locked", Some(1)), owned("stale", Some(1))]),
            "Deployment" => Ok(vec![owned("old-deploy", Some(1))]),
            "Secret" => Err(anyhow::anyhow!("secrets are forbidden")),
            _ => Ok(Vec::new()),
        });
        let record = deleted.clone();
        deleter.expect_delete().returning(move |_, _, name| {
            if name == "locked" {
                return Err(anyhow::anyhow!("forbidden"));
            }
            record.lock().unwrap().push(name.to_string());
            Ok(())
        });

        assert_eq!(collect_garbage(&deleter, "ns", "hello", 2).await, 2);
        assert_eq!(*deleted.lock().unwrap(), vec!["stale", "old-deploy"]);
    }

    #[tokio::test]
    async fn test_collect_leaves_foreign_objects() {
        let mut deleter = MockResourceDeleter::new();
        deleter.expect_list().returning(|gvk, _, _| {
            if gvk.kind != "ConfigMap" {
                return Ok(Vec::new());
            }
            let mut other_owner = owned("other-owner", Some(1));
            other_owner.owner_references[0].name = "goodbye".to_string();
            let mut not_controller = owned("not-controller", Some(1));
            not_controller.owner_references[0].controller = None;
            Ok(vec![
                LabeledObject {
                    name: "unowned".to_string(),
                    generation: Some(1),
                    ..Default::default()
                },
                other_owner,
                not_controller,
                owned("mine", Some(1)),
            ])
        });
        deleter
            .expect_delete()
            .with(
                eq(GroupVersionKind::gvk("", "v1", "ConfigMap")),
                eq("ns"),
                eq("mine"),
            )
            .times(1)
            .returning(|_, _, _| Ok(()));

        assert_eq!(collect_garbage(&deleter, "ns", "hello", 2).await, 1);
    }
}
