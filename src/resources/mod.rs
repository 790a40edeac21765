//! Resource collection
//!
//! The ordered set of Kubernetes objects built by the traits during one reconcile.
//! Objects are only ever added: traits locate an existing object and mutate it, or
//! create it when missing, so that several traits can shape the same Deployment.
//!
//! ## Adding a New Resource Kind
//!
//! 1. Model the type (k8s-openapi, or a hand-written serde struct in this module)
//! 2. Add a line to the `collection_items!` invocation below
//! 3. If the kind carries a pod template, extend [`Collection::visit_pod_specs`] and
//!    [`Collection::visit_pod_template_meta`]

mod keda;
mod knative;

pub use keda::*;
pub use knative::*;

use crate::apis::IntegrationPlatform;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::batch::v1::CronJob;
use k8s_openapi::api::core::v1::{ConfigMap, Container, PodSpec, Secret, Service};
use k8s_openapi::api::policy::v1::PodDisruptionBudget;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::Serialize;

/// Typed access to the members of [`Resource`]
pub trait CollectionItem: Into<Resource> {
    fn from_resource(resource: &Resource) -> Option<&Self>;
    fn from_resource_mut(resource: &mut Resource) -> Option<&mut Self>;
}

macro_rules! collection_items {
    ($($variant:ident($type:ty) => $api_version:expr, $kind:expr;)+) => {
        /// A Kubernetes object held by the collection
        #[derive(Clone, Debug, Serialize)]
        #[serde(untagged)]
        pub enum Resource {
            $($variant($type),)+
        }

        impl Resource {
            pub fn api_version(&self) -> &'static str {
                match self {
                    $(Resource::$variant(_) => $api_version,)+
                }
            }

            pub fn kind(&self) -> &'static str {
                match self {
                    $(Resource::$variant(_) => $kind,)+
                }
            }

            pub fn metadata(&self) -> &ObjectMeta {
                match self {
                    $(Resource::$variant(r) => &r.metadata,)+
                }
            }

            pub fn metadata_mut(&mut self) -> &mut ObjectMeta {
                match self {
                    $(Resource::$variant(r) => &mut r.metadata,)+
                }
            }
        }

        $(
            impl From<$type> for Resource {
                fn from(resource: $type) -> Self {
                    Resource::$variant(resource)
                }
            }

            impl CollectionItem for $type {
                fn from_resource(resource: &Resource) -> Option<&Self> {
                    match resource {
                        Resource::$variant(r) => Some(r),
                        _ => None,
                    }
                }

                fn from_resource_mut(resource: &mut Resource) -> Option<&mut Self> {
                    match resource {
                        Resource::$variant(r) => Some(r),
                        _ => None,
                    }
                }
            }
        )+
    };
}

collection_items! {
    Deployment(Deployment) => "apps/v1", "Deployment";
    KnativeService(KnativeService) => KnativeService::API_VERSION, KnativeService::KIND;
    CronJob(CronJob) => "batch/v1", "CronJob";
    Service(Service) => "v1", "Service";
    ConfigMap(ConfigMap) => "v1", "ConfigMap";
    Secret(Secret) => "v1", "Secret";
    PodDisruptionBudget(PodDisruptionBudget) => "policy/v1", "PodDisruptionBudget";
    ScaledObject(ScaledObject) => ScaledObject::API_VERSION, ScaledObject::KIND;
    IntegrationPlatform(IntegrationPlatform) => "camel.apache.org/v1", "IntegrationPlatform";
}

impl Resource {
    pub fn name(&self) -> &str {
        self.metadata().name.as_deref().unwrap_or_default()
    }
}

/// Ordered, append-only set of resources
#[derive(Clone, Debug, Default)]
pub struct Collection {
    items: Vec<Resource>,
}

impl Collection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn add(&mut self, resource: impl Into<Resource>) {
        self.items.push(resource.into());
    }

    pub fn add_all<R: Into<Resource>>(&mut self, resources: impl IntoIterator<Item = R>) {
        self.items.extend(resources.into_iter().map(Into::into));
    }

    pub fn items(&self) -> &[Resource] {
        &self.items
    }

    pub fn into_items(self) -> Vec<Resource> {
        self.items
    }

    /// Every object of kind `T`, in insertion order
    pub fn all<'a, T: CollectionItem + 'a>(&'a self) -> impl Iterator<Item = &'a T> {
        self.items.iter().filter_map(T::from_resource)
    }

    pub fn find<T: CollectionItem>(&self, predicate: impl Fn(&T) -> bool) -> Option<&T> {
        self.all::<T>().find(|r| predicate(r))
    }

    pub fn find_mut<T: CollectionItem>(
        &mut self,
        predicate: impl Fn(&T) -> bool,
    ) -> Option<&mut T> {
        self.items
            .iter_mut()
            .filter_map(T::from_resource_mut)
            .find(|r| predicate(r))
    }

    /// Apply `visitor` to every object of kind `T`
    pub fn visit<T: CollectionItem>(&mut self, mut visitor: impl FnMut(&mut T)) {
        self.items
            .iter_mut()
            .filter_map(T::from_resource_mut)
            .for_each(|r| visitor(r));
    }

    /// Locate the first object of kind `T` matching `predicate`, adding the one built by
    /// `create` when there is none. Calling it twice never yields a duplicate.
    pub fn get_or_create<T: CollectionItem>(
        &mut self,
        predicate: impl Fn(&T) -> bool,
        create: impl FnOnce() -> T,
    ) -> &mut T {
        let position = self
            .items
            .iter()
            .position(|r| T::from_resource(r).is_some_and(&predicate));
        let index = match position {
            Some(index) => index,
            None => {
                self.items.push(create().into());
                self.items.len() - 1
            }
        };
        match T::from_resource_mut(&mut self.items[index]) {
            Some(resource) => resource,
            None => unreachable!("collection item stored under a foreign variant"),
        }
    }

    /// Apply `visitor` to the metadata of every object
    pub fn visit_metadata(&mut self, mut visitor: impl FnMut(&str, &mut ObjectMeta)) {
        for resource in self.items.iter_mut() {
            let kind = resource.kind();
            visitor(kind, resource.metadata_mut());
        }
    }

    /// Apply `visitor` to every pod spec held by a workload
    pub fn visit_pod_specs(&mut self, mut visitor: impl FnMut(&mut PodSpec)) {
        for resource in self.items.iter_mut() {
            if let Some(pod_spec) = pod_spec_mut(resource) {
                visitor(pod_spec);
            }
        }
    }

    /// Apply `visitor` to every pod template metadata held by a workload
    pub fn visit_pod_template_meta(&mut self, mut visitor: impl FnMut(&mut ObjectMeta)) {
        for resource in self.items.iter_mut() {
            let meta = match resource {
                Resource::Deployment(d) => d
                    .spec
                    .get_or_insert_with(Default::default)
                    .template
                    .metadata
                    .get_or_insert_with(Default::default),
                Resource::KnativeService(s) => &mut s.spec.template.metadata,
                Resource::CronJob(c) => c
                    .spec
                    .get_or_insert_with(Default::default)
                    .job_template
                    .spec
                    .get_or_insert_with(Default::default)
                    .template
                    .metadata
                    .get_or_insert_with(Default::default),
                _ => continue,
            };
            visitor(meta);
        }
    }

    /// Apply `visitor` to every container of every workload
    pub fn visit_containers(&mut self, mut visitor: impl FnMut(&mut Container)) {
        self.visit_pod_specs(|spec| spec.containers.iter_mut().for_each(&mut visitor));
    }

    /// Render the collection as a multi-document YAML stream
    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        let mut out = String::new();
        for resource in &self.items {
            out.push_str("---\n");
            out.push_str(&serde_yaml::to_string(resource)?);
        }
        Ok(out)
    }
}

/// Pod spec of a workload resource, created on demand
pub fn pod_spec_mut(resource: &mut Resource) -> Option<&mut PodSpec> {
    match resource {
        Resource::Deployment(d) => Some(
            d.spec
                .get_or_insert_with(Default::default)
                .template
                .spec
                .get_or_insert_with(Default::default),
        ),
        Resource::KnativeService(s) => Some(&mut s.spec.template.spec.pod_spec),
        Resource::CronJob(c) => Some(
            c.spec
                .get_or_insert_with(Default::default)
                .job_template
                .spec
                .get_or_insert_with(Default::default)
                .template
                .spec
                .get_or_insert_with(Default::default),
        ),
        _ => None,
    }
}

/// Metadata carrying only a name and a namespace
pub fn object_meta(name: &str, namespace: Option<&str>) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: namespace.map(str::to_string),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deployment(name: &str) -> Deployment {
        Deployment {
            metadata: object_meta(name, Some("default")),
            ..Default::default()
        }
    }

    #[test]
    fn test_resource_kind_and_version() {
        let resource: Resource = deployment("it").into();
        assert_eq!(resource.kind(), "Deployment");
        assert_eq!(resource.api_version(), "apps/v1");
        assert_eq!(resource.name(), "it");
    }

    #[test]
    fn test_find_by_kind() {
        let mut collection = Collection::new();
        collection.add(deployment("a"));
        collection.add(ConfigMap {
            metadata: object_meta("a", None),
            ..Default::default()
        });

        assert!(
            collection
                .find::<Deployment>(|d| d.metadata.name.as_deref() == Some("a"))
                .is_some()
        );
        assert_eq!(collection.all::<ConfigMap>().count(), 1);
        assert!(collection.find::<Service>(|_| true).is_none());
    }

    #[test]
    fn test_pod_specs_created_on_visit() {
        let mut collection = Collection::new();
        collection.add(deployment("a"));
        collection.visit_pod_specs(|spec| spec.containers.push(Container::default()));

        let d = collection.find::<Deployment>(|_| true).unwrap();
        let spec = d.spec.as_ref().unwrap().template.spec.as_ref().unwrap();
        assert_eq!(spec.containers.len(), 1);
    }
}
