//! Shared state of one reconcile
//!
//! Every trait observes and mutates the same [`Environment`]: what a lower order trait
//! writes is visible to every trait running after it.

use super::{
    Catalog, ControllerStrategy, Trait, TraitCondition, TraitError, TraitResult,
    builtin::container::{ContainerTrait, DEFAULT_CONTAINER_NAME},
};
use crate::apis::{
    INTEGRATION_LABEL, Integration, IntegrationKit, IntegrationKitPhase, IntegrationPhase,
    IntegrationPlatform, IntegrationPlatformPhase, TraitProfile,
};
use crate::camel::{CamelCatalog, SourceInspector, UriInspector};
use crate::config::OperatorConfig;
use crate::resources::{Collection, KnativeService, object_meta};
use crate::worker::BackgroundWorker;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::batch::v1::CronJob;
use k8s_openapi::api::core::v1::{ConfigMap, Container, EnvVar, EnvVarSource, PodSpec};
use kube::ResourceExt;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Deferred step run by the catalog after the main pass
pub type PostProcessor = Box<dyn FnOnce(&mut Environment) -> TraitResult<()> + Send>;

/// Deferred step run once the resources have been persisted. Failures are logged only.
pub type PostAction = Box<dyn FnOnce(&Environment) -> TraitResult<()> + Send>;

/// Default name of the port the integration container listens on
pub const DEFAULT_CONTAINER_PORT_NAME: &str = "http";
/// Port name used under Knative, which requires HTTP/2 cleartext naming
pub const KNATIVE_CONTAINER_PORT_NAME: &str = "h2c";

pub struct Environment {
    pub integration: Option<Integration>,
    pub integration_kit: Option<IntegrationKit>,
    pub platform: Option<IntegrationPlatform>,

    /// Runtime catalog resolved by the camel trait
    pub camel_catalog: Option<CamelCatalog>,
    /// Catalogs the camel trait may choose from
    pub available_catalogs: Vec<CamelCatalog>,

    pub catalog: Catalog,
    pub resources: Collection,
    pub env_vars: Vec<EnvVar>,
    pub application_properties: BTreeMap<String, String>,

    pub post_step_processors: Vec<PostProcessor>,
    pub post_processors: Vec<PostProcessor>,
    pub post_actions: Vec<PostAction>,

    /// Ids of the traits whose `configure` returned true, in execution order
    pub configured_traits: Vec<&'static str>,
    /// Ids of the traits whose `apply` completed, in execution order
    pub executed_traits: Vec<&'static str>,

    pub config: OperatorConfig,
    pub inspector: Arc<dyn SourceInspector>,
    pub client: Option<kube::Client>,
    pub worker: Option<BackgroundWorker>,
    pub cancellation: CancellationToken,

    pub(crate) controller_strategy: Option<ControllerStrategy>,
}

impl Environment {
    pub fn new(catalog: Catalog) -> Self {
        let available_catalogs = match CamelCatalog::embedded() {
            Ok(embedded) => vec![embedded],
            Err(err) => {
                tracing::warn!("Embedded camel catalog unavailable: {}", err);
                Vec::new()
            }
        };

        Self {
            integration: None,
            integration_kit: None,
            platform: None,
            camel_catalog: None,
            available_catalogs,
            catalog,
            resources: Collection::new(),
            env_vars: Vec::new(),
            application_properties: BTreeMap::new(),
            post_step_processors: Vec::new(),
            post_processors: Vec::new(),
            post_actions: Vec::new(),
            configured_traits: Vec::new(),
            executed_traits: Vec::new(),
            config: OperatorConfig::default(),
            inspector: Arc::new(UriInspector::default()),
            client: None,
            worker: None,
            cancellation: CancellationToken::new(),
            controller_strategy: None,
        }
    }

    pub fn with_integration(mut self, integration: Integration) -> Self {
        self.integration = Some(integration);
        self
    }

    pub fn with_kit(mut self, kit: IntegrationKit) -> Self {
        self.integration_kit = Some(kit);
        self
    }

    pub fn with_platform(mut self, platform: IntegrationPlatform) -> Self {
        self.platform = Some(platform);
        self
    }

    pub fn with_config(mut self, config: OperatorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_client(mut self, client: kube::Client) -> Self {
        self.client = Some(client);
        self
    }

    pub fn with_worker(mut self, worker: BackgroundWorker) -> Self {
        self.worker = Some(worker);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    pub fn with_inspector(mut self, inspector: Arc<dyn SourceInspector>) -> Self {
        self.inspector = inspector;
        self
    }

    pub fn integration(&self) -> TraitResult<&Integration> {
        self.integration
            .as_ref()
            .ok_or_else(|| TraitError::MissingResource("no integration in environment".into()))
    }

    pub fn integration_mut(&mut self) -> TraitResult<&mut Integration> {
        self.integration
            .as_mut()
            .ok_or_else(|| TraitError::MissingResource("no integration in environment".into()))
    }

    /// Name of the Integration, empty when reconciling a kit
    pub fn integration_name(&self) -> String {
        self.integration
            .as_ref()
            .map(|it| it.name_any())
            .unwrap_or_default()
    }

    pub fn integration_namespace(&self) -> Option<String> {
        self.integration.as_ref().and_then(|it| it.namespace())
    }

    pub fn camel_catalog(&self) -> TraitResult<&CamelCatalog> {
        self.camel_catalog
            .as_ref()
            .ok_or_else(|| TraitError::MissingResource("camel catalog not resolved".into()))
    }

    /// Fail fast when the reconcile was cancelled
    pub fn check_cancelled(&self) -> TraitResult<()> {
        if self.cancellation.is_cancelled() {
            Err(TraitError::Cancelled)
        } else {
            Ok(())
        }
    }

    pub fn integration_in_phase(&self, phases: &[IntegrationPhase]) -> bool {
        self.integration
            .as_ref()
            .is_some_and(|it| phases.contains(&it.phase()))
    }

    pub fn integration_in_running_phases(&self) -> bool {
        self.integration_in_phase(&IntegrationPhase::RUNNING)
    }

    pub fn integration_kit_in_phase(&self, phases: &[IntegrationKitPhase]) -> bool {
        self.integration_kit
            .as_ref()
            .is_some_and(|kit| phases.contains(&kit.phase()))
    }

    pub fn platform_in_phase(&self, phases: &[IntegrationPlatformPhase]) -> bool {
        self.platform
            .as_ref()
            .is_some_and(|p| phases.contains(&p.phase()))
    }

    pub fn in_phase(&self, kit_phase: IntegrationKitPhase, phase: IntegrationPhase) -> bool {
        self.integration_kit_in_phase(&[kit_phase]) && self.integration_in_phase(&[phase])
    }

    /// Profile of this reconcile: Integration status, Integration spec, kit, platform,
    /// operator default, then Kubernetes
    pub fn determine_profile(&self) -> TraitProfile {
        let integration = self.integration.as_ref();
        integration
            .and_then(|it| it.status.as_ref().and_then(|s| s.profile))
            .or_else(|| integration.and_then(|it| it.spec.profile))
            .or_else(|| self.integration_kit.as_ref().and_then(|k| k.spec.profile))
            .or_else(|| self.platform.as_ref().and_then(|p| p.profile()))
            .or(self.config.default_profile)
            .unwrap_or_default()
    }

    /// Workload kind for the Integration. Resolved once per pass by the catalog, computed
    /// from the strategy selectors when called outside a pass.
    pub fn determine_controller_strategy(&self) -> TraitResult<ControllerStrategy> {
        match self.controller_strategy {
            Some(strategy) => Ok(strategy),
            None => self.resolve_controller_strategy(),
        }
    }

    pub(crate) fn resolve_controller_strategy(&self) -> TraitResult<ControllerStrategy> {
        let mut selectors: Vec<_> = self
            .catalog
            .traits()
            .filter_map(|t| t.controller_strategy_selector())
            .collect();
        selectors.sort_by_key(|s| s.controller_strategy_selector_order());

        for selector in selectors {
            if let Some(strategy) = selector.select_controller_strategy(self)? {
                return Ok(strategy);
            }
        }
        Ok(ControllerStrategy::default())
    }

    pub fn determine_default_container_port_name(&self) -> &'static str {
        match self.determine_controller_strategy() {
            Ok(ControllerStrategy::KnativeService) => KNATIVE_CONTAINER_PORT_NAME,
            _ => DEFAULT_CONTAINER_PORT_NAME,
        }
    }

    /// Whether a consumer endpoint of the Integration sources is served over HTTP.
    /// False until the camel catalog is resolved.
    pub fn sources_expose_http(&self) -> TraitResult<bool> {
        let (Some(integration), Some(catalog)) = (&self.integration, &self.camel_catalog) else {
            return Ok(false);
        };
        for source in &integration.spec.sources {
            if self.inspector.inspect(source)?.exposes_http(catalog) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Sibling trait lookup. The trait currently executing is not visible to itself.
    pub fn get_trait(&self, id: &str) -> Option<&dyn Trait> {
        self.catalog.get_trait(id)
    }

    /// Sibling trait lookup, downcast to its concrete type
    pub fn get_trait_as<T: Trait>(&self, id: &str) -> Option<&T> {
        self.catalog.get_as::<T>(id)
    }

    /// Record a trait condition on the Integration, or on the kit when there is none
    pub fn set_trait_condition(&mut self, condition: &TraitCondition) {
        if let Some(integration) = self.integration.as_mut() {
            integration
                .status_mut()
                .set_condition(condition.integration_condition());
        } else if let Some(kit) = self.integration_kit.as_mut() {
            kit.status_mut().set_condition(condition.kit_condition());
        }
    }

    /// Selector labels shared by every object of the Integration
    pub fn integration_labels(&self) -> BTreeMap<String, String> {
        BTreeMap::from([(INTEGRATION_LABEL.to_string(), self.integration_name())])
    }

    pub fn set_env_var(&mut self, name: &str, value: impl Into<String>) {
        self.upsert_env_var(EnvVar {
            name: name.to_string(),
            value: Some(value.into()),
            value_from: None,
        });
    }

    pub fn set_env_var_from(&mut self, name: &str, source: EnvVarSource) {
        self.upsert_env_var(EnvVar {
            name: name.to_string(),
            value: None,
            value_from: Some(source),
        });
    }

    fn upsert_env_var(&mut self, var: EnvVar) {
        match self.env_vars.iter_mut().find(|v| v.name == var.name) {
            Some(existing) => *existing = var,
            None => self.env_vars.push(var),
        }
    }

    /// Name of the integration container, as configured on the container trait
    pub fn integration_container_name(&self) -> String {
        self.get_trait_as::<ContainerTrait>(super::builtin::container::ID)
            .and_then(|t| t.config.name.clone())
            .unwrap_or_else(|| DEFAULT_CONTAINER_NAME.to_string())
    }

    /// Pod spec of the Integration workload, whatever its kind
    pub fn integration_pod_spec_mut(&mut self) -> Option<&mut PodSpec> {
        let name = self.integration_name();
        let matches = |meta: &k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta| {
            meta.name.as_deref() == Some(name.as_str())
        };

        if self
            .resources
            .find::<Deployment>(|d| matches(&d.metadata))
            .is_some()
        {
            let deployment = self.resources.find_mut::<Deployment>(|d| matches(&d.metadata))?;
            return deployment
                .spec
                .as_mut()
                .and_then(|spec| spec.template.spec.as_mut());
        }
        if self
            .resources
            .find::<KnativeService>(|s| matches(&s.metadata))
            .is_some()
        {
            let service = self
                .resources
                .find_mut::<KnativeService>(|s| matches(&s.metadata))?;
            return Some(&mut service.spec.template.spec.pod_spec);
        }
        let cron_job = self.resources.find_mut::<CronJob>(|c| matches(&c.metadata))?;
        cron_job
            .spec
            .as_mut()
            .and_then(|spec| spec.job_template.spec.as_mut())
            .and_then(|job| job.template.spec.as_mut())
    }

    /// The integration container inside the workload pod spec
    pub fn integration_container_mut(&mut self) -> Option<&mut Container> {
        let name = self.integration_container_name();
        self.integration_pod_spec_mut()?
            .containers
            .iter_mut()
            .find(|c| c.name == name)
    }

    /// ConfigMap holding the application properties, `None` when there are none
    pub fn compute_application_properties(&self) -> Option<ConfigMap> {
        if self.application_properties.is_empty() {
            return None;
        }

        let name = self.integration_name();
        let content: String = self
            .application_properties
            .iter()
            .map(|(key, value)| format!("{}={}\n", key, value))
            .collect();

        let mut metadata = object_meta(
            &format!("{}-application-properties", name),
            self.integration_namespace().as_deref(),
        );
        metadata.labels = Some(BTreeMap::from([
            (INTEGRATION_LABEL.to_string(), name),
            (
                "camel.apache.org/properties.type".to_string(),
                "application".to_string(),
            ),
        ]));

        Some(ConfigMap {
            metadata,
            data: Some(BTreeMap::from([(
                "application.properties".to_string(),
                content,
            )])),
            ..Default::default()
        })
    }

    /// Run the post actions registered during the pass. Meant to be called once the
    /// resources have been persisted. Failures are logged and counted, never returned.
    pub fn run_post_actions(&mut self) -> usize {
        let actions = std::mem::take(&mut self.post_actions);
        let mut failures = 0;
        for action in actions {
            if let Err(err) = action(self) {
                failures += 1;
                tracing::warn!(
                    "Post action failed for integration {}: {}",
                    self.integration_name(),
                    err
                );
            }
        }
        failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apis::{IntegrationSpec, IntegrationStatus};
    use crate::traits::TraitRegistry;

    fn environment(phase: IntegrationPhase) -> Environment {
        let mut integration = Integration::new("hello", IntegrationSpec::default());
        integration.metadata.namespace = Some("default".to_string());
        integration.status = Some(IntegrationStatus {
            phase,
            ..Default::default()
        });
        Environment::new(Catalog::new(&TraitRegistry::with_builtin_traits()))
            .with_integration(integration)
    }

    #[test]
    fn test_phase_predicates() {
        let env = environment(IntegrationPhase::Deploying);
        assert!(env.integration_in_running_phases());
        assert!(env.integration_in_phase(&[IntegrationPhase::Deploying]));
        assert!(!env.integration_in_phase(&[IntegrationPhase::Initialization]));
        assert!(!env.platform_in_phase(&[IntegrationPlatformPhase::Ready]));
    }

    #[test]
    fn test_determine_profile_precedence() {
        let mut env = environment(IntegrationPhase::Running);
        assert_eq!(env.determine_profile(), TraitProfile::Kubernetes);

        env.config.default_profile = Some(TraitProfile::OpenShift);
        assert_eq!(env.determine_profile(), TraitProfile::OpenShift);

        if let Some(it) = env.integration.as_mut() {
            it.spec.profile = Some(TraitProfile::Knative);
        }
        assert_eq!(env.determine_profile(), TraitProfile::Knative);
    }

    #[test]
    fn test_env_var_upsert() {
        let mut env = environment(IntegrationPhase::Running);
        env.set_env_var("A", "1");
        env.set_env_var("A", "2");
        assert_eq!(env.env_vars.len(), 1);
        assert_eq!(env.env_vars[0].value.as_deref(), Some("2"));
    }

    #[test]
    fn test_application_properties_configmap() {
        let mut env = environment(IntegrationPhase::Running);
        assert!(env.compute_application_properties().is_none());

        env.application_properties
            .insert("my.key".to_string(), "value".to_string());
        env.application_properties
            .insert("camel.foo".to_string(), "bar".to_string());

        let cm = env.compute_application_properties().unwrap();
        assert_eq!(
            cm.metadata.name.as_deref(),
            Some("hello-application-properties")
        );
        let data = cm.data.unwrap();
        insta::assert_snapshot!(data["application.properties"], @r"
        camel.foo=bar
        my.key=value
        ");
    }

    #[test]
    fn test_default_controller_strategy() {
        let env = environment(IntegrationPhase::Running);
        assert_eq!(
            env.determine_controller_strategy().unwrap(),
            ControllerStrategy::Deployment
        );
        assert_eq!(env.determine_default_container_port_name(), "http");
    }
}
