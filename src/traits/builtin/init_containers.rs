//! Init and sidecar containers declared as `name;image;command` tasks

use super::jvm::{self, AGENT_DIR, AGENT_VOLUME, JvmTrait};
use super::split_command;
use crate::traits::decode::lenient;
use crate::traits::{
    BaseTrait, Configured, Environment, ORDER_INIT_CONTAINERS, Trait, TraitCondition, TraitError,
    TraitResult,
};
use k8s_openapi::api::core::v1::{Container, VolumeMount};
use serde::Deserialize;

pub const ID: &str = "init-containers";

const AGENT_DOWNLOAD_TASK: &str = "agents-download";

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InitContainersConfig {
    #[serde(deserialize_with = "lenient::opt_bool")]
    pub enabled: Option<bool>,
    /// Containers run to completion before the integration starts
    #[serde(deserialize_with = "lenient::string_list")]
    pub init_tasks: Vec<String>,
    /// Containers running alongside the integration for the whole pod lifetime
    #[serde(deserialize_with = "lenient::string_list")]
    pub sidecar_tasks: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContainerTask {
    pub name: String,
    pub image: String,
    pub command: String,
    pub sidecar: bool,
}

impl ContainerTask {
    fn container(&self, mounts: Option<Vec<VolumeMount>>) -> Container {
        Container {
            name: self.name.clone(),
            image: Some(self.image.clone()),
            command: Some(split_command(&self.command)),
            restart_policy: self.sidecar.then(|| "Always".to_string()),
            volume_mounts: mounts,
            ..Default::default()
        }
    }
}

pub struct InitContainersTrait {
    base: BaseTrait,
    pub config: InitContainersConfig,
    tasks: Vec<ContainerTask>,
}

pub(crate) fn new_trait() -> Box<dyn Trait> {
    Box::new(InitContainersTrait {
        base: BaseTrait::new(ID, ORDER_INIT_CONTAINERS),
        config: InitContainersConfig::default(),
        tasks: Vec::new(),
    })
}

/// Parse the task list, `kind` only shows up in errors
pub fn parse_tasks(tasks: &[String], kind: &str, sidecar: bool) -> TraitResult<Vec<ContainerTask>> {
    tasks
        .iter()
        .map(|task| {
            let parts: Vec<&str> = task.splitn(3, ';').collect();
            let [name, image, command] = parts.as_slice() else {
                return Err(TraitError::InvalidConfiguration(format!(
                    "could not parse {} task {:?}: format expected \"name;container-image;command\"",
                    kind, task
                )));
            };
            Ok(ContainerTask {
                name: name.to_string(),
                image: image.to_string(),
                command: command.to_string(),
                sidecar,
            })
        })
        .collect()
}

impl InitContainersTrait {
    /// Task fetching the JVM agents into the shared agent volume
    fn agent_download_task(env: &Environment) -> TraitResult<Option<ContainerTask>> {
        let Some(jvm) = env.get_trait_as::<JvmTrait>(jvm::ID) else {
            return Ok(None);
        };
        if jvm.config.enabled == Some(false) {
            return Ok(None);
        }
        let agents = jvm.parse_agents()?;
        if agents.is_empty() {
            return Ok(None);
        }

        let downloads = agents
            .iter()
            .map(|agent| format!("curl -o {} {}", agent.jar_path(), agent.url))
            .collect::<Vec<_>>()
            .join(" && ");
        Ok(Some(ContainerTask {
            name: AGENT_DOWNLOAD_TASK.to_string(),
            image: env.config.agent_download_image.clone(),
            command: format!("/bin/sh -c \"{}\"", downloads),
            sidecar: false,
        }))
    }
}

impl Trait for InitContainersTrait {
    trait_base!();

    fn configure(&mut self, env: &Environment) -> TraitResult<Configured> {
        if env.integration.is_none() {
            return Ok((false, None));
        }
        if self.config.enabled == Some(false) {
            return Ok((false, Some(TraitCondition::user_disabled("InitContainers"))));
        }
        if !env.integration_in_running_phases() {
            return Ok((false, None));
        }

        let mut tasks = Vec::new();
        tasks.extend(Self::agent_download_task(env)?);
        tasks.extend(parse_tasks(&self.config.init_tasks, "init container", false)?);
        tasks.extend(parse_tasks(&self.config.sidecar_tasks, "sidecar container", true)?);
        self.tasks = tasks;

        Ok((!self.tasks.is_empty(), None))
    }

    fn apply(&mut self, env: &mut Environment) -> TraitResult<()> {
        let tasks = self.tasks.clone();
        env.resources.visit_pod_specs(|pod_spec| {
            let init_containers = pod_spec.init_containers.get_or_insert_with(Vec::new);
            for task in &tasks {
                if init_containers.iter().any(|c| c.name == task.name) {
                    continue;
                }
                let mounts = (task.name == AGENT_DOWNLOAD_TASK).then(|| {
                    vec![VolumeMount {
                        name: AGENT_VOLUME.to_string(),
                        mount_path: AGENT_DIR.to_string(),
                        ..Default::default()
                    }]
                });
                init_containers.push(task.container(mounts));
            }
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apis::IntegrationPhase;
    use crate::resources::object_meta;
    use crate::traits::builtin::testing;
    use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
    use k8s_openapi::api::core::v1::{PodSpec, PodTemplateSpec};

    fn environment() -> Environment {
        let mut env = testing::environment(testing::integration("hello", IntegrationPhase::Running));
        env.resources.add(Deployment {
            metadata: object_meta("hello", Some(testing::NAMESPACE)),
            spec: Some(DeploymentSpec {
                template: PodTemplateSpec {
                    spec: Some(PodSpec::default()),
                    ..Default::default()
                },
                ..Default::default()
            }),
            ..Default::default()
        });
        env
    }

    fn init_containers(env: &Environment) -> Vec<Container> {
        env.resources
            .find::<Deployment>(|_| true)
            .and_then(|d| d.spec.as_ref())
            .and_then(|s| s.template.spec.as_ref())
            .and_then(|p| p.init_containers.clone())
            .unwrap_or_default()
    }

    #[test]
    fn test_init_and_sidecar_tasks() {
        let mut env = environment();
        let mut t = InitContainersTrait {
            base: BaseTrait::new(ID, ORDER_INIT_CONTAINERS),
            config: InitContainersConfig {
                init_tasks: vec!["init;busybox;echo hello".to_string()],
                sidecar_tasks: vec!["proxy;envoy:1;envoy -c \"/etc/envoy.yaml\"".to_string()],
                ..Default::default()
            },
            tasks: Vec::new(),
        };
        assert!(t.configure(&env).unwrap().0);
        t.apply(&mut env).unwrap();

        let containers = init_containers(&env);
        assert_eq!(containers.len(), 2);
        assert_eq!(containers[0].name, "init");
        assert_eq!(containers[0].image.as_deref(), Some("busybox"));
        assert_eq!(
            containers[0].command,
            Some(vec!["echo".to_string(), "hello".to_string()])
        );
        assert_eq!(containers[0].restart_policy, None);
        assert_eq!(containers[1].restart_policy.as_deref(), Some("Always"));
        assert_eq!(
            containers[1].command,
            Some(vec![
                "envoy".to_string(),
                "-c".to_string(),
                "/etc/envoy.yaml".to_string()
            ])
        );
    }

    #[test]
    fn test_malformed_task() {
        let err = parse_tasks(&["init;busybox".to_string()], "init container", false).unwrap_err();
        assert_eq!(
            err.to_string(),
            "could not parse init container task \"init;busybox\": format expected \"name;container-image;command\""
        );
    }

    #[test]
    fn test_nothing_to_do() {
        let env = environment();
        assert!(!new_trait().configure(&env).unwrap().0);
    }

    #[test]
    fn test_jvm_agents_download() {
        let mut env = environment();
        if let Some(jvm) = env.catalog.get_as_mut::<JvmTrait>(jvm::ID) {
            jvm.config.agents = vec![
                "otel;https://repo/otel.jar".to_string(),
                "jolokia;https://repo/jolokia.jar;port=8778".to_string(),
            ];
        }
        let mut t = new_trait();
        assert!(t.configure(&env).unwrap().0);
        t.apply(&mut env).unwrap();

        let containers = init_containers(&env);
        assert_eq!(containers[0].name, AGENT_DOWNLOAD_TASK);
        assert_eq!(
            containers[0].command.clone().unwrap(),
            vec![
                "/bin/sh".to_string(),
                "-c".to_string(),
                "curl -o /agent/otel.jar https://repo/otel.jar && curl -o /agent/jolokia.jar https://repo/jolokia.jar".to_string(),
            ]
        );
        assert_eq!(
            containers[0].volume_mounts.clone().unwrap()[0].mount_path,
            AGENT_DIR
        );
    }
}
