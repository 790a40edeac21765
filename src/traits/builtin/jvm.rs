//! JVM command line of the integration container

use crate::apis::IntegrationKitPhase;
use crate::traits::decode::lenient;
use crate::traits::{
    BaseTrait, Configured, Environment, ORDER_JVM, Trait, TraitCondition, TraitError,
    TraitResult,
};
use k8s_openapi::api::core::v1::{Container, EmptyDirVolumeSource, Volume, VolumeMount};
use serde::Deserialize;
use std::collections::BTreeSet;

pub const ID: &str = "jvm";

pub const DEBUG_LABEL: &str = "camel.apache.org/debug";
pub const DEFAULT_DEBUG_ADDRESS: &str = "*:5005";
pub const AGENT_DIR: &str = "/agent";
pub const AGENT_VOLUME: &str = "agent";

const DEPLOYMENT_DIR: &str = "/deployments";
const DEFAULT_CLASSPATH: [&str; 4] = [
    "./resources",
    "/etc/camel/resources",
    "/etc/camel/resources.d/_configmaps",
    "/etc/camel/resources.d/_secrets",
];
const KIT_DEPENDENCY_PATHS: [&str; 4] = [
    "dependencies/*",
    "dependencies/lib/boot/*",
    "dependencies/lib/main/*",
    "dependencies/quarkus/*",
];
const HEAP_OPTIONS: [&str; 4] = [
    "-Xmx",
    "-XX:MaxHeapSize",
    "-XX:MinRAMPercentage",
    "-XX:MaxRAMPercentage",
];
const DEFAULT_MAX_MEMORY_PERCENTAGE: u64 = 50;
const LOW_MEMORY_MAX_MEMORY_PERCENTAGE: u64 = 25;
const LOW_MEMORY_THRESHOLD_BYTES: u64 = 300_000_000;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct JvmConfig {
    #[serde(deserialize_with = "lenient::opt_bool")]
    pub enabled: Option<bool>,
    /// Open a JDWP port on the JVM
    #[serde(deserialize_with = "lenient::opt_bool")]
    pub debug: Option<bool>,
    #[serde(deserialize_with = "lenient::opt_bool")]
    pub debug_suspend: Option<bool>,
    #[serde(deserialize_with = "lenient::opt_string")]
    pub debug_address: Option<String>,
    /// Extra JVM options
    #[serde(deserialize_with = "lenient::string_list")]
    pub options: Vec<String>,
    /// Extra classpath entries, colon separated
    #[serde(deserialize_with = "lenient::opt_string")]
    pub classpath: Option<String>,
    /// Run this jar instead of the runtime application class
    #[serde(deserialize_with = "lenient::opt_string")]
    pub jar: Option<String>,
    /// Java agents as `name;url[;options]`
    #[serde(deserialize_with = "lenient::string_list")]
    pub agents: Vec<String>,
}

/// A Java agent downloaded by an init container
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JvmAgent {
    pub name: String,
    pub url: String,
    pub options: Option<String>,
}

impl JvmAgent {
    pub fn jar_path(&self) -> String {
        format!("{}/{}.jar", AGENT_DIR, self.name)
    }

    fn argument(&self) -> String {
        match &self.options {
            Some(options) => format!("-javaagent:{}={}", self.jar_path(), options),
            None => format!("-javaagent:{}", self.jar_path()),
        }
    }
}

pub struct JvmTrait {
    base: BaseTrait,
    pub config: JvmConfig,
}

pub(crate) fn new_trait() -> Box<dyn Trait> {
    Box::new(JvmTrait {
        base: BaseTrait::new(ID, ORDER_JVM),
        config: JvmConfig::default(),
    })
}

/// Memory quantity in bytes, `None` for anything that is not a plain or suffixed integer
fn quantity_bytes(quantity: &str) -> Option<u64> {
    let split = quantity
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(quantity.len());
    let (number, suffix) = quantity.split_at(split);
    let number: u64 = number.parse().ok()?;
    let multiplier: u64 = match suffix {
        "" => 1,
        "k" => 1_000,
        "M" => 1_000_000,
        "G" => 1_000_000_000,
        "T" => 1_000_000_000_000,
        "Ki" => 1 << 10,
        "Mi" => 1 << 20,
        "Gi" => 1 << 30,
        "Ti" => 1 << 40,
        _ => return None,
    };
    number.checked_mul(multiplier)
}

/// `-Xmx` capped to a share of the memory limit, smaller for small containers
fn max_heap_option(limit: &str) -> Option<String> {
    let bytes = quantity_bytes(limit)?;
    let percentage = if bytes < LOW_MEMORY_THRESHOLD_BYTES {
        LOW_MEMORY_MAX_MEMORY_PERCENTAGE
    } else {
        DEFAULT_MAX_MEMORY_PERCENTAGE
    };
    let megabytes = bytes.div_ceil(1_000_000);
    Some(format!("-Xmx{}M", megabytes * percentage / 100))
}

impl JvmTrait {
    /// True when the JVM will open a debug port
    pub fn debug_enabled(&self) -> bool {
        self.config.enabled != Some(false) && self.config.debug.unwrap_or(false)
    }

    pub fn parse_agents(&self) -> TraitResult<Vec<JvmAgent>> {
        self.config
            .agents
            .iter()
            .map(|agent| {
                let parts: Vec<&str> = agent.splitn(3, ';').collect();
                match parts.as_slice() {
                    [name, url] | [name, url, _] if !name.is_empty() && !url.is_empty() => {
                        Ok(JvmAgent {
                            name: name.to_string(),
                            url: url.to_string(),
                            options: parts.get(2).map(|o| o.to_string()),
                        })
                    }
                    _ => Err(TraitError::InvalidConfiguration(format!(
                        "could not parse JVM agent {:?}: format expected \"agent-name;agent-url[;jvm-agent-options]\"",
                        agent
                    ))),
                }
            })
            .collect()
    }

    fn debug_argument(&self) -> String {
        let suspend = if self.config.debug_suspend.unwrap_or(false) {
            "y"
        } else {
            "n"
        };
        format!(
            "-agentlib:jdwp=transport=dt_socket,server=y,suspend={},address={}",
            suspend,
            self.config
                .debug_address
                .as_deref()
                .unwrap_or(DEFAULT_DEBUG_ADDRESS)
        )
    }

    fn classpath(&self, container: &Container, with_kit: bool) -> String {
        let mut items: BTreeSet<String> = DEFAULT_CLASSPATH.iter().map(|s| s.to_string()).collect();
        if let Some(classpath) = &self.config.classpath {
            items.extend(classpath.split(':').filter(|s| !s.is_empty()).map(str::to_string));
        }
        if let Some(mounts) = &container.volume_mounts {
            items.extend(
                mounts
                    .iter()
                    .filter(|m| m.mount_path != AGENT_DIR)
                    .map(|m| m.mount_path.clone()),
            );
        }
        if with_kit {
            items.extend(KIT_DEPENDENCY_PATHS.iter().map(|s| s.to_string()));
        }
        items.into_iter().collect::<Vec<_>>().join(":")
    }
}

impl Trait for JvmTrait {
    trait_base!();

    fn configure(&mut self, env: &Environment) -> TraitResult<Configured> {
        if env.integration.is_none() {
            return Ok((false, None));
        }
        if self.config.enabled == Some(false) {
            return Ok((false, Some(TraitCondition::user_disabled("JVM"))));
        }
        let kit_pending = env.integration_kit.is_some()
            && !env.integration_kit_in_phase(&[IntegrationKitPhase::Ready]);
        if kit_pending || !env.integration_in_running_phases() {
            return Ok((false, None));
        }
        self.parse_agents()?;
        Ok((true, None))
    }

    fn apply(&mut self, env: &mut Environment) -> TraitResult<()> {
        let debug = self.debug_enabled();
        if debug {
            env.resources.visit_pod_template_meta(|meta| {
                meta.labels
                    .get_or_insert_with(Default::default)
                    .insert(DEBUG_LABEL.to_string(), "true".to_string());
            });
        }

        let agents = self.parse_agents()?;
        if !agents.is_empty() {
            if let Some(pod_spec) = env.integration_pod_spec_mut() {
                let volumes = pod_spec.volumes.get_or_insert_with(Vec::new);
                if !volumes.iter().any(|v| v.name == AGENT_VOLUME) {
                    volumes.push(Volume {
                        name: AGENT_VOLUME.to_string(),
                        empty_dir: Some(EmptyDirVolumeSource::default()),
                        ..Default::default()
                    });
                }
            }
        }

        let application_class = env.camel_catalog()?.runtime.application_class.clone();
        let with_kit = env.integration_kit.is_some();
        let name = env.integration_name();
        let Some(container) = env.integration_container_mut() else {
            return Err(TraitError::MissingResource(format!(
                "unable to find a container for {} Integration",
                name
            )));
        };

        let mut args = container.args.take().unwrap_or_default();
        if debug {
            args.push(self.debug_argument());
        }
        args.extend(agents.iter().map(JvmAgent::argument));

        let has_heap_option = self
            .config
            .options
            .iter()
            .any(|o| HEAP_OPTIONS.iter().any(|h| o.contains(h)));
        args.extend(self.config.options.iter().cloned());
        if !has_heap_option {
            let memory_limit = container
                .resources
                .as_ref()
                .and_then(|r| r.limits.as_ref())
                .and_then(|l| l.get("memory"))
                .and_then(|q| max_heap_option(&q.0));
            args.extend(memory_limit);
        }

        if !agents.is_empty() {
            let mounts = container.volume_mounts.get_or_insert_with(Vec::new);
            if !mounts.iter().any(|m| m.mount_path == AGENT_DIR) {
                mounts.push(VolumeMount {
                    name: AGENT_VOLUME.to_string(),
                    mount_path: AGENT_DIR.to_string(),
                    ..Default::default()
                });
            }
        }

        args.push("-cp".to_string());
        match &self.config.jar {
            Some(jar) => {
                args.push(self.classpath(container, false));
                args.push("-jar".to_string());
                args.push(jar.clone());
            }
            None => {
                args.push(self.classpath(container, with_kit));
                args.push(application_class);
            }
        }

        container.working_dir = Some(DEPLOYMENT_DIR.to_string());
        container.command = Some(vec!["java".to_string()]);
        container.args = Some(args);
        Ok(())
    }
}
