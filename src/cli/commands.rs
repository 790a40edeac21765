//! CLI command handlers

use anyhow::{Context, Result};
use clap::{Args, Subcommand, ValueEnum};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::apis::{Integration, IntegrationKit, IntegrationPhase, IntegrationPlatform};
use crate::config::{self, ConfigLoader, OperatorConfig, paths};
use crate::traits::{self, Catalog, Environment, TraitRegistry};
use crate::worker::BackgroundWorker;

/// Configuration management subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigSubcommand {
    /// Get configuration value
    Get {
        /// Configuration key (e.g., "operatorId", "defaultProfile")
        key: Option<String>,
    },
    /// Set configuration value
    Set {
        /// Configuration key (e.g., "operatorId", "defaultProfile")
        key: String,
        /// Configuration value, empty to reset optional keys
        value: String,
    },
    /// List all configuration
    List,
    /// Show configuration file path
    Path,
    /// Validate configuration
    Validate,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Yaml,
    Json,
}

/// Inputs of a single pipeline run
#[derive(Args, Debug)]
pub struct RenderArgs {
    /// Integration manifest (YAML or JSON)
    #[arg(long, short = 'i')]
    pub integration: PathBuf,
    /// IntegrationKit manifest
    #[arg(long)]
    pub kit: Option<PathBuf>,
    /// IntegrationPlatform manifest
    #[arg(long)]
    pub platform: Option<PathBuf>,
    /// Override the Integration phase (e.g. "initialization", "running")
    #[arg(long)]
    pub phase: Option<String>,
    #[arg(long, short = 'o', value_enum, default_value_t = OutputFormat::Yaml)]
    pub output: OutputFormat,
}

fn read_manifest<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read manifest: {}", path.display()))?;
    serde_yaml::from_str(&contents)
        .with_context(|| format!("Failed to parse manifest: {}", path.display()))
}

/// Build the Environment for a render run
pub fn render_environment(args: &RenderArgs, config: OperatorConfig) -> Result<Environment> {
    let mut integration: Integration = read_manifest(&args.integration)?;
    if let Some(phase) = &args.phase {
        let phase: IntegrationPhase = phase.parse().map_err(|e: String| anyhow::anyhow!(e))?;
        integration.status_mut().phase = phase;
    }

    let mut env = Environment::new(Catalog::new(&TraitRegistry::with_builtin_traits()))
        .with_config(config)
        .with_integration(integration);
    if let Some(path) = &args.kit {
        env = env.with_kit(read_manifest::<IntegrationKit>(path)?);
    }
    if let Some(path) = &args.platform {
        env = env.with_platform(read_manifest::<IntegrationPlatform>(path)?);
    }
    Ok(env)
}

/// Run the trait pipeline on the given manifests and print the result
pub async fn handle_render_command(args: RenderArgs, config: OperatorConfig) -> Result<()> {
    let cancel = CancellationToken::new();
    let worker = BackgroundWorker::spawn(config.post_action_queue, cancel.clone());

    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            interrupt.cancel();
        }
    });

    let mut env = render_environment(&args, config)?
        .with_worker(worker.clone())
        .with_cancellation(cancel);

    traits::apply(&mut env).context("Trait pipeline failed")?;
    debug!("Executed traits: {}", env.executed_traits.join(","));

    let status = env.integration.as_ref().and_then(|it| it.status.clone());
    match args.output {
        OutputFormat::Yaml => {
            print!(
                "{}",
                env.resources
                    .to_yaml()
                    .context("Failed to serialize resources")?
            );
            if let Some(status) = &status {
                println!("---");
                print!(
                    "{}",
                    serde_yaml::to_string(status).context("Failed to serialize status")?
                );
            }
        }
        OutputFormat::Json => {
            let document = serde_json::json!({
                "resources": env.resources.items(),
                "status": status,
            });
            println!(
                "{}",
                serde_json::to_string_pretty(&document).context("Failed to serialize output")?
            );
        }
    }

    // Nothing is persisted by a render, post actions run right away
    let failures = env.run_post_actions();
    if failures > 0 {
        debug!("{} post actions failed", failures);
    }
    worker.shutdown().await;
    Ok(())
}

/// Print the registered traits in execution order
pub fn handle_traits_command() {
    let catalog = Catalog::new(&TraitRegistry::with_builtin_traits());
    for t in catalog.traits() {
        let kind = if t.is_platform_trait() {
            "platform"
        } else {
            "user"
        };
        println!("{:>5}  {:<16} {}", t.order(), t.id(), kind);
    }
}

/// Handle configuration subcommands
pub async fn handle_config_command(cmd: ConfigSubcommand, path: Option<&Path>) -> Result<()> {
    match cmd {
        ConfigSubcommand::Get { key } => {
            let config = ConfigLoader::load(path).context("Failed to load configuration")?;

            if let Some(key) = key {
                let value = config::get_config_value(&config, &key)?;
                println!("{}", value);
            } else {
                let yaml =
                    serde_yaml::to_string(&config).context("Failed to serialize configuration")?;
                print!("{}", yaml);
            }
        }
        ConfigSubcommand::Set { key, value } => {
            let mut config = ConfigLoader::load(path).unwrap_or_else(|_| ConfigLoader::load_defaults());

            config::set_config_value(&mut config, &key, &value)
                .with_context(|| format!("Failed to set {} = {}", key, value))?;

            let saved = match path {
                Some(path) => {
                    ConfigLoader::save(&config, path).context("Failed to save configuration")?;
                    path.to_path_buf()
                }
                None => ConfigLoader::save_root(&config).context("Failed to save configuration")?,
            };
            println!("Configuration saved to {}", saved.display());
        }
        ConfigSubcommand::List => {
            let config = ConfigLoader::load(path).context("Failed to load configuration")?;
            for key in config::CONFIG_KEYS {
                println!("{}: {}", key, config::get_config_value(&config, key)?);
            }
        }
        ConfigSubcommand::Path => {
            let config_path = path
                .map(Path::to_path_buf)
                .unwrap_or_else(paths::root_config_path);
            println!("{}", config_path.display());
        }
        ConfigSubcommand::Validate => {
            ConfigLoader::validate(path).context("Configuration validation failed")?;
            println!("Configuration is valid");
        }
    }

    Ok(())
}
