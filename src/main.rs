//! camelk-traits - render Camel K Integrations through the trait pipeline
//!
//! Runs the trait catalog against Integration manifests and prints the generated
//! Kubernetes resources.

use anyhow::{Context, Result};
use camelk_traits::cli::{self, ConfigSubcommand, RenderArgs};
use camelk_traits::config::ConfigLoader;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "camelk-traits")]
#[command(about = "Render Camel K Integrations into Kubernetes resources", long_about = None)]
struct Args {
    /// Enable debug logging
    #[arg(long, short = 'd', global = true)]
    debug: bool,

    /// Configuration file, defaults to the user configuration directory
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the trait pipeline on an Integration and print the resulting resources
    Render(RenderArgs),
    /// List the registered traits in execution order
    Traits,
    /// Configuration management
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    cli::init_logging(args.debug);

    match args.command {
        Command::Render(render) => {
            let config =
                ConfigLoader::load(args.config.as_deref()).context("Failed to load configuration")?;
            tracing::debug!(
                "Configuration loaded: operatorId={}, postActionQueue={}",
                config.operator_id,
                config.post_action_queue
            );
            cli::handle_render_command(render, config).await
        }
        Command::Traits => {
            cli::handle_traits_command();
            Ok(())
        }
        Command::Config { subcommand } => {
            cli::handle_config_command(subcommand, args.config.as_deref()).await
        }
        Command::Version => {
            cli::display_version();
            Ok(())
        }
    }
}
