//! CLI command handling module
//!
//! Handles all CLI subcommands and argument parsing.

mod commands;
mod logging;
mod version;

pub use commands::{
    ConfigSubcommand, OutputFormat, RenderArgs, handle_config_command, handle_render_command,
    handle_traits_command,
};
pub use logging::*;
pub use version::display_version;
