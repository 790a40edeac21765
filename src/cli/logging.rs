//! Logging initialization

use tracing_subscriber::EnvFilter;

/// Initialize logging to stderr so rendered manifests on stdout stay clean.
///
/// `RUST_LOG` wins over the debug flag. Initialising twice is a no-op.
pub fn init_logging(debug: bool) {
    let default_level = if debug { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .with_target(debug)
        .with_file(debug)
        .with_line_number(debug)
        .try_init();
}
