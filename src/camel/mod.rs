//! Camel runtime knowledge used by the traits
//!
//! The runtime catalog maps endpoint schemes, DSL loaders and capabilities to Maven
//! artifacts. Source inspection extracts the endpoint URIs a route uses so traits can
//! derive dependencies and decide whether the Integration exposes HTTP.

mod catalog;
mod dependencies;
mod inspector;

pub use catalog::*;
pub use dependencies::*;
pub use inspector::*;

/// Catalog related errors
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("Failed to parse camel catalog: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("unable to find catalog matching version requirement: runtime={version}, provider={provider}")]
    NotFound { version: String, provider: String },
}
