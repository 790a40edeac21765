//! Camel K trait pipeline
//!
//! Turns an Integration custom resource into the Kubernetes resources that run it, by
//! applying an ordered catalog of traits to a shared environment.

pub mod apis;
pub mod camel;
pub mod cli;
pub mod config;
pub mod resources;
pub mod traits;
pub mod worker;

pub use resources::{Collection, Resource};
pub use traits::{Catalog, Environment, Trait, TraitCondition, TraitError, TraitRegistry, TraitResult};
