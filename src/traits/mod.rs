//! Trait pipeline
//!
//! A trait is a self-contained configuration unit turning part of an Integration into
//! Kubernetes objects. Every reconcile builds a fresh [`Environment`] holding a
//! [`Catalog`] of trait instances, then [`apply`] runs them in a fixed total order:
//! `configure` decides whether the trait applies, `apply` mutates the environment.
//!
//! ## Adding a New Trait
//!
//! 1. Create a module under `builtin/` with a config struct and a trait struct
//! 2. Implement [`Trait`], starting the impl block with `trait_base!()`
//! 3. Register its factory in [`TraitRegistry::with_builtin_traits`]

/// Implements the identity, enablement and decoding parts of [`Trait`] for structs
/// holding a `base: BaseTrait` and a `config` with an `enabled: Option<bool>` field.
macro_rules! trait_base {
    () => {
        fn id(&self) -> &'static str {
            self.base.id()
        }

        fn order(&self) -> i32 {
            self.base.order()
        }

        fn enabled(&self) -> Option<bool> {
            self.config.enabled
        }

        fn is_platform_trait(&self) -> bool {
            self.base.is_platform()
        }

        fn decode(&mut self, options: serde_json::Value) -> $crate::traits::TraitResult<()> {
            self.config = $crate::traits::decode::decode_options(self.base.id(), options)?;
            Ok(())
        }
    };
}

pub mod builtin;
pub mod catalog;
pub mod condition;
pub mod decode;
pub mod environment;
pub mod registry;

use crate::apis::TraitProfile;
use std::any::Any;
use std::fmt;

pub use catalog::{Catalog, apply};
pub use condition::TraitCondition;
pub use environment::{Environment, PostAction, PostProcessor};
pub use registry::{TraitFactory, TraitRegistry};

/// Trait pipeline errors
#[derive(Debug, thiserror::Error)]
pub enum TraitError {
    #[error("{0}")]
    InvalidConfiguration(String),

    #[error("{0}")]
    MissingResource(String),

    #[error("unable to decode configuration of trait {id}: {source}")]
    Decode {
        id: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("{id} trait configuration failed: {source}")]
    ConfigureFailed {
        id: String,
        #[source]
        source: Box<TraitError>,
    },

    #[error("{id} trait execution failed: {source}")]
    ApplyFailed {
        id: String,
        #[source]
        source: Box<TraitError>,
    },

    #[error("post processing failed: {0}")]
    PostProcess(#[source] Box<TraitError>),

    #[error("trait pipeline cancelled")]
    Cancelled,

    #[error(transparent)]
    Catalog(#[from] crate::camel::CatalogError),

    #[error(transparent)]
    Inspect(#[from] crate::camel::InspectError),

    #[error(transparent)]
    Worker(#[from] crate::worker::WorkerError),

    #[error(transparent)]
    Kube(#[from] kube::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl TraitError {
    /// Innermost error, skipping the per-trait wrappers added by the catalog
    pub fn root_cause(&self) -> &TraitError {
        match self {
            TraitError::ConfigureFailed { source, .. }
            | TraitError::ApplyFailed { source, .. }
            | TraitError::PostProcess(source) => source.root_cause(),
            other => other,
        }
    }
}

/// Result type for trait operations
pub type TraitResult<T> = Result<T, TraitError>;

/// Outcome of [`Trait::configure`]: whether the trait applies, plus an optional
/// condition explaining the decision
pub type Configured = (bool, Option<TraitCondition>);

// Execution orders of the built-in traits, lowest first.
pub const ORDER_INIT: i32 = 1;
pub const ORDER_PLATFORM: i32 = 100;
pub const ORDER_CAMEL: i32 = 200;
pub const ORDER_DEPENDENCIES: i32 = 500;
pub const ORDER_ENVIRONMENT: i32 = 800;
pub const ORDER_PDB: i32 = 900;
pub const ORDER_CRON: i32 = 1000;
pub const ORDER_DEPLOYMENT: i32 = 1100;
pub const ORDER_GC: i32 = 1200;
pub const ORDER_TOLERATION: i32 = 1200;
pub const ORDER_AFFINITY: i32 = 1300;
pub const ORDER_KNATIVE_SERVICE: i32 = 1400;
pub const ORDER_SERVICE: i32 = 1500;
pub const ORDER_CONTAINER: i32 = 1600;
pub const ORDER_INIT_CONTAINERS: i32 = 1610;
pub const ORDER_HEALTH: i32 = 1700;
pub const ORDER_JVM: i32 = 2000;
pub const ORDER_ISTIO: i32 = 2300;
pub const ORDER_KEDA: i32 = 2450;
pub const ORDER_OWNER: i32 = 2500;

/// Upcast helper so sibling traits can be read back as their concrete type
pub trait AsAny: Any {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// The contract every trait implements
pub trait Trait: AsAny + Send {
    fn id(&self) -> &'static str;

    /// Position in the global execution order
    fn order(&self) -> i32;

    /// Tri-state enablement: `None` lets the trait decide from the environment
    fn enabled(&self) -> Option<bool>;

    /// Replace the trait configuration with the decoded property map
    fn decode(&mut self, options: serde_json::Value) -> TraitResult<()>;

    /// Decide whether the trait applies. May fill in defaults on the trait itself,
    /// never touches the environment.
    fn configure(&mut self, env: &Environment) -> TraitResult<Configured>;

    /// Mutate the environment. Only called when `configure` returned `true`.
    fn apply(&mut self, env: &mut Environment) -> TraitResult<()>;

    /// Operator internal behaviour rather than a user facing add-on
    fn is_platform_trait(&self) -> bool {
        false
    }

    /// Whether the trait configuration changes the built kit
    fn influences_kit(&self) -> bool {
        false
    }

    fn requires_integration_platform(&self) -> bool {
        true
    }

    fn is_allowed_in_profile(&self, _profile: TraitProfile) -> bool {
        true
    }

    fn controller_strategy_selector(&self) -> Option<&dyn ControllerStrategySelector> {
        None
    }
}

impl fmt::Debug for dyn Trait {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Trait")
            .field("id", &self.id())
            .field("order", &self.order())
            .finish()
    }
}

/// Identity shared by all traits
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BaseTrait {
    id: &'static str,
    order: i32,
    platform: bool,
}

impl BaseTrait {
    pub const fn new(id: &'static str, order: i32) -> Self {
        Self {
            id,
            order,
            platform: false,
        }
    }

    /// Identity of an operator internal trait
    pub const fn platform(id: &'static str, order: i32) -> Self {
        Self {
            id,
            order,
            platform: true,
        }
    }

    pub fn id(&self) -> &'static str {
        self.id
    }

    pub fn order(&self) -> i32 {
        self.order
    }

    pub fn is_platform(&self) -> bool {
        self.platform
    }
}

/// Workload kind materialising an Integration
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ControllerStrategy {
    #[default]
    Deployment,
    KnativeService,
    CronJob,
}

impl ControllerStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ControllerStrategy::Deployment => "deployment",
            ControllerStrategy::KnativeService => "knative-service",
            ControllerStrategy::CronJob => "cron-job",
        }
    }
}

impl fmt::Display for ControllerStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Implemented by traits able to pick the workload kind
pub trait ControllerStrategySelector {
    fn select_controller_strategy(
        &self,
        env: &Environment,
    ) -> TraitResult<Option<ControllerStrategy>>;

    /// Selectors are consulted in ascending order, the first choice wins
    fn controller_strategy_selector_order(&self) -> i32;
}

