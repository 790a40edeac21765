//! Trait catalog and execution engine
//!
//! The catalog owns one instance of every registered trait, sorted by order with
//! registration order breaking ties. [`apply`] runs the whole pipeline on an
//! [`Environment`]:
//!
//! 1. merge the trait options of every source and decode them onto the traits
//! 2. resolve the controller strategy, again once the camel catalog becomes known
//! 3. for each trait in order: `configure`, record its condition, `apply` when enabled
//! 4. drain the post step processors, then the post processors, in FIFO order
//!
//! Configure and apply errors abort the pass. Post actions are left on the environment
//! for the caller to run once the resources have been persisted.

use super::decode::{TraitOptions, collect_options};
use super::{Environment, PostProcessor, Trait, TraitError, TraitRegistry, TraitResult};
use crate::apis::{IntegrationPlatformPhase, TraitProfile};
use serde_json::{Map, Value};
use tracing::{debug, info};

/// Trait instances of one reconcile
#[derive(Debug)]
pub struct Catalog {
    // A slot is empty while its trait executes.
    slots: Vec<Option<Box<dyn Trait>>>,
}

impl Catalog {
    pub fn new(registry: &TraitRegistry) -> Self {
        let mut traits: Vec<(usize, Box<dyn Trait>)> = registry
            .factories()
            .iter()
            .enumerate()
            .map(|(index, factory)| (index, factory()))
            .collect();
        traits.sort_by_key(|(index, t)| (t.order(), *index));

        Self {
            slots: traits.into_iter().map(|(_, t)| Some(t)).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Trait ids in execution order
    pub fn ids(&self) -> Vec<&'static str> {
        self.traits().map(|t| t.id()).collect()
    }

    /// Every trait not currently executing, in execution order
    pub fn traits(&self) -> impl Iterator<Item = &dyn Trait> {
        self.slots.iter().flatten().map(|t| &**t)
    }

    pub fn get_trait(&self, id: &str) -> Option<&dyn Trait> {
        self.traits().find(|t| t.id() == id)
    }

    pub fn get_as<T: Trait>(&self, id: &str) -> Option<&T> {
        self.get_trait(id)?.as_any().downcast_ref::<T>()
    }

    pub fn get_as_mut<T: Trait>(&mut self, id: &str) -> Option<&mut T> {
        self.slots
            .iter_mut()
            .flatten()
            .find(|t| t.id() == id)
            .and_then(|t| (**t).as_any_mut().downcast_mut::<T>())
    }

    /// Reset every trait to its default configuration, then decode merged options onto
    /// the matching traits
    pub fn decode(&mut self, options: TraitOptions) -> TraitResult<()> {
        for t in self.slots.iter_mut().flatten() {
            t.decode(Value::Object(Map::new()))?;
        }
        for (id, properties) in options {
            let slot = self
                .slots
                .iter_mut()
                .flatten()
                .find(|t| t.id() == id)
                .ok_or_else(|| {
                    TraitError::InvalidConfiguration(format!(
                        "trait {} does not exist in catalog",
                        id
                    ))
                })?;
            slot.decode(Value::Object(properties))?;
        }
        Ok(())
    }

    fn checkout(&mut self, index: usize) -> Option<Box<dyn Trait>> {
        self.slots.get_mut(index).and_then(Option::take)
    }

    fn restore(&mut self, index: usize, t: Box<dyn Trait>) {
        if let Some(slot) = self.slots.get_mut(index) {
            *slot = Some(t);
        }
    }
}

/// Run the trait pipeline on `env`
pub fn apply(env: &mut Environment) -> TraitResult<()> {
    let options = collect_options(
        env.platform.as_ref(),
        env.integration_kit.as_ref(),
        env.integration.as_ref(),
    )?;
    env.catalog.decode(options)?;

    env.controller_strategy = None;
    let strategy = env.resolve_controller_strategy()?;
    env.controller_strategy = Some(strategy);

    let profile = env.determine_profile();
    let platform_ready = env.platform_in_phase(&[IntegrationPlatformPhase::Ready]);
    debug!(
        "Applying traits to {} (profile {}, strategy {})",
        env.integration_name(),
        profile,
        strategy
    );

    env.configured_traits.clear();
    env.executed_traits.clear();

    for index in 0..env.catalog.len() {
        env.check_cancelled()?;

        let Some(mut t) = env.catalog.checkout(index) else {
            continue;
        };
        let catalog_known = env.camel_catalog.is_some();
        let outcome = run_trait(env, &mut *t, profile, platform_ready);
        env.catalog.restore(index, t);
        outcome?;

        // Selectors inspecting source endpoints need the camel catalog.
        if !catalog_known && env.camel_catalog.is_some() {
            let resolved = env.resolve_controller_strategy()?;
            if env.controller_strategy != Some(resolved) {
                debug!(
                    "Controller strategy of {} is now {}",
                    env.integration_name(),
                    resolved
                );
            }
            env.controller_strategy = Some(resolved);
        }
    }

    run_processors(env, |env| std::mem::take(&mut env.post_step_processors))?;
    run_processors(env, |env| std::mem::take(&mut env.post_processors))?;

    info!(
        "Applied {} traits to {}: {}",
        env.executed_traits.len(),
        env.integration_name(),
        env.executed_traits.join(",")
    );
    Ok(())
}

fn run_trait(
    env: &mut Environment,
    t: &mut dyn Trait,
    profile: TraitProfile,
    platform_ready: bool,
) -> TraitResult<()> {
    let id = t.id();

    if t.requires_integration_platform() && !platform_ready {
        debug!("Skipping trait {}: integration platform not ready", id);
        return Ok(());
    }
    if !t.is_allowed_in_profile(profile) {
        debug!("Skipping trait {}: not allowed in profile {}", id, profile);
        return Ok(());
    }

    let (enabled, condition) = t.configure(env).map_err(|source| TraitError::ConfigureFailed {
        id: id.to_string(),
        source: Box::new(source),
    })?;
    if let Some(condition) = condition {
        env.set_trait_condition(&condition);
    }
    if !enabled || t.enabled() == Some(false) {
        debug!("Trait {} not applicable", id);
        return Ok(());
    }

    env.configured_traits.push(id);
    t.apply(env).map_err(|source| TraitError::ApplyFailed {
        id: id.to_string(),
        source: Box::new(source),
    })?;
    env.executed_traits.push(id);
    debug!("Applied trait {}", id);
    Ok(())
}

// Processors may schedule further processors of the same list; they run in later batches.
fn run_processors(
    env: &mut Environment,
    take: fn(&mut Environment) -> Vec<PostProcessor>,
) -> TraitResult<()> {
    loop {
        let batch = take(env);
        if batch.is_empty() {
            return Ok(());
        }
        for processor in batch {
            env.check_cancelled()?;
            processor(env).map_err(|source| TraitError::PostProcess(Box::new(source)))?;
        }
    }
}
