//! Trait registry
//!
//! Explicit list of trait factories. A catalog instantiates every registered trait once
//! per reconcile.

use super::{Trait, builtin};

/// Builds a fresh trait instance with its default configuration
pub type TraitFactory = fn() -> Box<dyn Trait>;

/// Ordered set of trait factories
#[derive(Clone, Debug, Default)]
pub struct TraitRegistry {
    factories: Vec<TraitFactory>,
}

impl TraitRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            factories: Vec::new(),
        }
    }

    /// Registry holding every built-in trait
    pub fn with_builtin_traits() -> Self {
        let mut registry = Self::new();
        for factory in builtin::factories() {
            registry.register(factory);
        }
        registry
    }

    /// Register a trait factory. Registration order breaks ties between equal orders.
    pub fn register(&mut self, factory: TraitFactory) -> &mut Self {
        self.factories.push(factory);
        self
    }

    pub fn factories(&self) -> &[TraitFactory] {
        &self.factories
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[test]
    fn test_builtin_ids_are_unique() {
        let registry = TraitRegistry::with_builtin_traits();
        let ids: BTreeSet<_> = registry.factories().iter().map(|f| f().id()).collect();
        assert_eq!(ids.len(), registry.len());
        assert!(ids.contains("health"));
        assert!(ids.contains("keda"));
    }

    #[test]
    fn test_empty_registry() {
        assert!(TraitRegistry::new().is_empty());
    }
}
