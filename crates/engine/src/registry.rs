//! The registry mapping strategy class identifiers to constructors.

use std::collections::HashMap;

use core_types::StrategyConfig;
use strategies::dca::Dca;
use strategies::sma_crossover::SmaCrossover;
use strategies::Strategy;

use crate::error::{Error, Result};

/// Builds a strategy instance from a validated configuration.
pub type StrategyFactory =
    Box<dyn Fn(&StrategyConfig) -> strategies::Result<Box<dyn Strategy>> + Send + Sync>;

/// Runtime registry of strategy implementations, keyed by class identifier.
/// Concrete strategies register a factory here instead of relying on any
/// inheritance-style dispatch.
#[derive(Default)]
pub struct StrategyRegistry {
    factories: HashMap<String, StrategyFactory>,
}

impl StrategyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The registry with the built-in strategies already registered.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry
            .register(SmaCrossover::ID, Box::new(|config| {
                Ok(Box::new(SmaCrossover::from_config(config)?) as Box<dyn Strategy>)
            }))
            .expect("empty registry cannot hold duplicates");
        registry
            .register(Dca::ID, Box::new(|config| {
                Ok(Box::new(Dca::from_config(config)?) as Box<dyn Strategy>)
            }))
            .expect("empty registry cannot hold duplicates");
        registry
    }

    pub fn register(&mut self, class_id: impl Into<String>, factory: StrategyFactory) -> Result<()> {
        let class_id = class_id.into();
        if self.factories.contains_key(&class_id) {
            return Err(Error::DuplicateRegistration(class_id));
        }
        tracing::info!(class = %class_id, "strategy class registered");
        self.factories.insert(class_id, factory);
        Ok(())
    }

    pub fn create(&self, class_id: &str, config: &StrategyConfig) -> Result<Box<dyn Strategy>> {
        let factory = self
            .factories
            .get(class_id)
            .ok_or_else(|| Error::UnknownClass(class_id.to_string()))?;
        factory(config).map_err(|e| Error::Configuration(e.to_string()))
    }

    pub fn class_ids(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }
}
