use serde::{Deserialize, Serialize};
use toml::Value;

use crate::error::{Error, Result};
use crate::types::{Symbol, Timeframe};

/// Identifier of one running (or stopped) strategy occurrence.
///
/// Allocated by the engine, unique within its lifetime, never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InstanceId(pub u64);

impl std::fmt::Display for InstanceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Immutable configuration bound to a strategy instance at creation time.
///
/// Changing a configuration means creating a new instance; a live instance
/// never observes a different one. `params` carries the strategy-specific
/// parameter table and is deserialized into a typed settings struct by the
/// strategy itself.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct StrategyConfig {
    pub name: String,
    pub symbols: Vec<Symbol>,
    pub exchange_ids: Vec<String>,
    pub timeframes: Vec<Timeframe>,
    #[serde(default = "empty_params")]
    pub params: Value,
}

fn empty_params() -> Value {
    Value::Table(toml::value::Table::new())
}

impl StrategyConfig {
    pub fn new(
        name: impl Into<String>,
        symbols: Vec<Symbol>,
        exchange_ids: Vec<String>,
        timeframes: Vec<Timeframe>,
        params: Value,
    ) -> Self {
        Self {
            name: name.into(),
            symbols,
            exchange_ids,
            timeframes,
            params,
        }
    }

    /// Checks the structural invariants every instance relies on:
    /// non-empty symbol/exchange/timeframe sets and well-formed pairs.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::InvalidConfig("strategy name is empty".into()));
        }
        if self.symbols.is_empty() {
            return Err(Error::InvalidConfig("no symbols configured".into()));
        }
        if self.exchange_ids.is_empty() {
            return Err(Error::InvalidConfig("no exchanges configured".into()));
        }
        if self.timeframes.is_empty() {
            return Err(Error::InvalidConfig("no timeframes configured".into()));
        }
        for symbol in &self.symbols {
            symbol.split()?;
        }
        for timeframe in &self.timeframes {
            if timeframe.0.trim().is_empty() {
                return Err(Error::InvalidTimeframe(timeframe.0.clone()));
            }
        }
        Ok(())
    }

    /// Whether this configuration subscribes to a (symbol, timeframe) pair.
    pub fn subscribes_to(&self, symbol: &Symbol, timeframe: &Timeframe) -> bool {
        self.symbols.contains(symbol) && self.timeframes.contains(timeframe)
    }

    /// All (symbol, timeframe) pairs this configuration subscribes to.
    pub fn subscriptions(&self) -> Vec<(Symbol, Timeframe)> {
        let mut pairs = Vec::with_capacity(self.symbols.len() * self.timeframes.len());
        for symbol in &self.symbols {
            for timeframe in &self.timeframes {
                pairs.push((symbol.clone(), timeframe.clone()));
            }
        }
        pairs
    }
}
