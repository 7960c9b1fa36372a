use std::collections::HashMap;

use chrono::{DateTime, Utc};
use core_types::Symbol;
use rust_decimal::Decimal;

/// Shared mutable state passed into every rule evaluation.
///
/// The context is owned by the [`RiskManager`](crate::RiskManager), never
/// ambient. Callers feed it before checks: the engine marks the last trade
/// price and the event clock from each market event, and the backtester
/// publishes the running drawdown. Generic numeric keys merge with
/// last-write-wins semantics.
#[derive(Debug, Default)]
pub struct RiskContext {
    values: HashMap<String, Decimal>,
    last_prices: HashMap<Symbol, Decimal>,
    clock: Option<DateTime<Utc>>,
}

impl RiskContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merges numeric keys into the context; the last write per key wins.
    pub fn merge<I>(&mut self, partial: I)
    where
        I: IntoIterator<Item = (String, Decimal)>,
    {
        self.values.extend(partial);
    }

    pub fn value(&self, key: &str) -> Option<Decimal> {
        self.values.get(key).copied()
    }

    /// Records the most recent traded price for a symbol.
    pub fn mark_price(&mut self, symbol: Symbol, price: Decimal) {
        self.last_prices.insert(symbol, price);
    }

    pub fn last_price(&self, symbol: &Symbol) -> Option<Decimal> {
        self.last_prices.get(symbol).copied()
    }

    pub fn last_prices(&self) -> &HashMap<Symbol, Decimal> {
        &self.last_prices
    }

    /// Sets the evaluation clock. This is event time, not wall time, so
    /// day-boundary rules behave identically in live trading and replay.
    pub fn set_clock(&mut self, now: DateTime<Utc>) {
        self.clock = Some(now);
    }

    pub fn clock(&self) -> Option<DateTime<Utc>> {
        self.clock
    }
}
