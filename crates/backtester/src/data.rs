use chrono::{DateTime, Utc};
use core_types::{Candle, Symbol, Timeframe};

use crate::error::Result;

/// Read-only supplier of historical market events.
///
/// Implementations must return candles strictly ordered and gap-free for
/// their declared granularity; the backtester re-sorts defensively but
/// relies on the source for completeness. Queries never mutate the
/// underlying data set.
pub trait HistoricalDataSource: Send + Sync {
    /// All candles for the given symbols and timeframes with
    /// `start <= timestamp < end`, ordered by timestamp with ties broken
    /// by symbol then timeframe.
    fn events(
        &self,
        symbols: &[Symbol],
        timeframes: &[Timeframe],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Candle>>;
}

/// Data source over a preloaded candle set, used by tests and small
/// research runs.
pub struct InMemoryDataSource {
    candles: Vec<Candle>,
}

impl InMemoryDataSource {
    pub fn new(candles: Vec<Candle>) -> Self {
        Self { candles }
    }
}

impl HistoricalDataSource for InMemoryDataSource {
    fn events(
        &self,
        symbols: &[Symbol],
        timeframes: &[Timeframe],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Candle>> {
        let mut selected: Vec<Candle> = self
            .candles
            .iter()
            .filter(|c| {
                symbols.contains(&c.symbol)
                    && timeframes.contains(&c.timeframe)
                    && c.timestamp >= start
                    && c.timestamp < end
            })
            .cloned()
            .collect();
        selected.sort_by(|a, b| {
            a.timestamp
                .cmp(&b.timestamp)
                .then_with(|| a.symbol.0.cmp(&b.symbol.0))
                .then_with(|| a.timeframe.0.cmp(&b.timeframe.0))
        });
        Ok(selected)
    }
}
