use core_types::Candle;

pub mod context;
pub mod dca;
pub mod error;
pub mod result;
pub mod sma_crossover;
pub mod types;

// Re-export public types
pub use context::StrategyContext;
pub use error::{Error, Result};
pub use result::StrategyResult;

/// The universal interface for a unit of trading logic.
///
/// A strategy is a stateful entity: it may keep indicator state, its own
/// position bookkeeping, or anything else across calls. The engine owns
/// the lifecycle around it — a strategy only ever sees one callback at a
/// time, always with its own context.
pub trait Strategy: Send {
    /// The name of the strategy.
    fn name(&self) -> &'static str;

    /// Called once when the instance is created, before any market event.
    /// A strategy may register risk rules into the shared manager here
    /// through the context.
    fn initialize(&mut self, _ctx: &mut StrategyContext) -> Result<()> {
        Ok(())
    }

    /// Consumes one market event and produces the orders, cancellations
    /// and log lines it wants acted upon. An `Err` here is caught by the
    /// engine, counted against the instance, and never crosses to other
    /// instances.
    fn on_market_event(&mut self, candle: &Candle, ctx: &mut StrategyContext)
        -> Result<StrategyResult>;

    /// Called when the instance stops. State survives for a later restart.
    fn on_stop(&mut self, _ctx: &mut StrategyContext) {}
}
