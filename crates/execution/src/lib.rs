use async_trait::async_trait;
use core_types::{Order, OrderId};

pub mod error;
pub mod simulated;
pub mod types;

// Re-export public types
pub use error::{Error, Result};
pub use simulated::{SimulatedAccount, SimulatedSink};
pub use types::{FillSettings, LimitFillPolicy};

/// The universal interface for an order destination.
///
/// A sink receives orders that already passed the risk gate and owns what
/// happens to them next: a live implementation wraps exchange submission
/// and cancellation wire calls, the simulated implementation computes
/// deterministic fills against replayed bars. Cancellation is never
/// risk-gated, so `cancel` must be safe to call for any order the sink has
/// seen.
#[async_trait]
pub trait OrderSink: Send + Sync {
    /// The name of the sink (e.g. "SimulatedSink").
    fn name(&self) -> &'static str;

    /// Accepts an order for execution and returns its id.
    async fn submit(&self, order: Order) -> Result<OrderId>;

    /// Cancels a previously submitted order.
    async fn cancel(&self, order_id: &OrderId) -> Result<()>;
}
