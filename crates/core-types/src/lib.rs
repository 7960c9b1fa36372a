pub mod account;
pub mod error;
pub mod order;
pub mod strategy;
pub mod types;

// Re-export the most important types for easy access from other crates.
pub use account::{Account, Balance};
pub use error::{Error, Result};
pub use order::{Fill, Order, OrderId, OrderStatus, OrderType};
pub use strategy::{InstanceId, StrategyConfig};
pub use types::{Candle, Side, Symbol, Timeframe};
