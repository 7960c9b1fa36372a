use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::strategy::InstanceId;
use crate::types::{Side, Symbol};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderType {
    Market,
    Limit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    /// Built by a strategy, not yet past the risk gate.
    Pending,
    /// Accepted and resting at the order sink.
    Open,
    Filled,
    Canceled,
    Rejected,
}

/// Identifier assigned at order construction, unique per engine run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderId(pub String);

impl std::fmt::Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// A request to trade, produced by a strategy instance.
///
/// Everything but `status` is fixed at construction. Status moves through
/// the guarded transition methods only; a closed order refuses further
/// transitions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub instance_id: InstanceId,
    pub symbol: Symbol,
    pub side: Side,
    pub order_type: OrderType,
    pub quantity: Decimal,
    /// Limit price. `None` for market orders.
    pub price: Option<Decimal>,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
}

impl Order {
    pub fn new(
        id: OrderId,
        instance_id: InstanceId,
        symbol: Symbol,
        side: Side,
        order_type: OrderType,
        quantity: Decimal,
        price: Option<Decimal>,
        created_at: DateTime<Utc>,
    ) -> Result<Self> {
        if order_type == OrderType::Limit && price.is_none() {
            return Err(Error::MissingPrice(order_type));
        }
        Ok(Self {
            id,
            instance_id,
            symbol,
            side,
            order_type,
            quantity,
            price,
            status: OrderStatus::Pending,
            created_at,
        })
    }

    pub fn is_closed(&self) -> bool {
        matches!(
            self.status,
            OrderStatus::Filled | OrderStatus::Canceled | OrderStatus::Rejected
        )
    }

    /// Marks the order as accepted by the sink.
    pub fn open(&mut self) -> Result<()> {
        self.transition(OrderStatus::Pending, OrderStatus::Open, "open")
    }

    pub fn fill(&mut self) -> Result<()> {
        if self.is_closed() {
            return Err(self.refused("fill"));
        }
        self.status = OrderStatus::Filled;
        Ok(())
    }

    pub fn cancel(&mut self) -> Result<()> {
        if self.is_closed() {
            return Err(self.refused("cancel"));
        }
        self.status = OrderStatus::Canceled;
        Ok(())
    }

    pub fn reject(&mut self) -> Result<()> {
        if self.is_closed() {
            return Err(self.refused("reject"));
        }
        self.status = OrderStatus::Rejected;
        Ok(())
    }

    fn transition(&mut self, from: OrderStatus, to: OrderStatus, action: &'static str) -> Result<()> {
        if self.status != from {
            return Err(self.refused(action));
        }
        self.status = to;
        Ok(())
    }

    fn refused(&self, action: &'static str) -> Error {
        Error::InvalidTransition {
            id: self.id.0.clone(),
            status: self.status,
            action,
        }
    }
}

/// The execution of an order against a price, live or simulated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fill {
    pub order_id: OrderId,
    pub instance_id: InstanceId,
    pub symbol: Symbol,
    pub side: Side,
    pub quantity: Decimal,
    pub price: Decimal,
    pub fee: Decimal,
    /// Profit realized by this fill against the position's average cost.
    /// Zero for fills that only open or extend a position.
    pub realized_pnl: Decimal,
    pub timestamp: DateTime<Utc>,
}
