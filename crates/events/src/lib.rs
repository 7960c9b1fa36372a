//! Observable engine events.
//!
//! The strategy engine broadcasts these to whoever subscribes (persistence,
//! messaging, a UI); none of them are required for the core's correctness.

use analytics::types::PerformanceReport;
use chrono::{DateTime, Utc};
use core_types::{InstanceId, Order, OrderId, Side, Symbol};
use rust_decimal::Decimal;
use serde::Serialize;

/// Compact description of a strategy instance, for event payloads.
#[derive(Debug, Clone, Serialize)]
pub struct InstanceNotice {
    pub id: InstanceId,
    pub strategy: String,
    pub symbols: Vec<Symbol>,
    pub occurred_at: DateTime<Utc>,
}

/// Compact description of an order, for event payloads.
#[derive(Debug, Clone, Serialize)]
pub struct OrderNotice {
    pub id: OrderId,
    pub instance_id: InstanceId,
    pub symbol: Symbol,
    pub side: Side,
    pub quantity: Decimal,
    pub price: Option<Decimal>,
    pub occurred_at: DateTime<Utc>,
}

impl From<&Order> for OrderNotice {
    fn from(order: &Order) -> Self {
        Self {
            id: order.id.clone(),
            instance_id: order.instance_id,
            symbol: order.symbol.clone(),
            side: order.side,
            quantity: order.quantity,
            price: order.price,
            occurred_at: Utc::now(),
        }
    }
}

/// The top-level engine event enum.
/// `tag` and `content` give subscribers a clean JSON representation.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "payload")]
pub enum EngineEvent {
    InstanceCreated(InstanceNotice),
    InstanceStarted(InstanceNotice),
    InstanceStopped(InstanceNotice),
    InstanceErrored {
        instance: InstanceNotice,
        error: String,
    },
    OrderAccepted(OrderNotice),
    OrderRejected {
        order: OrderNotice,
        rule: String,
        reason: String,
    },
    BacktestCompleted {
        instance_id: InstanceId,
        report: PerformanceReport,
    },
}
