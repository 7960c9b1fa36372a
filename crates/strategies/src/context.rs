use std::sync::{Arc, Mutex, RwLock, Weak};

use chrono::{DateTime, Utc};
use core_types::{Account, InstanceId, Order, OrderId, OrderType, Side, StrategyConfig};
use risk::RiskManager;
use rust_decimal::Decimal;

use crate::error::Result;

/// Per-instance runtime environment handed to every strategy callback.
///
/// The context is owned exclusively by one instance and destroyed with it.
/// Its handles to the engine-shared risk manager and account are weak:
/// the engine owns those services, an instance must not extend their
/// lifetime. Order construction runs through a per-instance sequence
/// counter, which keeps order ids deterministic under replay.
pub struct StrategyContext {
    instance_id: InstanceId,
    config: Arc<StrategyConfig>,
    risk: Weak<Mutex<RiskManager>>,
    account: Weak<RwLock<Account>>,
    order_seq: u64,
    current_time: DateTime<Utc>,
}

impl StrategyContext {
    pub fn new(
        instance_id: InstanceId,
        config: Arc<StrategyConfig>,
        risk: Weak<Mutex<RiskManager>>,
        account: Weak<RwLock<Account>>,
    ) -> Self {
        Self {
            instance_id,
            config,
            risk,
            account,
            order_seq: 0,
            current_time: Utc::now(),
        }
    }

    pub fn instance_id(&self) -> InstanceId {
        self.instance_id
    }

    pub fn config(&self) -> &StrategyConfig {
        &self.config
    }

    /// Event time of the market event currently being processed.
    pub fn current_time(&self) -> DateTime<Utc> {
        self.current_time
    }

    /// Advanced by the engine before each callback.
    pub fn set_current_time(&mut self, now: DateTime<Utc>) {
        self.current_time = now;
    }

    /// The engine-shared risk manager, if the engine is still alive.
    pub fn risk_manager(&self) -> Option<Arc<Mutex<RiskManager>>> {
        self.risk.upgrade()
    }

    /// A consistent snapshot of the account state.
    pub fn account(&self) -> Option<Account> {
        let handle = self.account.upgrade()?;
        let snapshot = handle.read().expect("account lock poisoned").clone();
        Some(snapshot)
    }

    /// Builds a market order stamped with this instance's identity and the
    /// current event time.
    pub fn market_order(
        &mut self,
        symbol: core_types::Symbol,
        side: Side,
        quantity: Decimal,
    ) -> Result<Order> {
        let order = Order::new(
            self.next_order_id(),
            self.instance_id,
            symbol,
            side,
            OrderType::Market,
            quantity,
            None,
            self.current_time,
        )?;
        Ok(order)
    }

    /// Builds a limit order stamped with this instance's identity and the
    /// current event time.
    pub fn limit_order(
        &mut self,
        symbol: core_types::Symbol,
        side: Side,
        quantity: Decimal,
        price: Decimal,
    ) -> Result<Order> {
        let order = Order::new(
            self.next_order_id(),
            self.instance_id,
            symbol,
            side,
            OrderType::Limit,
            quantity,
            Some(price),
            self.current_time,
        )?;
        Ok(order)
    }

    fn next_order_id(&mut self) -> OrderId {
        self.order_seq += 1;
        OrderId(format!("{}-{}", self.instance_id, self.order_seq))
    }
}
