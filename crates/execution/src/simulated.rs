use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use core_types::{Account, Balance, Candle, Fill, Order, OrderId, OrderType, Side, Symbol};
use num_traits::FromPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::error::{Error, Result};
use crate::types::{FillSettings, LimitFillPolicy};
use crate::OrderSink;

/// Average-cost basis of one held position, for realized-pnl accounting.
#[derive(Debug, Clone, Copy)]
struct PositionCost {
    quantity: Decimal,
    avg_cost: Decimal,
}

/// The simulated account and fill model used for backtests.
///
/// Market orders fill immediately at the last marked close of their
/// symbol, slippage-adjusted. Limit orders rest and are evaluated against
/// every subsequent bar of their symbol (`mark`). All balance mutation in
/// a backtest happens here; strategies and risk rules only ever read the
/// shared account.
pub struct SimulatedAccount {
    commission_rate: Decimal,
    slippage: Decimal,
    limit_fill: LimitFillPolicy,
    initial_capital: Decimal,
    quote_asset: String,
    account: Arc<RwLock<Account>>,
    open_orders: Vec<Order>,
    fills: Vec<Fill>,
    equity_curve: Vec<(DateTime<Utc>, Decimal)>,
    last_candles: HashMap<Symbol, Candle>,
    position_costs: HashMap<Symbol, PositionCost>,
}

impl SimulatedAccount {
    pub fn new(
        settings: FillSettings,
        initial_capital: Decimal,
        quote_asset: impl Into<String>,
        account: Arc<RwLock<Account>>,
    ) -> Self {
        let mut simulated = Self {
            commission_rate: Decimal::from_f64(settings.commission_rate).unwrap_or(Decimal::ZERO),
            slippage: Decimal::from_f64(settings.slippage).unwrap_or(Decimal::ZERO),
            limit_fill: settings.limit_fill,
            initial_capital,
            quote_asset: quote_asset.into(),
            account,
            open_orders: Vec::new(),
            fills: Vec::new(),
            equity_curve: Vec::new(),
            last_candles: HashMap::new(),
            position_costs: HashMap::new(),
        };
        simulated.reset();
        simulated
    }

    /// Puts the simulation back into its initial state: seeded quote
    /// balance, no resting orders, empty fill log and equity curve.
    /// Replaying the same history after a reset reproduces the same
    /// results.
    pub fn reset(&mut self) {
        let mut account = self.account.write().expect("account lock poisoned");
        account.balances.clear();
        account.balances.insert(
            self.quote_asset.clone(),
            Balance::new(self.quote_asset.clone(), self.initial_capital),
        );
        drop(account);
        self.open_orders.clear();
        self.fills.clear();
        self.equity_curve.clear();
        self.last_candles.clear();
        self.position_costs.clear();
    }

    pub fn initial_capital(&self) -> Decimal {
        self.initial_capital
    }

    pub fn fills(&self) -> &[Fill] {
        &self.fills
    }

    pub fn open_orders(&self) -> &[Order] {
        &self.open_orders
    }

    pub fn equity_curve(&self) -> &[(DateTime<Utc>, Decimal)] {
        &self.equity_curve
    }

    /// Advances the simulation to a new bar: remembers it as the current
    /// price for its symbol and gives resting limit orders a chance to
    /// fill against it.
    pub fn mark(&mut self, candle: &Candle) -> Result<()> {
        self.last_candles.insert(candle.symbol.clone(), candle.clone());

        let mut still_open = Vec::with_capacity(self.open_orders.len());
        for order in std::mem::take(&mut self.open_orders) {
            if order.symbol != candle.symbol {
                still_open.push(order);
                continue;
            }
            let limit_price = match order.price {
                Some(p) => p,
                None => continue, // market orders never rest
            };
            let touched = match order.side {
                Side::Buy => candle.low <= limit_price,
                Side::Sell => candle.high >= limit_price,
            };
            if touched {
                // Limit orders fill at their own price, no slippage.
                self.execute_fill(order, limit_price, candle.timestamp)?;
            } else if self.limit_fill == LimitFillPolicy::NextBarOnly {
                let mut order = order;
                order.cancel()?;
                tracing::debug!(order = %order.id, "limit order expired untouched");
            } else {
                still_open.push(order);
            }
        }
        self.open_orders = still_open;
        Ok(())
    }

    /// Account equity valued at the last marked closes.
    pub fn current_equity(&self) -> Decimal {
        let prices: HashMap<Symbol, Decimal> = self
            .last_candles
            .iter()
            .map(|(symbol, candle)| (symbol.clone(), candle.close))
            .collect();
        self.account
            .read()
            .expect("account lock poisoned")
            .equity(&self.quote_asset, &prices)
    }

    /// Appends the current account equity to the equity curve.
    pub fn record_equity(&mut self, timestamp: DateTime<Utc>) {
        let equity = self.current_equity();
        self.equity_curve.push((timestamp, equity));
    }

    pub fn submit_order(&mut self, mut order: Order) -> Result<OrderId> {
        order.open()?;
        match order.order_type {
            OrderType::Market => {
                let candle = self
                    .last_candles
                    .get(&order.symbol)
                    .cloned()
                    .ok_or_else(|| Error::NoMarketData(order.symbol.clone()))?;
                // Slippage always works against the taker.
                let price = match order.side {
                    Side::Buy => candle.close * (dec!(1) + self.slippage),
                    Side::Sell => candle.close * (dec!(1) - self.slippage),
                };
                let id = order.id.clone();
                self.execute_fill(order, price, candle.timestamp)?;
                Ok(id)
            }
            OrderType::Limit => {
                let id = order.id.clone();
                tracing::debug!(order = %id, "limit order resting");
                self.open_orders.push(order);
                Ok(id)
            }
        }
    }

    pub fn cancel_order(&mut self, order_id: &OrderId) -> Result<()> {
        let position = self
            .open_orders
            .iter()
            .position(|o| &o.id == order_id)
            .ok_or_else(|| Error::UnknownOrder(order_id.clone()))?;
        let mut order = self.open_orders.remove(position);
        order.cancel()?;
        tracing::info!(order = %order.id, "order canceled");
        Ok(())
    }

    fn execute_fill(
        &mut self,
        mut order: Order,
        price: Decimal,
        timestamp: DateTime<Utc>,
    ) -> Result<()> {
        let (base, quote) = order.symbol.split()?;
        let (base, quote) = (base.to_string(), quote.to_string());
        let value = order.quantity * price;
        let fee = value * self.commission_rate;

        let account_handle = Arc::clone(&self.account);
        let mut account = account_handle.write().expect("account lock poisoned");
        let realized_pnl = match order.side {
            Side::Buy => {
                // Debit quote (value plus fee), credit base.
                if !account.deduct(&quote, value + fee) {
                    drop(account);
                    self.reject(order, "insufficient quote balance")?;
                    return Err(Error::ExecutionFailed {
                        reason: format!("insufficient {quote} balance"),
                    });
                }
                account.add(&base, order.quantity);

                let cost = self
                    .position_costs
                    .entry(order.symbol.clone())
                    .or_insert(PositionCost {
                        quantity: Decimal::ZERO,
                        avg_cost: Decimal::ZERO,
                    });
                let new_quantity = cost.quantity + order.quantity;
                cost.avg_cost = (cost.quantity * cost.avg_cost + order.quantity * price)
                    / new_quantity;
                cost.quantity = new_quantity;
                Decimal::ZERO
            }
            Side::Sell => {
                // Debit base, credit quote net of the fee.
                if !account.deduct(&base, order.quantity) {
                    drop(account);
                    self.reject(order, "insufficient base balance")?;
                    return Err(Error::ExecutionFailed {
                        reason: format!("insufficient {base} balance"),
                    });
                }
                account.add(&quote, value - fee);

                let avg_cost = self
                    .position_costs
                    .get(&order.symbol)
                    .map(|c| c.avg_cost)
                    .unwrap_or(Decimal::ZERO);
                if let Some(cost) = self.position_costs.get_mut(&order.symbol) {
                    cost.quantity -= order.quantity;
                    if cost.quantity <= Decimal::ZERO {
                        self.position_costs.remove(&order.symbol);
                    }
                }
                (price - avg_cost) * order.quantity - fee
            }
        };
        drop(account);

        order.fill()?;
        let fill = Fill {
            order_id: order.id.clone(),
            instance_id: order.instance_id,
            symbol: order.symbol.clone(),
            side: order.side,
            quantity: order.quantity,
            price,
            fee,
            realized_pnl,
            timestamp,
        };
        tracing::info!(
            order = %fill.order_id,
            symbol = %fill.symbol,
            side = ?fill.side,
            %price,
            quantity = %fill.quantity,
            %fee,
            "order filled"
        );
        self.fills.push(fill);
        Ok(())
    }

    fn reject(&self, mut order: Order, reason: &str) -> Result<()> {
        tracing::warn!(order = %order.id, reason, "order rejected by fill model");
        order.reject()?;
        Ok(())
    }
}

/// `OrderSink` adapter over a shared simulated account, so the engine can
/// hold the sink while the backtester keeps driving the simulation.
pub struct SimulatedSink {
    inner: Arc<Mutex<SimulatedAccount>>,
}

impl SimulatedSink {
    pub fn new(inner: Arc<Mutex<SimulatedAccount>>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl OrderSink for SimulatedSink {
    fn name(&self) -> &'static str {
        "SimulatedSink"
    }

    async fn submit(&self, order: Order) -> Result<OrderId> {
        self.inner
            .lock()
            .expect("simulated account lock poisoned")
            .submit_order(order)
    }

    async fn cancel(&self, order_id: &OrderId) -> Result<()> {
        self.inner
            .lock()
            .expect("simulated account lock poisoned")
            .cancel_order(order_id)
    }
}
