//! Built-in risk rules.
//!
//! Each rule can be enabled, disabled and re-parameterized independently
//! through the [`RiskManager`](crate::RiskManager). A threshold that is
//! unset or zero means "no limit" for that dimension.

use chrono::{NaiveDate, Utc};
use core_types::{Account, Order, Side};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::context::RiskContext;
use crate::{param_decimal, RiskRule};

fn active_limit(threshold: Option<Decimal>) -> Option<Decimal> {
    threshold.filter(|t| *t > Decimal::ZERO)
}

/// Caps the size of a single order along three independent dimensions:
/// order value in quote currency, resulting position value as a percentage
/// of account equity, and resulting position quantity in base currency.
pub struct PositionSizeRule {
    enabled: bool,
    max_position_value: Option<Decimal>,
    max_position_percentage: Option<Decimal>,
    max_position_amount: Option<Decimal>,
    quote_asset: String,
}

impl PositionSizeRule {
    pub const NAME: &'static str = "position_size";

    pub fn new() -> Self {
        Self {
            enabled: true,
            max_position_value: None,
            max_position_percentage: None,
            max_position_amount: None,
            quote_asset: "USDT".to_string(),
        }
    }

    pub fn with_max_value(mut self, max: Decimal) -> Self {
        self.max_position_value = Some(max);
        self
    }

    pub fn with_max_percentage(mut self, max: Decimal) -> Self {
        self.max_position_percentage = Some(max);
        self
    }

    pub fn with_max_amount(mut self, max: Decimal) -> Self {
        self.max_position_amount = Some(max);
        self
    }

    pub fn with_quote_asset(mut self, asset: impl Into<String>) -> Self {
        self.quote_asset = asset.into();
        self
    }
}

impl Default for PositionSizeRule {
    fn default() -> Self {
        Self::new()
    }
}

impl RiskRule for PositionSizeRule {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn enabled(&self) -> bool {
        self.enabled
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    fn update_params(&mut self, params: &toml::value::Table) {
        if let Some(v) = param_decimal(params, "max_position_value") {
            self.max_position_value = Some(v);
        }
        if let Some(v) = param_decimal(params, "max_position_percentage") {
            self.max_position_percentage = Some(v);
        }
        if let Some(v) = param_decimal(params, "max_position_amount") {
            self.max_position_amount = Some(v);
        }
        if let Some(v) = params.get("quote_asset").and_then(|v| v.as_str()) {
            self.quote_asset = v.to_string();
        }
    }

    fn check_order(
        &mut self,
        order: &Order,
        account: &Account,
        ctx: &RiskContext,
    ) -> Option<String> {
        // Market orders carry no price; fall back to the last marked trade.
        let price = match order.price.or_else(|| ctx.last_price(&order.symbol)) {
            Some(p) => p,
            None => {
                tracing::warn!(order = %order.id, symbol = %order.symbol, "no price available, passing order unchecked");
                return None;
            }
        };

        let order_value = order.quantity * price;
        if let Some(max) = active_limit(self.max_position_value) {
            if order_value > max {
                return Some(format!(
                    "order value {order_value} {} exceeds maximum {max}",
                    self.quote_asset
                ));
            }
        }

        let base = match order.symbol.base() {
            Ok(base) => base,
            Err(_) => {
                tracing::warn!(symbol = %order.symbol, "symbol has no base/quote split, passing order unchecked");
                return None;
            }
        };
        let current = account.total_of(base);
        let resulting = match order.side {
            Side::Buy => current + order.quantity,
            Side::Sell => (current - order.quantity).abs(),
        };

        if let Some(max) = active_limit(self.max_position_amount) {
            if resulting > max {
                return Some(format!(
                    "resulting position {resulting} {base} exceeds maximum {max}"
                ));
            }
        }

        if let Some(max) = active_limit(self.max_position_percentage) {
            let equity = account.equity(&self.quote_asset, ctx.last_prices());
            if equity <= Decimal::ZERO {
                return Some(format!("account equity is non-positive ({equity})"));
            }
            let percentage = resulting * price / equity * dec!(100);
            if percentage > max {
                return Some(format!(
                    "resulting position is {percentage:.2}% of equity, maximum is {max}%"
                ));
            }
        }

        None
    }
}

/// Global circuit breaker: rejects every order while the drawdown published
/// in the shared context is at or above the configured threshold.
pub struct MaxDrawdownRule {
    enabled: bool,
    max_drawdown_percentage: Decimal,
}

impl MaxDrawdownRule {
    pub const NAME: &'static str = "max_drawdown";

    pub fn new(max_drawdown_percentage: Decimal) -> Self {
        Self {
            enabled: true,
            max_drawdown_percentage,
        }
    }
}

impl RiskRule for MaxDrawdownRule {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn enabled(&self) -> bool {
        self.enabled
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    fn update_params(&mut self, params: &toml::value::Table) {
        if let Some(v) = param_decimal(params, "max_drawdown_percentage") {
            self.max_drawdown_percentage = v;
        }
    }

    fn check_order(
        &mut self,
        _order: &Order,
        _account: &Account,
        ctx: &RiskContext,
    ) -> Option<String> {
        let drawdown = match ctx.value("drawdown") {
            Some(d) => d,
            None => {
                tracing::warn!("no drawdown in risk context, passing order unchecked");
                return None;
            }
        };
        if drawdown >= self.max_drawdown_percentage {
            return Some(format!(
                "drawdown {drawdown:.2}% has reached the maximum of {:.2}%",
                self.max_drawdown_percentage
            ));
        }
        None
    }
}

/// Limits how many orders may pass the gate per calendar day.
///
/// The day boundary comes from the context clock, which is event time:
/// replayed history trips and resets the counter exactly as live trading
/// would have.
pub struct MaxTradesPerDayRule {
    enabled: bool,
    max_trades: u32,
    trades_today: u32,
    current_day: Option<NaiveDate>,
}

impl MaxTradesPerDayRule {
    pub const NAME: &'static str = "max_trades_per_day";

    pub fn new(max_trades: u32) -> Self {
        Self {
            enabled: true,
            max_trades,
            trades_today: 0,
            current_day: None,
        }
    }

    pub fn trades_today(&self) -> u32 {
        self.trades_today
    }
}

impl RiskRule for MaxTradesPerDayRule {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn enabled(&self) -> bool {
        self.enabled
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    fn update_params(&mut self, params: &toml::value::Table) {
        if let Some(v) = params.get("max_trades").and_then(|v| v.as_integer()) {
            self.max_trades = v.max(0) as u32;
        }
    }

    fn check_order(
        &mut self,
        _order: &Order,
        _account: &Account,
        ctx: &RiskContext,
    ) -> Option<String> {
        let today = ctx
            .clock()
            .map(|t| t.date_naive())
            .unwrap_or_else(|| Utc::now().date_naive());

        if self.current_day != Some(today) {
            self.current_day = Some(today);
            self.trades_today = 0;
        }

        if self.trades_today >= self.max_trades {
            return Some(format!(
                "daily trade limit of {} reached for {today}",
                self.max_trades
            ));
        }

        self.trades_today += 1;
        tracing::debug!(trades = self.trades_today, max = self.max_trades, "trade counted");
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manager::{RiskManager, RiskVerdict};
    use chrono::{TimeZone, Utc};
    use core_types::{InstanceId, OrderId, OrderType, Symbol};

    fn market_buy(quantity: Decimal) -> Order {
        Order::new(
            OrderId("7-1".into()),
            InstanceId(7),
            Symbol::new("BTC/USDT"),
            Side::Buy,
            OrderType::Market,
            quantity,
            None,
            Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap(),
        )
        .unwrap()
    }

    fn funded_account() -> Account {
        let mut account = Account::new("backtest");
        account.add("USDT", dec!(100000));
        account
    }

    #[test]
    fn order_value_threshold() {
        let mut manager = RiskManager::new();
        manager
            .add_rule(Box::new(PositionSizeRule::new().with_max_value(dec!(1000))))
            .unwrap();
        manager.context_mut().mark_price(Symbol::new("BTC/USDT"), dec!(100));

        // 15 * 100 = 1500 > 1000
        let verdict = manager.check_order(&market_buy(dec!(15)), &funded_account());
        assert!(matches!(verdict, RiskVerdict::Rejected { rule, .. } if rule == PositionSizeRule::NAME));

        // 9 * 100 = 900 <= 1000
        let verdict = manager.check_order(&market_buy(dec!(9)), &funded_account());
        assert!(verdict.is_accepted());
    }

    #[test]
    fn resulting_position_amount_threshold() {
        let mut rule = PositionSizeRule::new().with_max_amount(dec!(5));
        let ctx = {
            let mut ctx = RiskContext::new();
            ctx.mark_price(Symbol::new("BTC/USDT"), dec!(100));
            ctx
        };
        let mut account = funded_account();
        account.add("BTC", dec!(4.5));

        // 4.5 held + 1 bought = 5.5 > 5
        assert!(rule.check_order(&market_buy(dec!(1)), &account, &ctx).is_some());
        // 4.5 + 0.5 = 5.0 is within the cap
        assert!(rule.check_order(&market_buy(dec!(0.5)), &account, &ctx).is_none());
    }

    #[test]
    fn zero_threshold_means_no_limit() {
        let mut rule = PositionSizeRule::new().with_max_value(Decimal::ZERO);
        let ctx = {
            let mut ctx = RiskContext::new();
            ctx.mark_price(Symbol::new("BTC/USDT"), dec!(100));
            ctx
        };
        assert!(rule.check_order(&market_buy(dec!(1000)), &funded_account(), &ctx).is_none());
    }

    #[test]
    fn drawdown_gate_trips_and_recovers() {
        let mut manager = RiskManager::new();
        manager.add_rule(Box::new(MaxDrawdownRule::new(dec!(10)))).unwrap();

        manager.update_context([("drawdown".to_string(), dec!(12))]);
        let verdict = manager.check_order(&market_buy(dec!(0.1)), &funded_account());
        assert!(matches!(verdict, RiskVerdict::Rejected { rule, .. } if rule == MaxDrawdownRule::NAME));

        // At the threshold still rejects.
        manager.update_context([("drawdown".to_string(), dec!(10))]);
        assert!(!manager.check_order(&market_buy(dec!(0.1)), &funded_account()).is_accepted());

        // Below the threshold trades flow again.
        manager.update_context([("drawdown".to_string(), dec!(8))]);
        assert!(manager.check_order(&market_buy(dec!(0.1)), &funded_account()).is_accepted());
    }

    #[test]
    fn daily_trade_counter_resets_at_event_day_boundary() {
        let mut manager = RiskManager::new();
        manager.add_rule(Box::new(MaxTradesPerDayRule::new(2))).unwrap();
        let account = funded_account();

        manager
            .context_mut()
            .set_clock(Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap());
        assert!(manager.check_order(&market_buy(dec!(0.1)), &account).is_accepted());
        assert!(manager.check_order(&market_buy(dec!(0.1)), &account).is_accepted());
        assert!(!manager.check_order(&market_buy(dec!(0.1)), &account).is_accepted());

        // The next event day starts a fresh counter.
        manager
            .context_mut()
            .set_clock(Utc.with_ymd_and_hms(2024, 3, 2, 0, 0, 0).unwrap());
        assert!(manager.check_order(&market_buy(dec!(0.1)), &account).is_accepted());
    }

    #[test]
    fn parameter_update_keeps_the_day_counter() {
        let mut manager = RiskManager::new();
        manager.add_rule(Box::new(MaxTradesPerDayRule::new(2))).unwrap();
        let account = funded_account();
        manager
            .context_mut()
            .set_clock(Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap());

        assert!(manager.check_order(&market_buy(dec!(0.1)), &account).is_accepted());
        assert!(manager.check_order(&market_buy(dec!(0.1)), &account).is_accepted());

        // Raising the limit mid-day keeps the two trades already counted.
        let mut params = toml::value::Table::new();
        params.insert("max_trades".into(), toml::Value::Integer(3));
        manager.update_rule_params(MaxTradesPerDayRule::NAME, &params).unwrap();

        assert!(manager.check_order(&market_buy(dec!(0.1)), &account).is_accepted());
        assert!(!manager.check_order(&market_buy(dec!(0.1)), &account).is_accepted());
    }
}
