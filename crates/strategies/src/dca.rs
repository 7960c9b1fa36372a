use core_types::{Candle, Side, StrategyConfig};
use num_traits::FromPrimitive;
use rust_decimal::Decimal;

use crate::context::StrategyContext;
use crate::error::{Error, Result};
use crate::result::StrategyResult;
use crate::Strategy;
use crate::types::DcaSettings;

/// Dollar-cost averaging: a fixed-quantity market buy on every candle of
/// the primary symbol, no signal logic at all.
pub struct Dca {
    order_size: Decimal,
}

impl Dca {
    pub const ID: &'static str = "dca";

    pub fn from_config(config: &StrategyConfig) -> Result<Self> {
        let settings: DcaSettings = config.params.clone().try_into()?;
        let order_size = Decimal::from_f64(settings.order_size)
            .filter(|q| *q > Decimal::ZERO)
            .ok_or_else(|| {
                Error::InvalidParams(format!("order size {} must be positive", settings.order_size))
            })?;
        Ok(Self { order_size })
    }
}

impl Strategy for Dca {
    fn name(&self) -> &'static str {
        Self::ID
    }

    fn on_market_event(
        &mut self,
        candle: &Candle,
        ctx: &mut StrategyContext,
    ) -> Result<StrategyResult> {
        let mut result = StrategyResult::new();
        let symbol = ctx.config().symbols[0].clone();
        if candle.symbol != symbol {
            return Ok(result);
        }
        result.add_order(ctx.market_order(symbol.clone(), Side::Buy, self.order_size)?);
        result.log(format!(
            "accumulating {} {symbol} at {}",
            self.order_size, candle.close
        ));
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use core_types::{Account, InstanceId, Symbol, Timeframe};
    use risk::RiskManager;
    use rust_decimal_macros::dec;
    use std::sync::{Arc, Mutex, RwLock};

    #[test]
    fn buys_on_every_candle_of_the_primary_symbol() {
        let mut table = toml::value::Table::new();
        table.insert("order_size".into(), toml::Value::Float(0.01));
        let cfg = Arc::new(StrategyConfig::new(
            "dca",
            vec![Symbol::new("BTC/USDT")],
            vec!["backtest".into()],
            vec![Timeframe::new("1h")],
            toml::Value::Table(table),
        ));
        let mut strategy = Dca::from_config(&cfg).unwrap();
        let risk = Arc::new(Mutex::new(RiskManager::new()));
        let account = Arc::new(RwLock::new(Account::new("backtest")));
        let mut ctx = StrategyContext::new(
            InstanceId(1),
            cfg,
            Arc::downgrade(&risk),
            Arc::downgrade(&account),
        );

        let candle = Candle {
            symbol: Symbol::new("BTC/USDT"),
            timeframe: Timeframe::new("1h"),
            timestamp: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            open: dec!(100),
            high: dec!(101),
            low: dec!(99),
            close: dec!(100),
            volume: dec!(10),
        };
        let result = strategy.on_market_event(&candle, &mut ctx).unwrap();
        assert_eq!(result.orders.len(), 1);
        assert_eq!(result.orders[0].quantity, dec!(0.01));
        assert_eq!(result.orders[0].side, Side::Buy);

        let other = Candle {
            symbol: Symbol::new("ETH/USDT"),
            ..candle
        };
        assert!(strategy.on_market_event(&other, &mut ctx).unwrap().orders.is_empty());
    }
}
