use core_types::{Candle, Side, Symbol};
use num_traits::cast::ToPrimitive;
use num_traits::FromPrimitive;
use rust_decimal::Decimal;
use ta::indicators::ExponentialMovingAverage as Ema;
use ta::Next;

use crate::context::StrategyContext;
use crate::error::{Error, Result};
use crate::result::StrategyResult;
use crate::types::SmaCrossoverSettings;
use crate::Strategy;

/// Fast/slow moving-average crossover.
///
/// Goes long on the candle where the fast average crosses above the slow
/// one and flattens on the cross back down. Position bookkeeping is local
/// to the strategy; the account is the source of truth for risk checks.
pub struct SmaCrossover {
    settings: SmaCrossoverSettings,
    order_size: Decimal,
    fast_ema: Ema,
    slow_ema: Ema,
    last_fast: f64,
    last_slow: f64,
    warmed_up: bool,
    long: bool,
}

impl SmaCrossover {
    pub const ID: &'static str = "sma_crossover";

    pub fn from_config(config: &core_types::StrategyConfig) -> Result<Self> {
        let settings: SmaCrossoverSettings = config.params.clone().try_into()?;
        if settings.fast_period == 0 || settings.fast_period >= settings.slow_period {
            return Err(Error::InvalidParams(format!(
                "fast period {} must be positive and below slow period {}",
                settings.fast_period, settings.slow_period
            )));
        }
        let order_size = Decimal::from_f64(settings.order_size)
            .filter(|q| *q > Decimal::ZERO)
            .ok_or_else(|| {
                Error::InvalidParams(format!("order size {} must be positive", settings.order_size))
            })?;
        let fast_ema = Ema::new(settings.fast_period as usize)
            .map_err(|e| Error::InvalidParams(e.to_string()))?;
        let slow_ema = Ema::new(settings.slow_period as usize)
            .map_err(|e| Error::InvalidParams(e.to_string()))?;
        Ok(Self {
            settings,
            order_size,
            fast_ema,
            slow_ema,
            last_fast: 0.0,
            last_slow: 0.0,
            warmed_up: false,
            long: false,
        })
    }

    fn primary_symbol(ctx: &StrategyContext) -> Symbol {
        ctx.config().symbols[0].clone()
    }
}

impl Strategy for SmaCrossover {
    fn name(&self) -> &'static str {
        Self::ID
    }

    fn initialize(&mut self, ctx: &mut StrategyContext) -> Result<()> {
        if self.settings.max_order_value <= 0.0 {
            return Ok(());
        }
        let max_value = Decimal::from_f64(self.settings.max_order_value).ok_or_else(|| {
            Error::InvalidParams(format!(
                "max order value {} is not representable",
                self.settings.max_order_value
            ))
        })?;
        if let Some(risk) = ctx.risk_manager() {
            let mut manager = risk.lock().expect("risk manager lock poisoned");
            match manager.add_rule(Box::new(
                risk::PositionSizeRule::new().with_max_value(max_value),
            )) {
                Ok(()) => {}
                // Another instance sharing the manager already registered it.
                Err(risk::Error::DuplicateRule(_)) => {}
                Err(e) => return Err(Error::Callback(e.to_string())),
            }
        }
        Ok(())
    }

    fn on_market_event(
        &mut self,
        candle: &Candle,
        ctx: &mut StrategyContext,
    ) -> Result<StrategyResult> {
        let mut result = StrategyResult::new();
        let symbol = Self::primary_symbol(ctx);
        if candle.symbol != symbol {
            return Ok(result);
        }

        let close = candle.close.to_f64().ok_or_else(|| {
            Error::Callback(format!("close price {} is not representable", candle.close))
        })?;
        let fast = self.fast_ema.next(close);
        let slow = self.slow_ema.next(close);

        if !self.warmed_up {
            // First sample has no previous values to cross against.
            self.warmed_up = true;
            self.last_fast = fast;
            self.last_slow = slow;
            return Ok(result);
        }

        let crossed_up = fast > slow && self.last_fast <= self.last_slow;
        let crossed_down = fast < slow && self.last_fast >= self.last_slow;

        if crossed_up && !self.long {
            result.add_order(ctx.market_order(symbol.clone(), Side::Buy, self.order_size)?);
            result.log(format!("bullish crossover on {symbol} at {close}"));
            self.long = true;
        } else if crossed_down && self.long {
            result.add_order(ctx.market_order(symbol.clone(), Side::Sell, self.order_size)?);
            result.log(format!("bearish crossover on {symbol} at {close}"));
            self.long = false;
        }

        self.last_fast = fast;
        self.last_slow = slow;
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use core_types::{StrategyConfig, Timeframe};
    use risk::RiskManager;
    use rust_decimal_macros::dec;
    use std::sync::{Arc, Mutex, RwLock};

    fn config(params: toml::Value) -> Arc<StrategyConfig> {
        Arc::new(StrategyConfig::new(
            "sma",
            vec![Symbol::new("BTC/USDT")],
            vec!["backtest".into()],
            vec![Timeframe::new("1h")],
            params,
        ))
    }

    fn params(fast: i64, slow: i64) -> toml::Value {
        let mut table = toml::value::Table::new();
        table.insert("fast_period".into(), toml::Value::Integer(fast));
        table.insert("slow_period".into(), toml::Value::Integer(slow));
        table.insert("order_size".into(), toml::Value::Float(0.5));
        toml::Value::Table(table)
    }

    fn candle(close: Decimal) -> Candle {
        Candle {
            symbol: Symbol::new("BTC/USDT"),
            timeframe: Timeframe::new("1h"),
            timestamp: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            open: close,
            high: close,
            low: close,
            close,
            volume: dec!(1),
        }
    }

    #[test]
    fn rejects_inverted_periods() {
        let cfg = config(params(20, 5));
        assert!(SmaCrossover::from_config(&cfg).is_err());
    }

    #[test]
    fn emits_buy_on_bullish_crossover() {
        let cfg = config(params(2, 5));
        let mut strategy = SmaCrossover::from_config(&cfg).unwrap();
        let risk = Arc::new(Mutex::new(RiskManager::new()));
        let account = Arc::new(RwLock::new(core_types::Account::new("backtest")));
        let mut ctx = StrategyContext::new(
            core_types::InstanceId(1),
            cfg.clone(),
            Arc::downgrade(&risk),
            Arc::downgrade(&account),
        );

        // Decline first so the fast average sits below the slow one, then
        // rally through it.
        let closes = [dec!(100), dec!(90), dec!(80), dec!(70), dec!(120), dec!(160)];
        let mut orders = Vec::new();
        for close in closes {
            let result = strategy.on_market_event(&candle(close), &mut ctx).unwrap();
            orders.extend(result.orders);
        }
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].side, Side::Buy);
        assert_eq!(orders[0].quantity, dec!(0.5));
    }
}
