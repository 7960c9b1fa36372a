pub mod data;
pub mod error;

use std::sync::{Arc, Mutex, RwLock};

use analytics::types::EquityPoint;
use analytics::AnalyticsEngine;
use chrono::{DateTime, Utc};
use core_types::{Account, InstanceId, StrategyConfig};
use engine::{EngineSettings, LifecycleState, StrategyEngine, StrategyFactory};
use events::EngineEvent;
use execution::{FillSettings, SimulatedAccount, SimulatedSink};
use rust_decimal::Decimal;

pub use analytics::types::PerformanceReport;
pub use data::{HistoricalDataSource, InMemoryDataSource};
pub use error::{Error, Result};

#[derive(Debug, Clone)]
pub struct BacktestSettings {
    pub initial_capital: Decimal,
    /// Asset the equity curve and the seeded balance are denominated in.
    pub quote_asset: String,
    pub fill: FillSettings,
    pub engine: EngineSettings,
}

impl Default for BacktestSettings {
    fn default() -> Self {
        Self {
            initial_capital: Decimal::from(100_000),
            quote_asset: "USDT".to_string(),
            fill: FillSettings::default(),
            engine: EngineSettings::default(),
        }
    }
}

/// The engine for running historical backtests.
///
/// Specializes the live setup in exactly two places: the event source is a
/// historical data set replayed in event-time order, and the order sink is
/// a simulated account instead of an exchange adapter. Strategy creation,
/// dispatch and risk gating run through the identical `StrategyEngine`
/// code path, which is what makes simulated results transferable.
pub struct BacktestEngine {
    engine: StrategyEngine,
    simulated: Arc<Mutex<SimulatedAccount>>,
    data: Box<dyn HistoricalDataSource>,
    settings: BacktestSettings,
}

impl BacktestEngine {
    pub fn new(data: Box<dyn HistoricalDataSource>, settings: BacktestSettings) -> Self {
        let account = Arc::new(RwLock::new(Account::new("backtest")));
        let simulated = Arc::new(Mutex::new(SimulatedAccount::new(
            settings.fill.clone(),
            settings.initial_capital,
            settings.quote_asset.clone(),
            Arc::clone(&account),
        )));
        let sink = SimulatedSink::new(Arc::clone(&simulated));
        let engine = StrategyEngine::new(Box::new(sink), account, settings.engine.clone());
        Self {
            engine,
            simulated,
            data,
            settings,
        }
    }

    /// The underlying strategy engine, for lifecycle and risk
    /// administration.
    pub fn engine(&self) -> &StrategyEngine {
        &self.engine
    }

    pub fn register_strategy_class(
        &self,
        class_id: impl Into<String>,
        factory: StrategyFactory,
    ) -> engine::Result<()> {
        self.engine.register_strategy_class(class_id, factory)
    }

    /// Identical semantics to the live engine's `create_strategy`; the
    /// backtest path shares it outright.
    pub fn create_strategy(
        &self,
        class_id: &str,
        config: StrategyConfig,
    ) -> engine::Result<InstanceId> {
        self.engine.create_strategy(class_id, config)
    }

    /// Replays `[start, end)` through the live dispatch path against the
    /// simulated account and reports the resulting performance.
    ///
    /// Replay is single-pass and strictly sequential in event time. The
    /// simulation is reset first, so re-running with identical inputs
    /// produces identical metrics.
    pub async fn run_backtest(
        &self,
        id: InstanceId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<PerformanceReport> {
        let config = self.engine.instance_config(id)?;
        let mut events = self
            .data
            .events(&config.symbols, &config.timeframes, start, end)?;
        if events.is_empty() {
            return Err(Error::InsufficientData { start, end });
        }
        // The source contract says ordered; enforce the deterministic
        // (timestamp, symbol, timeframe) order anyway.
        events.sort_by(|a, b| {
            a.timestamp
                .cmp(&b.timestamp)
                .then_with(|| a.symbol.0.cmp(&b.symbol.0))
                .then_with(|| a.timeframe.0.cmp(&b.timeframe.0))
        });

        self.simulated
            .lock()
            .expect("simulated account lock poisoned")
            .reset();

        if self.engine.instance_state(id)? != LifecycleState::Running {
            self.engine.start_strategy(id).await?;
        }

        tracing::info!(
            instance = %id,
            events = events.len(),
            %start,
            %end,
            "starting backtest replay"
        );

        let mut peak_equity = self.settings.initial_capital;
        for candle in &events {
            // 1. Let resting limit orders see the new bar.
            {
                let mut simulated = self
                    .simulated
                    .lock()
                    .expect("simulated account lock poisoned");
                simulated.mark(candle)?;

                // 2. Publish the running drawdown so the circuit-breaker
                // rule sees it before any order of this bar.
                let equity = simulated.current_equity();
                peak_equity = peak_equity.max(equity);
                let drawdown = if peak_equity > Decimal::ZERO {
                    (peak_equity - equity) / peak_equity * Decimal::from(100)
                } else {
                    Decimal::ZERO
                };
                self.engine
                    .risk_manager()
                    .lock()
                    .expect("risk manager lock poisoned")
                    .update_context([("drawdown".to_string(), drawdown)]);
            }

            // 3. The same dispatch the live engine runs.
            self.engine.on_market_event(candle).await;

            // 4. Snapshot equity after the bar's trading is done.
            self.simulated
                .lock()
                .expect("simulated account lock poisoned")
                .record_equity(candle.timestamp);
        }

        let report = {
            let simulated = self
                .simulated
                .lock()
                .expect("simulated account lock poisoned");
            let equity_curve: Vec<EquityPoint> = simulated
                .equity_curve()
                .iter()
                .map(|(timestamp, value)| EquityPoint {
                    timestamp: *timestamp,
                    value: *value,
                })
                .collect();
            AnalyticsEngine::new().calculate(
                self.settings.initial_capital,
                simulated.fills(),
                &equity_curve,
            )
        };

        tracing::info!(
            instance = %id,
            total_return = %report.total_return,
            max_drawdown = %report.max_drawdown_percentage,
            trades = report.total_trades,
            "backtest complete"
        );
        let _ = self.engine.event_sender().send(EngineEvent::BacktestCompleted {
            instance_id: id,
            report: report.clone(),
        });
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use core_types::{Candle, Symbol, Timeframe};
    use rust_decimal_macros::dec;

    fn rising_series(count: u32) -> Vec<Candle> {
        (0..count)
            .map(|i| {
                let close = Decimal::from(101 + i);
                Candle {
                    symbol: Symbol::new("BTC/USDT"),
                    timeframe: Timeframe::new("1h"),
                    timestamp: Utc.with_ymd_and_hms(2024, 1, 1, i, 0, 0).unwrap(),
                    open: close - dec!(1),
                    high: close + dec!(0.5),
                    low: close - dec!(1.5),
                    close,
                    volume: dec!(10),
                }
            })
            .collect()
    }

    fn dca_config() -> StrategyConfig {
        let mut params = toml::value::Table::new();
        params.insert("order_size".into(), toml::Value::Float(0.01));
        StrategyConfig::new(
            "dca-hourly",
            vec![Symbol::new("BTC/USDT")],
            vec!["backtest".into()],
            vec![Timeframe::new("1h")],
            toml::Value::Table(params),
        )
    }

    fn frictionless_settings() -> BacktestSettings {
        BacktestSettings {
            initial_capital: dec!(10000),
            fill: FillSettings {
                commission_rate: 0.0,
                slippage: 0.0,
                ..FillSettings::default()
            },
            ..BacktestSettings::default()
        }
    }

    #[tokio::test]
    async fn empty_range_is_insufficient_data() {
        let backtest = BacktestEngine::new(
            Box::new(InMemoryDataSource::new(rising_series(10))),
            frictionless_settings(),
        );
        let id = backtest.create_strategy("dca", dca_config()).unwrap();
        let err = backtest
            .run_backtest(
                id,
                Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
                Utc.with_ymd_and_hms(2025, 1, 2, 0, 0, 0).unwrap(),
            )
            .await;
        assert!(matches!(err, Err(Error::InsufficientData { .. })));
    }

    #[tokio::test]
    async fn replay_is_idempotent() {
        let backtest = BacktestEngine::new(
            Box::new(InMemoryDataSource::new(rising_series(10))),
            frictionless_settings(),
        );
        let id = backtest.create_strategy("dca", dca_config()).unwrap();
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();

        let first = backtest.run_backtest(id, start, end).await.unwrap();
        let second = backtest.run_backtest(id, start, end).await.unwrap();
        assert_eq!(first, second);
    }
}
