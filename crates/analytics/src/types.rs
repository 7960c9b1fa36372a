use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A point in the portfolio's equity curve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub timestamp: DateTime<Utc>,
    pub value: Decimal,
}

/// Performance summary of one backtest run.
///
/// Money figures stay in `Decimal`; ratios that involve roots or powers
/// are `f64`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct PerformanceReport {
    pub initial_equity: Decimal,
    pub final_equity: Decimal,
    /// (final - initial) / initial.
    pub total_return: Decimal,
    /// Total return compounded to a 365-day year.
    pub annual_return: f64,
    /// Largest peak-to-trough decline of the equity curve, in percent.
    pub max_drawdown_percentage: Decimal,
    /// Mean over standard deviation of the per-sample equity returns.
    pub sharpe_ratio: f64,
    pub total_trades: u32,
    pub winning_trades: u32,
    pub losing_trades: u32,
    /// Winners as a percentage of fills that realized pnl.
    pub win_rate: f64,
    /// Average winning pnl over average losing pnl.
    pub profit_loss_ratio: f64,
}

impl PerformanceReport {
    pub fn new() -> Self {
        Self::default()
    }
}
