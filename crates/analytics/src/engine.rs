use core_types::Fill;
use rust_decimal::prelude::*;
use rust_decimal_macros::dec;

use crate::types::{EquityPoint, PerformanceReport};

/// The engine responsible for turning a fill log and an equity curve into
/// a performance report.
#[derive(Default)]
pub struct AnalyticsEngine;

impl AnalyticsEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Calculates a full report. Everything here is a pure function of its
    /// inputs, so identical replays yield identical reports.
    pub fn calculate(
        &self,
        initial_capital: Decimal,
        fills: &[Fill],
        equity_curve: &[EquityPoint],
    ) -> PerformanceReport {
        let mut report = PerformanceReport::new();
        report.initial_equity = initial_capital;

        let Some(last) = equity_curve.last() else {
            return report;
        };
        report.final_equity = last.value;

        // 1. Total and annualized return
        if initial_capital > Decimal::ZERO {
            report.total_return = (report.final_equity - initial_capital) / initial_capital;
        }
        if let Some(first) = equity_curve.first() {
            let days = (last.timestamp - first.timestamp).num_days();
            if days > 0 {
                let growth = 1.0 + report.total_return.to_f64().unwrap_or(0.0);
                report.annual_return = growth.powf(365.0 / days as f64) - 1.0;
            }
        }

        // 2. Max drawdown, peak-to-trough over the curve
        let mut peak = initial_capital;
        let mut max_drawdown = Decimal::ZERO;
        for point in equity_curve {
            peak = peak.max(point.value);
            if peak > Decimal::ZERO {
                let drawdown = (peak - point.value) / peak * dec!(100);
                max_drawdown = max_drawdown.max(drawdown);
            }
        }
        report.max_drawdown_percentage = max_drawdown;

        // 3. Sharpe ratio over the per-sample return series.
        // This is the periodic Sharpe; annualizing would multiply by the
        // square root of the number of periods per year.
        if equity_curve.len() > 1 {
            let returns: Vec<f64> = equity_curve
                .windows(2)
                .filter(|w| w[0].value > Decimal::ZERO)
                .map(|w| (w[1].value / w[0].value - dec!(1)).to_f64().unwrap_or(0.0))
                .collect();
            if !returns.is_empty() {
                let mean = returns.iter().sum::<f64>() / returns.len() as f64;
                let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>()
                    / returns.len() as f64;
                let std_dev = variance.sqrt();
                if std_dev > 0.0 {
                    report.sharpe_ratio = mean / std_dev;
                }
            }
        }

        // 4. Trade statistics from realized pnl
        report.total_trades = fills.len() as u32;
        let winners: Vec<&Fill> = fills.iter().filter(|f| f.realized_pnl > Decimal::ZERO).collect();
        let losers: Vec<&Fill> = fills.iter().filter(|f| f.realized_pnl < Decimal::ZERO).collect();
        report.winning_trades = winners.len() as u32;
        report.losing_trades = losers.len() as u32;

        let closing = winners.len() + losers.len();
        if closing > 0 {
            report.win_rate = winners.len() as f64 / closing as f64 * 100.0;
        }

        if !winners.is_empty() && !losers.is_empty() {
            let avg_profit: Decimal = winners.iter().map(|f| f.realized_pnl).sum::<Decimal>()
                / Decimal::from(winners.len());
            let avg_loss: Decimal = losers.iter().map(|f| f.realized_pnl.abs()).sum::<Decimal>()
                / Decimal::from(losers.len());
            if avg_loss > Decimal::ZERO {
                report.profit_loss_ratio = (avg_profit / avg_loss).to_f64().unwrap_or(0.0);
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn point(day: u32, value: Decimal) -> EquityPoint {
        EquityPoint {
            timestamp: Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap(),
            value,
        }
    }

    #[test]
    fn empty_curve_yields_default_report() {
        let report = AnalyticsEngine::new().calculate(dec!(10000), &[], &[]);
        assert_eq!(report.final_equity, Decimal::ZERO);
        assert_eq!(report.total_return, Decimal::ZERO);
    }

    #[test]
    fn total_return_and_drawdown() {
        let curve = vec![
            point(1, dec!(10000)),
            point(2, dec!(11000)),
            point(3, dec!(9900)),
            point(4, dec!(10500)),
        ];
        let report = AnalyticsEngine::new().calculate(dec!(10000), &[], &curve);
        assert_eq!(report.total_return, dec!(0.05));
        // Peak 11000 to trough 9900 is a 10% decline.
        assert_eq!(report.max_drawdown_percentage, dec!(10));
    }

    #[test]
    fn flat_curve_has_zero_sharpe() {
        let curve = vec![point(1, dec!(10000)), point(2, dec!(10000)), point(3, dec!(10000))];
        let report = AnalyticsEngine::new().calculate(dec!(10000), &[], &curve);
        assert_eq!(report.sharpe_ratio, 0.0);
        assert_eq!(report.max_drawdown_percentage, Decimal::ZERO);
    }
}
