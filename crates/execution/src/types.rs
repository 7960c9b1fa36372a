use serde::Deserialize;

/// How resting limit orders behave when a bar passes without touching them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
pub enum LimitFillPolicy {
    /// The order rests and is re-evaluated against every later bar.
    #[default]
    RestUntilFilled,
    /// The order is only given the next bar of its symbol; untouched means
    /// canceled.
    NextBarOnly,
}

/// Knobs of the simulated fill model.
#[derive(Debug, Clone, Deserialize)]
pub struct FillSettings {
    /// Fee charged on each fill as a fraction of its value
    /// (e.g. 0.001 for 0.1%).
    pub commission_rate: f64,

    /// Price penalty applied to market fills (e.g. 0.0005 for 0.05%).
    /// Buys fill higher, sells fill lower.
    pub slippage: f64,

    #[serde(default)]
    pub limit_fill: LimitFillPolicy,
}

impl Default for FillSettings {
    fn default() -> Self {
        Self {
            commission_rate: 0.001,
            slippage: 0.0,
            limit_fill: LimitFillPolicy::default(),
        }
    }
}
