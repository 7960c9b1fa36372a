use core_types::{Account, Order};

pub mod context;
pub mod error;
pub mod manager;
pub mod rules;

// Re-export public types
pub use context::RiskContext;
pub use error::{Error, Result};
pub use manager::{RiskManager, RiskVerdict};
pub use rules::{MaxDrawdownRule, MaxTradesPerDayRule, PositionSizeRule};

/// The universal interface for a single risk check.
///
/// A rule is a named predicate over (order, account snapshot, shared
/// context). Rules must not depend on their position in the evaluation
/// order except through the shared context; any state they keep across
/// calls (counters, day markers) is their own.
pub trait RiskRule: Send {
    /// Name identifying the rule within one manager. Must be unique.
    fn name(&self) -> &str;

    fn enabled(&self) -> bool;

    fn set_enabled(&mut self, enabled: bool);

    /// Merges new parameter values into the rule without replacing it, so
    /// rule-internal state survives a parameter change. Unknown keys are
    /// ignored with a warning.
    fn update_params(&mut self, params: &toml::value::Table);

    /// Evaluates the order. `None` means the rule accepts; `Some(reason)`
    /// rejects it with a human-readable explanation.
    fn check_order(
        &mut self,
        order: &Order,
        account: &Account,
        ctx: &RiskContext,
    ) -> Option<String>;
}

/// Reads a numeric parameter out of a TOML table, accepting either float
/// or integer representation.
pub(crate) fn param_decimal(params: &toml::value::Table, key: &str) -> Option<rust_decimal::Decimal> {
    use num_traits::FromPrimitive;
    match params.get(key) {
        Some(toml::Value::Float(f)) => rust_decimal::Decimal::from_f64(*f),
        Some(toml::Value::Integer(i)) => Some(rust_decimal::Decimal::from(*i)),
        _ => None,
    }
}
