use core_types::{Account, Order};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::context::RiskContext;
use crate::error::{Error, Result};
use crate::RiskRule;

/// Outcome of gating one order through the rule set.
///
/// A rejection is a normal, expected control-flow value, not an error:
/// it carries the rejecting rule's name and reason so callers can log and
/// surface it, and the order simply does not go out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum RiskVerdict {
    Accepted,
    Rejected { rule: String, reason: String },
}

impl RiskVerdict {
    pub fn is_accepted(&self) -> bool {
        matches!(self, RiskVerdict::Accepted)
    }
}

/// Owns the ordered rule set and the shared evaluation context.
///
/// Insertion order is evaluation order: given an identical history of
/// `add_rule` calls, the rejecting rule reported for an order is always the
/// same. `check_order` is a critical section; callers serialize access
/// (the engine keeps the manager behind a mutex) so rule-internal counters
/// stay consistent.
pub struct RiskManager {
    rules: Vec<Box<dyn RiskRule>>,
    context: RiskContext,
}

impl Default for RiskManager {
    fn default() -> Self {
        Self::new()
    }
}

impl RiskManager {
    pub fn new() -> Self {
        Self {
            rules: Vec::new(),
            context: RiskContext::new(),
        }
    }

    /// Appends a rule to the evaluation order.
    pub fn add_rule(&mut self, rule: Box<dyn RiskRule>) -> Result<()> {
        if self.rules.iter().any(|r| r.name() == rule.name()) {
            return Err(Error::DuplicateRule(rule.name().to_string()));
        }
        tracing::info!(rule = rule.name(), "risk rule added");
        self.rules.push(rule);
        Ok(())
    }

    pub fn enable_rule(&mut self, name: &str) -> Result<()> {
        self.set_rule_enabled(name, true)
    }

    pub fn disable_rule(&mut self, name: &str) -> Result<()> {
        self.set_rule_enabled(name, false)
    }

    fn set_rule_enabled(&mut self, name: &str, enabled: bool) -> Result<()> {
        let rule = self.rule_mut(name)?;
        rule.set_enabled(enabled);
        tracing::info!(rule = name, enabled, "risk rule toggled");
        Ok(())
    }

    /// Merges new parameters into the named rule. The rule object is kept,
    /// so any counters it has accumulated persist across the update.
    pub fn update_rule_params(&mut self, name: &str, params: &toml::value::Table) -> Result<()> {
        let rule = self.rule_mut(name)?;
        rule.update_params(params);
        Ok(())
    }

    fn rule_mut(&mut self, name: &str) -> Result<&mut Box<dyn RiskRule>> {
        self.rules
            .iter_mut()
            .find(|r| r.name() == name)
            .ok_or_else(|| Error::UnknownRule(name.to_string()))
    }

    pub fn rule_names(&self) -> Vec<&str> {
        self.rules.iter().map(|r| r.name()).collect()
    }

    /// Merges keys into the shared context, last write wins per key.
    pub fn update_context<I>(&mut self, partial: I)
    where
        I: IntoIterator<Item = (String, Decimal)>,
    {
        self.context.merge(partial);
    }

    pub fn context(&self) -> &RiskContext {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut RiskContext {
        &mut self.context
    }

    /// Evaluates every enabled rule in insertion order, short-circuiting on
    /// the first rejection.
    pub fn check_order(&mut self, order: &Order, account: &Account) -> RiskVerdict {
        for rule in self.rules.iter_mut() {
            if !rule.enabled() {
                continue;
            }
            if let Some(reason) = rule.check_order(order, account, &self.context) {
                tracing::warn!(
                    order = %order.id,
                    rule = rule.name(),
                    %reason,
                    "order rejected by risk rule"
                );
                return RiskVerdict::Rejected {
                    rule: rule.name().to_string(),
                    reason,
                };
            }
        }
        tracing::debug!(order = %order.id, "order passed all risk checks");
        RiskVerdict::Accepted
    }
}
