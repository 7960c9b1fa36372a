use std::collections::HashMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::types::Symbol;

/// Holdings of a single asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Balance {
    pub asset: String,
    /// Spendable amount.
    pub free: Decimal,
    /// Amount frozen by resting orders.
    pub locked: Decimal,
}

impl Balance {
    pub fn new(asset: impl Into<String>, free: Decimal) -> Self {
        Self {
            asset: asset.into(),
            free,
            locked: Decimal::ZERO,
        }
    }

    pub fn total(&self) -> Decimal {
        self.free + self.locked
    }
}

/// The portfolio state read by risk rules and strategies.
///
/// Strategies never write to an account. All mutation flows through fills:
/// live exchange fills or the simulated fill model during a backtest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Account {
    pub exchange_id: String,
    pub balances: HashMap<String, Balance>,
}

impl Account {
    pub fn new(exchange_id: impl Into<String>) -> Self {
        Self {
            exchange_id: exchange_id.into(),
            balances: HashMap::new(),
        }
    }

    pub fn balance(&self, asset: &str) -> Option<&Balance> {
        self.balances.get(asset)
    }

    /// Total holdings of an asset, zero when the asset is unknown.
    pub fn total_of(&self, asset: &str) -> Decimal {
        self.balances.get(asset).map(Balance::total).unwrap_or(Decimal::ZERO)
    }

    pub fn has_sufficient(&self, asset: &str, amount: Decimal) -> bool {
        self.balances
            .get(asset)
            .map(|b| b.free >= amount)
            .unwrap_or(false)
    }

    pub fn add(&mut self, asset: &str, amount: Decimal) {
        self.balances
            .entry(asset.to_string())
            .or_insert_with(|| Balance::new(asset, Decimal::ZERO))
            .free += amount;
    }

    /// Deducts from the free balance; refuses to go negative.
    pub fn deduct(&mut self, asset: &str, amount: Decimal) -> bool {
        match self.balances.get_mut(asset) {
            Some(b) if b.free >= amount => {
                b.free -= amount;
                true
            }
            _ => false,
        }
    }

    pub fn lock(&mut self, asset: &str, amount: Decimal) -> bool {
        match self.balances.get_mut(asset) {
            Some(b) if b.free >= amount => {
                b.free -= amount;
                b.locked += amount;
                true
            }
            _ => false,
        }
    }

    pub fn unlock(&mut self, asset: &str, amount: Decimal) -> bool {
        match self.balances.get_mut(asset) {
            Some(b) if b.locked >= amount => {
                b.locked -= amount;
                b.free += amount;
                true
            }
            _ => false,
        }
    }

    /// Account equity expressed in `quote_asset`.
    ///
    /// Non-quote holdings are valued with `prices`, keyed by pair symbol
    /// (`BTC/USDT`). Assets with no known price contribute nothing.
    pub fn equity(&self, quote_asset: &str, prices: &HashMap<Symbol, Decimal>) -> Decimal {
        let mut equity = self.total_of(quote_asset);
        for (asset, balance) in &self.balances {
            if asset == quote_asset {
                continue;
            }
            let symbol = Symbol::new(format!("{asset}/{quote_asset}"));
            if let Some(price) = prices.get(&symbol) {
                equity += balance.total() * price;
            }
        }
        equity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn deduct_refuses_overdraft() {
        let mut account = Account::new("backtest");
        account.add("USDT", dec!(100));
        assert!(!account.deduct("USDT", dec!(101)));
        assert!(account.deduct("USDT", dec!(40)));
        assert_eq!(account.total_of("USDT"), dec!(60));
    }

    #[test]
    fn lock_and_unlock_round_trip() {
        let mut account = Account::new("backtest");
        account.add("BTC", dec!(2));
        assert!(account.lock("BTC", dec!(1.5)));
        assert_eq!(account.balance("BTC").unwrap().free, dec!(0.5));
        assert!(account.unlock("BTC", dec!(1.5)));
        assert_eq!(account.balance("BTC").unwrap().free, dec!(2));
        assert_eq!(account.total_of("BTC"), dec!(2));
    }

    #[test]
    fn equity_values_holdings_at_last_price() {
        let mut account = Account::new("backtest");
        account.add("USDT", dec!(1000));
        account.add("BTC", dec!(0.5));
        let mut prices = HashMap::new();
        prices.insert(Symbol::new("BTC/USDT"), dec!(40000));
        assert_eq!(account.equity("USDT", &prices), dec!(21000));
    }
}
