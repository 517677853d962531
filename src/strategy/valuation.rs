//! Portfolio valuation.

use rust_decimal::Decimal;
use std::collections::HashMap;
use tracing::debug;

use crate::types::{AccountBalance, Portfolio, PriceMap, RebalanceError, Symbol};

pub struct PortfolioValuator;

impl PortfolioValuator {
    /// Value every tracked symbol at its current price.
    ///
    /// A tracked symbol the account does not hold is valued at zero. Other
    /// currencies in `balances` (including the quote currency) are not part
    /// of the invested total.
    pub fn value(
        balances: &HashMap<Symbol, Decimal>,
        prices: &PriceMap,
        tracked: &[Symbol],
    ) -> Result<Portfolio, RebalanceError> {
        let mut valued = Vec::with_capacity(tracked.len());
        let mut total = Decimal::ZERO;

        for symbol in tracked {
            let price = prices
                .get(symbol.as_str())
                .ok_or_else(|| RebalanceError::MissingPrice {
                    symbol: symbol.clone(),
                })?;
            let balance = balances.get(symbol).copied().unwrap_or(Decimal::ZERO);
            let value_usd = balance * price;
            total += value_usd;

            valued.push(AccountBalance {
                symbol: symbol.clone(),
                balance,
                value_usd,
            });
        }

        debug!(
            invested = format!("${:.2}", total),
            holdings = valued.len(),
            "Portfolio valued"
        );

        Ok(Portfolio {
            balances: valued,
            total_invested_value_usd: total,
        })
    }
}
