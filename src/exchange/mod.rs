//! Exchange integrations.
//!
//! Defines the `Exchange` trait the rebalancer consumes and provides the
//! Coinbase Exchange implementation:
//! - product listing (minimum order sizes)
//! - ticker and level-1 order book
//! - account balances and order submission (authenticated)

pub mod auth;
pub mod coinbase;

use anyhow::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;

use crate::types::{ExchangeProductMeta, OrderReceipt, OrderSpec, Symbol};

/// Abstraction over a spot exchange.
///
/// Price lookups are independent per symbol and may be issued concurrently.
/// Implementations never retry; a failed call is reported as-is.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Exchange: Send + Sync {
    /// Trading constraints for the tracked symbols quoted in `quote_currency`.
    /// Symbols the exchange does not list are simply absent.
    async fn fetch_products(
        &self,
        symbols: &[Symbol],
        quote_currency: &str,
    ) -> Result<Vec<ExchangeProductMeta>>;

    /// Last traded price.
    async fn fetch_current_price(&self, symbol: &Symbol, quote_currency: &str) -> Result<Decimal>;

    /// Highest resting bid.
    async fn fetch_best_bid(&self, symbol: &Symbol, quote_currency: &str) -> Result<Decimal>;

    /// Raw balance of every currency held by the account.
    async fn fetch_balances(&self) -> Result<HashMap<Symbol, Decimal>>;

    /// Place a buy order. Called at most once per order.
    async fn submit_order(&self, order: &OrderSpec) -> Result<OrderReceipt>;
}
