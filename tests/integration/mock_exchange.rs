//! In-memory exchange and market-cap feed for integration testing.
//!
//! Deterministic `Exchange` and `MarketCapSource` implementations with
//! controllable prices, balances and failures. Every submitted order is
//! recorded so tests can assert exactly what would have reached the wire.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use capweight::exchange::Exchange;
use capweight::market_data::MarketCapSource;
use capweight::types::*;

/// Which collaborator call a forced error applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Call {
    Products,
    Price,
    BestBid,
    Balances,
    Submit,
}

/// A mock spot exchange.
pub struct MockExchange {
    products: Vec<ExchangeProductMeta>,
    prices: HashMap<Symbol, Decimal>,
    best_bids: HashMap<Symbol, Decimal>,
    balances: Arc<Mutex<HashMap<Symbol, Decimal>>>,
    submitted: Arc<Mutex<Vec<OrderSpec>>>,
    /// Product ids whose orders are rejected.
    rejected_products: Arc<Mutex<Vec<String>>>,
    force_error: Arc<Mutex<Option<(Call, String)>>>,
}

impl MockExchange {
    pub fn new() -> Self {
        Self {
            products: Vec::new(),
            prices: HashMap::new(),
            best_bids: HashMap::new(),
            balances: Arc::new(Mutex::new(HashMap::new())),
            submitted: Arc::new(Mutex::new(Vec::new())),
            rejected_products: Arc::new(Mutex::new(Vec::new())),
            force_error: Arc::new(Mutex::new(None)),
        }
    }

    /// List a `{symbol}-USD` product with a price, best bid and minimum.
    pub fn with_product(mut self, symbol: &str, price: Decimal, bid: Decimal, minimum: Decimal) -> Self {
        let sym = Symbol::new(symbol);
        self.products.push(ExchangeProductMeta {
            symbol: sym.clone(),
            product_id: sym.product_id("USD"),
            minimum_order_qty: minimum,
        });
        self.prices.insert(sym.clone(), price);
        self.best_bids.insert(sym, bid);
        self
    }

    pub fn with_balance(self, symbol: &str, amount: Decimal) -> Self {
        self.balances.lock().unwrap().insert(Symbol::new(symbol), amount);
        self
    }

    /// Make the given call fail with `msg`.
    pub fn set_error(&self, call: Call, msg: &str) {
        *self.force_error.lock().unwrap() = Some((call, msg.to_string()));
    }

    /// Reject orders for one product only.
    pub fn reject_orders_for(&self, product_id: &str) {
        self.rejected_products.lock().unwrap().push(product_id.to_string());
    }

    pub fn submitted(&self) -> Vec<OrderSpec> {
        self.submitted.lock().unwrap().clone()
    }

    fn check(&self, call: Call) -> Result<()> {
        match &*self.force_error.lock().unwrap() {
            Some((failing, msg)) if *failing == call => Err(anyhow!(msg.clone())),
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl Exchange for MockExchange {
    async fn fetch_products(
        &self,
        symbols: &[Symbol],
        quote_currency: &str,
    ) -> Result<Vec<ExchangeProductMeta>> {
        self.check(Call::Products)?;
        Ok(self
            .products
            .iter()
            .filter(|p| symbols.contains(&p.symbol) && p.product_id.ends_with(quote_currency))
            .cloned()
            .collect())
    }

    async fn fetch_current_price(&self, symbol: &Symbol, quote_currency: &str) -> Result<Decimal> {
        self.check(Call::Price)?;
        self.prices
            .get(symbol)
            .copied()
            .ok_or_else(|| anyhow!("404 NotFound: {}", symbol.product_id(quote_currency)))
    }

    async fn fetch_best_bid(&self, symbol: &Symbol, quote_currency: &str) -> Result<Decimal> {
        self.check(Call::BestBid)?;
        self.best_bids
            .get(symbol)
            .copied()
            .ok_or_else(|| anyhow!("404 NotFound: {}", symbol.product_id(quote_currency)))
    }

    async fn fetch_balances(&self) -> Result<HashMap<Symbol, Decimal>> {
        self.check(Call::Balances)?;
        Ok(self.balances.lock().unwrap().clone())
    }

    async fn submit_order(&self, order: &OrderSpec) -> Result<OrderReceipt> {
        self.check(Call::Submit)?;
        if self
            .rejected_products
            .lock()
            .unwrap()
            .iter()
            .any(|p| p == order.product_id())
        {
            return Err(anyhow!("400 Bad Request: product {} is post-only", order.product_id()));
        }

        self.submitted.lock().unwrap().push(order.clone());
        Ok(OrderReceipt {
            order_id: Uuid::new_v4().to_string(),
            client_oid: Uuid::new_v4().to_string(),
            product_id: order.product_id().to_string(),
            status: "pending".to_string(),
            submitted_at: Utc::now(),
        })
    }
}

/// A mock market-cap feed.
pub struct MockMarketCaps {
    entries: Vec<MarketCapEntry>,
    force_error: Arc<Mutex<Option<String>>>,
}

impl MockMarketCaps {
    pub fn new(entries: &[(&str, Decimal)]) -> Self {
        Self {
            entries: entries
                .iter()
                .map(|(symbol, cap)| MarketCapEntry::new(*symbol, *cap))
                .collect(),
            force_error: Arc::new(Mutex::new(None)),
        }
    }

    pub fn set_error(&self, msg: &str) {
        *self.force_error.lock().unwrap() = Some(msg.to_string());
    }
}

#[async_trait]
impl MarketCapSource for MockMarketCaps {
    async fn fetch_market_caps(&self, _symbols: &[Symbol]) -> Result<Vec<MarketCapEntry>> {
        if let Some(msg) = self.force_error.lock().unwrap().clone() {
            return Err(anyhow!(msg));
        }
        Ok(self.entries.clone())
    }
}
