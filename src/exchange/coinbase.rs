//! Coinbase Exchange integration.
//!
//! REST API of the Coinbase Exchange (formerly GDAX).
//!
//! API docs: https://docs.cdp.coinbase.com/exchange/reference
//! Base URL: https://api.exchange.coinbase.com
//! Sandbox:  https://api-public.sandbox.exchange.coinbase.com
//! Auth: not required for products, ticker and book. Accounts and orders
//! need `CB-ACCESS-KEY`, `CB-ACCESS-SIGN`, `CB-ACCESS-TIMESTAMP` and
//! `CB-ACCESS-PASSPHRASE` (see [`super::auth`]).

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, Method, Response};
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

use super::{auth, Exchange};
use crate::types::{ExchangeProductMeta, OrderReceipt, OrderSpec, Symbol};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

pub const PRODUCTION_URL: &str = "https://api.exchange.coinbase.com";
pub const SANDBOX_URL: &str = "https://api-public.sandbox.exchange.coinbase.com";

// ---------------------------------------------------------------------------
// API response types (Coinbase JSON → Rust)
// ---------------------------------------------------------------------------

/// Entry of `GET /products`. Numeric fields arrive as strings.
#[derive(Debug, Deserialize)]
struct CoinbaseProduct {
    id: String,
    base_currency: String,
    quote_currency: String,
    /// Minimum order size in base currency. Older responses only.
    #[serde(default)]
    base_min_size: Option<String>,
    /// Smallest quantity step; used when `base_min_size` is absent.
    #[serde(default)]
    base_increment: Option<String>,
    #[serde(default)]
    trading_disabled: bool,
}

/// `GET /products/{id}/ticker`
#[derive(Debug, Deserialize)]
struct CoinbaseTicker {
    price: String,
}

/// `GET /products/{id}/book?level=1`. Each level is
/// `[price, size, num_orders]`.
#[derive(Debug, Deserialize)]
struct CoinbaseBook {
    #[serde(default)]
    bids: Vec<Vec<serde_json::Value>>,
}

/// Entry of `GET /accounts`.
#[derive(Debug, Deserialize)]
struct CoinbaseAccount {
    currency: String,
    balance: String,
}

/// Response of `POST /orders`.
#[derive(Debug, Deserialize)]
struct CoinbaseOrderResponse {
    id: String,
    product_id: String,
    #[serde(default)]
    status: Option<String>,
}

/// Body of `POST /orders`.
#[derive(Debug, Serialize)]
struct OrderRequest {
    client_oid: String,
    product_id: String,
    side: &'static str,
    #[serde(rename = "type")]
    order_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    funds: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    price: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    size: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    time_in_force: Option<&'static str>,
}

impl OrderRequest {
    fn buy(order: &OrderSpec, client_oid: String) -> Self {
        match order {
            OrderSpec::Market {
                product_id,
                funds_usd,
            } => Self {
                client_oid,
                product_id: product_id.clone(),
                side: "buy",
                order_type: "market",
                funds: Some(funds_usd.to_string()),
                price: None,
                size: None,
                time_in_force: None,
            },
            OrderSpec::Limit {
                product_id,
                price,
                quantity,
            } => Self {
                client_oid,
                product_id: product_id.clone(),
                side: "buy",
                order_type: "limit",
                funds: None,
                price: Some(price.normalize().to_string()),
                size: Some(quantity.normalize().to_string()),
                time_in_force: Some("GTC"),
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// API key, base64 secret and passphrase for authenticated endpoints.
#[derive(Debug)]
pub struct CoinbaseCredentials {
    pub api_key: SecretString,
    pub api_secret: SecretString,
    pub passphrase: SecretString,
}

/// Coinbase Exchange client.
pub struct CoinbaseClient {
    http: Client,
    base_url: String,
    credentials: CoinbaseCredentials,
}

impl CoinbaseClient {
    /// Create a client for production or the public sandbox.
    pub fn new(credentials: CoinbaseCredentials, sandbox: bool, timeout: Duration) -> Result<Self> {
        let base_url = if sandbox { SANDBOX_URL } else { PRODUCTION_URL };
        Self::with_base_url(credentials, base_url, timeout)
    }

    pub fn with_base_url(
        credentials: CoinbaseCredentials,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent("capweight/0.1.0 (portfolio-rebalancer)")
            .build()
            .context("Failed to build HTTP client for Coinbase")?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            credentials,
        })
    }

    // -- Internal helpers ------------------------------------------------

    async fn get_public<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}{path}", self.base_url);
        debug!(url = %url, "Coinbase public request");

        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .with_context(|| format!("Coinbase request failed: GET {path}"))?;

        Self::parse_response(resp, path).await
    }

    async fn send_signed<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<String>,
    ) -> Result<T> {
        let timestamp = Utc::now().timestamp().to_string();
        let body = body.unwrap_or_default();
        let signature = auth::sign(
            self.credentials.api_secret.expose_secret(),
            &timestamp,
            method.as_str(),
            path,
            &body,
        )?;

        let url = format!("{}{path}", self.base_url);
        debug!(url = %url, method = %method, "Coinbase signed request");

        let mut req = self
            .http
            .request(method.clone(), &url)
            .header("CB-ACCESS-KEY", self.credentials.api_key.expose_secret().as_str())
            .header("CB-ACCESS-SIGN", signature)
            .header("CB-ACCESS-TIMESTAMP", timestamp)
            .header(
                "CB-ACCESS-PASSPHRASE",
                self.credentials.passphrase.expose_secret().as_str(),
            );
        if !body.is_empty() {
            req = req.header("Content-Type", "application/json").body(body);
        }

        let resp = req
            .send()
            .await
            .with_context(|| format!("Coinbase request failed: {method} {path}"))?;

        Self::parse_response(resp, path).await
    }

    async fn parse_response<T: DeserializeOwned>(resp: Response, path: &str) -> Result<T> {
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("Coinbase API error {status} on {path}: {body}");
        }

        resp.json()
            .await
            .with_context(|| format!("Failed to parse Coinbase response for {path}"))
    }

    /// Keep tradable products for tracked symbols quoted in `quote_currency`.
    fn to_product_meta(
        products: Vec<CoinbaseProduct>,
        symbols: &[Symbol],
        quote_currency: &str,
    ) -> Result<Vec<ExchangeProductMeta>> {
        let mut metas = Vec::new();
        for product in products {
            if product.quote_currency != quote_currency || product.trading_disabled {
                continue;
            }
            let Some(symbol) = symbols.iter().find(|s| s.as_str() == product.base_currency) else {
                continue;
            };

            let minimum = match product.base_min_size.as_deref().or(product.base_increment.as_deref()) {
                Some(raw) => parse_decimal(raw, "base_min_size")?,
                None => Decimal::ZERO,
            };

            metas.push(ExchangeProductMeta {
                symbol: symbol.clone(),
                product_id: product.id,
                minimum_order_qty: minimum,
            });
        }
        Ok(metas)
    }

    fn best_bid(book: &CoinbaseBook, product_id: &str) -> Result<Decimal> {
        let raw = book
            .bids
            .first()
            .and_then(|level| level.first())
            .and_then(|price| price.as_str())
            .with_context(|| format!("Empty bid side for {product_id}"))?;
        parse_decimal(raw, "bid price")
    }

    fn to_balances(accounts: Vec<CoinbaseAccount>) -> Result<HashMap<Symbol, Decimal>> {
        let mut balances: HashMap<Symbol, Decimal> = HashMap::new();
        for account in accounts {
            let balance = parse_decimal(&account.balance, "account balance")?;
            *balances.entry(Symbol::new(account.currency)).or_insert(Decimal::ZERO) += balance;
        }
        Ok(balances)
    }
}

/// Coinbase sends numbers as strings.
fn parse_decimal(raw: &str, what: &str) -> Result<Decimal> {
    Decimal::from_str(raw.trim()).with_context(|| format!("Invalid {what}: {raw:?}"))
}

// ---------------------------------------------------------------------------
// Exchange impl
// ---------------------------------------------------------------------------

#[async_trait]
impl Exchange for CoinbaseClient {
    async fn fetch_products(
        &self,
        symbols: &[Symbol],
        quote_currency: &str,
    ) -> Result<Vec<ExchangeProductMeta>> {
        let products: Vec<CoinbaseProduct> = self.get_public("/products").await?;
        let listed = products.len();
        let metas = Self::to_product_meta(products, symbols, quote_currency)?;
        info!(listed, tracked = metas.len(), "Coinbase products fetched");
        Ok(metas)
    }

    async fn fetch_current_price(&self, symbol: &Symbol, quote_currency: &str) -> Result<Decimal> {
        let product_id = symbol.product_id(quote_currency);
        let ticker: CoinbaseTicker = self
            .get_public(&format!("/products/{}/ticker", urlencoding::encode(&product_id)))
            .await?;
        let price = parse_decimal(&ticker.price, "ticker price")?;
        debug!(product_id = %product_id, price = %price, "Ticker fetched");
        Ok(price)
    }

    async fn fetch_best_bid(&self, symbol: &Symbol, quote_currency: &str) -> Result<Decimal> {
        let product_id = symbol.product_id(quote_currency);
        let book: CoinbaseBook = self
            .get_public(&format!(
                "/products/{}/book?level=1",
                urlencoding::encode(&product_id)
            ))
            .await?;
        let bid = Self::best_bid(&book, &product_id)?;
        debug!(product_id = %product_id, bid = %bid, "Best bid fetched");
        Ok(bid)
    }

    async fn fetch_balances(&self) -> Result<HashMap<Symbol, Decimal>> {
        let accounts: Vec<CoinbaseAccount> =
            self.send_signed(Method::GET, "/accounts", None).await?;
        let balances = Self::to_balances(accounts)?;
        info!(currencies = balances.len(), "Coinbase balances fetched");
        Ok(balances)
    }

    async fn submit_order(&self, order: &OrderSpec) -> Result<OrderReceipt> {
        let client_oid = uuid::Uuid::new_v4().to_string();
        let request = OrderRequest::buy(order, client_oid.clone());
        let body = serde_json::to_string(&request).context("Failed to serialise order")?;

        info!(order = %order, client_oid = %client_oid, "Submitting order to Coinbase");

        let resp: CoinbaseOrderResponse = self
            .send_signed(Method::POST, "/orders", Some(body))
            .await
            .with_context(|| format!("Order rejected for {}", order.product_id()))?;

        Ok(OrderReceipt {
            order_id: resp.id,
            client_oid,
            product_id: resp.product_id,
            status: resp.status.unwrap_or_else(|| "pending".to_string()),
            submitted_at: Utc::now(),
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
