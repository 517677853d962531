//! CoinGecko market-cap feed.
//!
//! API: `https://api.coingecko.com/api/v3/coins/markets`
//! Auth: optional demo key via the `x-cg-demo-api-key` header.
//! Rate limit: ~30 req/min on the public tier. One request per pass.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};

use super::MarketCapSource;
use crate::types::{MarketCapEntry, Symbol};

pub const BASE_URL: &str = "https://api.coingecko.com/api/v3";

/// Number of ranked coins requested when not configured.
pub const DEFAULT_FETCH_LIMIT: u32 = 100;

// ---------------------------------------------------------------------------
// API response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct CoinMarket {
    symbol: String,
    /// Null for coins CoinGecko has no supply data for.
    #[serde(default)]
    market_cap: Option<Decimal>,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct CoinGeckoClient {
    http: Client,
    base_url: String,
    api_key: Option<SecretString>,
    fetch_limit: u32,
}

impl CoinGeckoClient {
    pub fn new(api_key: Option<SecretString>, fetch_limit: u32, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent("capweight/0.1.0 (portfolio-rebalancer)")
            .build()
            .context("Failed to build HTTP client for CoinGecko")?;

        Ok(Self {
            http,
            base_url: BASE_URL.to_string(),
            api_key,
            fetch_limit: fetch_limit.max(1),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Ranked markets restricted to the tracked tickers, so a coin outside
    /// the top `fetch_limit` is still returned.
    fn markets_url(&self, symbols: &[Symbol]) -> String {
        let tickers: Vec<String> = symbols.iter().map(|s| s.as_str().to_lowercase()).collect();
        format!(
            "{}/coins/markets?vs_currency=usd&order=market_cap_desc&per_page={}&page=1&symbols={}",
            self.base_url,
            self.fetch_limit,
            urlencoding::encode(&tickers.join(","))
        )
    }

    /// Upper-case tickers; null or negative caps count as zero.
    fn to_entries(markets: Vec<CoinMarket>) -> Vec<MarketCapEntry> {
        markets
            .into_iter()
            .map(|m| {
                let cap = m
                    .market_cap
                    .filter(|c| *c > Decimal::ZERO)
                    .unwrap_or(Decimal::ZERO);
                MarketCapEntry::new(Symbol::new(m.symbol.to_uppercase()), cap)
            })
            .collect()
    }
}

#[async_trait]
impl MarketCapSource for CoinGeckoClient {
    async fn fetch_market_caps(&self, symbols: &[Symbol]) -> Result<Vec<MarketCapEntry>> {
        let url = self.markets_url(symbols);
        debug!(url = %url, "CoinGecko request");

        let mut req = self.http.get(&url);
        if let Some(key) = &self.api_key {
            req = req.header("x-cg-demo-api-key", key.expose_secret().as_str());
        }

        let resp = req.send().await.context("CoinGecko request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("CoinGecko API error {status}: {body}");
        }

        let markets: Vec<CoinMarket> = resp
            .json()
            .await
            .context("Failed to parse CoinGecko markets response")?;

        let entries = Self::to_entries(markets);
        let missing: Vec<&str> = symbols
            .iter()
            .filter(|s| !entries.iter().any(|e| &e.symbol == *s))
            .map(|s| s.as_str())
            .collect();
        if !missing.is_empty() {
            debug!(?missing, "CoinGecko returned no market cap for tracked symbols");
        }
        let tracked_found = symbols.len() - missing.len();

        info!(
            ranked = entries.len(),
            tracked_found,
            tracked = symbols.len(),
            "Market caps fetched"
        );

        Ok(entries)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
