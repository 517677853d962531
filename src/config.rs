//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Secrets (API keys) are referenced by env-var name in the config and
//! resolved at runtime via `std::env::var`.

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use secrecy::SecretString;
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::Path;

use crate::strategy::RebalanceSettings;
use crate::types::{AllocationMode, OrderStyle, Symbol};

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub rebalance: RebalanceConfig,
    #[serde(default)]
    pub orders: OrdersConfig,
    #[serde(default)]
    pub exchange: ExchangeConfig,
    #[serde(default)]
    pub market_data: MarketDataConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RebalanceConfig {
    /// Tracked tickers, in the order orders are placed.
    pub symbols: Vec<String>,
    #[serde(default = "default_quote_currency")]
    pub quote_currency: String,
    /// USD to spend per pass. Checked by the planner, not here.
    pub transaction_budget_usd: Decimal,
    #[serde(default)]
    pub allocation_mode: AllocationMode,
    /// Submit orders for real. `--live` on the command line also enables it.
    #[serde(default)]
    pub live_trading: bool,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct OrdersConfig {
    #[serde(default)]
    pub style: OrderStyle,
    /// Raise limit quantities below the exchange minimum up to it.
    #[serde(default)]
    pub round_up_to_minimum: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExchangeConfig {
    /// Use the Coinbase public sandbox instead of production.
    #[serde(default = "default_true")]
    pub sandbox: bool,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_api_secret_env")]
    pub api_secret_env: String,
    #[serde(default = "default_passphrase_env")]
    pub passphrase_env: String,
    #[serde(default = "default_exchange_timeout")]
    pub timeout_secs: u64,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            sandbox: true,
            api_key_env: default_api_key_env(),
            api_secret_env: default_api_secret_env(),
            passphrase_env: default_passphrase_env(),
            timeout_secs: default_exchange_timeout(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct MarketDataConfig {
    /// Optional CoinGecko demo key.
    #[serde(default)]
    pub api_key_env: Option<String>,
    /// How many top-ranked coins to request.
    #[serde(default = "default_fetch_limit")]
    pub fetch_limit: u32,
    #[serde(default = "default_market_data_timeout")]
    pub timeout_secs: u64,
}

impl Default for MarketDataConfig {
    fn default() -> Self {
        Self {
            api_key_env: None,
            fetch_limit: default_fetch_limit(),
            timeout_secs: default_market_data_timeout(),
        }
    }
}

fn default_quote_currency() -> String {
    "USD".to_string()
}

fn default_true() -> bool {
    true
}

fn default_api_key_env() -> String {
    "COINBASE_API_KEY".to_string()
}

fn default_api_secret_env() -> String {
    "COINBASE_API_SECRET".to_string()
}

fn default_passphrase_env() -> String {
    "COINBASE_API_PASSPHRASE".to_string()
}

fn default_exchange_timeout() -> u64 {
    30
}

fn default_fetch_limit() -> u32 {
    crate::market_data::coingecko::DEFAULT_FETCH_LIMIT
}

fn default_market_data_timeout() -> u64 {
    15
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_toml_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents)?;
        Ok(config)
    }

    /// Validate the rebalance and order sections into engine settings.
    pub fn settings(&self) -> Result<RebalanceSettings> {
        let rebalance = &self.rebalance;
        let quote = rebalance.quote_currency.trim();
        if quote.is_empty() {
            anyhow::bail!("quote_currency must not be empty");
        }
        if rebalance.symbols.is_empty() {
            anyhow::bail!("At least one symbol must be tracked");
        }

        let mut seen = HashSet::new();
        let mut symbols = Vec::with_capacity(rebalance.symbols.len());
        for raw in &rebalance.symbols {
            let ticker = raw.trim();
            if ticker.is_empty() {
                anyhow::bail!("Empty ticker in symbols");
            }
            if ticker == quote {
                anyhow::bail!("Quote currency {quote} cannot also be a tracked symbol");
            }
            if !seen.insert(ticker) {
                anyhow::bail!("Duplicate ticker in symbols: {ticker}");
            }
            symbols.push(Symbol::new(ticker));
        }

        Ok(RebalanceSettings {
            symbols,
            quote_currency: quote.to_string(),
            transaction_budget_usd: rebalance.transaction_budget_usd,
            allocation_mode: rebalance.allocation_mode,
            order_style: self.orders.style,
            round_up_to_minimum: self.orders.round_up_to_minimum,
            live_trading: rebalance.live_trading,
        })
    }

    /// Resolve an environment variable name to its value.
    /// Useful for loading secrets referenced in the config.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))
    }

    /// Like [`AppConfig::resolve_env`], wrapped so it never ends up in logs.
    pub fn resolve_secret(env_name: &str) -> Result<SecretString> {
        Self::resolve_env(env_name).map(SecretString::new)
    }
}
