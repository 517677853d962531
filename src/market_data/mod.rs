//! Market-capitalisation sources.
//!
//! Defines the `MarketCapSource` trait the rebalancer consumes and provides
//! the CoinGecko implementation.

pub mod coingecko;

use anyhow::Result;
use async_trait::async_trait;

use crate::types::{MarketCapEntry, Symbol};

/// Abstraction over a market-cap feed.
///
/// The feed may return symbols that are not tracked, and may omit tracked
/// ones; filtering happens in the weighting step.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MarketCapSource: Send + Sync {
    /// Market caps in USD, ranked by the provider.
    async fn fetch_market_caps(&self, symbols: &[Symbol]) -> Result<Vec<MarketCapEntry>>;
}
