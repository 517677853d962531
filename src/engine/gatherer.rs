//! Input gathering.
//!
//! Fetches every external input of a pass concurrently and assembles an
//! immutable [`MarketSnapshot`]. The engine never starts on partial data.

use anyhow::Context;
use futures::future::try_join_all;
use rust_decimal::Decimal;
use std::collections::HashMap;
use tracing::{debug, info};

use crate::exchange::Exchange;
use crate::market_data::MarketCapSource;
use crate::strategy::RebalanceSettings;
use crate::types::{MarketSnapshot, OrderStyle, PriceMap, RebalanceError, Stage, Symbol};

/// Fetch market caps, product metadata, prices, best bids and balances.
///
/// Product metadata is only needed by limit orders and best bids only by
/// `LimitAtBestBid`; those requests are skipped otherwise.
pub async fn gather(
    market_data: &dyn MarketCapSource,
    exchange: &dyn Exchange,
    settings: &RebalanceSettings,
) -> Result<MarketSnapshot, RebalanceError> {
    let symbols = settings.symbols.as_slice();
    let quote = settings.quote_currency.as_str();
    let style = settings.order_style;

    debug!(symbols = symbols.len(), style = %style, "Gathering pass inputs");

    let market_caps = async {
        market_data
            .fetch_market_caps(symbols)
            .await
            .map_err(|e| RebalanceError::network(Stage::MarketData, e))
    };

    let products = async {
        if !style.is_limit() {
            return Ok(Vec::new());
        }
        exchange
            .fetch_products(symbols, quote)
            .await
            .map_err(|e| RebalanceError::network(Stage::ProductMetadata, e))
    };

    let prices = async {
        try_join_all(symbols.iter().map(|symbol| async move {
            exchange
                .fetch_current_price(symbol, quote)
                .await
                .with_context(|| format!("price for {symbol}"))
                .map(|price| (symbol.clone(), price))
        }))
        .await
        .map_err(|e| RebalanceError::network(Stage::Prices, e))
    };

    let best_bids = async {
        if style != OrderStyle::LimitAtBestBid {
            return Ok(Vec::new());
        }
        try_join_all(symbols.iter().map(|symbol| async move {
            exchange
                .fetch_best_bid(symbol, quote)
                .await
                .with_context(|| format!("best bid for {symbol}"))
                .map(|bid| (symbol.clone(), bid))
        }))
        .await
        .map_err(|e| RebalanceError::network(Stage::BestBids, e))
    };

    let balances = async {
        exchange
            .fetch_balances()
            .await
            .map_err(|e| RebalanceError::network(Stage::Balances, e))
    };

    let (market_caps, products, prices, best_bids, balances) =
        tokio::try_join!(market_caps, products, prices, best_bids, balances)?;

    let mut price_map = PriceMap::with_quote_sentinel(quote);
    for (symbol, price) in prices {
        price_map.insert(symbol, price);
    }
    let best_bids: HashMap<Symbol, Decimal> = best_bids.into_iter().collect();

    info!(
        market_caps = market_caps.len(),
        products = products.len(),
        prices = price_map.len(),
        best_bids = best_bids.len(),
        balances = balances.len(),
        "Pass inputs gathered"
    );

    Ok(MarketSnapshot {
        market_caps,
        products,
        prices: price_map,
        best_bids,
        balances,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
