//! Market-cap weighting.
//!
//! Turns raw market-cap figures into each tracked symbol's share of the
//! total market cap among tracked symbols.

use rust_decimal::Decimal;
use tracing::{debug, warn};

use crate::types::{MarketCapEntry, RebalanceError, Symbol, WeightMap};

pub struct MarketWeightProvider;

impl MarketWeightProvider {
    /// Compute relative weights for the tracked symbols.
    ///
    /// Entries for untracked symbols are dropped. The feed lists coins by
    /// rank and tickers are not unique across coins, so when a symbol
    /// appears more than once only its first entry counts.
    pub fn weights(
        entries: &[MarketCapEntry],
        tracked: &[Symbol],
    ) -> Result<WeightMap, RebalanceError> {
        let mut relevant: Vec<&MarketCapEntry> = Vec::with_capacity(tracked.len());

        for entry in entries {
            if !tracked.contains(&entry.symbol) {
                continue;
            }
            if relevant.iter().any(|e| e.symbol == entry.symbol) {
                debug!(symbol = %entry.symbol, "Ignoring lower-ranked duplicate ticker");
                continue;
            }
            if entry.market_cap_usd < Decimal::ZERO {
                return Err(RebalanceError::DataUnavailable {
                    reason: format!(
                        "negative market cap {} for {}",
                        entry.market_cap_usd, entry.symbol
                    ),
                });
            }
            relevant.push(entry);
        }

        if relevant.is_empty() {
            return Err(RebalanceError::DataUnavailable {
                reason: "no market-cap data for any tracked symbol".to_string(),
            });
        }

        let total: Decimal = relevant.iter().map(|e| e.market_cap_usd).sum();
        if total.is_zero() {
            return Err(RebalanceError::DataUnavailable {
                reason: "total market cap of tracked symbols is zero".to_string(),
            });
        }

        let weights: Vec<(Symbol, Decimal)> = relevant
            .iter()
            .map(|e| (e.symbol.clone(), e.market_cap_usd / total))
            .collect();

        let missing: Vec<&str> = tracked
            .iter()
            .filter(|s| !weights.iter().any(|(w, _)| w == *s))
            .map(|s| s.as_str())
            .collect();
        if !missing.is_empty() {
            warn!(?missing, "Tracked symbols absent from market-cap feed; weighted at zero");
        }

        Ok(WeightMap::from_entries(weights))
    }
}
