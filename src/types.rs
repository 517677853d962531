//! Shared types for the rebalancer.
//!
//! These types form the data model used across all modules. Every value
//! here is built once per rebalancing pass and read-only afterwards, so the
//! strategy, engine, exchange and market-data modules can pass them around
//! without shared mutable state.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::collections::HashMap;
use std::fmt;

// ---------------------------------------------------------------------------
// Symbols
// ---------------------------------------------------------------------------

/// An asset ticker such as `BTC`. Case-sensitive.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Symbol(String);

impl Symbol {
    pub fn new(ticker: impl Into<String>) -> Self {
        Self(ticker.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Exchange product id for this asset against a quote currency,
    /// e.g. `BTC-USD`.
    pub fn product_id(&self, quote_currency: &str) -> String {
        format!("{}-{}", self.0, quote_currency)
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Symbol {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Borrow<str> for Symbol {
    fn borrow(&self) -> &str {
        &self.0
    }
}

// ---------------------------------------------------------------------------
// Market data
// ---------------------------------------------------------------------------

/// Market capitalisation of one asset, as reported by the market-data feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketCapEntry {
    pub symbol: Symbol,
    pub market_cap_usd: Decimal,
}

impl MarketCapEntry {
    pub fn new(symbol: impl Into<Symbol>, market_cap_usd: Decimal) -> Self {
        Self {
            symbol: symbol.into(),
            market_cap_usd,
        }
    }
}

/// Relative market-cap weight per tracked symbol, in feed order.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct WeightMap {
    entries: Vec<(Symbol, Decimal)>,
}

impl WeightMap {
    pub fn from_entries(entries: Vec<(Symbol, Decimal)>) -> Self {
        Self { entries }
    }

    /// Weight of a symbol, or `None` if the feed did not list it.
    pub fn get(&self, symbol: &str) -> Option<Decimal> {
        self.entries
            .iter()
            .find(|(s, _)| s.as_str() == symbol)
            .map(|(_, w)| *w)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Symbol, Decimal)> {
        self.entries.iter().map(|(s, w)| (s, *w))
    }

    pub fn total(&self) -> Decimal {
        self.entries.iter().map(|(_, w)| *w).sum()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Display for WeightMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .entries
            .iter()
            .map(|(s, w)| format!("{s}: {:.2}%", *w * Decimal::ONE_HUNDRED))
            .collect();
        write!(f, "{}", parts.join(" | "))
    }
}

/// Current unit prices in the quote currency.
///
/// Always carries a sentinel entry for the quote currency itself at 1.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PriceMap {
    prices: HashMap<Symbol, Decimal>,
}

impl PriceMap {
    /// An empty map holding only the quote-currency sentinel.
    pub fn with_quote_sentinel(quote_currency: &str) -> Self {
        let mut prices = HashMap::new();
        prices.insert(Symbol::new(quote_currency), Decimal::ONE);
        Self { prices }
    }

    pub fn insert(&mut self, symbol: Symbol, price: Decimal) {
        self.prices.insert(symbol, price);
    }

    pub fn get(&self, symbol: &str) -> Option<Decimal> {
        self.prices.get(symbol).copied()
    }

    pub fn len(&self) -> usize {
        self.prices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Portfolio
// ---------------------------------------------------------------------------

/// Holding of one tracked asset, valued at the current price.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccountBalance {
    pub symbol: Symbol,
    pub balance: Decimal,
    pub value_usd: Decimal,
}

/// Valued holdings across the tracked symbols, in configuration order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Portfolio {
    pub balances: Vec<AccountBalance>,
    pub total_invested_value_usd: Decimal,
}

impl Portfolio {
    pub fn balance_of(&self, symbol: &str) -> Option<&AccountBalance> {
        self.balances.iter().find(|b| b.symbol.as_str() == symbol)
    }

    /// USD value held in a symbol; zero when not tracked.
    pub fn value_of(&self, symbol: &str) -> Decimal {
        self.balance_of(symbol)
            .map(|b| b.value_usd)
            .unwrap_or(Decimal::ZERO)
    }
}

impl fmt::Display for Portfolio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invested=${:.2}", self.total_invested_value_usd)?;
        for b in &self.balances {
            write!(f, " | {} {} (${:.2})", b.balance, b.symbol, b.value_usd)?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Allocation
// ---------------------------------------------------------------------------

/// How the transaction budget is split across tracked symbols.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllocationMode {
    /// Split the budget among underweight symbols, proportional to how far
    /// each is below its market-cap target.
    #[default]
    Underweight,
    /// Split the budget by raw market-cap weight, ignoring current holdings.
    MarketWeight,
}

impl fmt::Display for AllocationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AllocationMode::Underweight => write!(f, "underweight"),
            AllocationMode::MarketWeight => write!(f, "market-weight"),
        }
    }
}

/// Planned allocation for a single tracked symbol.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AllocationLine {
    pub symbol: Symbol,
    pub weight: Decimal,
    pub current_value_usd: Decimal,
    pub target_value_usd: Decimal,
    pub underweight_amount_usd: Decimal,
    /// Full-precision share of the budget.
    pub allocated_usd: Decimal,
    /// Share in whole cents. Across a plan these sum to the budget in cents.
    pub allocated_cents_usd: Decimal,
}

impl AllocationLine {
    /// The allocation in whole cents, as handed to order sizing.
    pub fn allocated_cents(&self) -> Decimal {
        self.allocated_cents_usd
    }

    /// Signed distance to target; negative means overweight.
    pub fn delta_usd(&self) -> Decimal {
        self.target_value_usd - self.current_value_usd
    }
}

/// Result of the allocation planner for one pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AllocationPlan {
    pub mode: AllocationMode,
    pub budget_usd: Decimal,
    pub lines: Vec<AllocationLine>,
    pub total_underweight_amount_usd: Decimal,
}

impl AllocationPlan {
    pub fn line(&self, symbol: &str) -> Option<&AllocationLine> {
        self.lines.iter().find(|l| l.symbol.as_str() == symbol)
    }

    /// True when nothing is allocated: every symbol is already at or above
    /// its target and no orders should be placed this pass.
    pub fn is_at_target(&self) -> bool {
        self.lines.iter().all(|l| l.allocated_usd.is_zero())
    }

    pub fn total_allocated_usd(&self) -> Decimal {
        self.lines.iter().map(|l| l.allocated_usd).sum()
    }

    /// Sum of the cent amounts handed to order sizing.
    pub fn total_allocated_cents(&self) -> Decimal {
        self.lines.iter().map(|l| l.allocated_cents_usd).sum()
    }
}

/// Current vs target value of one tracked symbol, for the targets report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TargetDelta {
    pub symbol: Symbol,
    pub weight: Decimal,
    pub current_value_usd: Decimal,
    pub target_value_usd: Decimal,
    pub delta_usd: Decimal,
}

/// Round a USD amount to cents, midpoint away from zero.
pub fn round_to_cents(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, rust_decimal::RoundingStrategy::MidpointAwayFromZero)
}

// ---------------------------------------------------------------------------
// Exchange metadata & orders
// ---------------------------------------------------------------------------

/// Trading constraints for one exchange product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeProductMeta {
    pub symbol: Symbol,
    pub product_id: String,
    pub minimum_order_qty: Decimal,
}

/// How buy orders are priced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStyle {
    /// Funds-denominated market order (taker).
    #[default]
    Market,
    /// Limit order at the last traded price.
    LimitAtCurrentPrice,
    /// Limit order at the best bid, resting on the book as a maker.
    LimitAtBestBid,
}

impl OrderStyle {
    pub fn is_limit(&self) -> bool {
        !matches!(self, OrderStyle::Market)
    }
}

impl fmt::Display for OrderStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderStyle::Market => write!(f, "market"),
            OrderStyle::LimitAtCurrentPrice => write!(f, "limit@last"),
            OrderStyle::LimitAtBestBid => write!(f, "limit@bid"),
        }
    }
}

/// A buy order ready for submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrderSpec {
    Market {
        product_id: String,
        funds_usd: Decimal,
    },
    Limit {
        product_id: String,
        price: Decimal,
        quantity: Decimal,
    },
}

impl OrderSpec {
    pub fn product_id(&self) -> &str {
        match self {
            OrderSpec::Market { product_id, .. } | OrderSpec::Limit { product_id, .. } => {
                product_id
            }
        }
    }

    /// USD the order commits if fully filled.
    pub fn notional_usd(&self) -> Decimal {
        match self {
            OrderSpec::Market { funds_usd, .. } => *funds_usd,
            OrderSpec::Limit {
                price, quantity, ..
            } => *price * *quantity,
        }
    }
}

impl fmt::Display for OrderSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderSpec::Market {
                product_id,
                funds_usd,
            } => write!(f, "MARKET BUY {product_id} funds=${funds_usd:.2}"),
            OrderSpec::Limit {
                product_id,
                price,
                quantity,
            } => write!(f, "LIMIT BUY {product_id} {quantity} @ {price}"),
        }
    }
}

/// Why an order was held back instead of submitted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum HoldReason {
    /// Nothing was allocated to this symbol.
    ZeroAllocation,
    /// The limit quantity is below the exchange's minimum lot.
    BelowMinimum { quantity: Decimal, minimum: Decimal },
    /// Live trading is disabled.
    DryRun,
}

impl fmt::Display for HoldReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HoldReason::ZeroAllocation => write!(f, "zero allocation"),
            HoldReason::BelowMinimum { quantity, minimum } => {
                write!(f, "quantity {quantity} below minimum {minimum}")
            }
            HoldReason::DryRun => write!(f, "dry run"),
        }
    }
}

/// Outcome of the submission gate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum GateDecision {
    Submit,
    Hold(HoldReason),
}

/// A sized order plus the gate's verdict on whether to send it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlannedOrder {
    pub symbol: Symbol,
    pub allocated_usd: Decimal,
    pub spec: OrderSpec,
    pub gate: GateDecision,
}

impl PlannedOrder {
    pub fn is_submittable(&self) -> bool {
        self.gate == GateDecision::Submit
    }
}

/// Exchange acknowledgement of a submitted order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderReceipt {
    pub order_id: String,
    pub client_oid: String,
    pub product_id: String,
    pub status: String,
    pub submitted_at: DateTime<Utc>,
}

impl fmt::Display for OrderReceipt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} [{}] at {}",
            self.product_id,
            self.order_id,
            self.status,
            self.submitted_at.format("%Y-%m-%d %H:%M:%S UTC"),
        )
    }
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// Every external input a rebalancing pass needs, fetched up front.
#[derive(Debug, Clone, Default)]
pub struct MarketSnapshot {
    pub market_caps: Vec<MarketCapEntry>,
    pub products: Vec<ExchangeProductMeta>,
    /// Last traded prices plus the quote-currency sentinel.
    pub prices: PriceMap,
    /// Level-1 best bids; only populated for best-bid limit orders.
    pub best_bids: HashMap<Symbol, Decimal>,
    /// Raw balances for every currency the account holds.
    pub balances: HashMap<Symbol, Decimal>,
}

impl MarketSnapshot {
    pub fn product(&self, symbol: &str) -> Option<&ExchangeProductMeta> {
        self.products.iter().find(|p| p.symbol.as_str() == symbol)
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Where in a rebalancing pass a failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Stage {
    MarketData,
    ProductMetadata,
    Prices,
    BestBids,
    Balances,
    Weights,
    Valuation,
    Allocation,
    Sizing,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::MarketData => "fetching market caps",
            Stage::ProductMetadata => "fetching product metadata",
            Stage::Prices => "fetching prices",
            Stage::BestBids => "fetching best bids",
            Stage::Balances => "fetching balances",
            Stage::Weights => "computing weights",
            Stage::Valuation => "valuing portfolio",
            Stage::Allocation => "allocating budget",
            Stage::Sizing => "sizing orders",
        };
        f.write_str(s)
    }
}

/// Failures that abort a rebalancing pass before any order is submitted.
#[derive(Debug, thiserror::Error)]
pub enum RebalanceError {
    #[error("Market data unavailable: {reason}")]
    DataUnavailable { reason: String },

    #[error("No price for tracked symbol {symbol}")]
    MissingPrice { symbol: Symbol },

    #[error("No {style} reference price for {symbol}")]
    MissingReferencePrice { symbol: Symbol, style: OrderStyle },

    #[error("Transaction budget must be positive, got {budget}")]
    InvalidBudget { budget: Decimal },

    #[error("Reference price for {symbol} must be positive, got {price}")]
    ZeroOrNegativePrice { symbol: Symbol, price: Decimal },

    #[error("No exchange product listed for {symbol}")]
    UnknownProduct { symbol: Symbol },

    #[error("Network error while {stage}: {source:#}")]
    Network {
        stage: Stage,
        #[source]
        source: anyhow::Error,
    },
}

impl RebalanceError {
    pub fn network(stage: Stage, source: anyhow::Error) -> Self {
        RebalanceError::Network { stage, source }
    }

    /// The pass stage that failed.
    pub fn stage(&self) -> Stage {
        match self {
            RebalanceError::DataUnavailable { .. } => Stage::Weights,
            RebalanceError::MissingPrice { .. } => Stage::Valuation,
            RebalanceError::InvalidBudget { .. } => Stage::Allocation,
            RebalanceError::MissingReferencePrice { .. }
            | RebalanceError::ZeroOrNegativePrice { .. }
            | RebalanceError::UnknownProduct { .. } => Stage::Sizing,
            RebalanceError::Network { stage, .. } => *stage,
        }
    }

    /// The symbol involved, when the failure is specific to one.
    pub fn symbol(&self) -> Option<&Symbol> {
        match self {
            RebalanceError::MissingPrice { symbol }
            | RebalanceError::MissingReferencePrice { symbol, .. }
            | RebalanceError::ZeroOrNegativePrice { symbol, .. }
            | RebalanceError::UnknownProduct { symbol } => Some(symbol),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
