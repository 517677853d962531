//! Rebalancing strategy: market-cap weights, portfolio valuation, budget
//! allocation and order sizing.
//!
//! Every component here is a pure computation over an immutable
//! [`MarketSnapshot`]; nothing touches the network or the clock.

pub mod allocation;
pub mod sizing;
pub mod valuation;
pub mod weights;

use rust_decimal::Decimal;
use tracing::{debug, info};

use crate::types::{
    AllocationMode, AllocationPlan, MarketSnapshot, OrderStyle, PlannedOrder, Portfolio,
    RebalanceError, Symbol, TargetDelta, WeightMap,
};
use allocation::AllocationPlanner;
use sizing::{OrderSizer, SizingConfig};
use valuation::PortfolioValuator;
use weights::MarketWeightProvider;

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// Validated settings for a rebalancing pass.
#[derive(Debug, Clone)]
pub struct RebalanceSettings {
    /// Tracked symbols, in the order orders are produced.
    pub symbols: Vec<Symbol>,
    pub quote_currency: String,
    pub transaction_budget_usd: Decimal,
    pub allocation_mode: AllocationMode,
    pub order_style: OrderStyle,
    pub round_up_to_minimum: bool,
    pub live_trading: bool,
}

impl RebalanceSettings {
    pub fn sizing_config(&self) -> SizingConfig {
        SizingConfig {
            style: self.order_style,
            quote_currency: self.quote_currency.clone(),
            round_up_to_minimum: self.round_up_to_minimum,
            live_trading: self.live_trading,
        }
    }
}

// ---------------------------------------------------------------------------
// Plan
// ---------------------------------------------------------------------------

/// Everything computed for one pass, from weights down to gated orders.
#[derive(Debug, Clone, PartialEq)]
pub struct RebalancePlan {
    pub weights: WeightMap,
    pub portfolio: Portfolio,
    pub allocation: AllocationPlan,
    /// One order per tracked symbol, in configuration order.
    pub orders: Vec<PlannedOrder>,
}

impl RebalancePlan {
    pub fn submittable(&self) -> impl Iterator<Item = &PlannedOrder> {
        self.orders.iter().filter(|o| o.is_submittable())
    }

    pub fn is_at_target(&self) -> bool {
        self.allocation.is_at_target()
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Pipelines weighting → valuation → allocation → sizing.
///
/// Any failure aborts the whole plan, so either every order for the pass is
/// available or none is.
pub struct RebalanceOrchestrator {
    settings: RebalanceSettings,
    planner: AllocationPlanner,
    sizer: OrderSizer,
}

impl RebalanceOrchestrator {
    pub fn new(settings: RebalanceSettings) -> Self {
        let planner = AllocationPlanner::new(settings.allocation_mode);
        let sizer = OrderSizer::new(settings.sizing_config());
        Self {
            settings,
            planner,
            sizer,
        }
    }

    pub fn settings(&self) -> &RebalanceSettings {
        &self.settings
    }

    /// Compute the full plan for a snapshot.
    pub fn plan(&self, snapshot: &MarketSnapshot) -> Result<RebalancePlan, RebalanceError> {
        let symbols = &self.settings.symbols;

        let weights = MarketWeightProvider::weights(&snapshot.market_caps, symbols)?;
        info!(weights = %weights, "Market-cap weights computed");

        let portfolio = PortfolioValuator::value(&snapshot.balances, &snapshot.prices, symbols)?;
        info!(portfolio = %portfolio, "Portfolio valued");

        let allocation = self.planner.plan(
            &weights,
            &portfolio,
            self.settings.transaction_budget_usd,
            symbols,
        )?;

        let mut orders = Vec::with_capacity(allocation.lines.len());
        for line in &allocation.lines {
            let reference_price = match self.settings.order_style {
                OrderStyle::Market => None,
                OrderStyle::LimitAtCurrentPrice => snapshot.prices.get(line.symbol.as_str()),
                OrderStyle::LimitAtBestBid => snapshot.best_bids.get(&line.symbol).copied(),
            };
            let product = snapshot.product(line.symbol.as_str());

            orders.push(self.sizer.size(
                &line.symbol,
                line.allocated_cents(),
                reference_price,
                product,
            )?);
        }

        let submittable = orders.iter().filter(|o| o.is_submittable()).count();
        info!(
            mode = %allocation.mode,
            style = %self.settings.order_style,
            budget = format!("${:.2}", allocation.budget_usd),
            underweight = format!("${:.2}", allocation.total_underweight_amount_usd),
            orders = orders.len(),
            submittable,
            at_target = allocation.is_at_target(),
            "Rebalance plan ready"
        );

        Ok(RebalancePlan {
            weights,
            portfolio,
            allocation,
            orders,
        })
    }

    /// Current vs target value per tracked symbol, without sizing orders.
    pub fn targets(&self, snapshot: &MarketSnapshot) -> Result<Vec<TargetDelta>, RebalanceError> {
        let symbols = &self.settings.symbols;
        let weights = MarketWeightProvider::weights(&snapshot.market_caps, symbols)?;
        let portfolio = PortfolioValuator::value(&snapshot.balances, &snapshot.prices, symbols)?;
        let deltas = AllocationPlanner::target_deltas(&weights, &portfolio, symbols);
        debug!(count = deltas.len(), "Target deltas computed");
        Ok(deltas)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
