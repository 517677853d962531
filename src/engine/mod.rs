//! Pass runner: gather → plan → execute.
//!
//! A pass is a single, self-contained rebalancing run. All inputs are
//! gathered before the engine starts, and no order is submitted unless the
//! whole plan was computed.

pub mod executor;
pub mod gatherer;
pub mod report;

use chrono::{DateTime, Utc};
use tracing::info;

use crate::exchange::Exchange;
use crate::market_data::MarketCapSource;
use crate::strategy::{RebalanceOrchestrator, RebalancePlan, RebalanceSettings};
use crate::types::{OrderStyle, RebalanceError, TargetDelta};
use executor::{ExecutionReport, Executor};

/// Outcome of one rebalancing pass.
#[derive(Debug, Clone)]
pub struct PassReport {
    pub plan: RebalancePlan,
    pub execution: ExecutionReport,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Run one full pass.
///
/// Gathering and planning failures abort the pass with nothing submitted.
/// Per-order submission failures are reported in the [`ExecutionReport`].
pub async fn run_pass(
    market_data: &dyn MarketCapSource,
    exchange: &dyn Exchange,
    settings: &RebalanceSettings,
) -> Result<PassReport, RebalanceError> {
    let started_at = Utc::now();
    info!(
        symbols = settings.symbols.len(),
        budget = format!("${:.2}", settings.transaction_budget_usd),
        live = settings.live_trading,
        "Starting rebalancing pass"
    );

    let snapshot = gatherer::gather(market_data, exchange, settings).await?;
    let plan = RebalanceOrchestrator::new(settings.clone()).plan(&snapshot)?;

    if plan.is_at_target() {
        info!("Portfolio is at or above every target; nothing to buy");
    }
    let execution = Executor::new(exchange).execute(&plan.orders).await;

    Ok(PassReport {
        plan,
        execution,
        started_at,
        finished_at: Utc::now(),
    })
}

/// Current vs target value per tracked symbol. Never submits orders.
pub async fn target_report(
    market_data: &dyn MarketCapSource,
    exchange: &dyn Exchange,
    settings: &RebalanceSettings,
) -> Result<Vec<TargetDelta>, RebalanceError> {
    // Targets need neither product metadata nor best bids.
    let settings = RebalanceSettings {
        order_style: OrderStyle::Market,
        ..settings.clone()
    };
    let snapshot = gatherer::gather(market_data, exchange, &settings).await?;
    RebalanceOrchestrator::new(settings).targets(&snapshot)
}
