//! Budget allocation.
//!
//! Computes each tracked symbol's market-cap target, how far below target it
//! sits, and how much of the transaction budget goes toward it.
//!
//! Allocations are computed at full precision, then converted to whole
//! cents by largest remainder so the cent amounts handed to order sizing
//! (see [`AllocationLine::allocated_cents`]) add up to the budget exactly.

use rust_decimal::{Decimal, RoundingStrategy};
use tracing::{debug, info};

use crate::types::{
    round_to_cents, AllocationLine, AllocationMode, AllocationPlan, Portfolio, RebalanceError,
    Symbol, TargetDelta, WeightMap,
};

pub struct AllocationPlanner {
    mode: AllocationMode,
}

impl AllocationPlanner {
    pub fn new(mode: AllocationMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> AllocationMode {
        self.mode
    }

    /// Split `budget_usd` across the tracked symbols.
    ///
    /// In `Underweight` mode each symbol receives
    /// `budget × underweight / total_underweight`. When nothing is
    /// underweight every allocation is zero and the plan reports
    /// [`AllocationPlan::is_at_target`]. In `MarketWeight` mode each symbol
    /// receives `budget × weight` regardless of holdings.
    ///
    /// A tracked symbol the market-cap feed did not list has weight zero.
    pub fn plan(
        &self,
        weights: &WeightMap,
        portfolio: &Portfolio,
        budget_usd: Decimal,
        tracked: &[Symbol],
    ) -> Result<AllocationPlan, RebalanceError> {
        if budget_usd <= Decimal::ZERO {
            return Err(RebalanceError::InvalidBudget { budget: budget_usd });
        }

        // Pass 1: targets and deficits
        let mut lines = Vec::with_capacity(tracked.len());
        let mut total_underweight = Decimal::ZERO;

        for symbol in tracked {
            let weight = weights.get(symbol.as_str()).unwrap_or(Decimal::ZERO);
            let current = portfolio.value_of(symbol.as_str());
            let target = portfolio.total_invested_value_usd * weight;
            let underweight = (target - current).max(Decimal::ZERO);
            total_underweight += underweight;

            lines.push(AllocationLine {
                symbol: symbol.clone(),
                weight,
                current_value_usd: current,
                target_value_usd: target,
                underweight_amount_usd: underweight,
                allocated_usd: Decimal::ZERO,
                allocated_cents_usd: Decimal::ZERO,
            });
        }

        // Pass 2: split the budget
        match self.mode {
            AllocationMode::Underweight => {
                if total_underweight.is_zero() {
                    info!(
                        invested = format!("${:.2}", portfolio.total_invested_value_usd),
                        "Portfolio at or above every target; nothing to allocate"
                    );
                } else {
                    for line in &mut lines {
                        line.allocated_usd =
                            budget_usd * (line.underweight_amount_usd / total_underweight);
                    }
                }
            }
            AllocationMode::MarketWeight => {
                for line in &mut lines {
                    line.allocated_usd = budget_usd * line.weight;
                }
            }
        }

        distribute_cents(&mut lines);

        for line in &lines {
            debug!(
                symbol = %line.symbol,
                target = format!("${:.2}", line.target_value_usd),
                current = format!("${:.2}", line.current_value_usd),
                underweight = format!("${:.2}", line.underweight_amount_usd),
                allocated = format!("${:.2}", line.allocated_cents_usd),
                "Allocation line"
            );
        }

        Ok(AllocationPlan {
            mode: self.mode,
            budget_usd,
            lines,
            total_underweight_amount_usd: total_underweight,
        })
    }

    /// Signed distance of every tracked symbol from its market-cap target.
    ///
    /// Unlike [`plan`](Self::plan) this keeps overweight positions as
    /// negative deltas and needs no budget.
    pub fn target_deltas(
        weights: &WeightMap,
        portfolio: &Portfolio,
        tracked: &[Symbol],
    ) -> Vec<TargetDelta> {
        tracked
            .iter()
            .map(|symbol| {
                let weight = weights.get(symbol.as_str()).unwrap_or(Decimal::ZERO);
                let current = portfolio.value_of(symbol.as_str());
                let target = portfolio.total_invested_value_usd * weight;
                TargetDelta {
                    symbol: symbol.clone(),
                    weight,
                    current_value_usd: current,
                    target_value_usd: target,
                    delta_usd: target - current,
                }
            })
            .collect()
    }
}

/// Convert full-precision allocations to cents that sum to the rounded
/// total: every line is floored to cents, then the leftover cents go one at
/// a time to the largest remainders, earlier lines first on ties.
fn distribute_cents(lines: &mut [AllocationLine]) {
    let cent = Decimal::new(1, 2);
    let total: Decimal = lines.iter().map(|l| l.allocated_usd).sum();
    let target = round_to_cents(total);

    let mut remainders = Vec::with_capacity(lines.len());
    let mut floored_total = Decimal::ZERO;
    for (i, line) in lines.iter_mut().enumerate() {
        let floored = line
            .allocated_usd
            .round_dp_with_strategy(2, RoundingStrategy::ToZero);
        line.allocated_cents_usd = floored;
        floored_total += floored;
        remainders.push((i, line.allocated_usd - floored));
    }

    // Stable sort keeps configuration order among equal remainders
    remainders.sort_by(|a, b| b.1.cmp(&a.1));

    let mut leftover = target - floored_total;
    for (i, remainder) in remainders {
        if leftover < cent || remainder.is_zero() {
            break;
        }
        lines[i].allocated_cents_usd += cent;
        leftover -= cent;
    }
}
