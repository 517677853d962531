//! Order executor.
//!
//! Submits the gated orders of a plan through an [`Exchange`] and tracks the
//! results. Orders held by the gate (zero allocation, below minimum, dry run)
//! are logged and reported but never sent.

use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::exchange::Exchange;
use crate::types::{GateDecision, HoldReason, OrderReceipt, OrderSpec, PlannedOrder, Symbol};

// ---------------------------------------------------------------------------
// Execution result
// ---------------------------------------------------------------------------

/// Result of executing the orders of one pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExecutionReport {
    pub submitted: Vec<SubmittedOrder>,
    pub held: Vec<HeldOrder>,
    pub failed: Vec<FailedOrder>,
    /// Notional USD of every acknowledged order.
    pub total_committed: Decimal,
}

impl ExecutionReport {
    pub fn has_failures(&self) -> bool {
        !self.failed.is_empty()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SubmittedOrder {
    pub symbol: Symbol,
    pub spec: OrderSpec,
    pub receipt: OrderReceipt,
}

#[derive(Debug, Clone, Serialize)]
pub struct HeldOrder {
    pub symbol: Symbol,
    pub spec: OrderSpec,
    pub reason: HoldReason,
}

#[derive(Debug, Clone, Serialize)]
pub struct FailedOrder {
    pub symbol: Symbol,
    pub product_id: String,
    pub reason: String,
}

// ---------------------------------------------------------------------------
// Executor
// ---------------------------------------------------------------------------

pub struct Executor<'a> {
    exchange: &'a dyn Exchange,
}

impl<'a> Executor<'a> {
    pub fn new(exchange: &'a dyn Exchange) -> Self {
        Self { exchange }
    }

    /// Execute the orders of a plan, in plan order.
    ///
    /// Each submittable order is sent exactly once. A rejected order is
    /// recorded and the remaining orders are still attempted.
    pub async fn execute(&self, orders: &[PlannedOrder]) -> ExecutionReport {
        let mut report = ExecutionReport::default();

        let submittable = orders.iter().filter(|o| o.is_submittable()).count();
        info!(orders = orders.len(), submittable, "Executing orders");

        for order in orders {
            let reason = match &order.gate {
                GateDecision::Submit => None,
                GateDecision::Hold(reason) => Some(reason.clone()),
            };

            if let Some(reason) = reason {
                match reason {
                    HoldReason::DryRun => info!(
                        symbol = %order.symbol,
                        order = %order.spec,
                        allocated = format!("${:.2}", order.allocated_usd),
                        "[DRY RUN] Would place order"
                    ),
                    HoldReason::BelowMinimum { .. } => warn!(
                        symbol = %order.symbol,
                        order = %order.spec,
                        reason = %reason,
                        "Order held"
                    ),
                    HoldReason::ZeroAllocation => debug!(
                        symbol = %order.symbol,
                        "Nothing allocated, no order"
                    ),
                }
                report.held.push(HeldOrder {
                    symbol: order.symbol.clone(),
                    spec: order.spec.clone(),
                    reason,
                });
                continue;
            }

            match self.exchange.submit_order(&order.spec).await {
                Ok(receipt) => {
                    info!(
                        symbol = %order.symbol,
                        receipt = %receipt,
                        notional = format!("${:.2}", order.spec.notional_usd()),
                        "Order placed"
                    );
                    report.total_committed += order.spec.notional_usd();
                    report.submitted.push(SubmittedOrder {
                        symbol: order.symbol.clone(),
                        spec: order.spec.clone(),
                        receipt,
                    });
                }
                Err(e) => {
                    warn!(
                        symbol = %order.symbol,
                        product_id = %order.spec.product_id(),
                        error = %e,
                        "Order submission failed"
                    );
                    report.failed.push(FailedOrder {
                        symbol: order.symbol.clone(),
                        product_id: order.spec.product_id().to_string(),
                        reason: format!("{e:#}"),
                    });
                }
            }
        }

        info!(
            submitted = report.submitted.len(),
            held = report.held.len(),
            failed = report.failed.len(),
            committed = format!("${:.2}", report.total_committed),
            "Execution complete"
        );

        report
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::MockExchange;
    use chrono::Utc;
    use mockall::predicate::eq;
    use rust_decimal_macros::dec;

    fn market(symbol: &str, funds: Decimal, gate: GateDecision) -> PlannedOrder {
        PlannedOrder {
            symbol: Symbol::new(symbol),
            allocated_usd: funds,
            spec: OrderSpec::Market {
                product_id: format!("{symbol}-USD"),
                funds_usd: funds,
            },
            gate,
        }
    }

    fn receipt(product_id: &str) -> OrderReceipt {
        OrderReceipt {
            order_id: format!("{product_id}-order"),
            client_oid: "oid".into(),
            product_id: product_id.into(),
            status: "pending".into(),
            submitted_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_submits_only_gated_orders() {
        let orders = vec![
            market("BTC", dec!(60), GateDecision::Submit),
            market("ETH", dec!(0), GateDecision::Hold(HoldReason::ZeroAllocation)),
            market("SOL", dec!(40), GateDecision::Submit),
        ];

        let mut exchange = MockExchange::new();
        exchange
            .expect_submit_order()
            .times(2)
            .returning(|spec| Ok(receipt(spec.product_id())));

        let report = Executor::new(&exchange).execute(&orders).await;

        assert_eq!(report.submitted.len(), 2);
        assert_eq!(report.submitted[0].symbol, Symbol::new("BTC"));
        assert_eq!(report.submitted[1].receipt.order_id, "SOL-USD-order");
        assert_eq!(report.held.len(), 1);
        assert_eq!(report.held[0].reason, HoldReason::ZeroAllocation);
        assert_eq!(report.total_committed, dec!(100));
        assert!(!report.has_failures());
    }

    #[tokio::test]
    async fn test_dry_run_submits_nothing() {
        let orders = vec![
            market("BTC", dec!(60), GateDecision::Hold(HoldReason::DryRun)),
            market("ETH", dec!(40), GateDecision::Hold(HoldReason::DryRun)),
        ];

        let mut exchange = MockExchange::new();
        exchange.expect_submit_order().never();

        let report = Executor::new(&exchange).execute(&orders).await;

        assert!(report.submitted.is_empty());
        assert_eq!(report.held.len(), 2);
        assert_eq!(report.total_committed, Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_failure_does_not_stop_remaining_orders() {
        let orders = vec![
            market("BTC", dec!(60), GateDecision::Submit),
            market("ETH", dec!(40), GateDecision::Submit),
        ];

        let mut exchange = MockExchange::new();
        exchange
            .expect_submit_order()
            .with(eq(orders[0].spec.clone()))
            .times(1)
            .returning(|_| Err(anyhow::anyhow!("Insufficient funds")));
        exchange
            .expect_submit_order()
            .with(eq(orders[1].spec.clone()))
            .times(1)
            .returning(|spec| Ok(receipt(spec.product_id())));

        let report = Executor::new(&exchange).execute(&orders).await;

        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].product_id, "BTC-USD");
        assert!(report.failed[0].reason.contains("Insufficient funds"));
        assert_eq!(report.submitted.len(), 1);
        assert_eq!(report.total_committed, dec!(40));
        assert!(report.has_failures());
    }

    #[tokio::test]
    async fn test_limit_notional_committed() {
        let order = PlannedOrder {
            symbol: Symbol::new("BTC"),
            allocated_usd: dec!(100),
            spec: OrderSpec::Limit {
                product_id: "BTC-USD".into(),
                price: dec!(50000),
                quantity: dec!(0.002),
            },
            gate: GateDecision::Submit,
        };

        let mut exchange = MockExchange::new();
        exchange
            .expect_submit_order()
            .times(1)
            .returning(|spec| Ok(receipt(spec.product_id())));

        let report = Executor::new(&exchange).execute(&[order]).await;
        assert_eq!(report.total_committed, dec!(100));
    }

    #[tokio::test]
    async fn test_empty_plan() {
        let exchange = MockExchange::new();
        let report = Executor::new(&exchange).execute(&[]).await;
        assert!(report.submitted.is_empty());
        assert!(report.held.is_empty());
        assert!(report.failed.is_empty());
    }
}
