//! End-to-end rebalancing passes against the in-memory exchange.
//!
//! Each test builds settings from TOML the way the binary does, runs a
//! full gather → plan → execute pass and asserts on what was submitted.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tokio_test::{assert_err, assert_ok};

use capweight::config::AppConfig;
use capweight::engine::{run_pass, target_report};
use capweight::strategy::RebalanceSettings;
use capweight::types::*;

use crate::mock_exchange::{Call, MockExchange, MockMarketCaps};

fn settings(toml: &str) -> RebalanceSettings {
    AppConfig::from_toml_str(toml).unwrap().settings().unwrap()
}

fn btc_eth(style: &str, budget: &str, live: bool, round_up: bool) -> RebalanceSettings {
    settings(&format!(
        r#"
        [rebalance]
        symbols = ["BTC", "ETH"]
        transaction_budget_usd = {budget}
        live_trading = {live}

        [orders]
        style = "{style}"
        round_up_to_minimum = {round_up}
        "#
    ))
}

/// BTC 60% / ETH 40% by cap; $500 of each held, so BTC is $100 under target.
fn caps_60_40() -> MockMarketCaps {
    MockMarketCaps::new(&[("BTC", dec!(600)), ("ETH", dec!(400)), ("DOGE", dec!(50))])
}

fn exchange_60_40() -> MockExchange {
    MockExchange::new()
        .with_product("BTC", dec!(50000), dec!(49990), dec!(0.0001))
        .with_product("ETH", dec!(2000), dec!(1999), dec!(0.001))
        .with_balance("BTC", dec!(0.01))
        .with_balance("ETH", dec!(0.25))
        .with_balance("USD", dec!(1000))
}

#[tokio::test]
async fn test_market_order_for_underweight_symbol() {
    let exchange = exchange_60_40();
    let report = assert_ok!(
        run_pass(&caps_60_40(), &exchange, &btc_eth("market", "100", true, false)).await
    );

    assert_eq!(report.plan.portfolio.total_invested_value_usd, dec!(1000));
    assert_eq!(
        exchange.submitted(),
        vec![OrderSpec::Market {
            product_id: "BTC-USD".into(),
            funds_usd: dec!(100.00),
        }]
    );
    assert_eq!(report.execution.held.len(), 1);
    assert_eq!(report.execution.held[0].reason, HoldReason::ZeroAllocation);
    assert_eq!(report.execution.total_committed, dec!(100));
    assert!(report.finished_at >= report.started_at);
}

#[tokio::test]
async fn test_limit_order_at_best_bid() {
    let exchange = exchange_60_40();
    assert_ok!(
        run_pass(
            &caps_60_40(),
            &exchange,
            &btc_eth("limit_at_best_bid", "100", true, false)
        )
        .await
    );

    assert_eq!(
        exchange.submitted(),
        vec![OrderSpec::Limit {
            product_id: "BTC-USD".into(),
            price: dec!(49990),
            quantity: dec!(0.00200040),
        }]
    );
}

#[tokio::test]
async fn test_dry_run_submits_nothing() {
    let exchange = exchange_60_40();
    let report = assert_ok!(
        run_pass(&caps_60_40(), &exchange, &btc_eth("market", "100", false, false)).await
    );

    assert!(exchange.submitted().is_empty());
    assert_eq!(report.plan.submittable().count(), 0);
    let reasons: Vec<&HoldReason> = report.execution.held.iter().map(|h| &h.reason).collect();
    assert_eq!(reasons, vec![&HoldReason::DryRun, &HoldReason::ZeroAllocation]);
}

#[tokio::test]
async fn test_budget_split_by_underweight() {
    // Equal caps, $300 invested: BTC is $50 under target and ETH $100 under.
    let caps = MockMarketCaps::new(&[("BTC", dec!(1)), ("ETH", dec!(1)), ("LTC", dec!(1))]);
    let exchange = MockExchange::new()
        .with_product("BTC", dec!(50), dec!(50), dec!(0.01))
        .with_product("ETH", dec!(10), dec!(10), dec!(0.01))
        .with_product("LTC", dec!(25), dec!(25), dec!(0.01))
        .with_balance("BTC", dec!(1))
        .with_balance("LTC", dec!(10));
    let settings = settings(
        r#"
        [rebalance]
        symbols = ["BTC", "ETH", "LTC"]
        transaction_budget_usd = 100
        live_trading = true
        "#,
    );

    let report = assert_ok!(run_pass(&caps, &exchange, &settings).await);

    assert_eq!(
        exchange.submitted(),
        vec![
            OrderSpec::Market {
                product_id: "BTC-USD".into(),
                funds_usd: dec!(33.33),
            },
            OrderSpec::Market {
                product_id: "ETH-USD".into(),
                funds_usd: dec!(66.67),
            },
        ]
    );
    assert_eq!(report.execution.total_committed, dec!(100.00));
}

#[tokio::test]
async fn test_no_holdings_places_no_orders() {
    let exchange = MockExchange::new()
        .with_product("BTC", dec!(50000), dec!(49990), dec!(0.0001))
        .with_product("ETH", dec!(2000), dec!(1999), dec!(0.001))
        .with_balance("USD", dec!(500));

    let report = assert_ok!(
        run_pass(&caps_60_40(), &exchange, &btc_eth("market", "100", true, false)).await
    );

    assert!(report.plan.is_at_target());
    assert!(exchange.submitted().is_empty());
    assert_eq!(report.execution.held.len(), 2);
}

#[tokio::test]
async fn test_below_minimum_is_held() {
    // $10 at a $50,000 bid buys 0.0002 BTC, under the 0.001 minimum.
    let exchange = MockExchange::new()
        .with_product("BTC", dec!(50000), dec!(50000), dec!(0.001))
        .with_product("ETH", dec!(2000), dec!(2000), dec!(0.001))
        .with_balance("ETH", dec!(0.5));

    let report = assert_ok!(
        run_pass(
            &caps_60_40(),
            &exchange,
            &btc_eth("limit_at_best_bid", "10", true, false)
        )
        .await
    );

    assert!(exchange.submitted().is_empty());
    assert_eq!(
        report.execution.held[0].reason,
        HoldReason::BelowMinimum {
            quantity: dec!(0.0002),
            minimum: dec!(0.001),
        }
    );
}

#[tokio::test]
async fn test_round_up_to_minimum_submits() {
    let exchange = MockExchange::new()
        .with_product("BTC", dec!(50000), dec!(50000), dec!(0.001))
        .with_product("ETH", dec!(2000), dec!(2000), dec!(0.001))
        .with_balance("ETH", dec!(0.5));

    assert_ok!(
        run_pass(
            &caps_60_40(),
            &exchange,
            &btc_eth("limit_at_best_bid", "10", true, true)
        )
        .await
    );

    assert_eq!(
        exchange.submitted(),
        vec![OrderSpec::Limit {
            product_id: "BTC-USD".into(),
            price: dec!(50000),
            quantity: dec!(0.001),
        }]
    );
}

#[tokio::test]
async fn test_rejected_order_does_not_stop_others() {
    // Only LTC held: BTC is $500 and ETH $300 under target.
    let caps = MockMarketCaps::new(&[("BTC", dec!(500)), ("ETH", dec!(300)), ("LTC", dec!(200))]);
    let exchange = MockExchange::new()
        .with_product("BTC", dec!(50000), dec!(50000), dec!(0.0001))
        .with_product("ETH", dec!(2000), dec!(2000), dec!(0.001))
        .with_product("LTC", dec!(100), dec!(100), dec!(0.01))
        .with_balance("LTC", dec!(10));
    exchange.reject_orders_for("BTC-USD");

    let settings = settings(
        r#"
        [rebalance]
        symbols = ["BTC", "ETH", "LTC"]
        transaction_budget_usd = 80
        live_trading = true
        "#,
    );

    let report = assert_ok!(run_pass(&caps, &exchange, &settings).await);

    assert_eq!(report.execution.failed.len(), 1);
    assert_eq!(report.execution.failed[0].product_id, "BTC-USD");
    assert_eq!(
        exchange.submitted(),
        vec![OrderSpec::Market {
            product_id: "ETH-USD".into(),
            funds_usd: dec!(30.00),
        }]
    );
    assert_eq!(report.execution.total_committed, dec!(30));
}

#[tokio::test]
async fn test_balance_failure_aborts_pass() {
    let exchange = exchange_60_40();
    exchange.set_error(Call::Balances, "401 Unauthorized: invalid signature");

    let err = assert_err!(
        run_pass(&caps_60_40(), &exchange, &btc_eth("market", "100", true, false)).await
    );

    assert_eq!(err.stage(), Stage::Balances);
    assert!(exchange.submitted().is_empty());
}

#[tokio::test]
async fn test_market_cap_failure_aborts_pass() {
    let caps = caps_60_40();
    caps.set_error("429 Too Many Requests");
    let exchange = exchange_60_40();

    let err = assert_err!(
        run_pass(&caps, &exchange, &btc_eth("market", "100", true, false)).await
    );

    assert_eq!(err.stage(), Stage::MarketData);
    assert!(exchange.submitted().is_empty());
}

#[tokio::test]
async fn test_unlisted_product_aborts_limit_pass() {
    let exchange = MockExchange::new()
        .with_product("BTC", dec!(50000), dec!(49990), dec!(0.0001))
        .with_balance("BTC", dec!(0.01));

    let err = assert_err!(
        run_pass(
            &caps_60_40(),
            &exchange,
            &btc_eth("limit_at_best_bid", "100", true, false)
        )
        .await
    );

    // ETH has no ticker or book either, so the pass stops while gathering.
    assert!(matches!(err.stage(), Stage::Prices | Stage::BestBids));
    assert!(exchange.submitted().is_empty());
}

#[tokio::test]
async fn test_zero_budget_rejected() {
    let exchange = exchange_60_40();
    let err = assert_err!(
        run_pass(&caps_60_40(), &exchange, &btc_eth("market", "0", true, false)).await
    );

    assert!(matches!(err, RebalanceError::InvalidBudget { .. }));
    assert!(exchange.submitted().is_empty());
}

#[tokio::test]
async fn test_repeated_passes_are_identical() {
    let exchange = exchange_60_40();
    let settings = btc_eth("limit_at_best_bid", "100", false, false);

    let first = assert_ok!(run_pass(&caps_60_40(), &exchange, &settings).await);
    let second = assert_ok!(run_pass(&caps_60_40(), &exchange, &settings).await);

    assert_eq!(first.plan, second.plan);
}

#[tokio::test]
async fn test_target_report() {
    let exchange = exchange_60_40();
    exchange.set_error(Call::BestBid, "book unavailable");

    let deltas = assert_ok!(
        target_report(
            &caps_60_40(),
            &exchange,
            &btc_eth("limit_at_best_bid", "100", true, false)
        )
        .await
    );

    assert_eq!(deltas.len(), 2);
    assert_eq!(deltas[0].symbol, Symbol::new("BTC"));
    assert_eq!(deltas[0].target_value_usd, dec!(600));
    assert_eq!(deltas[0].delta_usd, dec!(100));
    assert_eq!(deltas[1].delta_usd, dec!(-100));
    assert_eq!(deltas.iter().map(|d| d.delta_usd).sum::<Decimal>(), Decimal::ZERO);
    assert!(exchange.submitted().is_empty());
}
