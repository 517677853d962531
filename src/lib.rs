//! capweight: market-cap weighted crypto portfolio rebalancer.
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod config;
pub mod engine;
pub mod exchange;
pub mod market_data;
pub mod strategy;
pub mod types;
