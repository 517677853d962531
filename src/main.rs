//! capweight command-line entry point.
//!
//! Loads configuration, initialises structured logging, builds the
//! CoinGecko and Coinbase clients and runs a single rebalancing pass (or
//! prints the target report).

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process;
use std::time::Duration;
use tracing::{error, info, warn};

use capweight::config::AppConfig;
use capweight::engine::{self, report, PassReport};
use capweight::exchange::coinbase::{CoinbaseClient, CoinbaseCredentials};
use capweight::market_data::coingecko::CoinGeckoClient;
use capweight::types::RebalanceError;

#[derive(Parser)]
#[command(name = "capweight")]
#[command(about = "Market-cap weighted crypto portfolio rebalancer for Coinbase")]
#[command(version)]
struct Cli {
    /// Path to config.toml
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one rebalancing pass
    Run {
        /// Submit orders for real, overriding `live_trading` in the config
        #[arg(long)]
        live: bool,
    },

    /// Show current vs target value per symbol without placing orders
    Targets,
}

#[tokio::main]
async fn main() {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    init_logging();

    let cli = Cli::parse();

    let cfg = match AppConfig::load(&cli.config) {
        Ok(c) => c,
        Err(e) => {
            error!(error = format!("{e:#}"), "Error loading config");
            process::exit(1);
        }
    };

    if let Err(e) = run(cfg, cli.command).await {
        match e.downcast_ref::<RebalanceError>() {
            Some(err) => error!(
                stage = %err.stage(),
                symbol = err.symbol().map(|s| s.as_str()).unwrap_or("-"),
                error = %err,
                "Rebalancing pass aborted; no orders placed"
            ),
            None => error!(error = format!("{e:#}"), "capweight failed"),
        }
        process::exit(1);
    }
}

async fn run(cfg: AppConfig, command: Command) -> Result<()> {
    let mut settings = cfg.settings().context("Invalid [rebalance] configuration")?;

    let market_data = CoinGeckoClient::new(
        cfg.market_data
            .api_key_env
            .as_deref()
            .and_then(|env| AppConfig::resolve_secret(env).ok()),
        cfg.market_data.fetch_limit,
        Duration::from_secs(cfg.market_data.timeout_secs),
    )?;

    let credentials = CoinbaseCredentials {
        api_key: AppConfig::resolve_secret(&cfg.exchange.api_key_env)?,
        api_secret: AppConfig::resolve_secret(&cfg.exchange.api_secret_env)?,
        passphrase: AppConfig::resolve_secret(&cfg.exchange.passphrase_env)?,
    };
    let exchange = CoinbaseClient::new(
        credentials,
        cfg.exchange.sandbox,
        Duration::from_secs(cfg.exchange.timeout_secs),
    )?;

    match command {
        Command::Run { live } => {
            if live {
                settings.live_trading = true;
            }
            if settings.live_trading {
                warn!(sandbox = cfg.exchange.sandbox, "Live trading enabled");
            }
            info!(
                symbols = ?settings.symbols.iter().map(|s| s.as_str()).collect::<Vec<_>>(),
                quote = %settings.quote_currency,
                mode = %settings.allocation_mode,
                style = %settings.order_style,
                live = settings.live_trading,
                "capweight starting up"
            );

            let report = engine::run_pass(&market_data, &exchange, &settings).await?;
            log_pass_report(&report);

            if report.execution.has_failures() {
                anyhow::bail!(
                    "{} of {} order submissions failed",
                    report.execution.failed.len(),
                    report.execution.failed.len() + report.execution.submitted.len()
                );
            }
        }
        Command::Targets => {
            let deltas = engine::target_report(&market_data, &exchange, &settings).await?;
            print!("{}", report::format_targets_table(&deltas));
        }
    }

    Ok(())
}

/// Log a human-readable pass summary.
fn log_pass_report(report: &PassReport) {
    for line in &report.plan.allocation.lines {
        info!(
            symbol = %line.symbol,
            weight = format!("{:.2}%", line.weight * rust_decimal::Decimal::ONE_HUNDRED),
            current = format!("${:.2}", line.current_value_usd),
            target = format!("${:.2}", line.target_value_usd),
            allocated = format!("${:.2}", line.allocated_cents()),
            "Allocation"
        );
    }

    let elapsed_ms = (report.finished_at - report.started_at).num_milliseconds();
    info!(
        portfolio = format!("${:.2}", report.plan.portfolio.total_invested_value_usd),
        submitted = report.execution.submitted.len(),
        held = report.execution.held.len(),
        failed = report.execution.failed.len(),
        committed = format!("${:.2}", report.execution.total_committed),
        elapsed_ms,
        "Pass complete"
    );
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("capweight=info"));

    let json_logging = std::env::var("CAPWEIGHT_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
