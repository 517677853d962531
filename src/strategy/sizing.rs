//! Order sizing and the submission gate.
//!
//! Turns a cent-rounded USD allocation into a market or limit buy order and
//! decides whether that order may be sent to the exchange.

use rust_decimal::{Decimal, RoundingStrategy};
use tracing::debug;

use crate::types::{
    ExchangeProductMeta, GateDecision, HoldReason, OrderSpec, OrderStyle, PlannedOrder,
    RebalanceError, Symbol,
};

/// Lot precision for limit-order quantities.
pub const QUANTITY_DP: u32 = 8;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct SizingConfig {
    pub style: OrderStyle,
    pub quote_currency: String,
    /// Raise limit quantities below the exchange minimum up to the minimum.
    /// This spends more than allocated in exchange for order acceptance.
    pub round_up_to_minimum: bool,
    pub live_trading: bool,
}

impl Default for SizingConfig {
    fn default() -> Self {
        Self {
            style: OrderStyle::Market,
            quote_currency: "USD".to_string(),
            round_up_to_minimum: false,
            live_trading: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Sizer
// ---------------------------------------------------------------------------

pub struct OrderSizer {
    config: SizingConfig,
}

impl OrderSizer {
    pub fn new(config: SizingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SizingConfig {
        &self.config
    }

    /// Size one order.
    ///
    /// `allocated_usd` must already be rounded to cents. `reference_price`
    /// (last price or best bid) and `product` are only consulted for limit
    /// styles.
    pub fn size(
        &self,
        symbol: &Symbol,
        allocated_usd: Decimal,
        reference_price: Option<Decimal>,
        product: Option<&ExchangeProductMeta>,
    ) -> Result<PlannedOrder, RebalanceError> {
        let planned = if self.config.style.is_limit() {
            self.size_limit(symbol, allocated_usd, reference_price, product)?
        } else {
            self.size_market(symbol, allocated_usd, product)
        };

        debug!(
            symbol = %symbol,
            order = %planned.spec,
            gate = ?planned.gate,
            "Order sized"
        );

        Ok(planned)
    }

    fn size_market(
        &self,
        symbol: &Symbol,
        allocated_usd: Decimal,
        product: Option<&ExchangeProductMeta>,
    ) -> PlannedOrder {
        let product_id = product
            .map(|p| p.product_id.clone())
            .unwrap_or_else(|| symbol.product_id(&self.config.quote_currency));

        // Funds-denominated orders are sized by the exchange, so there is
        // no quantity to check against the minimum before execution.
        let gate = if allocated_usd <= Decimal::ZERO {
            GateDecision::Hold(HoldReason::ZeroAllocation)
        } else {
            self.live_gate()
        };

        PlannedOrder {
            symbol: symbol.clone(),
            allocated_usd,
            spec: OrderSpec::Market {
                product_id,
                funds_usd: allocated_usd,
            },
            gate,
        }
    }

    fn size_limit(
        &self,
        symbol: &Symbol,
        allocated_usd: Decimal,
        reference_price: Option<Decimal>,
        product: Option<&ExchangeProductMeta>,
    ) -> Result<PlannedOrder, RebalanceError> {
        let price = reference_price.ok_or_else(|| RebalanceError::MissingReferencePrice {
            symbol: symbol.clone(),
            style: self.config.style,
        })?;
        if price <= Decimal::ZERO {
            return Err(RebalanceError::ZeroOrNegativePrice {
                symbol: symbol.clone(),
                price,
            });
        }
        let product = product.ok_or_else(|| RebalanceError::UnknownProduct {
            symbol: symbol.clone(),
        })?;
        let minimum = product.minimum_order_qty;

        let mut quantity = limit_quantity(allocated_usd, price);
        if self.config.round_up_to_minimum && quantity < minimum {
            debug!(
                symbol = %symbol,
                quantity = %quantity,
                minimum = %minimum,
                "Rounding quantity up to exchange minimum"
            );
            quantity = minimum;
        }

        let gate = if allocated_usd <= Decimal::ZERO {
            GateDecision::Hold(HoldReason::ZeroAllocation)
        } else if quantity.is_zero() || (!self.config.round_up_to_minimum && quantity < minimum) {
            GateDecision::Hold(HoldReason::BelowMinimum { quantity, minimum })
        } else {
            self.live_gate()
        };

        Ok(PlannedOrder {
            symbol: symbol.clone(),
            allocated_usd,
            spec: OrderSpec::Limit {
                product_id: product.product_id.clone(),
                price,
                quantity,
            },
            gate,
        })
    }

    fn live_gate(&self) -> GateDecision {
        if self.config.live_trading {
            GateDecision::Submit
        } else {
            GateDecision::Hold(HoldReason::DryRun)
        }
    }
}

/// Quantity purchasable with `funds` at `price`, truncated to lot precision
/// so the order never spends more than allocated.
pub fn limit_quantity(funds: Decimal, price: Decimal) -> Decimal {
    (funds / price).round_dp_with_strategy(QUANTITY_DP, RoundingStrategy::ToZero)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
