//! Order price and quantity resolution.
//!
//! Market-mode orders are sent to the client as aggressive limit orders: the base
//! price moved by `offset` in the direction of the trade, then rounded to the
//! symbol's tick away from the base so the move is never lost to rounding.

use rust_decimal::{Decimal, RoundingStrategy};
use std::str::FromStr;

use crate::config::PricingConfig;
use crate::error::ExecutorError;
use crate::symbols::SymbolBook;
use crate::types::{PriceMode, Side};

/// Aggressive limit price for a market-mode order.
///
/// Buy results are ceiled to `decimals`, sell results floored, so a buy is always
/// strictly above `base` and a sell strictly below it.
pub fn compute_market_price(base: Decimal, side: Side, offset: Decimal, decimals: u32) -> Result<Decimal, ExecutorError> {
    if base <= Decimal::ZERO {
        return Err(invalid(format!("base price {} must be positive", base)));
    }
    if offset <= Decimal::ZERO || offset >= Decimal::ONE {
        return Err(invalid(format!("offset {} must be in (0, 1)", offset)));
    }

    let (factor, strategy) = match side {
        Side::Buy => (Decimal::ONE.checked_add(offset), RoundingStrategy::ToPositiveInfinity),
        Side::Sell => (Decimal::ONE.checked_sub(offset), RoundingStrategy::ToNegativeInfinity),
        Side::Cancel => return Err(invalid("cancel orders carry no price")),
    };
    let exact = factor
        .and_then(|f| base.checked_mul(f))
        .ok_or_else(|| invalid(format!("base price {} is out of range", base)))?;

    let price = exact.round_dp_with_strategy(decimals, strategy);
    if price <= Decimal::ZERO {
        return Err(invalid(format!(
            "{} price {} rounds to {} at {} decimals",
            side_label(side),
            exact,
            price,
            decimals
        )));
    }
    rescale_exact(price, decimals)
}

/// Pads to exactly `decimals` places; fails when the value cannot keep them.
fn rescale_exact(price: Decimal, decimals: u32) -> Result<Decimal, ExecutorError> {
    let mut padded = price;
    padded.rescale(decimals);
    if padded != price || padded.scale() != decimals {
        return Err(invalid(format!("price {} is out of range at {} decimals", price, decimals)));
    }
    Ok(padded)
}

pub fn parse_price(raw: &str) -> Result<Decimal, ExecutorError> {
    let price = Decimal::from_str(raw.trim()).map_err(|e| invalid(format!("price '{}' is not a decimal: {}", raw, e)))?;
    if price <= Decimal::ZERO {
        return Err(invalid(format!("price {} must be positive", price)));
    }
    Ok(price)
}

#[derive(Clone)]
pub struct PriceCalculator {
    default_offset: Decimal,
    symbols: SymbolBook,
}

impl PriceCalculator {
    pub fn new(config: &PricingConfig, symbols: SymbolBook) -> Self {
        Self {
            default_offset: config.market_offset,
            symbols,
        }
    }

    pub fn offset_for(&self, code: &str) -> Decimal {
        self.symbols.market_offset(code).unwrap_or(self.default_offset)
    }

    /// The exact text typed into the price field.
    pub fn resolve_price(&self, code: &str, side: Side, raw: &str, mode: PriceMode) -> Result<String, ExecutorError> {
        let decimals = self.symbols.price_decimals(code);
        let price = parse_price(raw)?;

        let resolved = match mode {
            PriceMode::Market => compute_market_price(price, side, self.offset_for(code), decimals)?,
            PriceMode::Limit => {
                if price.normalize().scale() > decimals {
                    return Err(invalid(format!(
                        "limit price {} has more than {} decimals for {}",
                        raw.trim(),
                        decimals,
                        code
                    )));
                }
                rescale_exact(price, decimals)?
            }
        };

        Ok(resolved.to_string())
    }

    /// Rounds down to whole board lots.
    pub fn round_quantity(&self, code: &str, quantity: u64) -> Result<u64, ExecutorError> {
        let lot = self.symbols.lot_size(code).max(1);
        let rounded = quantity / lot * lot;
        if rounded == 0 {
            return Err(invalid(format!(
                "quantity {} is below one lot ({}) for {}",
                quantity, lot, code
            )));
        }
        Ok(rounded)
    }
}

fn side_label(side: Side) -> &'static str {
    match side {
        Side::Buy => "buy",
        Side::Sell => "sell",
        Side::Cancel => "cancel",
    }
}

fn invalid(reason: impl Into<String>) -> ExecutorError {
    ExecutorError::InvalidOrder { reason: reason.into() }
}
