//! Pricing
//!
//! Order totals are computed in exact decimal arithmetic and rounded to
//! currency precision once, at the very end. Intermediate values (discounted
//! subtotal, tax) are never rounded.

use decimal_percentage::Percentage;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Deserialize;

/// Storefront pricing parameters.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PricingConfig {
    /// Sales tax rate applied to the discounted subtotal.
    pub tax_rate: Decimal,

    /// Flat shipping and handling fee added to every order.
    pub shipping_fee: Decimal,
}

impl Default for PricingConfig {
    fn default() -> Self {
        PricingConfig {
            tax_rate: Decimal::new(7, 2),
            shipping_fee: Decimal::new(399, 2),
        }
    }
}

/// Calculate an order total from a cart subtotal.
///
/// Applies the promotion discount (if any), adds tax on the discounted
/// subtotal and the flat shipping fee, then rounds to two decimal places.
#[must_use]
pub fn order_total(
    subtotal: Decimal,
    discount: Option<Percentage>,
    config: &PricingConfig,
) -> Decimal {
    let discounted = discounted_subtotal(subtotal, discount);
    let taxed = discounted + discounted * config.tax_rate;

    (taxed + config.shipping_fee).round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Apply a promotion discount to a subtotal, without rounding.
#[must_use]
pub fn discounted_subtotal(subtotal: Decimal, discount: Option<Percentage>) -> Decimal {
    match discount {
        Some(fraction) => subtotal - fraction * subtotal,
        None => subtotal,
    }
}
