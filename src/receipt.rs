//! Receipt
//!
//! Renders a placed order into the plain-text confirmation handed to the
//! notification collaborator. Composition lives here; delivery does not.

use std::fmt::Write;

use decimal_percentage::Percentage;
use rust_decimal::{Decimal, RoundingStrategy};
use rusty_money::{Money, iso};
use thiserror::Error;

use crate::{
    orders::Order,
    pricing::{PricingConfig, discounted_subtotal},
};

/// Errors that can occur while rendering a receipt.
#[derive(Debug, Error)]
pub enum ReceiptError {
    /// Formatting into the output buffer failed.
    #[error("could not format receipt text")]
    Format(#[from] std::fmt::Error),
}

/// A plain-text receipt for a placed order.
#[derive(Debug, Clone, Copy)]
pub struct Receipt<'a> {
    order: &'a Order,
    pricing: &'a PricingConfig,
}

impl<'a> Receipt<'a> {
    /// Create a receipt for an order under the given pricing parameters.
    #[must_use]
    pub fn new(order: &'a Order, pricing: &'a PricingConfig) -> Self {
        Receipt { order, pricing }
    }

    /// The order subtotal after the promotion discount, unrounded.
    #[must_use]
    pub fn discounted_subtotal(&self) -> Decimal {
        let discount = self.order.promotion.as_ref().map(|promo| {
            Percentage::from(Decimal::from(promo.discount) / Decimal::ONE_HUNDRED)
        });

        discounted_subtotal(self.order.subtotal, discount)
    }

    /// The amount saved by the applied promotion.
    #[must_use]
    pub fn savings(&self) -> Decimal {
        self.order.subtotal - self.discounted_subtotal()
    }

    /// Render the receipt body.
    ///
    /// # Errors
    ///
    /// Returns a [`ReceiptError::Format`] if writing to the buffer fails.
    pub fn render(&self) -> Result<String, ReceiptError> {
        let order = self.order;
        let mut out = String::new();

        writeln!(out, "Thank you for shopping with us! Here is your receipt.")?;
        writeln!(out)?;
        writeln!(out, "Order: {}", order.id)?;
        writeln!(
            out,
            "Placed: {}",
            order.placed_at.strftime("%m/%d/%y - %H:%M")
        )?;
        writeln!(out, "Ship to: {}", order.shipping_address)?;
        writeln!(out)?;

        for line in &order.lines {
            writeln!(out, "{} x{}", line.title, line.quantity)?;
            writeln!(out, "{}", usd(Decimal::from(line.quantity) * line.unit_price))?;
            writeln!(out, "ISBN: {}", line.isbn)?;
            writeln!(out)?;
        }

        writeln!(out, "Subtotal: {}", usd(order.subtotal))?;

        if let Some(promo) = &order.promotion {
            writeln!(
                out,
                "Promotion {} ({}% off): -{}",
                promo.code,
                promo.discount,
                usd(self.savings())
            )?;
        }

        let tax = (self.discounted_subtotal() * self.pricing.tax_rate)
            .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);

        writeln!(out, "Shipping and Handling: {}", usd(self.pricing.shipping_fee))?;
        writeln!(out, "Tax: {}", usd(tax))?;
        writeln!(out, "Order Total: {}", usd(order.total))?;

        Ok(out)
    }
}

/// Format a decimal amount as US dollars.
fn usd(amount: Decimal) -> Money<'static, iso::Currency> {
    Money::from_decimal(amount, iso::USD)
}
