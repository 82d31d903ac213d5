//! Checkout
//!
//! The checkout transaction converts a cart snapshot into an immutable order:
//! validate everything against current catalog and promotion state, commit
//! the multi-book stock decrement atomically, persist the order and replace
//! the user's cart. Every failure before the stock commit leaves catalog,
//! cart and ledger untouched, and the commit itself is all-or-nothing.
//!
//! All collaborators are injected at construction; the engine holds no
//! ambient state.

use std::fmt;
use std::sync::Arc;

use jiff::{Timestamp, Zoned, civil::Date};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use thiserror::Error;
use tracing::info;

use crate::{
    books::{Catalog, InventoryError},
    cart::{CartSnapshot, Carts},
    orders::{AppliedPromotion, Order, OrderKey, OrderLedger, OrderLine, OrderState},
    pricing::{PricingConfig, order_total},
    promotions::{Promotion, PromotionDirectory},
    users::UserId,
};

/// Errors that fail a checkout.
///
/// Every variant is reported with the system state provably unchanged, except
/// that none of them ever leaves a partial stock decrement behind.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CheckoutError {
    /// The cart snapshot has no lines.
    #[error("cannot check out an empty cart")]
    EmptyCart,

    /// The shipping address is missing required fields.
    #[error("shipping address is missing required fields")]
    IncompleteAddress,

    /// The payment method expired before today.
    #[error("payment method {reference:?} expired on {expired_on}")]
    PaymentExpired {
        /// Opaque payment-method reference.
        reference: String,
        /// Its expiration date.
        expired_on: Date,
    },

    /// No promotion exists with the supplied code.
    #[error("no promotion with code {0:?}")]
    PromotionNotFound(String),

    /// The promotion exists but is outside its validity window right now.
    #[error("promotion {0:?} is not active today")]
    PromotionExpired(String),

    /// A line failed inventory validation; nothing was decremented.
    #[error(transparent)]
    Inventory(#[from] InventoryError),
}

/// A validated shipping address supplied by the address collaborator.
///
/// The core checks that required fields are populated but does not validate
/// postal accuracy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingAddress {
    /// First street line.
    pub street_1: String,

    /// Optional second street line.
    pub street_2: Option<String>,

    /// City
    pub city: String,

    /// State or region code.
    pub state: String,

    /// Postal code.
    pub zip_code: String,
}

impl ShippingAddress {
    /// Whether every required field is populated.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        [&self.street_1, &self.city, &self.state, &self.zip_code]
            .iter()
            .all(|field| !field.trim().is_empty())
    }
}

impl fmt::Display for ShippingAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.street_1)?;

        if let Some(street_2) = &self.street_2 {
            write!(f, ", {street_2}")?;
        }

        write!(f, ", {}, {} {}", self.city, self.state, self.zip_code)
    }
}

/// A payment-method reference supplied by the payment collaborator.
///
/// Opaque to the core beyond its expiration date; no payment network is ever
/// contacted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentMethod {
    /// Opaque reference recorded on the order.
    pub reference: String,

    /// Last day the method is usable.
    pub expires_on: Date,
}

/// Source of the current time for window checks and order timestamps.
///
/// Injected so promotion windows and payment expirations can be evaluated
/// deterministically under test.
pub trait Clock: fmt::Debug + Send + Sync {
    /// The current instant.
    fn now(&self) -> Timestamp;

    /// The current calendar day in the store's local time zone.
    fn today(&self) -> Date;
}

/// Wall-clock time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Timestamp::now()
    }

    fn today(&self) -> Date {
        Zoned::now().date()
    }
}

/// A clock pinned to a fixed instant, for deterministic evaluation.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock {
    /// The pinned instant.
    pub now: Timestamp,

    /// The pinned calendar day.
    pub today: Date,
}

impl Clock for FixedClock {
    fn now(&self) -> Timestamp {
        self.now
    }

    fn today(&self) -> Date {
        self.today
    }
}

/// The checkout transaction engine.
#[derive(Debug)]
pub struct CheckoutEngine {
    catalog: Arc<Catalog>,
    promotions: Arc<PromotionDirectory>,
    carts: Arc<Carts>,
    ledger: Arc<OrderLedger>,
    pricing: PricingConfig,
    clock: Arc<dyn Clock>,
}

impl CheckoutEngine {
    /// Assemble an engine from its collaborators.
    #[must_use]
    pub fn new(
        catalog: Arc<Catalog>,
        promotions: Arc<PromotionDirectory>,
        carts: Arc<Carts>,
        ledger: Arc<OrderLedger>,
        pricing: PricingConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        CheckoutEngine {
            catalog,
            promotions,
            carts,
            ledger,
            pricing,
            clock,
        }
    }

    /// Convert a cart snapshot into a placed order.
    ///
    /// Validates the snapshot, address, payment expiration and promotion
    /// code, commits the stock decrement for every line atomically, appends
    /// the order to the ledger in `Processing` state and replaces the user's
    /// cart with a fresh empty one. The returned order carries its
    /// ledger-assigned id.
    ///
    /// # Errors
    ///
    /// Any [`CheckoutError`]. Failures have no observable side effect: stock
    /// is only decremented when every line can be satisfied, and the order
    /// ledger and cart are only touched after the stock commit succeeds.
    #[tracing::instrument(skip_all, fields(%user, lines = snapshot.lines().len()))]
    pub fn checkout(
        &self,
        user: UserId,
        snapshot: &CartSnapshot,
        payment: &PaymentMethod,
        address: &ShippingAddress,
        promo_code: Option<&str>,
    ) -> Result<Order, CheckoutError> {
        if snapshot.is_empty() {
            return Err(CheckoutError::EmptyCart);
        }

        if !address.is_complete() {
            return Err(CheckoutError::IncompleteAddress);
        }

        let today = self.clock.today();

        if payment.expires_on < today {
            return Err(CheckoutError::PaymentExpired {
                reference: payment.reference.clone(),
                expired_on: payment.expires_on,
            });
        }

        let promotion = promo_code.map(|code| self.resolve_promotion(code, today)).transpose()?;

        let mut lines: SmallVec<[OrderLine; 8]> = SmallVec::with_capacity(snapshot.lines().len());
        for line in snapshot.lines() {
            let book = self
                .catalog
                .book(line.book)
                .ok_or(InventoryError::UnknownBook(line.book))?;

            lines.push(OrderLine {
                book: line.book,
                title: book.title,
                isbn: book.isbn,
                quantity: line.quantity,
                unit_price: line.unit_price,
            });
        }

        // The only mutation of shared state: every line's stock is validated
        // and decremented under the per-book locks, or nothing is.
        self.catalog.take_stock(&snapshot.stock_requests())?;

        let discount = promotion.as_ref().map(Promotion::discount_fraction);
        let total = order_total(snapshot.subtotal(), discount, &self.pricing);

        let order = Order {
            id: OrderKey::default(),
            user,
            lines,
            promotion: promotion.map(|promo| AppliedPromotion {
                code: promo.code().to_owned(),
                discount: promo.discount(),
            }),
            payment_ref: payment.reference.clone(),
            shipping_address: address.clone(),
            placed_at: self.clock.now(),
            subtotal: snapshot.subtotal(),
            total,
            state: OrderState::Processing,
        };

        let key = self.ledger.create(order.clone());
        self.carts.replace(user);

        info!(order = %key, %total, "order placed");

        Ok(Order { id: key, ..order })
    }

    fn resolve_promotion(&self, code: &str, today: Date) -> Result<Promotion, CheckoutError> {
        let promotion = self
            .promotions
            .lookup(code)
            .ok_or_else(|| CheckoutError::PromotionNotFound(code.to_owned()))?;

        if !promotion.is_active(today) {
            return Err(CheckoutError::PromotionExpired(code.to_owned()));
        }

        Ok(promotion)
    }
}
